//! 内容分类与规范化
//!
//! 优先级固定：图片 > 文件列表 > HTML > 纯文本，取第一个可用的表示形式。
//! 规范化规则：
//! - 图片：缩放、PNG 编码为 data URL，元数据记录尺寸与原始尺寸
//! - 文件：路径按换行拼接，元数据记录路径数组与数量
//! - HTML：保留原始 HTML，元数据记录纯文本回退
//! - 纯文本：去除首尾空白

use serde_json::{json, Map, Value};

use crate::error::AppError;
use crate::model::{meta, ClipItem, ContentKind};

use super::image::{normalize_image, RawImage, ENCODED_FORMAT};
use super::reader::ClipboardSnapshot;

/// 分类结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardPayload {
    Image(RawImage),
    Files(Vec<String>),
    Html { html: String, plain_text: String },
    Text(String),
}

impl ClipboardPayload {
    pub fn kind(&self) -> ContentKind {
        match self {
            ClipboardPayload::Image(_) => ContentKind::Image,
            ClipboardPayload::Files(_) => ContentKind::File,
            ClipboardPayload::Html { .. } => ContentKind::Html,
            ClipboardPayload::Text(_) => ContentKind::Text,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// 粗略去除 HTML 标签，仅在剪贴板没有提供纯文本时使用
pub(crate) fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 按优先级挑选表示形式；没有可用内容时返回 `None`
pub fn classify(snapshot: ClipboardSnapshot) -> Option<ClipboardPayload> {
    let ClipboardSnapshot { image, files, html, text } = snapshot;

    if let Some(image) = image.filter(|img| img.width > 0 && img.height > 0) {
        return Some(ClipboardPayload::Image(image));
    }

    let files: Vec<String> = files
        .into_iter()
        .map(|path| path.trim().to_string())
        .filter(|path| !path.is_empty())
        .collect();
    if !files.is_empty() {
        return Some(ClipboardPayload::Files(files));
    }

    let text = non_blank(text).map(|t| t.trim().to_string());

    if let Some(html) = non_blank(html) {
        let plain_text = text.unwrap_or_else(|| strip_tags(&html));
        return Some(ClipboardPayload::Html { html, plain_text });
    }

    text.map(ClipboardPayload::Text)
}

/// 将分类结果转换为待入库条目
pub fn normalize(payload: ClipboardPayload) -> Result<ClipItem, AppError> {
    let kind = payload.kind();
    let mut metadata = Map::new();

    let content = match payload {
        ClipboardPayload::Image(raw) => {
            let encoded = normalize_image(&raw)?;
            metadata.insert(meta::WIDTH.to_string(), json!(encoded.width));
            metadata.insert(meta::HEIGHT.to_string(), json!(encoded.height));
            metadata.insert(meta::FORMAT.to_string(), json!(ENCODED_FORMAT));
            metadata.insert(meta::ORIGINAL_WIDTH.to_string(), json!(encoded.original_width));
            metadata.insert(meta::ORIGINAL_HEIGHT.to_string(), json!(encoded.original_height));
            encoded.data_url
        }
        ClipboardPayload::Files(files) => {
            metadata.insert(meta::FILE_COUNT.to_string(), json!(files.len()));
            let content = files.join("\n");
            metadata.insert(
                meta::FILES.to_string(),
                Value::Array(files.into_iter().map(Value::String).collect()),
            );
            content
        }
        ClipboardPayload::Html { html, plain_text } => {
            metadata.insert(meta::PLAIN_TEXT.to_string(), Value::String(plain_text));
            html
        }
        ClipboardPayload::Text(text) => text,
    };

    Ok(ClipItem::captured(content, kind, metadata))
}

/// 分类 + 规范化
pub fn capture_item(snapshot: ClipboardSnapshot) -> Result<Option<ClipItem>, AppError> {
    classify(snapshot).map(normalize).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_image() -> RawImage {
        RawImage { width: 2, height: 2, rgba: vec![255; 16] }
    }

    #[test]
    fn image_wins_over_everything() {
        let snapshot = ClipboardSnapshot {
            image: Some(tiny_image()),
            files: vec!["/tmp/a".to_string()],
            html: Some("<b>x</b>".to_string()),
            text: Some("x".to_string()),
        };
        assert_eq!(classify(snapshot).map(|p| p.kind()), Some(ContentKind::Image));
    }

    #[test]
    fn files_win_over_html_and_text() {
        let snapshot = ClipboardSnapshot {
            files: vec!["/tmp/a".to_string(), " ".to_string(), "/tmp/b".to_string()],
            html: Some("<b>x</b>".to_string()),
            text: Some("x".to_string()),
            ..ClipboardSnapshot::default()
        };
        assert_eq!(
            classify(snapshot),
            Some(ClipboardPayload::Files(vec!["/tmp/a".to_string(), "/tmp/b".to_string()]))
        );
    }

    #[test]
    fn html_keeps_plain_text_fallback() {
        let snapshot = ClipboardSnapshot {
            html: Some("<p>Hello <b>World</b></p>".to_string()),
            text: Some("  Hello World  ".to_string()),
            ..ClipboardSnapshot::default()
        };
        let item = capture_item(snapshot).expect("capture").expect("item");
        assert_eq!(item.content_type, ContentKind::Html);
        assert_eq!(item.content, "<p>Hello <b>World</b></p>");
        assert_eq!(item.metadata[meta::PLAIN_TEXT], json!("Hello World"));
    }

    #[test]
    fn html_without_text_strips_tags() {
        let snapshot = ClipboardSnapshot {
            html: Some("<div>a\n<span>b</span></div>".to_string()),
            ..ClipboardSnapshot::default()
        };
        let item = capture_item(snapshot).expect("capture").expect("item");
        assert_eq!(item.metadata[meta::PLAIN_TEXT], json!("a b"));
    }

    #[test]
    fn text_is_trimmed() {
        let item = capture_item(ClipboardSnapshot::text("  hello \n")).expect("capture").expect("item");
        assert_eq!(item.content, "hello");
        assert_eq!(item.content_type, ContentKind::Text);
    }

    #[test]
    fn blank_snapshot_yields_nothing() {
        assert!(capture_item(ClipboardSnapshot::text("   ")).expect("capture").is_none());
        assert!(capture_item(ClipboardSnapshot::default()).expect("capture").is_none());
    }

    #[test]
    fn file_list_is_newline_joined_with_count() {
        let snapshot = ClipboardSnapshot {
            files: vec!["/tmp/a".to_string(), "/tmp/b".to_string()],
            ..ClipboardSnapshot::default()
        };
        let item = capture_item(snapshot).expect("capture").expect("item");
        assert_eq!(item.content, "/tmp/a\n/tmp/b");
        assert_eq!(item.metadata[meta::FILE_COUNT], json!(2));
        assert_eq!(item.preview_text(50), "[文件] 2 个文件");
    }

    #[test]
    fn image_metadata_records_dimensions() {
        let snapshot = ClipboardSnapshot { image: Some(tiny_image()), ..ClipboardSnapshot::default() };
        let item = capture_item(snapshot).expect("capture").expect("item");
        assert_eq!(item.metadata[meta::WIDTH], json!(2));
        assert_eq!(item.metadata[meta::FORMAT], json!("png"));
        assert_eq!(item.preview_text(50), "[图片] 2x2");

        let mut keys: Vec<&str> = item.metadata.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["format", "height", "originalHeight", "originalWidth", "width"]);
    }

    #[test]
    fn broken_image_is_an_error() {
        let snapshot = ClipboardSnapshot {
            image: Some(RawImage { width: 3, height: 3, rgba: vec![0; 4] }),
            ..ClipboardSnapshot::default()
        };
        assert!(capture_item(snapshot).is_err());
    }
}
