//! 将历史条目写回系统剪贴板
//!
//! 写入前通过 `CaptureSuppressor::arm()` 取得守卫，写入成功后 `commit()`，
//! 保证这次写入引起的剪贴板变化不会被当成新的捕获；写入失败时守卫被丢弃，标志随之清除。

use std::borrow::Cow;

use arboard::{Clipboard, ImageData};

use crate::error::AppError;
use crate::model::{meta, ClipItem, ContentKind};

use super::classify::strip_tags;
use super::image::{decode_data_url, RawImage};
use super::CaptureSuppressor;

/// 写入剪贴板的具体表示形式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WritePayload {
    Text(String),
    Html { html: String, alt_text: String },
    Image(RawImage),
}

impl WritePayload {
    /// 根据条目类型构造写入内容；文件列表以换行分隔的路径文本写回
    pub fn from_item(item: &ClipItem) -> Result<Self, AppError> {
        match item.content_type {
            ContentKind::Text | ContentKind::File | ContentKind::Rtf => {
                Ok(WritePayload::Text(item.content.clone()))
            }
            ContentKind::Html => {
                let alt_text = item
                    .metadata
                    .get(meta::PLAIN_TEXT)
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| strip_tags(&item.content));
                Ok(WritePayload::Html {
                    html: item.content.clone(),
                    alt_text,
                })
            }
            ContentKind::Image => Ok(WritePayload::Image(decode_data_url(&item.content)?)),
        }
    }
}

pub trait ClipboardWriter {
    fn write(&mut self, payload: WritePayload) -> Result<(), AppError>;
}

/// 基于 `arboard` 的写入器
///
/// 部分平台上剪贴板内容由写入进程持有，因此 `Clipboard` 实例在写入后保留。
#[derive(Default)]
pub struct ArboardWriter {
    clipboard: Option<Clipboard>,
}

impl ArboardWriter {
    fn clipboard(&mut self) -> Result<&mut Clipboard, AppError> {
        if self.clipboard.is_none() {
            let clipboard = Clipboard::new()
                .map_err(|e| AppError::Clipboard(format!("打开剪贴板失败: {}", e)))?;
            self.clipboard = Some(clipboard);
        }
        self.clipboard
            .as_mut()
            .ok_or_else(|| AppError::Clipboard("剪贴板未初始化".to_string()))
    }
}

impl ClipboardWriter for ArboardWriter {
    fn write(&mut self, payload: WritePayload) -> Result<(), AppError> {
        let clipboard = self.clipboard()?;
        let result = match payload {
            WritePayload::Text(text) => clipboard.set_text(text),
            WritePayload::Html { html, alt_text } => clipboard.set_html(html, Some(alt_text)),
            WritePayload::Image(raw) => clipboard.set_image(ImageData {
                width: raw.width,
                height: raw.height,
                bytes: Cow::Owned(raw.rgba),
            }),
        };
        result.map_err(|e| AppError::Clipboard(e.to_string()))
    }
}

/// 将条目写回剪贴板，并抑制由此触发的下一次捕获
pub fn copy_item_to_clipboard(
    writer: &mut dyn ClipboardWriter,
    suppressor: &CaptureSuppressor,
    item: &ClipItem,
) -> Result<(), AppError> {
    let payload = WritePayload::from_item(item)?;

    let guard = suppressor.arm();
    writer.write(payload)?;
    guard.commit();

    log::debug!("📋 已将条目写回剪贴板: {}", item.content_hash);
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::{json, Map};
    use tokio::time::Instant;

    use super::*;

    #[derive(Default)]
    struct MemoryWriter {
        written: Vec<WritePayload>,
        fail: bool,
    }

    impl ClipboardWriter for MemoryWriter {
        fn write(&mut self, payload: WritePayload) -> Result<(), AppError> {
            if self.fail {
                return Err(AppError::Clipboard("occupied".to_string()));
            }
            self.written.push(payload);
            Ok(())
        }
    }

    #[test]
    fn successful_write_arms_one_suppressed_cycle() {
        let mut writer = MemoryWriter::default();
        let suppressor = CaptureSuppressor::new();
        let item = ClipItem::new("hello", Utc::now());

        copy_item_to_clipboard(&mut writer, &suppressor, &item).expect("write");
        assert_eq!(writer.written, vec![WritePayload::Text("hello".to_string())]);
        assert!(suppressor.take(Instant::now()));
        assert!(!suppressor.take(Instant::now()));
    }

    #[test]
    fn failed_write_leaves_capture_enabled() {
        let mut writer = MemoryWriter { fail: true, ..MemoryWriter::default() };
        let suppressor = CaptureSuppressor::new();
        let item = ClipItem::new("hello", Utc::now());

        assert!(copy_item_to_clipboard(&mut writer, &suppressor, &item).is_err());
        assert!(!suppressor.is_active());
    }

    #[test]
    fn html_uses_plain_text_metadata_as_alternative() {
        let mut metadata = Map::new();
        metadata.insert(meta::PLAIN_TEXT.to_string(), json!("Hi"));
        let item = ClipItem::new("<b>Hi</b>", Utc::now())
            .with_kind(ContentKind::Html)
            .with_metadata(metadata);
        assert_eq!(
            WritePayload::from_item(&item).expect("payload"),
            WritePayload::Html { html: "<b>Hi</b>".to_string(), alt_text: "Hi".to_string() }
        );
    }

    #[test]
    fn invalid_image_item_fails_before_arming() {
        let mut writer = MemoryWriter::default();
        let suppressor = CaptureSuppressor::new();
        let item = ClipItem::new("not a data url", Utc::now()).with_kind(ContentKind::Image);

        assert!(copy_item_to_clipboard(&mut writer, &suppressor, &item).is_err());
        assert!(writer.written.is_empty());
        assert!(!suppressor.is_active());
    }
}
