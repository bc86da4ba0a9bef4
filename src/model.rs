//! 剪贴板条目数据模型
//!
//! # 设计思路
//!
//! `ClipItem` 是一次剪贴板捕获的值对象：内容、捕获时间、内容类型、内容哈希、
//! 收藏标记、标签与类型相关的元数据。内容哈希在创建时计算一次，之后作为
//! 去重、收藏切换、删除的唯一身份键，不再重算。
//!
//! # 实现思路
//!
//! - 内容类型使用封闭枚举 `ContentKind`，新增类型时由编译器强制补全所有 `match`。
//! - 哈希：对内容 UTF-8 字节做 SHA-256，取前 16 位十六进制。
//! - 记录编解码基于 `serde`：缺失字段取默认值，未知内容类型或无法解析的时间戳
//!   直接报错，由调用方（加载 / 导入）跳过该条并记录告警。
//! - 时间戳写出为带时区的 RFC 3339（保留纳秒精度），读入时兼容旧版不带时区的写法。

use std::fmt;

use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::AppError;

/// 内容哈希保留的十六进制位数
pub const HASH_HEX_LEN: usize = 16;

/// 默认预览长度（字符数）
pub const DEFAULT_PREVIEW_LEN: usize = 50;

const TRUNCATION_MARKER: &str = "...";

/// 元数据键（与设置文件一致使用 camelCase）
pub mod meta {
    pub const WIDTH: &str = "width";
    pub const HEIGHT: &str = "height";
    pub const FORMAT: &str = "format";
    pub const ORIGINAL_WIDTH: &str = "originalWidth";
    pub const ORIGINAL_HEIGHT: &str = "originalHeight";
    pub const FILES: &str = "files";
    pub const FILE_COUNT: &str = "fileCount";
    pub const PLAIN_TEXT: &str = "plainText";
}

/// 剪贴板内容类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    #[default]
    Text,
    Image,
    File,
    Html,
    Rtf,
}

impl ContentKind {
    pub const ALL: [ContentKind; 5] = [
        ContentKind::Text,
        ContentKind::Image,
        ContentKind::File,
        ContentKind::Html,
        ContentKind::Rtf,
    ];

    /// 持久化使用的稳定字符串
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Image => "image",
            ContentKind::File => "file",
            ContentKind::Html => "html",
            ContentKind::Rtf => "rtf",
        }
    }

    /// 从持久化字符串解析，未知值返回 `None`
    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|kind| kind.as_str() == normalized)
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 计算内容哈希（SHA-256 截断为 16 位十六进制）
///
/// 对同一内容结果确定；截断后的碰撞按"内容相同"处理，不视为错误。
pub fn compute_content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut hex = hex::encode(digest);
    hex.truncate(HASH_HEX_LEN);
    hex
}

/// 解析时间戳字符串
///
/// 优先按 RFC 3339 解析；旧版导出文件写的是不带时区的本地时间，按本地时区解释。
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|ts| ts.with_timezone(&Utc))
}

/// 将时间戳格式化为 RFC 3339（UTC，按需保留小数秒）
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

mod timestamp_format {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("无法解析时间戳: {raw}")))
    }
}

/// 剪贴板历史条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipItem {
    #[serde(default)]
    pub content: String,
    #[serde(with = "timestamp_format", default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, alias = "contentType")]
    pub content_type: ContentKind,
    #[serde(default, alias = "contentHash")]
    pub content_hash: String,
    #[serde(default, alias = "isFavorite")]
    pub is_favorite: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ClipItem {
    /// 以纯文本类型创建条目，并立即计算内容哈希
    pub fn new(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        let content = content.into();
        let content_hash = compute_content_hash(&content);
        Self {
            content,
            timestamp,
            content_type: ContentKind::Text,
            content_hash,
            is_favorite: false,
            tags: Vec::new(),
            metadata: Map::new(),
        }
    }

    /// 以当前时间创建指定类型的条目
    pub fn captured(content: impl Into<String>, kind: ContentKind, metadata: Map<String, Value>) -> Self {
        Self::new(content, Utc::now())
            .with_kind(kind)
            .with_metadata(metadata)
    }

    pub fn with_kind(mut self, kind: ContentKind) -> Self {
        self.content_type = kind;
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_favorite(mut self, is_favorite: bool) -> Self {
        self.is_favorite = is_favorite;
        self
    }

    /// 内容为空或仅含空白
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// 未携带哈希的记录（旧格式）在读取后补算
    pub fn ensure_hash(&mut self) {
        if self.content_hash.is_empty() && !self.content.is_empty() {
            self.content_hash = compute_content_hash(&self.content);
        }
    }

    fn metadata_u64(&self, key: &str) -> Option<u64> {
        self.metadata.get(key).and_then(Value::as_u64)
    }

    fn file_paths(&self) -> Vec<String> {
        match self.metadata.get(meta::FILES).and_then(Value::as_array) {
            Some(files) => files
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            None => self
                .content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// 面向列表展示的完整文本（未截断）
    pub fn display_text(&self) -> String {
        match self.content_type {
            ContentKind::Text => self.content.clone(),
            ContentKind::Image => {
                let dim = |key| {
                    self.metadata_u64(key)
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| "?".to_string())
                };
                format!("[图片] {}x{}", dim(meta::WIDTH), dim(meta::HEIGHT))
            }
            ContentKind::File => {
                let files = self.file_paths();
                match files.as_slice() {
                    [single] => format!("[文件] {single}"),
                    _ => {
                        let count = self
                            .metadata_u64(meta::FILE_COUNT)
                            .unwrap_or(files.len() as u64);
                        format!("[文件] {count} 个文件")
                    }
                }
            }
            ContentKind::Html => "[HTML 内容]".to_string(),
            ContentKind::Rtf => "[RTF 内容]".to_string(),
        }
    }

    /// 预览文本：超过 `max_length` 个字符时截断并追加 `...`
    pub fn preview_text(&self, max_length: usize) -> String {
        let text = self.display_text();
        if text.chars().count() > max_length {
            let mut cut: String = text.chars().take(max_length).collect();
            cut.push_str(TRUNCATION_MARKER);
            cut
        } else {
            text
        }
    }

    /// 从结构化记录读取条目
    ///
    /// 缺失字段取默认值；未知内容类型、无法解析的时间戳返回错误。
    pub fn from_record(record: Value) -> Result<Self, AppError> {
        let mut item: ClipItem = serde_json::from_value(record)?;
        item.ensure_hash();
        Ok(item)
    }

    /// 转换为结构化记录
    pub fn to_record(&self) -> Result<Value, AppError> {
        Ok(serde_json::to_value(self)?)
    }
}
