//! 行编解码子模块
//!
//! ## 职责
//! - 大文本内容的透明压缩 / 解压（zstd）
//! - `DateTime<Utc>` 与 SQLite 整数列（纳秒）之间的转换
//!
//! ## 错误语义
//! - 压缩、解压、UTF-8 校验失败以及超出纳秒表示范围的时间统一映射为 `AppError::Database`

use chrono::{DateTime, TimeZone, Utc};

use crate::error::AppError;

/// 超过该字符数的内容压缩存储
pub const COMPRESSION_THRESHOLD_CHARS: usize = 1000;

const ZSTD_LEVEL: i32 = 3;

/// 编码内容列，返回 `(bytes, compressed)`
pub(super) fn encode_content(content: &str) -> Result<(Vec<u8>, bool), AppError> {
    if content.chars().count() <= COMPRESSION_THRESHOLD_CHARS {
        return Ok((content.as_bytes().to_vec(), false));
    }
    let packed = zstd::encode_all(content.as_bytes(), ZSTD_LEVEL)
        .map_err(|e| AppError::Database(format!("压缩内容失败: {}", e)))?;
    Ok((packed, true))
}

/// 解码内容列
pub(super) fn decode_content(bytes: Vec<u8>, compressed: bool) -> Result<String, AppError> {
    let raw = if compressed {
        zstd::decode_all(bytes.as_slice())
            .map_err(|e| AppError::Database(format!("解压内容失败: {}", e)))?
    } else {
        bytes
    };
    String::from_utf8(raw).map_err(|e| AppError::Database(format!("内容不是有效 UTF-8: {}", e)))
}

pub(super) fn to_nanos(ts: &DateTime<Utc>) -> Result<i64, AppError> {
    ts.timestamp_nanos_opt()
        .ok_or_else(|| AppError::Database(format!("时间戳超出可存储范围: {}", ts)))
}

pub(super) fn from_nanos(nanos: i64) -> DateTime<Utc> {
    Utc.timestamp_nanos(nanos)
}
