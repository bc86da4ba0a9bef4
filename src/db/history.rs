//! 历史条目子模块
//!
//! ## 职责
//! - 条目的插入（按内容哈希去重刷新）、查询、删除、收藏切换、清空
//! - 统计总数 / 今日 / 收藏
//!
//! ## 错误语义
//! - SQL 失败统一映射为 `AppError::Database`
//! - 单行数据损坏（未知类型、非法 JSON、解压失败）不视为错误：记录告警后跳过该行

use chrono::{DateTime, Local, TimeZone, Utc};
use rusqlite::{params, Connection, Row};
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::model::{compute_content_hash, ClipItem, ContentKind};

use super::codec::{decode_content, encode_content, from_nanos, to_nanos};
use super::{HistoryQuery, HistoryStats};

const SELECT_COLUMNS: &str =
    "SELECT content_hash, content, content_type, timestamp, is_favorite, tags, metadata, compressed FROM history";

/// 数据库中的原始行，解码前不做任何校验
struct RawRow {
    content_hash: String,
    content: Vec<u8>,
    content_type: String,
    timestamp: i64,
    is_favorite: i64,
    tags: String,
    metadata: String,
    compressed: i64,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            content_hash: row.get(0)?,
            content: row.get(1)?,
            content_type: row.get(2)?,
            timestamp: row.get(3)?,
            is_favorite: row.get(4)?,
            tags: row.get(5)?,
            metadata: row.get(6)?,
            compressed: row.get(7)?,
        })
    }

    fn decode(self) -> Result<ClipItem, AppError> {
        let content_type = ContentKind::parse(&self.content_type).ok_or_else(|| {
            AppError::Database(format!("未知内容类型: {}", self.content_type))
        })?;
        let tags: Vec<String> = serde_json::from_str(&self.tags)?;
        let metadata: Map<String, Value> = serde_json::from_str(&self.metadata)?;
        let content = decode_content(self.content, self.compressed != 0)?;

        Ok(ClipItem {
            content,
            timestamp: from_nanos(self.timestamp),
            content_type,
            content_hash: self.content_hash,
            is_favorite: self.is_favorite != 0,
            tags,
            metadata,
        })
    }
}

/// 执行查询并逐行解码，损坏行跳过；`accept` 返回 `false` 时停止读取
fn scan_rows(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
    mut accept: impl FnMut(ClipItem) -> bool,
) -> Result<(), AppError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| AppError::Database(format!("准备查询失败: {}", e)))?;
    let rows = stmt
        .query_map(params, RawRow::from_row)
        .map_err(|e| AppError::Database(format!("查询历史失败: {}", e)))?;

    for row in rows {
        let decoded = row
            .map_err(|e| AppError::Database(format!("读取行失败: {}", e)))
            .and_then(RawRow::decode);
        match decoded {
            Ok(item) => {
                if !accept(item) {
                    break;
                }
            }
            Err(e) => log::warn!("⚠️ 跳过损坏的历史记录: {}", e),
        }
    }
    Ok(())
}

fn from_sql_count(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}

pub(super) fn add_item(conn: &Connection, item: &ClipItem) -> Result<bool, AppError> {
    if item.is_blank() {
        return Ok(false);
    }

    let content_hash = if item.content_hash.is_empty() {
        compute_content_hash(&item.content)
    } else {
        item.content_hash.clone()
    };
    let (content, compressed) = encode_content(&item.content)?;
    let timestamp = to_nanos(&item.timestamp)?;
    let tags = serde_json::to_string(&item.tags)?;
    let metadata = serde_json::to_string(&item.metadata)?;

    // 已存在的同哈希条目原地刷新：时间取较新者，收藏与已有标签不会被一次普通捕获抹掉
    conn.execute(
        "INSERT INTO history (content_hash, content, content_type, timestamp, is_favorite, tags, metadata, compressed)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(content_hash) DO UPDATE SET
             content = excluded.content,
             content_type = excluded.content_type,
             timestamp = MAX(history.timestamp, excluded.timestamp),
             is_favorite = MAX(history.is_favorite, excluded.is_favorite),
             tags = CASE WHEN excluded.tags = '[]' THEN history.tags ELSE excluded.tags END,
             metadata = excluded.metadata,
             compressed = excluded.compressed",
        params![
            content_hash,
            content,
            item.content_type.as_str(),
            timestamp,
            i64::from(item.is_favorite),
            tags,
            metadata,
            i64::from(compressed),
        ],
    ).map_err(|e| AppError::Database(format!("写入历史失败: {}", e)))?;

    Ok(true)
}

pub(super) fn query_items(conn: &Connection, query: &HistoryQuery) -> Result<Vec<ClipItem>, AppError> {
    let filter = if query.favorites_only { " WHERE is_favorite = 1" } else { "" };
    let order = " ORDER BY is_favorite DESC, timestamp DESC, id DESC";
    let mut items = Vec::new();

    if query.limit == 0 {
        return Ok(items);
    }

    // 偏移按成功解码的行计算：损坏行既不占页内名额也不占偏移；
    // 内容可能是压缩存储的，搜索只能解码后在内存中匹配
    let needle = query.needle();
    let sql = format!("{SELECT_COLUMNS}{filter}{order}");
    let mut to_skip = query.offset;
    scan_rows(conn, &sql, [], |item| {
        if let Some(needle) = needle.as_deref() {
            if !item.content.to_lowercase().contains(needle) {
                return true;
            }
        }
        if to_skip > 0 {
            to_skip -= 1;
            return true;
        }
        items.push(item);
        items.len() < query.limit
    })?;

    Ok(items)
}

pub(super) fn get_item(conn: &Connection, content_hash: &str) -> Result<Option<ClipItem>, AppError> {
    let sql = format!("{SELECT_COLUMNS} WHERE content_hash = ?1");
    let mut found = None;
    scan_rows(conn, &sql, params![content_hash], |item| {
        found = Some(item);
        false
    })?;
    Ok(found)
}

/// 按时间倒序读取全部条目（导出用）
pub(super) fn load_all(conn: &Connection) -> Result<Vec<ClipItem>, AppError> {
    let sql = format!("{SELECT_COLUMNS} ORDER BY timestamp DESC, id DESC");
    let mut items = Vec::new();
    scan_rows(conn, &sql, [], |item| {
        items.push(item);
        true
    })?;
    Ok(items)
}

pub(super) fn delete_item(conn: &Connection, content_hash: &str) -> Result<bool, AppError> {
    let affected = conn
        .execute("DELETE FROM history WHERE content_hash = ?1", params![content_hash])
        .map_err(|e| AppError::Database(format!("删除历史失败: {}", e)))?;
    Ok(affected > 0)
}

pub(super) fn toggle_favorite(conn: &Connection, content_hash: &str) -> Result<bool, AppError> {
    let affected = conn
        .execute(
            "UPDATE history SET is_favorite = 1 - is_favorite WHERE content_hash = ?1",
            params![content_hash],
        )
        .map_err(|e| AppError::Database(format!("切换收藏失败: {}", e)))?;
    Ok(affected > 0)
}

pub(super) fn clear_items(conn: &Connection, keep_favorites: bool) -> Result<usize, AppError> {
    let sql = if keep_favorites {
        "DELETE FROM history WHERE is_favorite = 0"
    } else {
        "DELETE FROM history"
    };
    conn.execute(sql, [])
        .map_err(|e| AppError::Database(format!("清空历史失败: {}", e)))
}

pub(super) fn count_items(conn: &Connection) -> Result<usize, AppError> {
    let total: i64 = conn
        .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))
        .map_err(|e| AppError::Database(format!("查询总数失败: {}", e)))?;
    Ok(from_sql_count(total))
}

pub(super) fn latest_timestamp(conn: &Connection) -> Result<Option<DateTime<Utc>>, AppError> {
    conn.query_row("SELECT MAX(timestamp) FROM history", [], |row| row.get::<_, Option<i64>>(0))
        .map(|nanos| nanos.map(from_nanos))
        .map_err(|e| AppError::Database(format!("读取最新时间戳失败: {}", e)))
}

fn start_of_local_day() -> DateTime<Utc> {
    let now = Local::now();
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| Local.from_local_datetime(&midnight).earliest())
        .map(|midnight| midnight.with_timezone(&Utc))
        .unwrap_or_else(|| now.with_timezone(&Utc) - chrono::Duration::days(1))
}

pub(super) fn get_stats(conn: &Connection) -> Result<HistoryStats, AppError> {
    stats_since(conn, start_of_local_day())
}

fn stats_since(conn: &Connection, day_start: DateTime<Utc>) -> Result<HistoryStats, AppError> {
    let total: i64 = conn
        .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))
        .map_err(|e| AppError::Database(format!("查询总数失败: {}", e)))?;

    let today: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM history WHERE timestamp >= ?1",
            params![to_nanos(&day_start)?],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Database(format!("查询今日数失败: {}", e)))?;

    let favorites: i64 = conn
        .query_row("SELECT COUNT(*) FROM history WHERE is_favorite = 1", [], |row| row.get(0))
        .map_err(|e| AppError::Database(format!("查询收藏数失败: {}", e)))?;

    Ok(HistoryStats { total, today, favorites })
}
