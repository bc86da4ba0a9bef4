//! 标签子模块
//!
//! ## 职责
//! - 为单个条目添加 / 移除标签
//! - 汇总所有条目上出现过的标签
//!
//! ## 输入/输出
//! - 输入：`&Connection`、内容哈希、标签名
//! - 输出：`bool`（条目是否存在）或 `Vec<String>`
//!
//! ## 错误语义
//! - 查询与写入失败统一映射为 `AppError::Database`

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::AppError;

fn load_tags(conn: &Connection, content_hash: &str) -> Result<Option<Vec<String>>, AppError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT tags FROM history WHERE content_hash = ?1",
            params![content_hash],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| AppError::Database(format!("查询标签失败: {}", e)))?;

    match raw {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

fn store_tags(conn: &Connection, content_hash: &str, tags: &[String]) -> Result<(), AppError> {
    conn.execute(
        "UPDATE history SET tags = ?1 WHERE content_hash = ?2",
        params![serde_json::to_string(tags)?, content_hash],
    ).map_err(|e| AppError::Database(format!("更新标签失败: {}", e)))?;
    Ok(())
}

pub(super) fn add_tag_to_item(conn: &Connection, content_hash: &str, tag: &str) -> Result<bool, AppError> {
    let tag = tag.trim();
    if tag.is_empty() {
        return Err(AppError::Database("标签名不能为空".to_string()));
    }
    let Some(mut tags) = load_tags(conn, content_hash)? else {
        return Ok(false);
    };
    if !tags.iter().any(|existing| existing == tag) {
        tags.push(tag.to_string());
        store_tags(conn, content_hash, &tags)?;
    }
    Ok(true)
}

pub(super) fn remove_tag_from_item(conn: &Connection, content_hash: &str, tag: &str) -> Result<bool, AppError> {
    let Some(mut tags) = load_tags(conn, content_hash)? else {
        return Ok(false);
    };
    let before = tags.len();
    tags.retain(|existing| existing != tag.trim());
    if tags.len() != before {
        store_tags(conn, content_hash, &tags)?;
    }
    Ok(true)
}

pub(super) fn get_all_tags(conn: &Connection) -> Result<Vec<String>, AppError> {
    let mut stmt = conn
        .prepare(
            "SELECT DISTINCT tag.value FROM history, json_each(history.tags) AS tag
             WHERE json_valid(history.tags)
             ORDER BY tag.value ASC",
        )
        .map_err(|e| AppError::Database(format!("准备查询失败: {}", e)))?;

    let tags = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| AppError::Database(format!("查询标签失败: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Database(format!("读取行失败: {}", e)))?;

    Ok(tags)
}
