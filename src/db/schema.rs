//! Schema 初始化子模块
//!
//! ## 职责
//! - 创建/迁移历史表结构与索引
//! - 设置 SQLite 运行参数（WAL）
//!
//! ## 输入/输出
//! - 输入：`&Connection`
//! - 输出：`Result<(), AppError>`
//!
//! ## 错误语义
//! - DDL 失败统一映射为 `AppError::Database`

use rusqlite::Connection;

use crate::error::AppError;

const SCHEMA_VERSION: i64 = 1;

fn get_user_version(conn: &Connection) -> Result<i64, AppError> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| AppError::Database(format!("读取数据库版本失败: {}", e)))
}

fn set_user_version(conn: &Connection, version: i64) -> Result<(), AppError> {
    conn.execute_batch(&format!("PRAGMA user_version = {version};"))
        .map_err(|e| AppError::Database(format!("写入数据库版本失败: {}", e)))
}

fn create_history_table(conn: &Connection) -> Result<(), AppError> {
    // timestamp 为 UTC 纳秒；content 为 BLOB，compressed = 1 时是 zstd 压缩后的 UTF-8
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content_hash TEXT NOT NULL UNIQUE,
            content BLOB NOT NULL,
            content_type TEXT NOT NULL DEFAULT 'text',
            timestamp INTEGER NOT NULL,
            is_favorite INTEGER NOT NULL DEFAULT 0 CHECK (is_favorite IN (0, 1)),
            tags TEXT NOT NULL DEFAULT '[]',
            metadata TEXT NOT NULL DEFAULT '{}',
            compressed INTEGER NOT NULL DEFAULT 0 CHECK (compressed IN (0, 1))
        );"
    ).map_err(|e| AppError::Database(format!("创建历史表失败: {}", e)))
}

fn create_history_indexes(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_history_timestamp ON history(timestamp);
         CREATE INDEX IF NOT EXISTS idx_history_favorite_timestamp ON history(is_favorite, timestamp DESC);"
    ).map_err(|e| AppError::Database(format!("创建历史索引失败: {}", e)))
}

/// 初始化数据库表结构
pub(super) fn initialize_schema(conn: &Connection) -> Result<(), AppError> {
    // 内存数据库不支持 WAL，返回 "memory" 即可，不视为错误
    let _: String = conn
        .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
        .map_err(|e| AppError::Database(format!("设置 WAL 模式失败: {}", e)))?;

    let version = get_user_version(conn)?;
    if version > SCHEMA_VERSION {
        return Err(AppError::Database(format!(
            "数据库版本 {} 高于当前程序支持的版本 {}",
            version, SCHEMA_VERSION
        )));
    }

    create_history_table(conn)?;
    create_history_indexes(conn)?;

    if version < SCHEMA_VERSION {
        log::info!("数据库 Schema 升级: {} -> {}", version, SCHEMA_VERSION);
        set_user_version(conn, SCHEMA_VERSION)?;
    }

    Ok(())
}
