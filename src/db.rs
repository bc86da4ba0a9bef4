//! 数据库模块（历史存储引擎）
//!
//! # 设计思路
//!
//! `HistoryStore` 是剪贴板历史的唯一数据源，负责去重、检索、收藏、保留期清理
//! 与数量上限淘汰。底层使用 `rusqlite` 直接操作 SQLite。
//!
//! # 优势
//!
//! - **类型安全**：`ClipItem` + serde，编译期保证数据结构正确
//! - **一致性**：内容哈希唯一约束，同一内容永远只有一行
//! - **并发**：WAL 模式 + busy timeout；后台线程使用各自独立的连接
//! - **可维护性**：SQL 逻辑按职责拆分到子模块
//!
//! # 子模块
//!
//! | 子模块 | 职责 |
//! |------|------|
//! | `schema` | 建表、索引、版本迁移 |
//! | `codec` | 大文本压缩、时间戳编码 |
//! | `history` | 增删查、收藏切换、统计 |
//! | `retention` | 保留期清理、数量上限淘汰 |
//! | `tags` | 条目标签 |
//! | `transfer` | 导出 / 导入 |

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::error::AppError;
use crate::model::ClipItem;

mod codec;
mod history;
mod retention;
mod schema;
mod tags;
mod transfer;

pub use codec::COMPRESSION_THRESHOLD_CHARS;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// 查询参数与统计
// ============================================================================

/// 历史查询条件
///
/// 排序固定为：收藏在前，组内按时间倒序。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryQuery {
    pub limit: usize,
    pub offset: usize,
    /// 对原始内容做大小写不敏感的子串匹配；空串等同于不过滤
    pub search_text: Option<String>,
    pub favorites_only: bool,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
            search_text: None,
            favorites_only: false,
        }
    }
}

impl HistoryQuery {
    pub fn page(limit: usize, offset: usize) -> Self {
        Self {
            limit,
            offset,
            ..Self::default()
        }
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search_text = Some(text.into());
        self
    }

    pub fn favorites_only(mut self, favorites_only: bool) -> Self {
        self.favorites_only = favorites_only;
        self
    }

    pub(crate) fn needle(&self) -> Option<String> {
        self.search_text
            .as_deref()
            .filter(|text| !text.is_empty())
            .map(str::to_lowercase)
    }
}

/// 历史统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HistoryStats {
    pub total: i64,
    pub today: i64,
    pub favorites: i64,
}

/// 导入结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
}

// ============================================================================
// 存储引擎
// ============================================================================

#[derive(Debug, Clone)]
enum StoreLocation {
    File(PathBuf),
    Memory,
}

/// 剪贴板历史存储
///
/// 内部持有一个受 `Mutex` 保护的连接；需要在其他线程长时间读写时，
/// 通过 [`HistoryStore::open_worker`] 打开独立连接，不跨线程共享同一连接。
pub struct HistoryStore {
    location: StoreLocation,
    conn: Mutex<Connection>,
}

impl HistoryStore {
    /// 打开（必要时创建）数据库文件并初始化 Schema
    ///
    /// 失败属于致命错误，调用方应终止启动。
    pub fn open(db_path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::Database(format!("创建数据库目录失败: {}", e))
            })?;
        }
        log::info!("数据库路径: {}", db_path.display());

        let conn = Connection::open(db_path).map_err(|e| {
            AppError::Database(format!("打开数据库失败: {}", e))
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| AppError::Database(format!("设置 busy timeout 失败: {}", e)))?;

        schema::initialize_schema(&conn)?;

        Ok(Self {
            location: StoreLocation::File(db_path.to_path_buf()),
            conn: Mutex::new(conn),
        })
    }

    /// 内存数据库，主要用于测试
    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            AppError::Database(format!("创建内存数据库失败: {}", e))
        })?;
        schema::initialize_schema(&conn)?;
        Ok(Self {
            location: StoreLocation::Memory,
            conn: Mutex::new(conn),
        })
    }

    /// 为后台线程打开同一数据库文件的独立连接
    pub fn open_worker(&self) -> Result<Self, AppError> {
        match &self.location {
            StoreLocation::File(path) => Self::open(path),
            StoreLocation::Memory => Err(AppError::Storage(
                "内存数据库无法为后台线程打开独立连接".to_string(),
            )),
        }
    }

    /// 数据库文件路径（内存数据库返回 `None`）
    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            StoreLocation::File(path) => Some(path),
            StoreLocation::Memory => None,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.conn.lock().map_err(|e| {
            AppError::Database(format!("获取数据库锁失败: {}", e))
        })
    }

    pub(crate) fn with_conn<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let conn = self.lock()?;
        op(&conn)
    }

    /// 插入条目；内容为空白时返回 `false`
    ///
    /// 同哈希条目已存在时原行被刷新（时间取较新者、保留收藏标记），不会产生重复行。
    pub fn add(&self, item: &ClipItem) -> Result<bool, AppError> {
        self.with_conn(|conn| history::add_item(conn, item))
    }

    pub fn query(&self, query: &HistoryQuery) -> Result<Vec<ClipItem>, AppError> {
        self.with_conn(|conn| history::query_items(conn, query))
    }

    pub fn get(&self, content_hash: &str) -> Result<Option<ClipItem>, AppError> {
        self.with_conn(|conn| history::get_item(conn, content_hash))
    }

    /// 删除条目；不存在时返回 `false`
    pub fn delete(&self, content_hash: &str) -> Result<bool, AppError> {
        self.with_conn(|conn| history::delete_item(conn, content_hash))
    }

    /// 切换收藏；不存在时返回 `false`
    pub fn toggle_favorite(&self, content_hash: &str) -> Result<bool, AppError> {
        self.with_conn(|conn| history::toggle_favorite(conn, content_hash))
    }

    /// 清空历史，返回删除行数
    pub fn clear(&self, keep_favorites: bool) -> Result<usize, AppError> {
        self.with_conn(|conn| history::clear_items(conn, keep_favorites))
    }

    pub fn count(&self) -> Result<usize, AppError> {
        self.with_conn(history::count_items)
    }

    pub fn stats(&self) -> Result<HistoryStats, AppError> {
        self.with_conn(history::get_stats)
    }

    /// 将 WAL 中已提交的修改合并回主数据库文件（定时自动保存）
    pub fn checkpoint(&self) -> Result<(), AppError> {
        self.with_conn(|conn| {
            conn.query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |_| Ok(()))
                .map_err(|e| AppError::Database(format!("WAL 检查点失败: {}", e)))
        })
    }

    /// 删除早于 `now - retention_days` 的非收藏条目；`retention_days <= 0` 表示永久保留
    pub fn clean_expired(&self, retention_days: i64, now: DateTime<Utc>) -> Result<usize, AppError> {
        if retention_days <= 0 {
            return Ok(0);
        }
        // 截止时间早于可存储的最早时间戳时，任何条目都不可能过期
        let cutoff = TimeDelta::try_days(retention_days)
            .and_then(|window| now.checked_sub_signed(window))
            .filter(|cutoff| cutoff.timestamp_nanos_opt().is_some());
        let Some(cutoff) = cutoff else {
            return Ok(0);
        };
        self.with_conn(|conn| retention::delete_expired_before(conn, cutoff))
    }

    /// 库中最新条目的时间戳；空库返回 `None`
    pub fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        self.with_conn(history::latest_timestamp)
    }

    /// 总数超过上限时按时间从旧到新删除非收藏条目
    ///
    /// 收藏计入总数但不会被删除；仅收藏就超过上限时，总数允许超过上限。
    pub fn enforce_max_count(&self, max_history: usize) -> Result<usize, AppError> {
        self.with_conn(|conn| retention::evict_over_limit(conn, max_history))
    }

    pub fn add_tag(&self, content_hash: &str, tag: &str) -> Result<bool, AppError> {
        self.with_conn(|conn| tags::add_tag_to_item(conn, content_hash, tag))
    }

    pub fn remove_tag(&self, content_hash: &str, tag: &str) -> Result<bool, AppError> {
        self.with_conn(|conn| tags::remove_tag_from_item(conn, content_hash, tag))
    }

    pub fn all_tags(&self) -> Result<Vec<String>, AppError> {
        self.with_conn(tags::get_all_tags)
    }

    /// 导出全部条目到结构化文件（先写临时文件再重命名）
    pub fn export_all(&self, destination: &Path) -> Result<usize, AppError> {
        let items = self.with_conn(history::load_all)?;
        transfer::write_records(destination, &items)
    }

    /// 从结构化文件导入；无效记录跳过，有效记录按 `add` 的去重语义写入
    pub fn import_all(&self, source: &Path) -> Result<ImportReport, AppError> {
        let records = transfer::read_records(source)?;
        self.with_conn(|conn| transfer::import_records(conn, records))
    }
}

#[cfg(test)]
mod tests {
    use super::{HistoryQuery, HistoryStore};

    #[test]
    fn query_builder_sets_fields() {
        let query = HistoryQuery::page(20, 40).search("Wor").favorites_only(true);
        assert_eq!(query.limit, 20);
        assert_eq!(query.offset, 40);
        assert_eq!(query.needle().as_deref(), Some("wor"));
        assert!(query.favorites_only);
    }

    #[test]
    fn empty_search_text_means_no_filter() {
        assert!(HistoryQuery::default().search("").needle().is_none());
    }

    #[test]
    fn memory_store_cannot_open_worker() {
        let store = HistoryStore::open_in_memory().expect("open memory store");
        assert!(store.open_worker().is_err());
        assert!(store.path().is_none());
    }

    #[test]
    fn file_store_opens_worker_on_same_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let db_path = dir.path().join("nested").join("clipboard.db");
        let store = HistoryStore::open(&db_path).expect("open file store");

        store
            .add(&crate::model::ClipItem::new("shared", chrono::Utc::now()))
            .expect("add via main connection");

        let worker = store.open_worker().expect("open worker connection");
        assert_eq!(worker.count().expect("count via worker"), 1);
        assert_eq!(worker.path(), Some(db_path.as_path()));
    }

    #[test]
    fn huge_retention_never_expires_anything() {
        let store = HistoryStore::open_in_memory().expect("open memory store");
        let now = chrono::Utc::now();
        store
            .add(&crate::model::ClipItem::new("ancient", now - chrono::TimeDelta::days(365 * 100)))
            .expect("add");

        for days in [100_000, 100_000_000, i64::MAX] {
            assert_eq!(store.clean_expired(days, now).expect("clean"), 0, "{days}");
        }
        assert_eq!(store.count().expect("count"), 1);
        assert_eq!(store.clean_expired(1, now).expect("clean"), 1);
    }
}
