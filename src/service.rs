//! 历史查询 / 命令门面
//!
//! # 设计思路
//!
//! 展示层与捕获管道只通过 `HistoryService` 访问历史：
//! - 修改操作完成后同步触发一次 `historyChanged`；新条目入库额外触发 `itemAdded`
//! - 存储错误在这里记录并转换为 `false` / 空结果 / `0`，不会向上冒泡
//! - 数量上限、保留天数保存在服务内部，更新后立即重新执行淘汰与过期清理
//!
//! # 实现思路
//!
//! 交互操作直接在调用线程上使用主连接；导出 / 导入可能涉及上千条记录，
//! 通过 `spawn_blocking` 放到后台线程，并为其打开独立连接。

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::clipboard::pipeline::CaptureSink;
use crate::clipboard::writer::{copy_item_to_clipboard, ClipboardWriter};
use crate::clipboard::CaptureSuppressor;
use crate::db::{HistoryQuery, HistoryStats, HistoryStore, ImportReport};
use crate::error::AppError;
use crate::events::{EventHub, ListenerId};
use crate::model::ClipItem;
use crate::settings::AppSettings;

/// 自动清理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_history: usize,
    /// `<= 0` 表示永久保留
    pub retention_days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        let defaults = AppSettings::default();
        Self::from_settings(&defaults)
    }
}

impl RetentionPolicy {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            max_history: settings.max_history,
            retention_days: settings.retention_days,
        }
    }
}

/// 一次维护执行的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub expired: usize,
    pub evicted: usize,
}

impl MaintenanceReport {
    pub fn removed(&self) -> usize {
        self.expired + self.evicted
    }
}

pub struct HistoryService {
    store: HistoryStore,
    events: EventHub,
    policy: Mutex<RetentionPolicy>,
}

impl HistoryService {
    pub fn new(store: HistoryStore, policy: RetentionPolicy) -> Self {
        Self {
            store,
            events: EventHub::new(),
            policy: Mutex::new(policy),
        }
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    pub fn on_history_changed(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.events.on_history_changed(listener)
    }

    pub fn on_item_added(&self, listener: impl Fn(&ClipItem) + Send + Sync + 'static) -> ListenerId {
        self.events.on_item_added(listener)
    }

    fn lock_policy(&self) -> MutexGuard<'_, RetentionPolicy> {
        match self.policy.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("清理策略锁中毒，继续使用恢复数据");
                poisoned.into_inner()
            }
        }
    }

    pub fn policy(&self) -> RetentionPolicy {
        *self.lock_policy()
    }

    // ------------------------------------------------------------------
    // 写操作
    // ------------------------------------------------------------------

    /// 添加条目；空白内容或存储失败返回 `false`
    pub fn add(&self, mut item: ClipItem) -> bool {
        item.ensure_hash();
        match self.store.add(&item) {
            Ok(true) => {}
            Ok(false) => return false,
            Err(err) => {
                log::error!("❌ 保存剪贴板条目失败: {}", err);
                return false;
            }
        }

        let max_history = self.policy().max_history;
        match self.store.enforce_max_count(max_history) {
            Ok(0) => {}
            Ok(evicted) => log::info!("超出上限 {}，已淘汰 {} 条旧记录", max_history, evicted),
            Err(err) => log::warn!("⚠️ 执行数量上限淘汰失败: {}", err),
        }

        // 刷新已有条目时，库中的收藏标记与标签才是准确的
        let stored = match self.store.get(&item.content_hash) {
            Ok(Some(stored)) => stored,
            Ok(None) => item,
            Err(err) => {
                log::warn!("读取刚写入的条目失败: {}", err);
                item
            }
        };
        self.events.emit_item_added(&stored);
        self.events.emit_history_changed();
        true
    }

    pub fn delete(&self, content_hash: &str) -> bool {
        self.changed_if(self.store.delete(content_hash), "删除条目")
    }

    pub fn toggle_favorite(&self, content_hash: &str) -> bool {
        self.changed_if(self.store.toggle_favorite(content_hash), "切换收藏")
    }

    /// 清空历史，返回删除条数
    pub fn clear(&self, keep_favorites: bool) -> usize {
        match self.store.clear(keep_favorites) {
            Ok(removed) => {
                log::info!("🗑️ 已清空历史 {} 条（保留收藏: {}）", removed, keep_favorites);
                if removed > 0 {
                    self.events.emit_history_changed();
                }
                removed
            }
            Err(err) => {
                log::error!("清空历史失败: {}", err);
                0
            }
        }
    }

    pub fn add_tag(&self, content_hash: &str, tag: &str) -> bool {
        self.changed_if(self.store.add_tag(content_hash, tag), "添加标签")
    }

    pub fn remove_tag(&self, content_hash: &str, tag: &str) -> bool {
        self.changed_if(self.store.remove_tag(content_hash, tag), "移除标签")
    }

    fn changed_if(&self, result: Result<bool, AppError>, action: &str) -> bool {
        match result {
            Ok(true) => {
                self.events.emit_history_changed();
                true
            }
            Ok(false) => false,
            Err(err) => {
                log::error!("{}失败: {}", action, err);
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // 读操作
    // ------------------------------------------------------------------

    pub fn query(&self, query: &HistoryQuery) -> Vec<ClipItem> {
        self.store.query(query).unwrap_or_else(|err| {
            log::error!("查询历史失败: {}", err);
            Vec::new()
        })
    }

    pub fn search(&self, text: &str, limit: usize) -> Vec<ClipItem> {
        self.query(&HistoryQuery::page(limit, 0).search(text))
    }

    pub fn get(&self, content_hash: &str) -> Option<ClipItem> {
        self.store.get(content_hash).unwrap_or_else(|err| {
            log::error!("读取条目失败: {}", err);
            None
        })
    }

    pub fn get_count(&self) -> usize {
        self.store.count().unwrap_or_else(|err| {
            log::error!("统计条目数失败: {}", err);
            0
        })
    }

    pub fn stats(&self) -> HistoryStats {
        self.store.stats().unwrap_or_else(|err| {
            log::error!("获取统计信息失败: {}", err);
            HistoryStats::default()
        })
    }

    pub fn all_tags(&self) -> Vec<String> {
        self.store.all_tags().unwrap_or_else(|err| {
            log::error!("获取标签失败: {}", err);
            Vec::new()
        })
    }

    // ------------------------------------------------------------------
    // 策略
    // ------------------------------------------------------------------

    /// 应用新的数量上限 / 保留天数，并立即执行一次清理
    ///
    /// 超出合法范围的字段记录告警并沿用当前策略中的值。
    pub fn update_settings(&self, settings: &AppSettings) -> MaintenanceReport {
        let current = self.policy();
        let baseline = AppSettings {
            max_history: current.max_history,
            retention_days: current.retention_days,
            ..settings.clone()
        };
        let (validated, warnings) = settings.clone().validate_against(&baseline);
        for warning in &warnings {
            log::warn!("⚠️ 忽略无效设置 {}: {}", warning.field, warning.message);
        }

        let policy = RetentionPolicy::from_settings(&validated);
        *self.lock_policy() = policy;
        log::info!(
            "清理策略已更新: 上限 {} 条, 保留 {} 天",
            policy.max_history,
            policy.retention_days
        );
        self.run_maintenance()
    }

    pub fn run_maintenance(&self) -> MaintenanceReport {
        self.run_maintenance_at(Utc::now())
    }

    /// 以指定时间为基准执行过期清理与数量淘汰
    pub fn run_maintenance_at(&self, now: DateTime<Utc>) -> MaintenanceReport {
        let policy = self.policy();
        let mut report = MaintenanceReport::default();

        match self.store.clean_expired(policy.retention_days, now) {
            Ok(expired) => report.expired = expired,
            Err(err) => log::warn!("⚠️ 过期清理失败: {}", err),
        }
        match self.store.enforce_max_count(policy.max_history) {
            Ok(evicted) => report.evicted = evicted,
            Err(err) => log::warn!("⚠️ 数量上限淘汰失败: {}", err),
        }

        if report.removed() > 0 {
            log::info!("🧹 自动清理完成: 过期 {} 条, 超限 {} 条", report.expired, report.evicted);
            self.events.emit_history_changed();
        }
        report
    }

    // ------------------------------------------------------------------
    // 导出 / 导入
    // ------------------------------------------------------------------

    async fn run_on_worker<T, F>(&self, job: F) -> Result<T, AppError>
    where
        T: Send + 'static,
        F: FnOnce(&HistoryStore) -> Result<T, AppError> + Send + 'static,
    {
        // 内存数据库无法共享给其他连接，只能在当前线程执行
        if self.store.path().is_none() {
            return job(&self.store);
        }
        let worker = self.store.open_worker()?;
        tokio::task::spawn_blocking(move || job(&worker))
            .await
            .map_err(|e| AppError::Storage(format!("后台任务异常退出: {}", e)))?
    }

    pub async fn export(&self, destination: impl Into<PathBuf>) -> Result<usize, AppError> {
        let destination = destination.into();
        let shown = destination.display().to_string();
        let exported = self
            .run_on_worker(move |store| store.export_all(&destination))
            .await?;
        log::info!("📤 已导出 {} 条记录到 {}", exported, shown);
        Ok(exported)
    }

    pub async fn import(&self, source: impl Into<PathBuf>) -> Result<ImportReport, AppError> {
        let source = source.into();
        let report = self.run_on_worker(move |store| store.import_all(&source)).await?;

        if report.imported > 0 {
            let max_history = self.policy().max_history;
            if let Err(err) = self.store.enforce_max_count(max_history) {
                log::warn!("⚠️ 导入后数量上限淘汰失败: {}", err);
            }
            self.events.emit_history_changed();
        }
        Ok(report)
    }

    // ------------------------------------------------------------------
    // 写回剪贴板
    // ------------------------------------------------------------------

    /// 将历史条目写回系统剪贴板，该次变化不会被重新捕获
    pub fn copy_to_clipboard(
        &self,
        writer: &mut dyn ClipboardWriter,
        suppressor: &CaptureSuppressor,
        content_hash: &str,
    ) -> bool {
        let Some(item) = self.get(content_hash) else {
            log::warn!("要复制的条目不存在: {}", content_hash);
            return false;
        };
        match copy_item_to_clipboard(writer, suppressor, &item) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("⚠️ 写回剪贴板失败: {}", err);
                false
            }
        }
    }
}

impl CaptureSink for HistoryService {
    fn submit(&self, item: ClipItem) -> bool {
        self.add(item)
    }

    fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.store.latest_timestamp().unwrap_or_else(|err| {
            log::warn!("读取最新时间戳失败: {}", err);
            None
        })
    }
}
