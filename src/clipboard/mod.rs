//! 剪贴板捕获模块
//!
//! # 设计思路
//!
//! 统一管理剪贴板相关的核心能力：
//! - **监听**：`clipboard-master` 在独立线程中阻塞等待系统通知，只负责把"变化了"
//!   转发到事件循环（`listener`）
//! - **捕获流水线**：防抖 → 分类 → 规范化 → 交给存储（`pipeline`、`classify`、`image`）
//! - **读取 / 写回**：`reader` 与 `writer` 分别封装系统剪贴板的读和写
//! - **抑制令牌 + RAII Guard**：应用自己写回剪贴板时，下一次捕获周期必须跳过，
//!   使用 `IgnoreGuard` 保证写入失败或 panic 时标志也会被清除
//!
//! # 实现思路
//!
//! - 抑制状态放在 `Mutex` 中，锁中毒时继续使用恢复数据，不让捕获永久停摆。
//! - `CaptureSuppressor::arm()` 返回 `IgnoreGuard`：守卫存活期间所有捕获都被跳过；
//!   `commit()` 表示写入成功，再额外跳过恰好一个捕获周期（2 秒内有效）；
//!   未 `commit` 就被丢弃时直接清除标志。

pub mod classify;
pub mod image;
pub mod listener;
pub mod pipeline;
pub mod reader;
pub mod writer;

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;

/// 写回成功后，抑制令牌的有效期
pub const SUPPRESSION_TTL: Duration = Duration::from_secs(2);

#[derive(Debug, Default)]
struct SuppressState {
    writing: bool,
    armed_until: Option<Instant>,
}

/// 捕获抑制器
///
/// 流水线与写回方共享同一实例（内部为 `Arc`，克隆开销很小）。
#[derive(Debug, Clone, Default)]
pub struct CaptureSuppressor {
    state: Arc<Mutex<SuppressState>>,
}

impl CaptureSuppressor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SuppressState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("剪贴板抑制状态锁中毒，继续使用恢复数据");
                poisoned.into_inner()
            }
        }
    }

    /// 开始一次应用自身的剪贴板写入
    pub fn arm(&self) -> IgnoreGuard {
        self.lock().writing = true;
        log::debug!("🚫 已设置剪贴板抑制标志");
        IgnoreGuard {
            suppressor: self.clone(),
            committed: false,
        }
    }

    /// 由流水线在每个捕获周期开始时调用：返回 `true` 表示本周期应跳过
    ///
    /// 写入成功后留下的令牌只消费一次，过期后不再生效。
    pub fn take(&self, now: Instant) -> bool {
        let mut state = self.lock();
        if state.writing {
            return true;
        }
        match state.armed_until.take() {
            Some(deadline) => now <= deadline,
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        let state = self.lock();
        state.writing || state.armed_until.is_some()
    }
}

/// 剪贴板抑制标志的 RAII 守卫
///
/// # 示例
/// ```rust,no_run
/// use clipmaster::clipboard::CaptureSuppressor;
///
/// let suppressor = CaptureSuppressor::new();
/// let guard = suppressor.arm();
/// // ... 写入剪贴板，成功后：
/// guard.commit();
/// ```
#[must_use = "守卫被立即丢弃会直接清除抑制标志"]
pub struct IgnoreGuard {
    suppressor: CaptureSuppressor,
    committed: bool,
}

impl IgnoreGuard {
    /// 写入已成功：跳过接下来恰好一个捕获周期
    pub fn commit(mut self) {
        let mut state = self.suppressor.lock();
        state.writing = false;
        state.armed_until = Some(Instant::now() + SUPPRESSION_TTL);
        self.committed = true;
    }
}

impl Drop for IgnoreGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut state = self.suppressor.lock();
        state.writing = false;
        state.armed_until = None;
        log::debug!("剪贴板写入未完成，已清除抑制标志");
    }
}
