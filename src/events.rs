//! 变更通知
//!
//! 展示层通过注册回调订阅两类通知：
//! - `historyChanged`：任何修改历史的操作完成后触发一次，不携带数据
//! - `itemAdded`：新条目入库后触发，携带该条目，便于增量刷新
//!
//! 回调在修改操作完成后同步调用，按注册顺序执行。触发前先复制回调列表再释放锁，
//! 回调内部可以再次调用服务（包括注册 / 注销回调）而不会死锁。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::model::ClipItem;

type HistoryChangedFn = Arc<dyn Fn() + Send + Sync>;
type ItemAddedFn = Arc<dyn Fn(&ClipItem) + Send + Sync>;

/// 注册回调时返回的句柄，用于注销
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("事件回调列表锁中毒，继续使用恢复数据");
            poisoned.into_inner()
        }
    }
}

#[derive(Default)]
pub struct EventHub {
    next_id: AtomicU64,
    history_changed: Mutex<Vec<(ListenerId, HistoryChangedFn)>>,
    item_added: Mutex<Vec<(ListenerId, ItemAddedFn)>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn on_history_changed(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        let id = self.allocate_id();
        lock(&self.history_changed).push((id, Arc::new(listener)));
        id
    }

    pub fn on_item_added(&self, listener: impl Fn(&ClipItem) + Send + Sync + 'static) -> ListenerId {
        let id = self.allocate_id();
        lock(&self.item_added).push((id, Arc::new(listener)));
        id
    }

    /// 注销回调；返回是否找到
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut removed = false;
        lock(&self.history_changed).retain(|(existing, _)| {
            let keep = *existing != id;
            removed |= !keep;
            keep
        });
        lock(&self.item_added).retain(|(existing, _)| {
            let keep = *existing != id;
            removed |= !keep;
            keep
        });
        removed
    }

    pub fn emit_history_changed(&self) {
        let listeners: Vec<HistoryChangedFn> = lock(&self.history_changed)
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();
        for listener in listeners {
            listener();
        }
    }

    pub fn emit_item_added(&self, item: &ClipItem) {
        let listeners: Vec<ItemAddedFn> = lock(&self.item_added)
            .iter()
            .map(|(_, f)| Arc::clone(f))
            .collect();
        for listener in listeners {
            listener(item);
        }
    }
}
