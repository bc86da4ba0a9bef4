//! 捕获流水线
//!
//! # 状态机
//!
//! ```text
//! Idle ──通知──▶ Debouncing ──计时到期──▶ Classifying ──▶ Normalizing ──▶ Idle
//!                  ▲    │
//!                  └────┘ 新通知重置计时
//! ```
//!
//! - 一次用户复制常常触发多次系统通知（每种格式一次），防抖窗口内的通知合并为一次捕获。
//! - 读取剪贴板有有限的重试窗口（默认 500ms，每 50ms 一次），超时记录日志后放弃本次捕获。
//! - 与上一次捕获哈希相同的内容直接忽略；中间复制过其他内容后再次复制则正常入库（刷新时间）。
//! - 应用自身写回剪贴板触发的周期由 `CaptureSuppressor` 跳过。
//! - 单次捕获中的任何错误只记录日志，不影响后续通知。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, sleep_until, Instant};

use crate::error::AppError;
use crate::model::ClipItem;

use super::classify::{classify, normalize};
use super::listener::ClipboardChanged;
use super::reader::{ClipboardReader, ClipboardSnapshot};
use super::CaptureSuppressor;

pub const DEBOUNCE_DEFAULT_MS: u64 = 100;
pub const DEBOUNCE_MIN_MS: u64 = 20;
pub const DEBOUNCE_MAX_MS: u64 = 5_000;
pub const READ_TIMEOUT: Duration = Duration::from_millis(500);
pub const READ_RETRY_INTERVAL: Duration = Duration::from_millis(50);

pub fn normalize_debounce_ms(value_ms: u64) -> u64 {
    value_ms.clamp(DEBOUNCE_MIN_MS, DEBOUNCE_MAX_MS)
}

/// 可在运行时调整的防抖窗口（设置变更后立即生效）
#[derive(Debug, Clone)]
pub struct DebounceWindow(Arc<AtomicU64>);

impl Default for DebounceWindow {
    fn default() -> Self {
        Self::from_millis(DEBOUNCE_DEFAULT_MS)
    }
}

impl DebounceWindow {
    pub fn from_millis(value_ms: u64) -> Self {
        Self(Arc::new(AtomicU64::new(normalize_debounce_ms(value_ms))))
    }

    pub fn set_millis(&self, value_ms: u64) {
        let normalized = normalize_debounce_ms(value_ms);
        self.0.store(normalized, Ordering::Relaxed);
        log::debug!("📋 剪贴板防抖窗口已更新: {}ms", normalized);
    }

    pub fn get(&self) -> Duration {
        Duration::from_millis(self.0.load(Ordering::Relaxed))
    }
}

/// 捕获结果的接收方（通常是 `HistoryService`）
pub trait CaptureSink: Send + Sync {
    /// 返回 `true` 表示条目已入库
    fn submit(&self, item: ClipItem) -> bool;

    /// 已入库条目中最新的时间戳，新捕获的时间戳不会早于它
    fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        None
    }
}

/// 捕获时间戳来源：分配的时间戳严格递增
///
/// 墙上时钟回拨时沿用上一次的时间戳再前进 1ns，保证新捕获始终排在最前。
pub struct CaptureClock {
    now: Box<dyn Fn() -> DateTime<Utc> + Send>,
    last: Option<DateTime<Utc>>,
}

impl Default for CaptureClock {
    fn default() -> Self {
        Self::with_source(Utc::now)
    }
}

impl CaptureClock {
    pub fn with_source(now: impl Fn() -> DateTime<Utc> + Send + 'static) -> Self {
        Self {
            now: Box::new(now),
            last: None,
        }
    }

    /// 记录一个已经存在的时间戳，后续分配都晚于它
    pub fn observe(&mut self, seen: DateTime<Utc>) {
        if self.last.is_none_or(|last| seen > last) {
            self.last = Some(seen);
        }
    }

    pub fn stamp(&mut self) -> DateTime<Utc> {
        let now = (self.now)();
        let next = match self.last {
            Some(last) if now <= last => last
                .checked_add_signed(TimeDelta::nanoseconds(1))
                .unwrap_or(last),
            _ => now,
        };
        self.last = Some(next);
        next
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapturePhase {
    #[default]
    Idle,
    Debouncing,
    Classifying,
    Normalizing,
}

/// 单次捕获周期的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Captured(String),
    Duplicate,
    Suppressed,
    Empty,
    Rejected,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub notifications: u64,
    pub captured: u64,
    pub duplicates: u64,
    pub suppressed: u64,
    pub failures: u64,
}

/// 纯状态防抖器：只记录截止时间，不持有计时器
#[derive(Debug, Default)]
pub struct Debouncer {
    deadline: Option<Instant>,
}

impl Debouncer {
    /// 收到通知：重置截止时间
    pub fn notify(&mut self, now: Instant, window: Duration) {
        self.deadline = Some(now + window);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// 到期则清除并返回 `true`
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn take_pending(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}

pub struct CapturePipeline {
    reader: Box<dyn ClipboardReader>,
    sink: Arc<dyn CaptureSink>,
    suppressor: CaptureSuppressor,
    debounce: DebounceWindow,
    debouncer: Debouncer,
    phase: CapturePhase,
    last_hash: Option<String>,
    clock: CaptureClock,
    clock_seeded: bool,
    read_timeout: Duration,
    retry_interval: Duration,
    stats: CaptureStats,
}

impl CapturePipeline {
    pub fn new(
        reader: Box<dyn ClipboardReader>,
        sink: Arc<dyn CaptureSink>,
        suppressor: CaptureSuppressor,
        debounce: DebounceWindow,
    ) -> Self {
        Self {
            reader,
            sink,
            suppressor,
            debounce,
            debouncer: Debouncer::default(),
            phase: CapturePhase::Idle,
            last_hash: None,
            clock: CaptureClock::default(),
            clock_seeded: false,
            read_timeout: READ_TIMEOUT,
            retry_interval: READ_RETRY_INTERVAL,
            stats: CaptureStats::default(),
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration, retry_interval: Duration) -> Self {
        self.read_timeout = timeout;
        self.retry_interval = retry_interval;
        self
    }

    pub fn with_clock(mut self, clock: CaptureClock) -> Self {
        self.clock = clock;
        self.clock_seeded = false;
        self
    }

    fn next_timestamp(&mut self) -> DateTime<Utc> {
        if !self.clock_seeded {
            if let Some(latest) = self.sink.latest_timestamp() {
                self.clock.observe(latest);
            }
            self.clock_seeded = true;
        }
        self.clock.stamp()
    }

    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    fn enter(&mut self, phase: CapturePhase) {
        log::trace!("捕获状态: {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// 处理一次原始通知
    pub fn on_notify(&mut self, now: Instant) {
        self.stats.notifications += 1;
        self.debouncer.notify(now, self.debounce.get());
        self.enter(CapturePhase::Debouncing);
    }

    /// 事件循环：直到通知通道关闭（关闭前挂起的防抖周期会被执行）
    pub async fn run(mut self, mut notices: UnboundedReceiver<ClipboardChanged>) -> CaptureStats {
        log::info!("📋 捕获流水线已启动（防抖 {}ms）", self.debounce.get().as_millis());
        loop {
            let deadline = self.debouncer.deadline();
            tokio::select! {
                notice = notices.recv() => match notice {
                    Some(ClipboardChanged) => self.on_notify(Instant::now()),
                    None => {
                        if self.debouncer.take_pending() {
                            self.capture_once().await;
                        }
                        break;
                    }
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if self.debouncer.fire(Instant::now()) {
                        self.capture_once().await;
                    }
                }
            }
        }
        log::info!("📋 捕获流水线已停止: {:?}", self.stats);
        self.stats
    }

    async fn read_with_retry(&mut self) -> Result<ClipboardSnapshot, AppError> {
        let started = Instant::now();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.reader.read() {
                Ok(snapshot) => return Ok(snapshot),
                Err(err) => {
                    if started.elapsed() + self.retry_interval > self.read_timeout {
                        return Err(AppError::Timeout(format!(
                            "读取剪贴板 {} 次仍失败（{}ms）: {}",
                            attempts,
                            self.read_timeout.as_millis(),
                            err
                        )));
                    }
                    log::trace!("读取剪贴板失败，{}ms 后重试: {}", self.retry_interval.as_millis(), err);
                    sleep(self.retry_interval).await;
                }
            }
        }
    }

    /// 执行一次完整的捕获周期（防抖计时已到期）
    pub async fn capture_once(&mut self) -> CaptureOutcome {
        let outcome = self.capture_cycle().await;
        match &outcome {
            CaptureOutcome::Captured(hash) => {
                self.stats.captured += 1;
                log::debug!("📋 已捕获剪贴板内容: {}", hash);
            }
            CaptureOutcome::Duplicate => self.stats.duplicates += 1,
            CaptureOutcome::Suppressed => {
                self.stats.suppressed += 1;
                log::debug!("⏭️  忽略应用主动触发的剪贴板变化");
            }
            CaptureOutcome::Failed => self.stats.failures += 1,
            CaptureOutcome::Empty | CaptureOutcome::Rejected => {}
        }
        self.enter(CapturePhase::Idle);
        outcome
    }

    async fn capture_cycle(&mut self) -> CaptureOutcome {
        if self.suppressor.take(Instant::now()) {
            return CaptureOutcome::Suppressed;
        }

        self.enter(CapturePhase::Classifying);
        let snapshot = match self.read_with_retry().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                log::warn!("⚠️ 放弃本次剪贴板捕获: {}", err);
                return CaptureOutcome::Failed;
            }
        };
        let Some(payload) = classify(snapshot) else {
            return CaptureOutcome::Empty;
        };

        self.enter(CapturePhase::Normalizing);
        let mut item = match normalize(payload) {
            Ok(item) => item,
            Err(err) => {
                log::warn!("⚠️ 剪贴板内容规范化失败，已跳过: {}", err);
                return CaptureOutcome::Failed;
            }
        };

        if self.last_hash.as_deref() == Some(item.content_hash.as_str()) {
            log::trace!("与上一次捕获内容相同，跳过");
            return CaptureOutcome::Duplicate;
        }

        item.timestamp = self.next_timestamp();
        let hash = item.content_hash.clone();
        if self.sink.submit(item) {
            self.last_hash = Some(hash.clone());
            CaptureOutcome::Captured(hash)
        } else {
            CaptureOutcome::Rejected
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use tokio::sync::mpsc;

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        items: Mutex<Vec<ClipItem>>,
        latest: Option<DateTime<Utc>>,
    }

    impl RecordingSink {
        fn contents(&self) -> Vec<String> {
            self.items
                .lock()
                .expect("sink lock")
                .iter()
                .map(|item| item.content.clone())
                .collect()
        }
    }

    impl CaptureSink for RecordingSink {
        fn submit(&self, item: ClipItem) -> bool {
            self.items.lock().expect("sink lock").push(item);
            true
        }

        fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
            self.latest
        }
    }

    /// 依次返回预设结果，用完后重复最后一个
    struct ScriptedReader {
        script: VecDeque<Result<ClipboardSnapshot, AppError>>,
        last: ClipboardSnapshot,
        reads: Arc<AtomicU64>,
    }

    impl ScriptedReader {
        fn new(script: Vec<Result<ClipboardSnapshot, AppError>>) -> (Self, Arc<AtomicU64>) {
            let reads = Arc::new(AtomicU64::new(0));
            let reader = Self {
                script: script.into(),
                last: ClipboardSnapshot::default(),
                reads: Arc::clone(&reads),
            };
            (reader, reads)
        }
    }

    impl ClipboardReader for ScriptedReader {
        fn read(&mut self) -> Result<ClipboardSnapshot, AppError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            match self.script.pop_front() {
                Some(Ok(snapshot)) => {
                    self.last = snapshot.clone();
                    Ok(snapshot)
                }
                Some(Err(err)) => Err(err),
                None => Ok(self.last.clone()),
            }
        }
    }

    fn busy() -> Result<ClipboardSnapshot, AppError> {
        Err(AppError::Clipboard("occupied".to_string()))
    }

    fn pipeline_with(
        script: Vec<Result<ClipboardSnapshot, AppError>>,
    ) -> (CapturePipeline, Arc<RecordingSink>, CaptureSuppressor, Arc<AtomicU64>) {
        let sink = Arc::new(RecordingSink::default());
        let suppressor = CaptureSuppressor::new();
        let (reader, reads) = ScriptedReader::new(script);
        let pipeline = CapturePipeline::new(
            Box::new(reader),
            sink.clone(),
            suppressor.clone(),
            DebounceWindow::default(),
        );
        (pipeline, sink, suppressor, reads)
    }

    #[test]
    fn debounce_window_is_clamped() {
        assert_eq!(normalize_debounce_ms(5), 20);
        assert_eq!(normalize_debounce_ms(100), 100);
        assert_eq!(normalize_debounce_ms(9_000), 5_000);
        let window = DebounceWindow::from_millis(1);
        window.set_millis(250);
        assert_eq!(window.get(), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn debouncer_resets_on_every_notify() {
        let mut debouncer = Debouncer::default();
        let window = Duration::from_millis(100);
        let start = Instant::now();

        debouncer.notify(start, window);
        debouncer.notify(start + Duration::from_millis(60), window);
        assert!(!debouncer.fire(start + Duration::from_millis(100)));
        assert!(debouncer.fire(start + Duration::from_millis(160)));
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_notifications_yields_one_capture() {
        let (pipeline, sink, _, reads) = pipeline_with(vec![Ok(ClipboardSnapshot::text("hello"))]);
        let (tx, rx) = mpsc::unbounded_channel();

        let driver = async move {
            tx.send(ClipboardChanged).expect("send first");
            sleep(Duration::from_millis(30)).await;
            tx.send(ClipboardChanged).expect("send second");
            sleep(Duration::from_millis(500)).await;
            drop(tx);
        };

        let (stats, ()) = tokio::join!(pipeline.run(rx), driver);
        assert_eq!(stats.notifications, 2);
        assert_eq!(stats.captured, 1);
        assert_eq!(reads.load(Ordering::SeqCst), 1);
        assert_eq!(sink.contents(), vec!["hello"]);
    }

    #[tokio::test(start_paused = true)]
    async fn separated_notifications_capture_separately() {
        let (pipeline, sink, _, _) = pipeline_with(vec![
            Ok(ClipboardSnapshot::text("one")),
            Ok(ClipboardSnapshot::text("two")),
        ]);
        let (tx, rx) = mpsc::unbounded_channel();

        let driver = async move {
            tx.send(ClipboardChanged).expect("send first");
            sleep(Duration::from_millis(300)).await;
            tx.send(ClipboardChanged).expect("send second");
            sleep(Duration::from_millis(300)).await;
        };

        let (stats, ()) = tokio::join!(pipeline.run(rx), driver);
        assert_eq!(stats.captured, 2);
        assert_eq!(sink.contents(), vec!["one", "two"]);
    }

    #[tokio::test(start_paused = true)]
    async fn identical_consecutive_content_is_ignored_but_later_copy_refreshes() {
        let (mut pipeline, sink, _, _) = pipeline_with(vec![
            Ok(ClipboardSnapshot::text("a")),
            Ok(ClipboardSnapshot::text("a")),
            Ok(ClipboardSnapshot::text("b")),
            Ok(ClipboardSnapshot::text("a")),
        ]);

        assert!(matches!(pipeline.capture_once().await, CaptureOutcome::Captured(_)));
        assert_eq!(pipeline.capture_once().await, CaptureOutcome::Duplicate);
        assert!(matches!(pipeline.capture_once().await, CaptureOutcome::Captured(_)));
        assert!(matches!(pipeline.capture_once().await, CaptureOutcome::Captured(_)));
        assert_eq!(sink.contents(), vec!["a", "b", "a"]);
        assert_eq!(pipeline.phase(), CapturePhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn committed_write_back_suppresses_one_cycle() {
        let (mut pipeline, sink, suppressor, reads) = pipeline_with(vec![
            Ok(ClipboardSnapshot::text("from history")),
            Ok(ClipboardSnapshot::text("external")),
        ]);

        suppressor.arm().commit();
        assert_eq!(pipeline.capture_once().await, CaptureOutcome::Suppressed);
        assert_eq!(reads.load(Ordering::SeqCst), 0);

        assert!(matches!(pipeline.capture_once().await, CaptureOutcome::Captured(_)));
        assert_eq!(sink.contents(), vec!["from history"]);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_read_failures_are_retried() {
        let (mut pipeline, sink, _, reads) =
            pipeline_with(vec![busy(), busy(), Ok(ClipboardSnapshot::text("late"))]);

        assert!(matches!(pipeline.capture_once().await, CaptureOutcome::Captured(_)));
        assert_eq!(reads.load(Ordering::SeqCst), 3);
        assert_eq!(sink.contents(), vec!["late"]);
    }

    #[tokio::test(start_paused = true)]
    async fn read_gives_up_after_timeout_and_loop_continues() {
        let script = (0..11).map(|_| busy()).chain([Ok(ClipboardSnapshot::text("next"))]).collect();
        let (mut pipeline, sink, _, reads) = pipeline_with(script);

        let started = Instant::now();
        assert_eq!(pipeline.capture_once().await, CaptureOutcome::Failed);
        assert!(started.elapsed() <= READ_TIMEOUT);
        assert_eq!(reads.load(Ordering::SeqCst), 11);
        assert_eq!(pipeline.stats().failures, 1);

        assert!(matches!(pipeline.capture_once().await, CaptureOutcome::Captured(_)));
        assert_eq!(sink.contents(), vec!["next"]);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_clipboard_is_not_submitted() {
        let (mut pipeline, sink, _, _) = pipeline_with(vec![Ok(ClipboardSnapshot::text("   "))]);
        assert_eq!(pipeline.capture_once().await, CaptureOutcome::Empty);
        assert!(sink.contents().is_empty());
    }

    fn wall_clock(readings: Vec<DateTime<Utc>>) -> CaptureClock {
        let readings = Mutex::new(VecDeque::from(readings));
        CaptureClock::with_source(move || {
            readings
                .lock()
                .expect("clock lock")
                .pop_front()
                .expect("clock reading")
        })
    }

    #[test]
    fn clock_keeps_increasing_when_wall_clock_steps_back() {
        let t0 = Utc::now();
        let mut clock = wall_clock(vec![t0, t0 - TimeDelta::minutes(10), t0, t0 + TimeDelta::seconds(1)]);

        let first = clock.stamp();
        let second = clock.stamp();
        let third = clock.stamp();
        let fourth = clock.stamp();
        assert_eq!(first, t0);
        assert_eq!(second, t0 + TimeDelta::nanoseconds(1));
        assert_eq!(third, t0 + TimeDelta::nanoseconds(2));
        assert_eq!(fourth, t0 + TimeDelta::seconds(1));
    }

    #[tokio::test(start_paused = true)]
    async fn captures_are_stamped_after_newest_stored_item() {
        let stored = Utc::now();
        let sink = Arc::new(RecordingSink {
            latest: Some(stored),
            ..RecordingSink::default()
        });
        let (reader, _) = ScriptedReader::new(vec![
            Ok(ClipboardSnapshot::text("one")),
            Ok(ClipboardSnapshot::text("two")),
        ]);
        let mut pipeline = CapturePipeline::new(
            Box::new(reader),
            sink.clone(),
            CaptureSuppressor::new(),
            DebounceWindow::default(),
        )
        .with_clock(wall_clock(vec![stored - TimeDelta::hours(1), stored - TimeDelta::hours(2)]));

        pipeline.capture_once().await;
        pipeline.capture_once().await;

        let stamps: Vec<DateTime<Utc>> = sink
            .items
            .lock()
            .expect("sink lock")
            .iter()
            .map(|item| item.timestamp)
            .collect();
        assert_eq!(
            stamps,
            vec![stored + TimeDelta::nanoseconds(1), stored + TimeDelta::nanoseconds(2)]
        );
    }
}
