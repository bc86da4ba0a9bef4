//! # 剪贴板历史工具：应用入口
//!
//! 本文件仅负责初始化与事件循环装配，业务逻辑见 `lib.rs` 架构文档。
//!
//! 启动顺序：日志 → 目录 → 设置 → 数据库（失败即退出）→ 捕获流水线 → 快捷键 → 自启动。
//! 之后在单线程事件循环上处理快捷键、定时维护与退出信号。
//!
//! 主线程留给快捷键宿主轮询平台事件循环（macOS 只允许在主线程上接收快捷键），
//! 异步运行时在独立线程上运行；运行时退出后句柄释放，主线程随之结束。

use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clipmaster::autostart::{sync_autostart, SystemAutostart};
use clipmaster::clipboard::listener::start_monitoring;
use clipmaster::clipboard::pipeline::{CapturePipeline, DebounceWindow};
use clipmaster::clipboard::reader::ArboardReader;
use clipmaster::clipboard::CaptureSuppressor;
use clipmaster::db::HistoryStore;
use clipmaster::error::AppError;
use clipmaster::hotkey::{hotkey_host, HotkeyAction, HotkeyHandle};
use clipmaster::paths::AppPaths;
use clipmaster::service::{HistoryService, RetentionPolicy};
use clipmaster::settings::{AppSettings, SettingsStore};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{interval, interval_at, Instant, Interval};

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60 * 60);

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (hotkeys, host, hotkey_events) = hotkey_host();
    let app = thread::Builder::new()
        .name("clipmaster-runtime".to_string())
        .spawn(move || run_runtime(hotkeys, hotkey_events));
    let app = match app {
        Ok(app) => app,
        Err(err) => {
            log::error!("创建运行时线程失败: {}", err);
            process::exit(1);
        }
    };

    host.run();

    match app.join() {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            log::error!("❌ 启动失败: {}", err);
            process::exit(1);
        }
        Err(_) => {
            log::error!("运行时线程异常退出");
            process::exit(1);
        }
    }
}

fn run_runtime(hotkeys: HotkeyHandle, hotkey_events: UnboundedReceiver<HotkeyAction>) -> Result<(), AppError> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(run(hotkeys, hotkey_events))
}

fn autosave_timer(seconds: u64) -> Interval {
    let period = Duration::from_secs(seconds.max(1));
    interval_at(Instant::now() + period, period)
}

/// 自动保存间隔变化时返回新的秒数
fn autosave_change(previous: &AppSettings, current: &AppSettings) -> Option<u64> {
    (current.auto_save_interval != previous.auto_save_interval).then_some(current.auto_save_interval)
}

async fn run(hotkeys: HotkeyHandle, mut hotkey_events: UnboundedReceiver<HotkeyAction>) -> Result<(), AppError> {
    let paths = AppPaths::resolve()?;
    paths.ensure_dirs()?;

    let (mut settings, _warnings) = SettingsStore::load(paths.settings_file());
    let current = settings.current().clone();
    log::info!("设置文件: {}", settings.path().display());

    let store = HistoryStore::open(&paths.db_path(current.db_dir.as_deref()))?;
    let service = Arc::new(HistoryService::new(store, RetentionPolicy::from_settings(&current)));
    service.on_item_added(|item| log::info!("📋 新条目: {}", item.preview_text(40)));

    // 捕获流水线
    let suppressor = CaptureSuppressor::new();
    let debounce = DebounceWindow::from_millis(current.clipboard_debounce_ms);
    let pipeline = CapturePipeline::new(
        Box::new(ArboardReader),
        service.clone(),
        suppressor.clone(),
        debounce.clone(),
    );
    let capture = tokio::spawn(pipeline.run(start_monitoring()));

    hotkeys.apply(&current.hotkeys);
    apply_autostart(&current);

    let mut maintenance = interval(MAINTENANCE_INTERVAL);
    let mut autosave = autosave_timer(current.auto_save_interval);

    loop {
        let mut reschedule_autosave = None;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("收到退出信号");
                break;
            }
            _ = maintenance.tick() => {
                service.run_maintenance();
            }
            _ = autosave.tick() => {
                if let Err(err) = service.store().checkpoint() {
                    log::warn!("⚠️ 自动保存失败: {}", err);
                }
                let previous = settings.current().clone();
                if !settings.reload().is_empty() {
                    log::warn!("⚠️ 设置文件存在无效字段，已回退");
                }
                let current = settings.current();
                if *current != previous {
                    log::info!("检测到设置文件变化，重新应用");
                    apply_runtime_settings(current, &previous, &service, &debounce, &hotkeys);
                    reschedule_autosave = autosave_change(&previous, current);
                }
            }
            Some(action) = hotkey_events.recv() => {
                match action {
                    HotkeyAction::ClearHistory => {
                        service.clear(true);
                    }
                    HotkeyAction::ShowWindow | HotkeyAction::Search => {
                        log::info!("⌨️ 快捷键 {}：当前共 {} 条记录", action.key(), service.get_count());
                    }
                }
            }
        }
        if let Some(seconds) = reschedule_autosave {
            log::info!("自动保存间隔调整为 {} 秒", seconds);
            autosave = autosave_timer(seconds);
        }
    }

    capture.abort();
    if let Err(err) = service.store().checkpoint() {
        log::warn!("⚠️ 退出前保存失败: {}", err);
    }
    log::info!("👋 已退出");
    Ok(())
}

fn apply_autostart(settings: &AppSettings) {
    match SystemAutostart::for_current_exe() {
        Ok(backend) => {
            sync_autostart(&backend, settings.startup);
        }
        Err(err) => log::warn!("⚠️ {}", err),
    }
}

fn apply_runtime_settings(
    current: &AppSettings,
    previous: &AppSettings,
    service: &HistoryService,
    debounce: &DebounceWindow,
    hotkeys: &HotkeyHandle,
) {
    if current.max_history != previous.max_history || current.retention_days != previous.retention_days {
        service.update_settings(current);
    }
    if current.clipboard_debounce_ms != previous.clipboard_debounce_ms {
        debounce.set_millis(current.clipboard_debounce_ms);
    }
    if current.hotkeys != previous.hotkeys {
        hotkeys.apply(&current.hotkeys);
    }
    if current.startup != previous.startup {
        apply_autostart(current);
    }
    if current.db_dir != previous.db_dir {
        log::warn!("数据库目录变更将在重启后生效");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn rebuilt_autosave_timer_uses_new_period() {
        let previous = AppSettings::default();
        let current = AppSettings { auto_save_interval: previous.auto_save_interval + 30, ..previous.clone() };
        assert_eq!(autosave_change(&previous, &previous), None);
        let seconds = autosave_change(&previous, &current).expect("interval changed");

        let start = Instant::now();
        let mut timer = autosave_timer(seconds);
        assert_eq!(timer.period(), Duration::from_secs(seconds));
        timer.tick().await;
        assert!(start.elapsed() >= Duration::from_secs(seconds));

        assert_eq!(autosave_timer(0).period(), Duration::from_secs(1));
    }
}
