//! 系统剪贴板监听
//!
//! `clipboard-master` 的 `Master::run` 会阻塞当前线程，因此监听器运行在独立线程中，
//! 只把原始通知转发到事件循环的 mpsc 通道；防抖、读取、入库全部在事件循环上完成。
//! 监听器意外退出时按指数退避重启；接收端关闭后线程自行结束。

use std::thread;
use std::time::Duration;

use clipboard_master::{CallbackResult, ClipboardHandler, Master};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

const RESTART_FIRST_DELAY: Duration = Duration::from_millis(100);
const RESTART_MAX_DELAY: Duration = Duration::from_secs(5);

/// 一次原始剪贴板变化通知（不携带内容）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipboardChanged;

/// 监听器重启退避：首次 100ms，之后每次翻倍，封顶 5s；监听成功启动后归零
#[derive(Debug, Default)]
struct RestartBackoff {
    failures: u32,
}

impl RestartBackoff {
    fn reset(&mut self) {
        self.failures = 0;
    }

    fn next_delay(&mut self) -> Duration {
        let delay = RESTART_FIRST_DELAY
            .checked_mul(1 << self.failures.min(16))
            .map_or(RESTART_MAX_DELAY, |delay| delay.min(RESTART_MAX_DELAY));
        self.failures = self.failures.saturating_add(1);
        delay
    }

    fn failures(&self) -> u32 {
        self.failures
    }
}

/// 剪贴板事件处理器（内部实现）
struct Handler {
    sender: UnboundedSender<ClipboardChanged>,
}

impl Handler {
    fn forward(&self) -> CallbackResult {
        if self.sender.send(ClipboardChanged).is_err() {
            log::info!("📋 捕获流水线已关闭，停止剪贴板监听");
            return CallbackResult::Stop;
        }
        log::trace!("📋 收到剪贴板变化通知");
        CallbackResult::Next
    }
}

impl ClipboardHandler for Handler {
    fn on_clipboard_change(&mut self) -> CallbackResult {
        self.forward()
    }

    fn on_clipboard_error(&mut self, error: std::io::Error) -> CallbackResult {
        log::error!("剪贴板错误：{}", error);
        CallbackResult::Next
    }
}

/// 创建通知通道并在后台线程启动剪贴板监听
pub fn start_monitoring() -> UnboundedReceiver<ClipboardChanged> {
    let (sender, receiver) = mpsc::unbounded_channel();
    spawn_monitor(sender);
    receiver
}

fn spawn_monitor(sender: UnboundedSender<ClipboardChanged>) {
    let spawned = thread::Builder::new()
        .name("clipboard-monitor".to_string())
        .spawn(move || {
            let mut backoff = RestartBackoff::default();
            loop {
                match Master::new(Handler { sender: sender.clone() }) {
                    Ok(mut master) => {
                        backoff.reset();
                        log::info!("📋 剪贴板监听已启动");
                        if let Err(err) = master.run() {
                            log::warn!("📋 剪贴板监听异常退出: {}", err);
                        }
                    }
                    Err(err) => {
                        log::error!("📋 创建剪贴板监听失败: {}", err);
                    }
                }

                if sender.is_closed() {
                    break;
                }

                let delay = backoff.next_delay();
                log::warn!("📋 第 {} 次重启剪贴板监听，等待 {:?}", backoff.failures(), delay);
                thread::sleep(delay);
            }
        });

    if let Err(err) = spawned {
        log::error!("📋 启动剪贴板监听线程失败: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_delay_doubles_until_capped_and_resets() {
        let mut backoff = RestartBackoff::default();
        let delays: Vec<u128> = (0..8).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1_600, 3_200, 5_000, 5_000]);

        for _ in 0..100 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), RESTART_MAX_DELAY);

        backoff.reset();
        assert_eq!(backoff.next_delay(), RESTART_FIRST_DELAY);
        assert_eq!(backoff.failures(), 1);
    }

    #[test]
    fn handler_forwards_until_receiver_closes() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut handler = Handler { sender };

        assert!(matches!(handler.on_clipboard_change(), CallbackResult::Next));
        assert_eq!(receiver.try_recv().expect("notice forwarded"), ClipboardChanged);

        drop(receiver);
        assert!(matches!(handler.on_clipboard_change(), CallbackResult::Stop));
    }
}
