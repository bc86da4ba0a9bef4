//! 全局快捷键
//!
//! # 设计思路
//!
//! 快捷键注册是进程级全局状态。`HotkeyRegistry` 记录每个逻辑动作当前绑定的组合键：
//! - 重新绑定同一动作时先注销旧组合，再注册新组合，避免重复触发
//! - 新组合已被其他动作占用时，先把它从那个动作上解绑
//! - 系统拒绝注册属于非致命错误：记录告警，动作保留原来的绑定，其余动作照常注册
//!
//! 系统调用通过 `HotkeyBackend` 抽象，生产环境使用 `global-hotkey`，测试使用内存实现。
//!
//! # 事件循环
//!
//! `global-hotkey` 依赖平台事件循环：Windows 需要在创建管理器的线程上处理消息队列，
//! macOS 需要主线程的 run loop。`HotkeyHost` 持有注册表并在所在线程上轮询平台事件，
//! 异步侧通过 `HotkeyHandle` 下发绑定、通过通道接收按下的动作。

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::mpsc::{self as std_mpsc, Receiver, Sender, TryRecvError};
use std::time::Duration;

use global_hotkey::hotkey::HotKey;
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::AppError;
use crate::settings::HotkeyBindings;

/// 可绑定快捷键的逻辑动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HotkeyAction {
    ShowWindow,
    ClearHistory,
    Search,
}

impl HotkeyAction {
    pub const ALL: [HotkeyAction; 3] = [
        HotkeyAction::ShowWindow,
        HotkeyAction::ClearHistory,
        HotkeyAction::Search,
    ];

    /// 设置文件中使用的键名
    pub fn key(self) -> &'static str {
        match self {
            HotkeyAction::ShowWindow => "showWindow",
            HotkeyAction::ClearHistory => "clearHistory",
            HotkeyAction::Search => "search",
        }
    }
}

/// 解析组合键字符串，如 `Ctrl+Shift+C`
pub fn parse_hotkey(combo: &str) -> Result<HotKey, AppError> {
    let combo = combo.trim();
    if combo.is_empty() {
        return Err(AppError::Hotkey("快捷键不能为空".to_string()));
    }
    HotKey::from_str(combo).map_err(|e| AppError::Hotkey(format!("无法解析快捷键 '{}': {}", combo, e)))
}

pub trait HotkeyBackend {
    fn register(&mut self, hotkey: HotKey) -> Result<(), AppError>;
    fn unregister(&mut self, hotkey: HotKey) -> Result<(), AppError>;
}

/// 基于 `global-hotkey` 的系统后端
pub struct GlobalHotkeyBackend {
    manager: GlobalHotKeyManager,
}

impl GlobalHotkeyBackend {
    pub fn new() -> Result<Self, AppError> {
        let manager = GlobalHotKeyManager::new()
            .map_err(|e| AppError::Hotkey(format!("创建快捷键管理器失败: {}", e)))?;
        Ok(Self { manager })
    }
}

impl HotkeyBackend for GlobalHotkeyBackend {
    fn register(&mut self, hotkey: HotKey) -> Result<(), AppError> {
        self.manager.register(hotkey).map_err(|e| match e {
            global_hotkey::Error::AlreadyRegistered(hk) => {
                AppError::Hotkey(format!("快捷键已被占用（id: {}）", hk.id()))
            }
            other => AppError::Hotkey(format!("注册快捷键失败: {}", other)),
        })
    }

    fn unregister(&mut self, hotkey: HotKey) -> Result<(), AppError> {
        self.manager
            .unregister(hotkey)
            .map_err(|e| AppError::Hotkey(format!("注销快捷键失败: {}", e)))
    }
}

#[derive(Debug, Clone)]
struct Binding {
    combo: String,
    hotkey: HotKey,
}

pub struct HotkeyRegistry<B: HotkeyBackend> {
    backend: B,
    bindings: HashMap<HotkeyAction, Binding>,
}

impl<B: HotkeyBackend> HotkeyRegistry<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            bindings: HashMap::new(),
        }
    }

    /// 从表中移除并注销，返回被移除的绑定
    fn release(&mut self, action: HotkeyAction) -> Option<Binding> {
        let binding = self.bindings.remove(&action)?;
        if let Err(err) = self.backend.unregister(binding.hotkey) {
            log::warn!("⚠️ 注销快捷键 {} ({}) 失败: {}", binding.combo, action.key(), err);
        }
        Some(binding)
    }

    /// 新组合注册失败后恢复先前释放的绑定
    fn restore(&mut self, released: Vec<(HotkeyAction, Binding)>) {
        for (action, binding) in released {
            match self.backend.register(binding.hotkey) {
                Ok(()) => {
                    self.bindings.insert(action, binding);
                }
                Err(err) => log::warn!("⚠️ 恢复快捷键 {} ({}) 失败: {}", binding.combo, action.key(), err),
            }
        }
    }

    /// 绑定动作到组合键，返回快捷键 id
    ///
    /// 注册失败时动作及被转移的其他动作都恢复到原来的绑定。
    pub fn bind(&mut self, action: HotkeyAction, combo: &str) -> Result<u32, AppError> {
        let hotkey = parse_hotkey(combo)?;

        if let Some(existing) = self.bindings.get(&action) {
            if existing.hotkey == hotkey {
                return Ok(hotkey.id());
            }
        }

        let holders: Vec<HotkeyAction> = self
            .bindings
            .iter()
            .filter(|(other, binding)| **other != action && binding.hotkey == hotkey)
            .map(|(other, _)| *other)
            .collect();
        let mut released = Vec::new();
        for holder in holders {
            log::warn!("快捷键 {} 从 {} 转移到 {}", combo, holder.key(), action.key());
            if let Some(binding) = self.release(holder) {
                released.push((holder, binding));
            }
        }
        if let Some(binding) = self.release(action) {
            released.push((action, binding));
        }

        if let Err(err) = self.backend.register(hotkey) {
            self.restore(released);
            return Err(err);
        }
        self.bindings.insert(
            action,
            Binding {
                combo: combo.trim().to_string(),
                hotkey,
            },
        );
        log::info!("⌨️ 已注册快捷键 {} -> {}", combo.trim(), action.key());
        Ok(hotkey.id())
    }

    /// 解绑动作；未绑定时返回 `false`
    pub fn unbind(&mut self, action: HotkeyAction) -> bool {
        self.release(action).is_some()
    }

    /// 按设置批量绑定；单个失败只记录告警
    pub fn apply_bindings(&mut self, bindings: &HotkeyBindings) -> Vec<(HotkeyAction, AppError)> {
        let mut failures = Vec::new();
        for (action, combo) in bindings.iter() {
            if let Err(err) = self.bind(action, combo) {
                log::warn!("⚠️ 快捷键 {} ({}) 注册失败: {}", combo, action.key(), err);
                failures.push((action, err));
            }
        }
        failures
    }

    pub fn action_for(&self, hotkey_id: u32) -> Option<HotkeyAction> {
        self.bindings
            .iter()
            .find(|(_, binding)| binding.hotkey.id() == hotkey_id)
            .map(|(action, _)| *action)
    }

    pub fn combo_for(&self, action: HotkeyAction) -> Option<&str> {
        self.bindings.get(&action).map(|binding| binding.combo.as_str())
    }
}

impl<B: HotkeyBackend> Drop for HotkeyRegistry<B> {
    fn drop(&mut self) {
        for action in HotkeyAction::ALL {
            self.release(action);
        }
    }
}

/// 下发到快捷键线程的命令
#[derive(Debug, Clone)]
pub enum HotkeyCommand {
    Apply(HotkeyBindings),
}

/// 异步侧持有的快捷键句柄；全部释放后快捷键线程退出
#[derive(Debug, Clone)]
pub struct HotkeyHandle {
    commands: Sender<HotkeyCommand>,
}

impl HotkeyHandle {
    pub fn apply(&self, bindings: &HotkeyBindings) {
        if self.commands.send(HotkeyCommand::Apply(bindings.clone())).is_err() {
            log::warn!("⚠️ 快捷键线程已退出，忽略新的绑定");
        }
    }
}

const PUMP_INTERVAL: Duration = Duration::from_millis(50);

/// 持有快捷键注册表、轮询平台事件的一端
pub struct HotkeyHost {
    commands: Receiver<HotkeyCommand>,
    pressed: UnboundedSender<HotkeyAction>,
}

/// 创建句柄、宿主和按下动作的接收端
pub fn hotkey_host() -> (HotkeyHandle, HotkeyHost, UnboundedReceiver<HotkeyAction>) {
    let (commands_tx, commands) = std_mpsc::channel();
    let (pressed, pressed_rx) = mpsc::unbounded_channel();
    (
        HotkeyHandle { commands: commands_tx },
        HotkeyHost { commands, pressed },
        pressed_rx,
    )
}

impl HotkeyHost {
    /// 在当前线程上运行直到所有句柄被释放；macOS 上必须是主线程
    pub fn run(self) {
        let backend = match GlobalHotkeyBackend::new() {
            Ok(backend) => backend,
            Err(err) => {
                log::warn!("⚠️ 全局快捷键不可用: {}", err);
                while self.commands.recv().is_ok() {}
                return;
            }
        };
        let mut registry = HotkeyRegistry::new(backend);
        let events = GlobalHotKeyEvent::receiver();
        loop {
            platform::pump_events(PUMP_INTERVAL);
            let pressed: Vec<u32> = events
                .try_iter()
                .filter(|event| event.state == HotKeyState::Pressed)
                .map(|event| event.id)
                .collect();
            if !self.step(&mut registry, pressed) {
                break;
            }
        }
        log::debug!("快捷键线程退出");
    }

    /// 处理一轮按键事件与命令；句柄全部释放时返回 `false`
    pub fn step<B: HotkeyBackend>(
        &self,
        registry: &mut HotkeyRegistry<B>,
        pressed: impl IntoIterator<Item = u32>,
    ) -> bool {
        for id in pressed {
            match registry.action_for(id) {
                Some(action) => {
                    let _ = self.pressed.send(action);
                }
                None => log::debug!("未绑定的快捷键事件: {}", id),
            }
        }
        loop {
            match self.commands.try_recv() {
                Ok(HotkeyCommand::Apply(bindings)) => {
                    registry.apply_bindings(&bindings);
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }
}

mod platform {
    use std::time::Duration;

    #[cfg(target_os = "windows")]
    pub fn pump_events(wait: Duration) {
        use windows::Win32::UI::WindowsAndMessaging::{
            DispatchMessageW, PeekMessageW, TranslateMessage, MSG, PM_REMOVE,
        };

        let mut msg = MSG::default();
        let mut handled = false;
        unsafe {
            while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
                handled = true;
            }
        }
        if !handled {
            std::thread::sleep(wait);
        }
    }

    #[cfg(target_os = "macos")]
    pub fn pump_events(wait: Duration) {
        use core_foundation::runloop::{kCFRunLoopDefaultMode, CFRunLoop};

        let _ = CFRunLoop::run_in_mode(unsafe { kCFRunLoopDefaultMode }, wait, true);
    }

    /// X11 后端在 `global-hotkey` 内部线程上监听，这里只需让出时间片
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    pub fn pump_events(wait: Duration) {
        std::thread::sleep(wait);
    }
}
