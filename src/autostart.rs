//! 开机自启动
//!
//! 系统启动项由 `auto-launch` 维护：
//! - Linux：XDG autostart 目录下的 `.desktop` 启动项
//! - macOS：LaunchAgent
//! - Windows：注册表 `Run` 键
//!
//! 上层只依赖 `AutostartBackend`，与设置同步时失败只记录告警。

use std::path::Path;

use auto_launch::{AutoLaunch, AutoLaunchBuilder};

use crate::error::AppError;

const APP_NAME: &str = "clipmaster";

pub trait AutostartBackend {
    fn is_enabled(&self) -> Result<bool, AppError>;
    fn enable(&self) -> Result<(), AppError>;
    fn disable(&self) -> Result<(), AppError>;

    fn set_enabled(&self, enabled: bool) -> Result<(), AppError> {
        if enabled { self.enable() } else { self.disable() }
    }
}

/// 基于 `auto-launch` 的系统启动项
pub struct SystemAutostart {
    launcher: AutoLaunch,
}

impl SystemAutostart {
    pub fn new(app_name: &str, executable: &Path) -> Result<Self, AppError> {
        let app_path = executable
            .to_str()
            .ok_or_else(|| AppError::Autostart(format!("可执行文件路径不是有效 UTF-8: {}", executable.display())))?;
        let launcher = AutoLaunchBuilder::new()
            .set_app_name(app_name)
            .set_app_path(app_path)
            .set_use_launch_agent(true)
            .build()
            .map_err(|e| AppError::Autostart(format!("初始化自启动失败: {}", e)))?;
        Ok(Self { launcher })
    }

    /// 指向当前可执行文件的启动项
    pub fn for_current_exe() -> Result<Self, AppError> {
        let executable = std::env::current_exe()
            .map_err(|e| AppError::Autostart(format!("无法获取可执行文件路径: {}", e)))?;
        Self::new(APP_NAME, &executable)
    }

    pub fn app_name(&self) -> &str {
        self.launcher.get_app_name()
    }

    pub fn app_path(&self) -> &str {
        self.launcher.get_app_path()
    }
}

impl AutostartBackend for SystemAutostart {
    fn is_enabled(&self) -> Result<bool, AppError> {
        self.launcher
            .is_enabled()
            .map_err(|e| AppError::Autostart(format!("查询启动项失败: {}", e)))
    }

    fn enable(&self) -> Result<(), AppError> {
        self.launcher
            .enable()
            .map_err(|e| AppError::Autostart(format!("写入启动项失败: {}", e)))?;
        log::info!("🚀 已启用开机自启动: {}", self.app_path());
        Ok(())
    }

    fn disable(&self) -> Result<(), AppError> {
        self.launcher
            .disable()
            .map_err(|e| AppError::Autostart(format!("删除启动项失败: {}", e)))?;
        log::info!("已禁用开机自启动");
        Ok(())
    }
}

/// 使系统启动项与设置一致；失败只记录告警并返回 `false`
pub fn sync_autostart(backend: &dyn AutostartBackend, enabled: bool) -> bool {
    let current = match backend.is_enabled() {
        Ok(current) => current,
        Err(err) => {
            log::warn!("⚠️ 查询自启动状态失败: {}", err);
            return false;
        }
    };
    if current == enabled {
        return true;
    }
    match backend.set_enabled(enabled) {
        Ok(()) => true,
        Err(err) => {
            log::warn!("⚠️ 设置开机自启动失败: {}", err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;

    #[test]
    fn launcher_is_built_for_given_executable() {
        let backend = SystemAutostart::new("clipmaster-test", Path::new("/opt/clipmaster/bin/clipmaster"))
            .expect("build launcher");
        assert_eq!(backend.app_name(), "clipmaster-test");
        assert_eq!(backend.app_path(), "/opt/clipmaster/bin/clipmaster");
    }

    #[derive(Default)]
    struct RecordingBackend {
        enabled: Cell<bool>,
        calls: RefCell<Vec<bool>>,
    }

    impl AutostartBackend for RecordingBackend {
        fn is_enabled(&self) -> Result<bool, AppError> {
            Ok(self.enabled.get())
        }
        fn enable(&self) -> Result<(), AppError> {
            self.calls.borrow_mut().push(true);
            self.enabled.set(true);
            Ok(())
        }
        fn disable(&self) -> Result<(), AppError> {
            self.calls.borrow_mut().push(false);
            self.enabled.set(false);
            Ok(())
        }
    }

    #[test]
    fn sync_only_touches_system_when_state_differs() {
        let backend = RecordingBackend::default();
        assert!(sync_autostart(&backend, false));
        assert!(sync_autostart(&backend, true));
        assert!(sync_autostart(&backend, true));
        assert!(sync_autostart(&backend, false));
        assert_eq!(*backend.calls.borrow(), vec![true, false]);
    }

    struct BrokenBackend;

    impl AutostartBackend for BrokenBackend {
        fn is_enabled(&self) -> Result<bool, AppError> {
            Ok(false)
        }
        fn enable(&self) -> Result<(), AppError> {
            Err(AppError::Autostart("denied".to_string()))
        }
        fn disable(&self) -> Result<(), AppError> {
            Ok(())
        }
    }

    #[test]
    fn sync_reports_failure_without_error() {
        assert!(!sync_autostart(&BrokenBackend, true));
        assert!(sync_autostart(&BrokenBackend, false));
    }
}
