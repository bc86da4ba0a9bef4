//! 应用设置
//!
//! # 设计思路
//!
//! 设置是一个显式传递的配置对象，而不是全局单例：`SettingsStore` 持有文件路径与当前
//! 生效值，提供 `load` / `reload` / `save` / `apply` 四个操作，调用方拿到新值后自行
//! 通知存储引擎、捕获流水线、快捷键注册表。
//!
//! # 实现思路
//!
//! - 文件为 JSON，字段使用 camelCase；读取时兼容旧版 snake_case 写法，缺失字段取默认值。
//! - 文件不存在：写入默认值；文件损坏：使用默认值并告警，不覆盖原文件。
//! - 所有更新都在 `validate_against` 边界校验：非法字段回退到上一个有效值并产生
//!   `SettingsWarning`，其余字段照常生效。非法值永远不会被保存。
//! - 写文件使用临时文件 + 重命名，避免崩溃时留下截断的配置。

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clipboard::pipeline::{DEBOUNCE_DEFAULT_MS, DEBOUNCE_MAX_MS, DEBOUNCE_MIN_MS};
use crate::error::AppError;
use crate::hotkey::{parse_hotkey, HotkeyAction};
use crate::paths::write_atomic;

pub const MAX_HISTORY_RANGE: (usize, usize) = (10, 100_000);
pub const RETENTION_DAYS_RANGE: (i64, i64) = (0, 3_650);
pub const DISPLAY_LIMIT_RANGE: (usize, usize) = (1, 10_000);

/// 快捷键绑定：逻辑动作 → 按键组合
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HotkeyBindings {
    #[serde(alias = "show_window")]
    pub show_window: String,
    #[serde(alias = "clear_history")]
    pub clear_history: String,
    pub search: String,
}

impl Default for HotkeyBindings {
    fn default() -> Self {
        Self {
            show_window: "Ctrl+O".to_string(),
            clear_history: "Ctrl+Shift+C".to_string(),
            search: "Ctrl+F".to_string(),
        }
    }
}

impl HotkeyBindings {
    pub fn get(&self, action: HotkeyAction) -> &str {
        match action {
            HotkeyAction::ShowWindow => &self.show_window,
            HotkeyAction::ClearHistory => &self.clear_history,
            HotkeyAction::Search => &self.search,
        }
    }

    fn get_mut(&mut self, action: HotkeyAction) -> &mut String {
        match action {
            HotkeyAction::ShowWindow => &mut self.show_window,
            HotkeyAction::ClearHistory => &mut self.clear_history,
            HotkeyAction::Search => &mut self.search,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (HotkeyAction, &str)> {
        HotkeyAction::ALL.into_iter().map(move |action| (action, self.get(action)))
    }
}

/// 设置记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(alias = "dark_mode")]
    pub dark_mode: bool,
    /// 开机自启
    pub startup: bool,
    #[serde(alias = "minimize_to_tray")]
    pub minimize_to_tray: bool,
    #[serde(alias = "max_history")]
    pub max_history: usize,
    /// 0 表示永久保留
    #[serde(alias = "retention_days")]
    pub retention_days: i64,
    /// 展示层分页大小
    #[serde(alias = "display_limit")]
    pub display_limit: usize,
    pub hotkeys: HotkeyBindings,
    /// 秒
    #[serde(alias = "auto_save_interval")]
    pub auto_save_interval: u64,
    #[serde(alias = "clipboard_debounce_ms")]
    pub clipboard_debounce_ms: u64,
    #[serde(alias = "db_dir", skip_serializing_if = "Option::is_none")]
    pub db_dir: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            dark_mode: false,
            startup: true,
            minimize_to_tray: false,
            max_history: 1000,
            retention_days: 30,
            display_limit: 100,
            hotkeys: HotkeyBindings::default(),
            auto_save_interval: 60,
            clipboard_debounce_ms: DEBOUNCE_DEFAULT_MS,
            db_dir: None,
        }
    }
}

/// 被拒绝的设置项
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsWarning {
    pub field: String,
    pub message: String,
}

impl SettingsWarning {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

fn check_range<T>(
    field: &str,
    value: &mut T,
    previous: T,
    (min, max): (T, T),
    warnings: &mut Vec<SettingsWarning>,
) where
    T: PartialOrd + Copy + std::fmt::Display,
{
    if *value < min || *value > max {
        warnings.push(SettingsWarning::new(
            field,
            format!("{} 超出范围 {}..={}，保留原值 {}", value, min, max, previous),
        ));
        *value = previous;
    }
}

impl AppSettings {
    /// 以 `previous` 为回退值校验本记录，返回合法化后的设置与告警列表
    pub fn validate_against(mut self, previous: &AppSettings) -> (AppSettings, Vec<SettingsWarning>) {
        let mut warnings = Vec::new();

        check_range("maxHistory", &mut self.max_history, previous.max_history, MAX_HISTORY_RANGE, &mut warnings);
        check_range(
            "retentionDays",
            &mut self.retention_days,
            previous.retention_days,
            RETENTION_DAYS_RANGE,
            &mut warnings,
        );
        check_range(
            "displayLimit",
            &mut self.display_limit,
            previous.display_limit,
            DISPLAY_LIMIT_RANGE,
            &mut warnings,
        );
        check_range(
            "clipboardDebounceMs",
            &mut self.clipboard_debounce_ms,
            previous.clipboard_debounce_ms,
            (DEBOUNCE_MIN_MS, DEBOUNCE_MAX_MS),
            &mut warnings,
        );
        if self.auto_save_interval == 0 {
            warnings.push(SettingsWarning::new("autoSaveInterval", "必须大于 0，保留原值"));
            self.auto_save_interval = previous.auto_save_interval;
        }

        for action in HotkeyAction::ALL {
            let combo = self.hotkeys.get(action).trim().to_string();
            match parse_hotkey(&combo) {
                Ok(_) => *self.hotkeys.get_mut(action) = combo,
                Err(err) => {
                    warnings.push(SettingsWarning::new(format!("hotkeys.{}", action.key()), err.to_string()));
                    *self.hotkeys.get_mut(action) = previous.hotkeys.get(action).to_string();
                }
            }
        }

        (self, warnings)
    }
}

fn merge_json(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                let nested = value.is_object() && base.get(&key).is_some_and(Value::is_object);
                if !nested {
                    base.insert(key, value);
                } else if let Some(existing) = base.get_mut(&key) {
                    merge_json(existing, value);
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

fn log_warnings(warnings: &[SettingsWarning]) {
    for warning in warnings {
        log::warn!("⚠️ 设置项 {} 无效: {}", warning.field, warning.message);
    }
}

/// 设置文件的读写入口
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
    current: AppSettings,
}

impl SettingsStore {
    fn read_file(path: &Path) -> Result<Option<AppSettings>, AppError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        let parsed = serde_json::from_str::<AppSettings>(&content)
            .map_err(|e| AppError::Config(format!("解析设置文件失败: {}", e)))?;
        Ok(Some(parsed))
    }

    /// 读取设置文件；不存在时写入默认值，损坏时回退默认值
    pub fn load(path: impl Into<PathBuf>) -> (Self, Vec<SettingsWarning>) {
        let mut store = Self {
            path: path.into(),
            current: AppSettings::default(),
        };
        let warnings = store.reload();
        (store, warnings)
    }

    /// 重新读取文件；非法字段回退到当前值
    pub fn reload(&mut self) -> Vec<SettingsWarning> {
        match Self::read_file(&self.path) {
            Ok(Some(loaded)) => {
                let (valid, warnings) = loaded.validate_against(&self.current);
                log_warnings(&warnings);
                self.current = valid;
                warnings
            }
            Ok(None) => {
                log::info!("设置文件不存在，写入默认设置: {}", self.path.display());
                if let Err(err) = self.save() {
                    log::warn!("⚠️ 写入默认设置失败: {}", err);
                }
                Vec::new()
            }
            Err(err) => {
                log::warn!("⚠️ 读取设置失败，使用当前设置: {}", err);
                vec![SettingsWarning::new("*", err.to_string())]
            }
        }
    }

    pub fn save(&self) -> Result<(), AppError> {
        let content = serde_json::to_vec_pretty(&self.current)?;
        write_atomic(&self.path, &content)
    }

    /// 校验并应用完整的新设置，然后落盘
    pub fn apply(&mut self, update: AppSettings) -> Result<Vec<SettingsWarning>, AppError> {
        let (valid, warnings) = update.validate_against(&self.current);
        log_warnings(&warnings);
        self.current = valid;
        self.save()?;
        Ok(warnings)
    }

    /// 以 JSON 片段更新部分字段（嵌套的 `hotkeys` 按键合并）
    pub fn apply_json(&mut self, patch: Value) -> Result<Vec<SettingsWarning>, AppError> {
        let mut merged = serde_json::to_value(&self.current)?;
        merge_json(&mut merged, patch);
        let update: AppSettings = serde_json::from_value(merged)
            .map_err(|e| AppError::Config(format!("设置字段类型错误: {}", e)))?;
        self.apply(update)
    }

    pub fn current(&self) -> &AppSettings {
        &self.current
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
