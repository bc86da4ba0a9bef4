//! 应用目录与文件路径
//!
//! 目录布局：
//!
//! ```text
//! <base>/                    默认 ~/.clipmaster_pro，可用 CLIPMASTER_HOME 覆盖
//! ├── data/
//! │   ├── clipboard.db       历史数据库（可被设置中的 dbDir 重定向）
//! │   └── config.json        设置文件
//! ├── logs/
//! └── cache/
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::AppError;

pub const HOME_ENV: &str = "CLIPMASTER_HOME";
const BASE_DIR_NAME: &str = ".clipmaster_pro";
const DB_FILE_NAME: &str = "clipboard.db";
const SETTINGS_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub base_dir: PathBuf,
    pub data_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl AppPaths {
    /// 以给定根目录构造，不触碰文件系统
    pub fn from_base(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            data_dir: base_dir.join("data"),
            logs_dir: base_dir.join("logs"),
            cache_dir: base_dir.join("cache"),
            base_dir,
        }
    }

    /// 解析默认根目录：环境变量优先，其次用户主目录
    pub fn resolve() -> Result<Self, AppError> {
        if let Some(custom) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Ok(Self::from_base(PathBuf::from(custom)));
        }
        let home = dirs::home_dir()
            .ok_or_else(|| AppError::Storage("无法获取用户主目录".to_string()))?;
        Ok(Self::from_base(home.join(BASE_DIR_NAME)))
    }

    /// 创建全部子目录
    pub fn ensure_dirs(&self) -> Result<(), AppError> {
        for dir in [&self.data_dir, &self.logs_dir, &self.cache_dir] {
            fs::create_dir_all(dir).map_err(|e| {
                AppError::Storage(format!("创建目录失败 {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    pub fn settings_file(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE_NAME)
    }

    /// 数据库文件路径；`db_dir` 非空时使用自定义目录
    pub fn db_path(&self, db_dir: Option<&str>) -> PathBuf {
        match db_dir.map(str::trim).filter(|dir| !dir.is_empty()) {
            Some(dir) => PathBuf::from(dir).join(DB_FILE_NAME),
            None => self.data_dir.join(DB_FILE_NAME),
        }
    }
}

/// 原子写入：先写同目录临时文件并落盘，再重命名覆盖目标
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), AppError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    let written = fs::File::create(&tmp_path).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(AppError::Storage(format!(
            "写入临时文件失败 {}: {}",
            tmp_path.display(),
            e
        )));
    }
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        AppError::Storage(format!("提交文件失败 {}: {}", path.display(), e))
    })
}
