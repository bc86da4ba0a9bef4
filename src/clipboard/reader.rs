//! 剪贴板读取
//!
//! `ClipboardReader` 是捕获流水线与系统剪贴板之间的接缝：流水线只依赖
//! `ClipboardSnapshot`，测试中用内存实现替换。

use arboard::Clipboard;

use crate::error::AppError;

use super::image::RawImage;

/// 某一时刻剪贴板上可用的全部表示形式
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClipboardSnapshot {
    pub image: Option<RawImage>,
    pub files: Vec<String>,
    pub html: Option<String>,
    pub text: Option<String>,
}

impl ClipboardSnapshot {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_none() && self.files.is_empty() && self.html.is_none() && self.text.is_none()
    }
}

/// 读取系统剪贴板
///
/// 返回 `Err` 表示剪贴板暂时不可访问（例如被其他进程占用），调用方可以重试；
/// 某种格式不存在不是错误，对应字段为空即可。
pub trait ClipboardReader: Send {
    fn read(&mut self) -> Result<ClipboardSnapshot, AppError>;
}

/// 基于 `arboard` 的系统剪贴板读取器
///
/// 每次读取新建 `Clipboard` 实例，不跨线程持有平台句柄。
#[derive(Debug, Default)]
pub struct ArboardReader;

/// 将 arboard 的"该格式不存在"映射为 `None`，占用类错误向上传递以便重试
fn optional<T>(result: Result<T, arboard::Error>, format: &str) -> Result<Option<T>, AppError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(arboard::Error::ContentNotAvailable) => Ok(None),
        Err(arboard::Error::ClipboardOccupied) => {
            Err(AppError::Clipboard(format!("读取{}时剪贴板被占用", format)))
        }
        Err(err) => {
            log::debug!("读取剪贴板{}失败，按不存在处理: {}", format, err);
            Ok(None)
        }
    }
}

impl ClipboardReader for ArboardReader {
    fn read(&mut self) -> Result<ClipboardSnapshot, AppError> {
        let mut clipboard = Clipboard::new()
            .map_err(|e| AppError::Clipboard(format!("打开剪贴板失败: {}", e)))?;

        let image = optional(clipboard.get_image(), "图片")?.map(|data| RawImage {
            width: data.width,
            height: data.height,
            rgba: data.bytes.into_owned(),
        });

        let files = optional(clipboard.get().file_list(), "文件列表")?
            .unwrap_or_default()
            .into_iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect();

        let html = optional(clipboard.get().html(), "HTML")?;
        let text = optional(clipboard.get_text(), "文本")?;

        Ok(ClipboardSnapshot { image, files, html, text })
    }
}
