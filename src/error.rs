//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义全局统一的 `AppError` 枚举，替代各模块中分散的
//! `.map_err(|e| e.to_string())`、`format!(...)`、`expect()` 等不一致模式。
//!
//! 错误按照处理方式分为四类：
//! - **瞬时 I/O**（剪贴板读取超时、磁盘写入失败）：记录日志后跳过
//! - **数据完整性**（损坏记录）：跳过该条，其余照常加载
//! - **配置错误**（非法快捷键、越界数值）：回退到上一个有效值
//! - **致命错误**（存储后端无法初始化）：向上传播并终止启动
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `std::io::Error` / `serde_json::Error` 提供 `From` 转换，无需手动 map。
//! - 实现 `Serialize` 将错误序列化为字符串，展示层可直接透传。

use serde::Serialize;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 剪贴板读写操作失败
    #[error("剪贴板操作失败: {0}")]
    Clipboard(String),

    /// 图片解码 / 缩放 / 编码失败
    #[error("图片处理失败: {0}")]
    Image(String),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 存储文件或后台存储任务失败
    #[error("存储操作失败: {0}")]
    Storage(String),

    /// 数据库操作失败
    #[error("数据库错误: {0}")]
    Database(String),

    /// 记录序列化 / 反序列化失败
    #[error("数据格式错误: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 配置值非法
    #[error("配置无效: {0}")]
    Config(String),

    /// 全局快捷键注册失败
    #[error("快捷键操作失败: {0}")]
    Hotkey(String),

    /// 开机自启设置失败
    #[error("开机自启设置失败: {0}")]
    Autostart(String),

    /// 操作在限定时间内未完成
    #[error("操作超时: {0}")]
    Timeout(String),
}

/// 展示层需要结构化错误时，序列化为人类可读的字符串。
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
