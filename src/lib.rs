//! # 剪贴板历史工具：库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │             展示层（窗口 / 托盘 / 命令行）                 │
//! │                                                          │
//! │   query · search · delete · toggle_favorite · clear      │
//! │   export · import · update_settings                      │
//! │        ↑ historyChanged / itemAdded 回调                 │
//! └────────┼─────────────────────────────────────────────────┘
//!          ↕
//! ┌────────┼─────────────────────────────────────────────────┐
//! │        ↕            核心 (Rust)                           │
//! │                                                          │
//! │  ┌─ service ──── HistoryService 门面 + 清理策略           │
//! │  │   └─ events      回调注册与同步分发                    │
//! │  │                                                       │
//! │  ├─ db ───────── SQLite (rusqlite) 去重·检索·淘汰·导入导出 │
//! │  ├─ model          ClipItem / ContentKind / 内容哈希      │
//! │  │                                                       │
//! │  ├─ clipboard ── 监听线程 → 防抖 → 分类 → 规范化 → 入库   │
//! │  │   ├─ image       缩放 + PNG data URL                   │
//! │  │   └─ writer      写回剪贴板 + IgnoreGuard (RAII)       │
//! │  │                                                       │
//! │  ├─ settings       配置记录、校验与回退                   │
//! │  ├─ paths          数据目录布局、原子写入                  │
//! │  ├─ hotkey         全局快捷键注册表                        │
//! │  └─ autostart      开机自启动启动项                        │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError` |
//! | [`model`] | 历史条目模型、内容哈希、预览文本、记录序列化 |
//! | [`db`] | SQLite 存储引擎：去重、检索、收藏、保留期、上限淘汰、导入导出 |
//! | [`clipboard`] | 剪贴板监听、防抖捕获流水线、内容分类、图片规范化、写回 |
//! | [`service`] | 门面：错误恢复、变更通知、策略更新 |
//! | [`events`] | `historyChanged` / `itemAdded` 回调 |
//! | [`settings`] | 设置文件加载 / 校验 / 保存 |
//! | [`paths`] | 应用目录与原子写入 |
//! | [`hotkey`] | 全局快捷键 |
//! | [`autostart`] | 开机自启动 |

pub mod autostart;
pub mod clipboard;
pub mod db;
pub mod error;
pub mod events;
pub mod hotkey;
pub mod model;
pub mod paths;
pub mod service;
pub mod settings;
