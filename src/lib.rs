//! # 剪贴板图片优化工具 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │        前端 (ui/index.html · ui/progress.html)           │
//! │   设置面板 (开机自启)      进度浮层 (大小对比 · 撤销)      │
//! └───────┬───────────────────────────────▲──────────────────┘
//!         │ invoke (Result<T, AppError>)  │ optimization-start / -complete
//! ┌───────▼───────────────────────────────┴──────────────────┐
//! │                     后端 (Rust)                           │
//! │                                                          │
//! │  commands ─── hide_progress · revert_clipboard · autostart│
//! │      │                                                    │
//! │  optimizer::OptimizerService (注入状态)                   │
//! │      ├─ queue      单槽合并队列                           │
//! │      ├─ pipeline   状态机 · 资格判断 · 提交 · 撤销        │
//! │      ├─ codec      识别 · 解码 · JPEG(q=60)               │
//! │      └─ event      tokio 通道 → 前端事件                  │
//! │                                                          │
//! │  clipboard ─── ClipboardPort · listener · system · memory │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError`，所有 Tauri command 的返回类型 |
//! | [`clipboard`] | 剪贴板快照、读写端口、变化监听 |
//! | [`optimizer`] | 优化流水线、撤销会话、工作线程 |
//! | [`settings`] | `optimizer.json` 配置覆盖 |
//! | [`overlay`] | 进度浮层定位与显示 |
//! | `commands` | 前端命令与事件转发（`desktop` 特性） |

pub mod clipboard;
pub mod error;
pub mod optimizer;
pub mod overlay;
pub mod settings;

#[cfg(feature = "desktop")]
pub mod commands;
