//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 所有 `#[tauri::command]` 函数统一返回 `Result<T, AppError>`，
//! 前端通过 `Serialize` 拿到可读的错误字符串。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `OptimizeError` / `io::Error` 提供 `From` 转换，命令层直接 `?`。
//! - 实现 `Serialize` 将错误序列化为字符串，满足 Tauri IPC 要求。

use serde::Serialize;

use crate::optimizer::OptimizeError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 优化流水线错误（读取 / 解码 / 编码 / 写回）
    #[error("{0}")]
    Optimize(#[from] OptimizeError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 配置目录或配置文件不可用
    #[error("存储目录不可用: {0}")]
    Storage(String),

    /// 窗口操作失败
    #[error("窗口操作失败: {0}")]
    Window(String),

    /// 开机自启注册失败
    #[error("开机自启设置失败: {0}")]
    Autostart(String),

    /// 后台阻塞任务未能完成（panic 或被取消）
    #[error("后台任务执行失败: {0}")]
    Task(String),
}

/// Tauri IPC 要求返回值实现 `Serialize`。
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
