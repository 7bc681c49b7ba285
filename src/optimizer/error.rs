//! # 错误模型模块
//!
//! 单一错误枚举承载流水线的全部失败来源，调用侧可按分支匹配。
//! 这些错误都不会展示给终端用户，只写入日志。

use crate::clipboard::ClipboardError;

/// 优化流水线统一错误类型。
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum OptimizeError {
    /// 剪贴板被占用或无权限。瞬时错误，只在下一次独立变化时重试。
    #[error("剪贴板不可用：{0}")]
    ClipboardUnavailable(String),

    #[error("解码错误：{0}")]
    Decode(String),

    #[error("编码错误：{0}")]
    Encode(String),

    /// 编码成功后写回剪贴板被拒绝。
    #[error("写入错误：{0}")]
    Write(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),
}

impl OptimizeError {
    /// 稳定错误码，便于日志检索。
    pub fn code(&self) -> &'static str {
        match self {
            Self::ClipboardUnavailable(_) => "E_CLIPBOARD_UNAVAILABLE",
            Self::Decode(_) => "E_DECODE",
            Self::Encode(_) => "E_ENCODE",
            Self::Write(_) => "E_WRITE",
            Self::FileSystem(_) => "E_FILE",
            Self::ResourceLimit(_) => "E_RESOURCE_LIMIT",
            Self::InvalidFormat(_) => "E_INVALID_FORMAT",
        }
    }

    /// 出错阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::ClipboardUnavailable(_) | Self::FileSystem(_) => "read",
            Self::Decode(_) | Self::ResourceLimit(_) | Self::InvalidFormat(_) => "decode",
            Self::Encode(_) => "encode",
            Self::Write(_) => "write",
        }
    }
}

impl From<ClipboardError> for OptimizeError {
    fn from(error: ClipboardError) -> Self {
        match error {
            ClipboardError::Unavailable(message) => Self::ClipboardUnavailable(message),
            ClipboardError::Unsupported(message) => Self::InvalidFormat(message),
        }
    }
}
