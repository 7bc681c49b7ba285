//! 剪贴板适配层
//!
//! # 设计思路
//!
//! 只负责“按格式读写系统剪贴板 + 变化通知”，不承载任何优化策略：
//! - **快照**：`ClipboardSnapshot` 记录某一时刻的格式→字节映射与变化序号
//! - **端口**：`ClipboardPort` trait 抽象读写，流水线只依赖该 trait
//! - **监听**：`listener` 通过 `clipboard-master` 接收系统通知并投递序号
//!
//! # 实现思路
//!
//! - `system`：真实系统剪贴板（`arboard` + Windows 原生注册格式）。
//! - `memory`：进程内剪贴板，序号语义与系统一致，用于无头运行与测试。
//! - 序号（`sequence_id`）单调递增，流水线据此识别自身写入。
//!
//! # 平台约束
//!
//! 各平台剪贴板在任意写入时都会清空全部已有格式。`write` 只写目标格式；
//! `restore` 在同一次打开中写回快照里的全部格式。

pub mod listener;
pub mod memory;
pub mod system;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

pub use memory::MemoryClipboard;
pub use system::SystemClipboard;

/// 剪贴板格式标识。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClipboardFormat {
    /// 原始位图（以 BMP 编码保存，保证快照内统一为“编码后字节”）。
    Bitmap,
    /// PNG 编码图片。
    Png,
    /// JPEG 编码图片。
    Jpeg,
    /// 文件引用列表（UTF-8，每行一个路径）。
    FileList,
}

/// 与图片相关的格式，按来源优先级排列。
pub const IMAGE_FORMATS: &[ClipboardFormat] = &[
    ClipboardFormat::Jpeg,
    ClipboardFormat::Png,
    ClipboardFormat::FileList,
    ClipboardFormat::Bitmap,
];

impl ClipboardFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bitmap => "bitmap",
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::FileList => "file-list",
        }
    }
}

/// 某一时刻的剪贴板内容。
///
/// 快照创建后不再修改；每次变化都会产生新的快照。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClipboardSnapshot {
    /// 剪贴板变化序号。
    pub sequence_id: u64,
    payloads: BTreeMap<ClipboardFormat, Vec<u8>>,
}

impl ClipboardSnapshot {
    pub fn empty(sequence_id: u64) -> Self {
        Self {
            sequence_id,
            payloads: BTreeMap::new(),
        }
    }

    /// 追加一个格式的负载（构建阶段使用）。
    pub fn with(mut self, format: ClipboardFormat, bytes: Vec<u8>) -> Self {
        self.payloads.insert(format, bytes);
        self
    }

    pub fn insert(&mut self, format: ClipboardFormat, bytes: Vec<u8>) {
        self.payloads.insert(format, bytes);
    }

    pub fn formats(&self) -> impl Iterator<Item = ClipboardFormat> + '_ {
        self.payloads.keys().copied()
    }

    pub fn payload(&self, format: ClipboardFormat) -> Option<&[u8]> {
        self.payloads.get(&format).map(Vec::as_slice)
    }

    pub fn contains(&self, format: ClipboardFormat) -> bool {
        self.payloads.contains_key(&format)
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// 仅保留请求的格式。
    pub fn filtered(&self, formats: &[ClipboardFormat]) -> Self {
        Self {
            sequence_id: self.sequence_id,
            payloads: self
                .payloads
                .iter()
                .filter(|(format, _)| formats.contains(format))
                .map(|(format, bytes)| (*format, bytes.clone()))
                .collect(),
        }
    }

    /// 恢复时优先写回的格式：按 `IMAGE_FORMATS` 优先级选取。
    pub fn primary_format(&self) -> Option<ClipboardFormat> {
        IMAGE_FORMATS
            .iter()
            .copied()
            .find(|format| self.contains(*format))
            .or_else(|| self.payloads.keys().next().copied())
    }

    pub fn entries(&self) -> impl Iterator<Item = (ClipboardFormat, &[u8])> + '_ {
        self.payloads
            .iter()
            .map(|(format, bytes)| (*format, bytes.as_slice()))
    }
}

/// 将文件列表编码为剪贴板负载。
pub fn encode_file_list(paths: &[PathBuf]) -> Vec<u8> {
    paths
        .iter()
        .map(|path| path.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("\n")
        .into_bytes()
}

/// 解析文件列表负载，忽略空行。
pub fn decode_file_list(bytes: &[u8]) -> Vec<PathBuf> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect()
}

/// 剪贴板适配层错误。
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ClipboardError {
    /// 系统拒绝访问（例如其他进程独占剪贴板）。属于瞬时错误。
    #[error("剪贴板不可用：{0}")]
    Unavailable(String),

    /// 当前平台无法以该格式写入。
    #[error("不支持的剪贴板格式：{0}")]
    Unsupported(String),
}

/// 剪贴板读写端口。
///
/// 流水线只通过此 trait 访问剪贴板，便于替换为内存实现做测试。
pub trait ClipboardPort: Send + Sync {
    /// 读取请求格式中当前存在的部分；都不存在时返回空快照。
    fn read(&self, formats: &[ClipboardFormat]) -> Result<ClipboardSnapshot, ClipboardError>;

    /// 以指定格式替换剪贴板内容，返回这次写入对应的变化序号。
    fn write(&self, format: ClipboardFormat, payload: &[u8]) -> Result<u64, ClipboardError>;

    /// 当前变化序号。
    fn sequence_id(&self) -> u64;

    /// 收到系统变化通知时调用，返回该次变化的序号。
    ///
    /// 系统没有原生序号的平台在这里自增计数。
    fn observe_change(&self) -> u64 {
        self.sequence_id()
    }

    /// 当前平台能否以该格式原样写入字节。
    ///
    /// 返回 `false` 时流水线不会进入编码阶段。
    fn supports_write(&self, _format: ClipboardFormat) -> bool {
        true
    }

    /// 在一次写入中把快照的全部格式写回剪贴板（撤销、写入失败回滚）。
    fn restore(&self, snapshot: &ClipboardSnapshot) -> Result<u64, ClipboardError>;
}
