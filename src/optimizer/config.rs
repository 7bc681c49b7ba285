//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `OptimizerConfig`：编码质量、资格阈值、解码资源上限、
//! 撤销有效期。`Default` 即生产配置，测试可按需覆盖单个字段。

use std::time::Duration;

use super::OptimizeError;

/// 固定的 JPEG 编码质量。
pub const DEFAULT_JPEG_QUALITY: u8 = 60;

/// 流水线配置。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizerConfig {
    /// JPEG 编码质量（1~100）。
    pub jpeg_quality: u8,
    /// 源数据低于该字节数时直接跳过（缩略图、图标不值得重编码）。
    pub min_source_bytes: u64,
    /// 源本身已是 JPEG 且低于该字节数时跳过，不做重编码尝试。
    pub jpeg_min_source_bytes: u64,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 撤销有效期；`None` 表示核心层不做过期判断（由界面控制）。
    pub revert_window: Option<Duration>,
    /// 总开关，关闭后所有变化都被忽略。
    pub enabled: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            min_source_bytes: 4 * 1024,
            jpeg_min_source_bytes: 1024 * 1024,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
            revert_window: None,
            enabled: true,
        }
    }
}

impl OptimizerConfig {
    /// 校验参数范围。
    pub fn validate(&self) -> Result<(), OptimizeError> {
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(OptimizeError::InvalidFormat(format!(
                "jpeg_quality 必须在 1~100 之间（当前：{}）",
                self.jpeg_quality
            )));
        }
        if self.max_decoded_bytes < 8 * 1024 * 1024 {
            return Err(OptimizeError::InvalidFormat("max_decoded_bytes 不能小于 8MB".to_string()));
        }
        if self.max_decoded_pixels == 0 {
            return Err(OptimizeError::InvalidFormat("max_decoded_pixels 不能为 0".to_string()));
        }
        if matches!(self.revert_window, Some(window) if window.is_zero()) {
            return Err(OptimizeError::InvalidFormat("revert_window 不能为 0".to_string()));
        }
        Ok(())
    }
}
