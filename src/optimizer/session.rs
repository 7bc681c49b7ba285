//! 最近一次优化的会话记录（单槽）。
//!
//! 新的优化无条件覆盖旧会话，不保留撤销历史。

use std::time::Instant;

use crate::clipboard::ClipboardSnapshot;

use super::source::OptimizedResult;

#[derive(Debug, Clone)]
pub struct SessionState {
    /// 优化写入前的完整剪贴板快照，撤销时原样写回。
    pub original_snapshot: ClipboardSnapshot,
    pub result: OptimizedResult,
    /// 源负载字节数。
    pub original_size: u64,
    /// 优化写入对应的剪贴板序号。
    pub committed_sequence: u64,
    /// `None` 表示不过期。
    pub expires_at: Option<Instant>,
}

impl SessionState {
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }

    /// 是否可撤销：已提交且未过期。
    pub fn is_revertible(&self, now: Instant) -> bool {
        self.result.committed && !self.is_expired(now)
    }

    /// 负载是否就是本会话写入的优化结果。
    pub fn produced(&self, payload: &[u8]) -> bool {
        self.result.committed && self.result.encoded_bytes == payload
    }
}
