//! 进程内剪贴板
//!
//! 行为与系统剪贴板保持一致：每次写入清空全部格式并递增序号。
//! 额外提供故障注入（下一次读/写失败），用于覆盖 `ClipboardUnavailable`
//! 与写入失败分支。写入失败分两种：未动剪贴板就被拒绝，以及清空之后才失败。

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{ClipboardError, ClipboardFormat, ClipboardPort, ClipboardSnapshot};

#[derive(Debug, Default)]
struct MemoryState {
    sequence_id: u64,
    payloads: BTreeMap<ClipboardFormat, Vec<u8>>,
}

/// 内存剪贴板。
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    state: Mutex<MemoryState>,
    failing_reads: AtomicU32,
    failing_writes: AtomicU32,
    clearing_writes: AtomicU32,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_state(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("内存剪贴板状态锁中毒，继续使用恢复数据");
                poisoned.into_inner()
            }
        }
    }

    /// 模拟外部应用复制：替换全部内容并返回新序号。
    pub fn set(&self, entries: Vec<(ClipboardFormat, Vec<u8>)>) -> u64 {
        let mut state = self.lock_state();
        state.payloads = entries.into_iter().collect();
        state.sequence_id += 1;
        state.sequence_id
    }

    /// 当前完整内容。
    pub fn contents(&self) -> ClipboardSnapshot {
        let state = self.lock_state();
        let mut snapshot = ClipboardSnapshot::empty(state.sequence_id);
        for (format, bytes) in &state.payloads {
            snapshot.insert(*format, bytes.clone());
        }
        snapshot
    }

    /// 接下来 `count` 次读取返回 `Unavailable`。
    pub fn fail_next_reads(&self, count: u32) {
        self.failing_reads.store(count, Ordering::SeqCst);
    }

    /// 接下来 `count` 次写入返回 `Unavailable`（不修改内容）。
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// 接下来 `count` 次写入先清空剪贴板（序号递增）再返回 `Unavailable`。
    pub fn fail_next_writes_after_clearing(&self, count: u32) {
        self.clearing_writes.store(count, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

impl ClipboardPort for MemoryClipboard {
    fn read(&self, formats: &[ClipboardFormat]) -> Result<ClipboardSnapshot, ClipboardError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_reads) {
            return Err(ClipboardError::Unavailable("剪贴板被其他进程占用".to_string()));
        }
        Ok(self.contents().filtered(formats))
    }

    fn write(&self, format: ClipboardFormat, payload: &[u8]) -> Result<u64, ClipboardError> {
        if Self::take_failure(&self.failing_writes) {
            return Err(ClipboardError::Unavailable("剪贴板被其他进程占用".to_string()));
        }
        if Self::take_failure(&self.clearing_writes) {
            self.set(Vec::new());
            return Err(ClipboardError::Unavailable("写入数据时剪贴板句柄失效".to_string()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(self.set(vec![(format, payload.to_vec())]))
    }

    fn sequence_id(&self) -> u64 {
        self.lock_state().sequence_id
    }

    /// 完整写回快照中的全部格式。
    fn restore(&self, snapshot: &ClipboardSnapshot) -> Result<u64, ClipboardError> {
        if Self::take_failure(&self.failing_writes) {
            return Err(ClipboardError::Unavailable("剪贴板被其他进程占用".to_string()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(self.set(
            snapshot
                .entries()
                .map(|(format, bytes)| (format, bytes.to_vec()))
                .collect(),
        ))
    }
}
