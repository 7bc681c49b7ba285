//! # 变化信箱（单槽合并队列）
//!
//! ## 设计思路
//!
//! 流水线忙时到达的变化不并发处理，也不丢弃：只保留最新一个待处理序号，
//! 中间的旧快照直接作废（只有剪贴板最终内容有意义）。
//!
//! ## 实现思路
//!
//! `Mutex<Slot>` + `Condvar`：
//! - 监听线程 `push`，永不阻塞
//! - 唯一工作线程 `pop_blocking` 取出并标记 in-flight，处理完调用 `complete`
//! - `wait_idle` 供测试与关闭流程等待队列排空

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct Slot {
    pending: Option<u64>,
    in_flight: bool,
    closed: bool,
    coalesced: u64,
}

#[derive(Debug, Default)]
pub struct ChangeQueue {
    slot: Mutex<Slot>,
    changed: Condvar,
}

impl ChangeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("变化队列锁中毒，继续使用恢复数据");
                poisoned.into_inner()
            }
        }
    }

    /// 投递一个变化序号；返回是否覆盖了尚未处理的旧序号。
    pub fn push(&self, sequence_id: u64) -> bool {
        let mut slot = self.lock_slot();
        if slot.closed {
            log::debug!("变化队列已关闭，丢弃 seq={}", sequence_id);
            return false;
        }

        let replaced = slot.pending.replace(sequence_id);
        if let Some(stale) = replaced {
            slot.coalesced += 1;
            log::debug!("合并剪贴板变化：seq={} 覆盖 seq={}", sequence_id, stale);
        }
        drop(slot);

        self.changed.notify_all();
        replaced.is_some()
    }

    /// 阻塞取出待处理序号；队列关闭后返回 `None`。
    pub fn pop_blocking(&self) -> Option<u64> {
        let mut slot = self.lock_slot();
        loop {
            if slot.closed {
                return None;
            }
            if let Some(sequence_id) = slot.pending.take() {
                slot.in_flight = true;
                return Some(sequence_id);
            }
            slot = self
                .changed
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// 非阻塞取出。
    pub fn try_pop(&self) -> Option<u64> {
        let mut slot = self.lock_slot();
        if slot.closed {
            return None;
        }
        let sequence_id = slot.pending.take()?;
        slot.in_flight = true;
        Some(sequence_id)
    }

    /// 当前序号处理完毕。
    pub fn complete(&self) {
        self.lock_slot().in_flight = false;
        self.changed.notify_all();
    }

    /// 等待队列空闲（无待处理且无处理中）；超时返回 `false`。
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let slot = self.lock_slot();
        let (slot, _) = self
            .changed
            .wait_timeout_while(slot, timeout, |slot| {
                !slot.closed && (slot.pending.is_some() || slot.in_flight)
            })
            .unwrap_or_else(PoisonError::into_inner);
        slot.closed || (slot.pending.is_none() && !slot.in_flight)
    }

    /// 关闭队列：丢弃待处理序号并唤醒所有等待者。
    pub fn close(&self) {
        let mut slot = self.lock_slot();
        slot.closed = true;
        slot.pending = None;
        drop(slot);
        self.changed.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock_slot().closed
    }

    /// 被合并掉的变化数量。
    pub fn coalesced_count(&self) -> u64 {
        self.lock_slot().coalesced
    }
}
