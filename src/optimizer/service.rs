//! # 服务层（可注入状态）
//!
//! ## 设计思路
//!
//! `OptimizerService` 作为 Tauri 注入状态，独占流水线、变化队列与工作线程，
//! 命令层和监听回调只持有它的句柄，不存在全局可变状态。
//!
//! ## 实现思路
//!
//! - 监听线程只做 `notify_change`（入队即返回，不阻塞系统通知）；
//! - 唯一工作线程取出最新序号并在流水线锁内处理，解码/编码不占用监听线程；
//! - `revert` 也在同一把锁内执行，与正在进行的优化互斥。

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::clipboard::ClipboardPort;

use super::event::EventSink;
use super::pipeline::{Pipeline, RevertOutcome};
use super::queue::ChangeQueue;
use super::{OptimizeError, OptimizerConfig};

fn lock_pipeline(pipeline: &Mutex<Pipeline>) -> MutexGuard<'_, Pipeline> {
    match pipeline.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("流水线锁中毒，继续使用恢复数据");
            poisoned.into_inner()
        }
    }
}

fn run_worker(pipeline: Arc<Mutex<Pipeline>>, queue: Arc<ChangeQueue>) {
    log::info!("🧵 优化线程已启动");
    while let Some(sequence_id) = queue.pop_blocking() {
        let outcome = lock_pipeline(&pipeline).handle_change(sequence_id);
        log::trace!("seq={} 处理结果：{:?}", sequence_id, outcome);
        queue.complete();
    }
    log::info!("🧵 优化线程已退出");
}

pub struct OptimizerService {
    pipeline: Arc<Mutex<Pipeline>>,
    queue: Arc<ChangeQueue>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl OptimizerService {
    /// 校验配置并启动工作线程。
    pub fn start(
        clipboard: Arc<dyn ClipboardPort>,
        config: OptimizerConfig,
        events: EventSink,
    ) -> Result<Self, OptimizeError> {
        config.validate()?;
        log::info!(
            "优化服务启动 - quality={} floor={}B enabled={}",
            config.jpeg_quality,
            config.min_source_bytes,
            config.enabled
        );

        let pipeline = Arc::new(Mutex::new(Pipeline::new(clipboard, config, events)));
        let queue = Arc::new(ChangeQueue::new());

        let worker = thread::Builder::new()
            .name("clipboard-optimizer".to_string())
            .spawn({
                let pipeline = Arc::clone(&pipeline);
                let queue = Arc::clone(&queue);
                move || run_worker(pipeline, queue)
            })
            .map_err(|e| OptimizeError::ResourceLimit(format!("启动优化线程失败：{}", e)))?;

        Ok(Self {
            pipeline,
            queue,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// 投递剪贴板变化序号；忙时只保留最新一个。
    pub fn notify_change(&self, sequence_id: u64) {
        self.queue.push(sequence_id);
    }

    pub fn revert(&self) -> Result<RevertOutcome, OptimizeError> {
        lock_pipeline(&self.pipeline).revert()
    }

    /// 等待已投递的变化全部处理完毕；超时返回 `false`。
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.queue.wait_idle(timeout)
    }

    pub fn config(&self) -> OptimizerConfig {
        lock_pipeline(&self.pipeline).config().clone()
    }

    pub fn set_config(&self, config: OptimizerConfig) -> Result<(), OptimizeError> {
        lock_pipeline(&self.pipeline).set_config(config)
    }

    /// 当前是否存在可撤销的会话。
    pub fn has_session(&self) -> bool {
        lock_pipeline(&self.pipeline).session().is_some()
    }

    pub fn last_written_sequence(&self) -> Option<u64> {
        lock_pipeline(&self.pipeline).last_written_sequence()
    }

    /// 关闭队列并等待工作线程退出。可重复调用。
    pub fn shutdown(&self) {
        self.queue.close();

        let handle = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("优化线程异常退出");
            }
        }
    }
}

impl Drop for OptimizerService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
