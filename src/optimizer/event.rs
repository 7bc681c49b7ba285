//! # 事件出口
//!
//! 核心层只把类型化事件投递到 tokio 通道，由界面层订阅后转发为前端事件，
//! 核心不依赖任何具体 UI 框架。

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub const OPTIMIZATION_START_EVENT: &str = "optimization-start";
pub const OPTIMIZATION_COMPLETE_EVENT: &str = "optimization-complete";

/// `optimization-complete` 的负载。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CompletionPayload {
    pub original_size: u64,
    pub new_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerEvent {
    /// 检测到符合条件的图片，开始编码。
    Started,
    /// 优化结果已写回剪贴板。
    Completed(CompletionPayload),
}

impl OptimizerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started => OPTIMIZATION_START_EVENT,
            Self::Completed(_) => OPTIMIZATION_COMPLETE_EVENT,
        }
    }
}

/// 事件发送端。接收端已关闭时静默丢弃。
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<UnboundedSender<OptimizerEvent>>,
}

impl EventSink {
    /// 创建一对发送端/接收端。
    pub fn channel() -> (Self, UnboundedReceiver<OptimizerEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender: Some(sender) }, receiver)
    }

    /// 不投递任何事件（无界面运行）。
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: OptimizerEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        if sender.send(event).is_err() {
            log::debug!("事件接收端已关闭，丢弃事件：{}", event.name());
        }
    }
}
