//! # 剪贴板图片优化模块
//!
//! ## 模块结构
//!
//! ```text
//! optimizer/
//! ├── mod.rs        模块入口，统一导出
//! ├── config.rs     OptimizerConfig
//! ├── error.rs      OptimizeError
//! ├── source.rs     SourceFormat / OptimizationCandidate / OptimizedResult
//! ├── codec.rs      格式识别、解码、JPEG 编码
//! ├── session.rs    单槽撤销会话
//! ├── event.rs      optimization-start / optimization-complete
//! ├── pipeline.rs   状态机、资格判断、提交、撤销
//! ├── queue.rs      单槽合并队列
//! └── service.rs    工作线程与注入状态
//! ```
//!
//! ## 数据流
//!
//! ```text
//! 变化通知 → ChangeQueue → Pipeline::handle_change
//!   → 读取快照 → 资格判断 → decode → encode(q=60)
//!   → 变小才写回 → SessionState → optimization-complete
//! ```

pub mod codec;
mod config;
mod error;
pub mod event;
pub mod pipeline;
pub mod queue;
pub mod service;
pub mod session;
pub mod source;

pub use config::{DEFAULT_JPEG_QUALITY, OptimizerConfig};
pub use error::OptimizeError;
pub use event::{CompletionPayload, EventSink, OptimizerEvent};
pub use pipeline::{IgnoreReason, Outcome, Pipeline, PipelineState, RevertOutcome, SkipReason};
pub use service::OptimizerService;
