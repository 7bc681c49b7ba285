//! # 优化流水线（状态机）
//!
//! ## 设计思路
//!
//! ```text
//! Idle → Evaluating → Encoding → Committing → Idle
//!            │            │           │
//!            ├→ Skipped ──┤           └→ Failed → Idle
//!            └→ Failed    └→ Failed
//! ```
//!
//! - 同一时刻只有一个流水线在运行，由 `OptimizerService` 的互斥锁串行化；
//! - 自身写入产生的序号记录在 `last_written_sequence`，对应的变化通知直接忽略，
//!   避免对自己的输出反复优化；
//! - 只有 `new_size < original_size` 才写回；编码期间剪贴板又变化时放弃写回；
//! - 写回前保留完整快照，供撤销与写入失败回滚使用；写入失败但剪贴板未被改动时不回滚；
//! - 平台无法原样写入 JPEG 时不编码，剪贴板保持原样。
//!
//! ## 来源选择
//!
//! 按 `IMAGE_FORMATS` 优先级：JPEG → PNG → 单个图片文件引用 → 位图。
//! 真实格式由字节识别，不信任剪贴板格式标签。

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::clipboard::{self, ClipboardFormat, ClipboardPort, ClipboardSnapshot, IMAGE_FORMATS};

use super::codec;
use super::event::{CompletionPayload, EventSink, OptimizerEvent};
use super::session::SessionState;
use super::source::{OptimizationCandidate, OptimizedResult};
use super::{OptimizeError, OptimizerConfig};

/// 可作为文件引用来源的扩展名。
const IMAGE_FILE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tiff", "tif", "webp", "gif"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Evaluating,
    Encoding,
    Committing,
    Skipped,
    Failed,
}

impl PipelineState {
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Evaluating)
                | (Evaluating, Encoding | Skipped | Failed | Idle)
                | (Encoding, Committing | Skipped | Failed)
                | (Committing, Idle | Failed)
                | (Skipped | Failed, Idle)
        )
    }
}

/// 变化被忽略的原因（不进入评估）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Disabled,
    SelfWrite,
    NoImage,
}

/// 评估后放弃优化的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// 低于字节下限。
    BelowFloor,
    /// 已是 JPEG 且体积不大，重编码无收益。
    AlreadyTarget,
    /// 内容就是上一次优化写入的结果。
    AlreadyOptimized,
    /// 重编码后没有变小。
    NoGain,
    /// 编码期间剪贴板已被再次修改，结果作废。
    Superseded,
    /// 当前平台无法把 JPEG 字节原样放回剪贴板。
    Unwritable,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BelowFloor => "below-floor",
            Self::AlreadyTarget => "already-target",
            Self::AlreadyOptimized => "already-optimized",
            Self::NoGain => "no-gain",
            Self::Superseded => "superseded",
            Self::Unwritable => "unwritable",
        }
    }
}

/// 单次变化的处理结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Ignored(IgnoreReason),
    Skipped(SkipReason),
    Committed { original_size: u64, new_size: u64 },
    Failed(OptimizeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevertOutcome {
    Reverted,
    NothingToRevert,
    Expired,
}

/// 选中的源负载。
struct SourcePayload<'a> {
    format: ClipboardFormat,
    bytes: Cow<'a, [u8]>,
}

/// 只有变小才写回。
pub fn should_commit(original_size: u64, new_size: u64) -> bool {
    new_size < original_size
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_FILE_EXTENSIONS
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// 文件列表恰好是一个图片文件时返回其路径。
fn single_image_path(payload: &[u8]) -> Option<PathBuf> {
    let mut paths = clipboard::decode_file_list(payload);
    if paths.len() != 1 || !is_image_path(&paths[0]) {
        return None;
    }
    paths.pop()
}

fn select_source(snapshot: &ClipboardSnapshot) -> Result<Option<SourcePayload<'_>>, OptimizeError> {
    for &format in IMAGE_FORMATS {
        let Some(payload) = snapshot.payload(format) else {
            continue;
        };

        if format == ClipboardFormat::FileList {
            let Some(path) = single_image_path(payload) else {
                continue;
            };
            let bytes = fs::read(&path).map_err(|e| {
                OptimizeError::FileSystem(format!("读取图片文件失败 {}: {}", path.display(), e))
            })?;
            return Ok(Some(SourcePayload {
                format,
                bytes: Cow::Owned(bytes),
            }));
        }

        if !payload.is_empty() {
            return Ok(Some(SourcePayload {
                format,
                bytes: Cow::Borrowed(payload),
            }));
        }
    }
    Ok(None)
}

pub struct Pipeline {
    clipboard: Arc<dyn ClipboardPort>,
    config: OptimizerConfig,
    events: EventSink,
    state: PipelineState,
    last_written_sequence: Option<u64>,
    session: Option<SessionState>,
}

impl Pipeline {
    pub fn new(clipboard: Arc<dyn ClipboardPort>, config: OptimizerConfig, events: EventSink) -> Self {
        Self {
            clipboard,
            config,
            events,
            state: PipelineState::Idle,
            last_written_sequence: None,
            session: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn session(&self) -> Option<&SessionState> {
        self.session.as_ref()
    }

    /// 本流水线最近一次写入剪贴板产生的序号。
    pub fn last_written_sequence(&self) -> Option<u64> {
        self.last_written_sequence
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: OptimizerConfig) -> Result<(), OptimizeError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    fn transition(&mut self, next: PipelineState) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(next) {
            log::warn!("非预期的流水线状态转换：{:?} → {:?}", self.state, next);
        }
        self.state = next;
    }

    fn is_self_write(&self, sequence_id: u64) -> bool {
        self.last_written_sequence == Some(sequence_id)
    }

    /// 处理一次剪贴板变化，返回时状态机已回到 `Idle`。
    pub fn handle_change(&mut self, sequence_id: u64) -> Outcome {
        let outcome = self.evaluate(sequence_id);

        match &outcome {
            Outcome::Ignored(IgnoreReason::SelfWrite) => {
                log::debug!("🔁 忽略自身写入 seq={}", sequence_id);
            }
            Outcome::Ignored(reason) => {
                log::trace!("忽略剪贴板变化 seq={} reason={:?}", sequence_id, reason);
            }
            Outcome::Skipped(reason) => {
                self.transition(PipelineState::Skipped);
                log::debug!("⏭️ 跳过优化 seq={} reason={}", sequence_id, reason.as_str());
            }
            Outcome::Failed(err @ OptimizeError::ClipboardUnavailable(_)) => {
                self.transition(PipelineState::Failed);
                log::warn!(
                    "⚠️ 优化中止 seq={} code={} stage={}: {}",
                    sequence_id,
                    err.code(),
                    err.stage(),
                    err
                );
            }
            Outcome::Failed(err) => {
                self.transition(PipelineState::Failed);
                log::error!(
                    "❌ 优化失败 seq={} code={} stage={}: {}",
                    sequence_id,
                    err.code(),
                    err.stage(),
                    err
                );
            }
            Outcome::Committed { .. } => {}
        }

        self.transition(PipelineState::Idle);
        outcome
    }

    fn evaluate(&mut self, sequence_id: u64) -> Outcome {
        if !self.config.enabled {
            return Outcome::Ignored(IgnoreReason::Disabled);
        }
        if self.is_self_write(sequence_id) {
            return Outcome::Ignored(IgnoreReason::SelfWrite);
        }

        self.transition(PipelineState::Evaluating);
        let total_start = Instant::now();

        let read_start = Instant::now();
        let snapshot = match self.clipboard.read(IMAGE_FORMATS) {
            Ok(snapshot) => snapshot,
            Err(err) => return Outcome::Failed(err.into()),
        };
        // 通知到达前内容已被本进程覆盖
        if self.is_self_write(snapshot.sequence_id) {
            return Outcome::Ignored(IgnoreReason::SelfWrite);
        }

        let source = match select_source(&snapshot) {
            Ok(Some(source)) => source,
            Ok(None) => return Outcome::Ignored(IgnoreReason::NoImage),
            Err(err) => return Outcome::Failed(err),
        };
        let read_elapsed = read_start.elapsed();

        if !self.clipboard.supports_write(ClipboardFormat::Jpeg) {
            return Outcome::Skipped(SkipReason::Unwritable);
        }

        let original_size = source.bytes.len() as u64;
        if original_size < self.config.min_source_bytes {
            return Outcome::Skipped(SkipReason::BelowFloor);
        }
        if self
            .session
            .as_ref()
            .is_some_and(|session| session.produced(&source.bytes))
        {
            return Outcome::Skipped(SkipReason::AlreadyOptimized);
        }

        let source_format = match codec::sniff_format(&source.bytes) {
            Ok(format) => format,
            Err(err) => return Outcome::Failed(err),
        };
        if source_format.is_target() && original_size < self.config.jpeg_min_source_bytes {
            return Outcome::Skipped(SkipReason::AlreadyTarget);
        }

        self.transition(PipelineState::Encoding);
        self.events.emit(OptimizerEvent::Started);
        log::info!(
            "🖼️ 开始优化 seq={} origin={} format={} size={}",
            sequence_id,
            source.format.as_str(),
            source_format.as_str(),
            original_size
        );

        let decode_start = Instant::now();
        let raw_pixels = match codec::decode(&source.bytes, &self.config) {
            Ok(pixels) => pixels,
            Err(err) => return Outcome::Failed(err),
        };
        let candidate = OptimizationCandidate {
            origin: source.format,
            source_format,
            raw_pixels,
            original_size,
        };
        drop(source);
        let decode_elapsed = decode_start.elapsed();

        let encode_start = Instant::now();
        let mut result = match codec::encode_jpeg(&candidate.raw_pixels, self.config.jpeg_quality) {
            Ok(bytes) => OptimizedResult::new(bytes),
            Err(err) => return Outcome::Failed(err),
        };
        let encode_elapsed = encode_start.elapsed();

        if !should_commit(candidate.original_size, result.new_size) {
            log::debug!(
                "重编码无收益 seq={} original={} encoded={}",
                sequence_id,
                candidate.original_size,
                result.new_size
            );
            return Outcome::Skipped(SkipReason::NoGain);
        }
        // 不覆盖编码期间用户新复制的内容
        if self.clipboard.sequence_id() != snapshot.sequence_id {
            return Outcome::Skipped(SkipReason::Superseded);
        }

        self.transition(PipelineState::Committing);
        let write_start = Instant::now();
        let written_sequence = match self.clipboard.write(ClipboardFormat::Jpeg, &result.encoded_bytes) {
            Ok(written_sequence) => written_sequence,
            Err(err) => {
                // 只有写入已经动过剪贴板时才需要回滚
                if self.clipboard.sequence_id() != snapshot.sequence_id {
                    self.restore_after_failed_write(&snapshot, sequence_id);
                }
                return Outcome::Failed(OptimizeError::Write(err.to_string()));
            }
        };
        let write_elapsed = write_start.elapsed();

        result.committed = true;
        let new_size = result.new_size;
        self.last_written_sequence = Some(written_sequence);
        self.session = Some(SessionState {
            original_snapshot: snapshot,
            result,
            original_size,
            committed_sequence: written_sequence,
            expires_at: self.config.revert_window.map(|window| Instant::now() + window),
        });
        self.events.emit(OptimizerEvent::Completed(CompletionPayload {
            original_size,
            new_size,
        }));

        log::info!(
            "✅ 优化完成 seq={} → {} {}x{} {} → {} bytes - read={}ms decode={}ms encode={}ms write={}ms total={}ms",
            sequence_id,
            written_sequence,
            candidate.raw_pixels.width,
            candidate.raw_pixels.height,
            original_size,
            new_size,
            read_elapsed.as_millis(),
            decode_elapsed.as_millis(),
            encode_elapsed.as_millis(),
            write_elapsed.as_millis(),
            total_start.elapsed().as_millis()
        );

        Outcome::Committed {
            original_size,
            new_size,
        }
    }

    /// 写回失败后尽力恢复原内容。
    fn restore_after_failed_write(&mut self, snapshot: &ClipboardSnapshot, sequence_id: u64) {
        match self.clipboard.restore(snapshot) {
            Ok(restored_sequence) => {
                self.last_written_sequence = Some(restored_sequence);
                log::warn!("↩️ 写入失败，已恢复原剪贴板内容 seq={}", sequence_id);
            }
            Err(err) => {
                log::error!("恢复原剪贴板内容失败 seq={}: {}", sequence_id, err);
            }
        }
    }

    /// 撤销最近一次优化，写回优化前的快照。
    ///
    /// 没有可撤销会话时是空操作；写回失败时保留会话以便重试。
    pub fn revert(&mut self) -> Result<RevertOutcome, OptimizeError> {
        let Some(session) = self.session.as_ref() else {
            log::debug!("没有可撤销的优化");
            return Ok(RevertOutcome::NothingToRevert);
        };

        let now = Instant::now();
        if session.is_expired(now) {
            log::debug!("撤销已过期 seq={}", session.committed_sequence);
            self.session = None;
            return Ok(RevertOutcome::Expired);
        }
        if !session.is_revertible(now) {
            return Ok(RevertOutcome::NothingToRevert);
        }

        match self.clipboard.restore(&session.original_snapshot) {
            Ok(restored_sequence) => {
                log::info!(
                    "↩️ 已撤销优化 seq={} → {} ({} bytes)",
                    session.committed_sequence,
                    restored_sequence,
                    session.original_size
                );
                self.last_written_sequence = Some(restored_sequence);
                self.session = None;
                Ok(RevertOutcome::Reverted)
            }
            Err(err) => {
                let err = OptimizeError::Write(err.to_string());
                log::error!("❌ 撤销失败 code={}: {}", err.code(), err);
                Err(err)
            }
        }
    }
}
