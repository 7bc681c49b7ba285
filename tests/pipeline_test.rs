// Pipeline behaviour against the in-process clipboard.
mod common;

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use clipboard_optimizer::clipboard::{
    ClipboardError, ClipboardFormat, ClipboardPort, ClipboardSnapshot, MemoryClipboard,
};
use clipboard_optimizer::optimizer::codec;
use clipboard_optimizer::optimizer::source::SourceFormat;
use clipboard_optimizer::optimizer::{
    CompletionPayload, EventSink, IgnoreReason, OptimizeError, OptimizerConfig, OptimizerEvent,
    Outcome, Pipeline, PipelineState, RevertOutcome, SkipReason,
};
use proptest::prelude::*;
use tokio::sync::mpsc::UnboundedReceiver;

fn setup(config: OptimizerConfig) -> (Arc<MemoryClipboard>, Pipeline, UnboundedReceiver<OptimizerEvent>) {
    let clipboard = Arc::new(MemoryClipboard::new());
    let (events, receiver) = EventSink::channel();
    let pipeline = Pipeline::new(clipboard.clone(), config, events);
    (clipboard, pipeline, receiver)
}

/// Port with a platform-limited restore (primary format only) and a switch
/// for whether JPEG bytes can be written at all.
struct LimitedClipboard {
    inner: MemoryClipboard,
    jpeg_writable: bool,
    restores: AtomicUsize,
}

impl LimitedClipboard {
    fn new(jpeg_writable: bool) -> Self {
        Self {
            inner: MemoryClipboard::new(),
            jpeg_writable,
            restores: AtomicUsize::new(0),
        }
    }
}

impl ClipboardPort for LimitedClipboard {
    fn read(&self, formats: &[ClipboardFormat]) -> Result<ClipboardSnapshot, ClipboardError> {
        self.inner.read(formats)
    }

    fn write(&self, format: ClipboardFormat, payload: &[u8]) -> Result<u64, ClipboardError> {
        self.inner.write(format, payload)
    }

    fn sequence_id(&self) -> u64 {
        self.inner.sequence_id()
    }

    fn supports_write(&self, format: ClipboardFormat) -> bool {
        self.jpeg_writable || format != ClipboardFormat::Jpeg
    }

    fn restore(&self, snapshot: &ClipboardSnapshot) -> Result<u64, ClipboardError> {
        self.restores.fetch_add(1, Ordering::SeqCst);
        let format = snapshot
            .primary_format()
            .ok_or_else(|| ClipboardError::Unsupported("empty snapshot".to_string()))?;
        self.inner
            .write(format, snapshot.payload(format).unwrap_or_default())
    }
}

#[test]
fn test_non_image_change_emits_nothing() {
    let (clipboard, mut pipeline, mut events) = setup(OptimizerConfig::default());

    let seq = clipboard.set(vec![(ClipboardFormat::FileList, b"/home/me/report.docx".to_vec())]);
    assert_eq!(pipeline.handle_change(seq), Outcome::Ignored(IgnoreReason::NoImage));

    assert!(common::drain(&mut events).is_empty());
    assert_eq!(clipboard.write_count(), 0);
    assert_eq!(pipeline.state(), PipelineState::Idle);
}

#[test]
fn test_large_png_is_replaced_with_smaller_jpeg() {
    let (clipboard, mut pipeline, mut events) = setup(OptimizerConfig::default());
    let png = common::large_png(1);

    let seq = clipboard.set(vec![(ClipboardFormat::Png, png.clone())]);
    let outcome = pipeline.handle_change(seq);

    let Outcome::Committed { original_size, new_size } = outcome else {
        panic!("expected commit, got {:?}", outcome);
    };
    assert_eq!(original_size, png.len() as u64);
    assert!(new_size < original_size);

    let contents = clipboard.contents();
    assert_eq!(contents.formats().collect::<Vec<_>>(), vec![ClipboardFormat::Jpeg]);
    let written = contents.payload(ClipboardFormat::Jpeg).expect("jpeg payload");
    assert_eq!(written.len() as u64, new_size);
    assert_eq!(codec::sniff_format(written), Ok(SourceFormat::Jpeg));

    assert_eq!(
        common::drain(&mut events),
        vec![
            OptimizerEvent::Started,
            OptimizerEvent::Completed(CompletionPayload { original_size, new_size }),
        ]
    );
    assert_eq!(pipeline.last_written_sequence(), Some(contents.sequence_id));
    assert!(pipeline.session().is_some());
    assert_eq!(pipeline.state(), PipelineState::Idle);
}

#[test]
fn test_own_write_does_not_trigger_second_pass() {
    let (clipboard, mut pipeline, mut events) = setup(OptimizerConfig::default());

    let seq = clipboard.set(vec![(ClipboardFormat::Png, common::large_png(2))]);
    assert!(matches!(pipeline.handle_change(seq), Outcome::Committed { .. }));
    common::drain(&mut events);

    let own = clipboard.sequence_id();
    assert_eq!(pipeline.handle_change(own), Outcome::Ignored(IgnoreReason::SelfWrite));
    // a late notification for the original copy sees our output on the clipboard
    assert_eq!(pipeline.handle_change(seq), Outcome::Ignored(IgnoreReason::SelfWrite));

    assert!(common::drain(&mut events).is_empty());
    assert_eq!(clipboard.write_count(), 1);
}

#[test]
fn test_recopied_output_is_skipped_as_already_optimized() {
    let (clipboard, mut pipeline, mut events) = setup(OptimizerConfig::default());

    let seq = clipboard.set(vec![(ClipboardFormat::Png, common::large_png(3))]);
    assert!(matches!(pipeline.handle_change(seq), Outcome::Committed { .. }));
    let optimized = clipboard
        .contents()
        .payload(ClipboardFormat::Jpeg)
        .expect("jpeg payload")
        .to_vec();
    common::drain(&mut events);

    // another app copies the very same bytes again
    let seq = clipboard.set(vec![(ClipboardFormat::Jpeg, optimized)]);
    assert_eq!(
        pipeline.handle_change(seq),
        Outcome::Skipped(SkipReason::AlreadyOptimized)
    );
    assert!(common::drain(&mut events).is_empty());
}

#[test]
fn test_revert_restores_byte_identical_snapshot() {
    let (clipboard, mut pipeline, _events) = setup(OptimizerConfig::default());

    let seq = clipboard.set(vec![
        (ClipboardFormat::Png, common::large_png(4)),
        (ClipboardFormat::Bitmap, common::encode(&common::noisy_photo(32, 32, 4), image::ImageFormat::Bmp)),
    ]);
    let before = clipboard.contents();
    assert!(matches!(pipeline.handle_change(seq), Outcome::Committed { .. }));

    assert_eq!(pipeline.revert(), Ok(RevertOutcome::Reverted));

    let after = clipboard.contents();
    assert_eq!(
        after.entries().collect::<Vec<_>>(),
        before.entries().collect::<Vec<_>>()
    );
    assert!(pipeline.session().is_none());

    // restoring the original must not start another optimization
    assert_eq!(
        pipeline.handle_change(after.sequence_id),
        Outcome::Ignored(IgnoreReason::SelfWrite)
    );
    assert_eq!(pipeline.revert(), Ok(RevertOutcome::NothingToRevert));
}

#[test]
fn test_revert_without_session_is_noop() {
    let (clipboard, mut pipeline, _events) = setup(OptimizerConfig::default());
    clipboard.set(vec![(ClipboardFormat::Png, vec![1, 2, 3])]);
    let before = clipboard.contents();

    assert_eq!(pipeline.revert(), Ok(RevertOutcome::NothingToRevert));
    assert_eq!(clipboard.contents(), before);
    assert_eq!(clipboard.write_count(), 0);
}

#[test]
fn test_revert_after_window_expired_keeps_optimized_content() {
    let config = OptimizerConfig {
        revert_window: Some(Duration::from_millis(1)),
        ..OptimizerConfig::default()
    };
    let (clipboard, mut pipeline, _events) = setup(config);

    let seq = clipboard.set(vec![(ClipboardFormat::Png, common::large_png(5))]);
    assert!(matches!(pipeline.handle_change(seq), Outcome::Committed { .. }));
    std::thread::sleep(Duration::from_millis(20));

    assert_eq!(pipeline.revert(), Ok(RevertOutcome::Expired));
    assert!(clipboard.contents().contains(ClipboardFormat::Jpeg));
    assert!(pipeline.session().is_none());
}

#[test]
fn test_failed_revert_keeps_session_for_retry() {
    let (clipboard, mut pipeline, _events) = setup(OptimizerConfig::default());

    let seq = clipboard.set(vec![(ClipboardFormat::Png, common::large_png(6))]);
    assert!(matches!(pipeline.handle_change(seq), Outcome::Committed { .. }));

    clipboard.fail_next_writes(1);
    assert!(matches!(pipeline.revert(), Err(OptimizeError::Write(_))));
    assert!(pipeline.session().is_some());

    assert_eq!(pipeline.revert(), Ok(RevertOutcome::Reverted));
    assert!(clipboard.contents().contains(ClipboardFormat::Png));
}

#[test]
fn test_tiny_image_is_skipped_without_events() {
    let (clipboard, mut pipeline, mut events) = setup(OptimizerConfig::default());
    let icon = common::tiny_png();
    assert!((icon.len() as u64) < OptimizerConfig::default().min_source_bytes);

    let seq = clipboard.set(vec![(ClipboardFormat::Png, icon)]);
    assert_eq!(pipeline.handle_change(seq), Outcome::Skipped(SkipReason::BelowFloor));

    assert!(common::drain(&mut events).is_empty());
    assert_eq!(clipboard.write_count(), 0);
    assert_eq!(pipeline.state(), PipelineState::Idle);
}

#[test]
fn test_small_jpeg_is_not_reencoded() {
    let (clipboard, mut pipeline, mut events) = setup(OptimizerConfig::default());

    let seq = clipboard.set(vec![(ClipboardFormat::Jpeg, common::jpeg(90))]);
    assert_eq!(pipeline.handle_change(seq), Outcome::Skipped(SkipReason::AlreadyTarget));
    assert!(common::drain(&mut events).is_empty());
}

#[test]
fn test_larger_result_is_never_committed() {
    let config = OptimizerConfig {
        min_source_bytes: 0,
        jpeg_min_source_bytes: 0,
        ..OptimizerConfig::default()
    };
    let (clipboard, mut pipeline, mut events) = setup(config);
    // heavily quantized source grows when re-encoded at a finer quality
    let source = common::jpeg(5);

    let seq = clipboard.set(vec![(ClipboardFormat::Jpeg, source.clone())]);
    assert_eq!(pipeline.handle_change(seq), Outcome::Skipped(SkipReason::NoGain));

    assert_eq!(clipboard.contents().payload(ClipboardFormat::Jpeg), Some(source.as_slice()));
    assert_eq!(clipboard.write_count(), 0);
    assert_eq!(common::drain(&mut events), vec![OptimizerEvent::Started]);
    assert!(pipeline.session().is_none());
}

#[test]
fn test_busy_clipboard_fails_then_next_change_succeeds() {
    let (clipboard, mut pipeline, mut events) = setup(OptimizerConfig::default());

    clipboard.fail_next_reads(1);
    let seq = clipboard.set(vec![(ClipboardFormat::Png, common::large_png(7))]);
    assert!(matches!(
        pipeline.handle_change(seq),
        Outcome::Failed(OptimizeError::ClipboardUnavailable(_))
    ));
    assert_eq!(pipeline.state(), PipelineState::Idle);
    assert!(common::drain(&mut events).is_empty());

    let seq = clipboard.set(vec![(ClipboardFormat::Png, common::large_png(8))]);
    assert!(matches!(pipeline.handle_change(seq), Outcome::Committed { .. }));
}

#[test]
fn test_write_failure_restores_original_content() {
    let (clipboard, mut pipeline, mut events) = setup(OptimizerConfig::default());

    let seq = clipboard.set(vec![(ClipboardFormat::Png, common::large_png(9))]);
    let before = clipboard.contents();
    clipboard.fail_next_writes_after_clearing(1);

    assert!(matches!(
        pipeline.handle_change(seq),
        Outcome::Failed(OptimizeError::Write(_))
    ));

    let after = clipboard.contents();
    assert_eq!(
        after.entries().collect::<Vec<_>>(),
        before.entries().collect::<Vec<_>>()
    );
    assert_eq!(pipeline.last_written_sequence(), Some(after.sequence_id));
    assert!(pipeline.session().is_none());
    assert!(!common::drain(&mut events)
        .iter()
        .any(|event| matches!(event, OptimizerEvent::Completed(_))));
}

#[test]
fn test_rejected_write_leaves_every_format_untouched() {
    let clipboard = Arc::new(LimitedClipboard::new(true));
    let mut pipeline = Pipeline::new(clipboard.clone(), OptimizerConfig::default(), EventSink::disabled());

    let seq = clipboard.inner.set(vec![
        (ClipboardFormat::Bitmap, common::encode(&common::noisy_photo(320, 240, 10), image::ImageFormat::Bmp)),
        (ClipboardFormat::Png, common::large_png(10)),
    ]);
    let before = clipboard.inner.contents();
    clipboard.inner.fail_next_writes(1);

    assert!(matches!(
        pipeline.handle_change(seq),
        Outcome::Failed(OptimizeError::Write(_))
    ));

    // the write never reached the clipboard, so nothing is rolled back
    let after = clipboard.inner.contents();
    assert_eq!(
        after.formats().collect::<Vec<_>>(),
        vec![ClipboardFormat::Bitmap, ClipboardFormat::Png]
    );
    assert_eq!(
        after.entries().collect::<Vec<_>>(),
        before.entries().collect::<Vec<_>>()
    );
    assert_eq!(after.sequence_id, seq);
    assert_eq!(clipboard.restores.load(Ordering::SeqCst), 0);
    assert_eq!(pipeline.last_written_sequence(), None);
}

#[test]
fn test_unwritable_target_leaves_clipboard_alone() {
    let clipboard = Arc::new(LimitedClipboard::new(false));
    let (events, mut receiver) = EventSink::channel();
    let mut pipeline = Pipeline::new(clipboard.clone(), OptimizerConfig::default(), events);

    let seq = clipboard
        .inner
        .set(vec![(ClipboardFormat::Png, common::large_png(11))]);

    assert_eq!(
        pipeline.handle_change(seq),
        Outcome::Skipped(SkipReason::Unwritable)
    );
    assert!(common::drain(&mut receiver).is_empty());
    assert_eq!(clipboard.inner.write_count(), 0);
    assert_eq!(clipboard.inner.sequence_id(), seq);
    assert!(pipeline.session().is_none());
    assert_eq!(pipeline.state(), PipelineState::Idle);
}

#[test]
fn test_corrupt_image_fails_without_touching_clipboard() {
    let (clipboard, mut pipeline, mut events) = setup(OptimizerConfig::default());

    let mut corrupt = b"\x89PNG\r\n\x1a\n".to_vec();
    corrupt.extend(std::iter::repeat_n(0xAB, 8 * 1024));
    let seq = clipboard.set(vec![(ClipboardFormat::Png, corrupt)]);
    let before = clipboard.contents();

    assert!(matches!(
        pipeline.handle_change(seq),
        Outcome::Failed(OptimizeError::Decode(_))
    ));
    assert_eq!(clipboard.contents(), before);
    assert!(!common::drain(&mut events)
        .iter()
        .any(|event| matches!(event, OptimizerEvent::Completed(_))));
}

#[test]
fn test_oversized_image_hits_resource_limit() {
    let config = OptimizerConfig {
        max_decoded_pixels: 10_000,
        ..OptimizerConfig::default()
    };
    let (clipboard, mut pipeline, _events) = setup(config);

    let seq = clipboard.set(vec![(ClipboardFormat::Png, common::large_png(10))]);
    assert!(matches!(
        pipeline.handle_change(seq),
        Outcome::Failed(OptimizeError::ResourceLimit(_))
    ));
    assert_eq!(clipboard.write_count(), 0);
}

#[test]
fn test_single_image_file_reference_is_optimized() {
    let dir = std::env::temp_dir().join(format!("clipboard-optimizer-files-{}", std::process::id()));
    fs::create_dir_all(&dir).expect("create temp dir");
    let path = dir.join("screenshot.png");
    let png = common::large_png(11);
    fs::write(&path, &png).expect("write source file");

    let (clipboard, mut pipeline, _events) = setup(OptimizerConfig::default());
    let seq = clipboard.set(vec![(
        ClipboardFormat::FileList,
        path.to_string_lossy().into_owned().into_bytes(),
    )]);

    let outcome = pipeline.handle_change(seq);
    assert!(
        matches!(outcome, Outcome::Committed { original_size, .. } if original_size == png.len() as u64),
        "unexpected outcome {:?}",
        outcome
    );
    assert!(clipboard.contents().contains(ClipboardFormat::Jpeg));
    assert_eq!(fs::read(&path).expect("read source file"), png);

    // revert gives the file reference back
    assert_eq!(pipeline.revert(), Ok(RevertOutcome::Reverted));
    assert!(clipboard.contents().contains(ClipboardFormat::FileList));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_disabled_pipeline_ignores_everything() {
    let config = OptimizerConfig {
        enabled: false,
        ..OptimizerConfig::default()
    };
    let (clipboard, mut pipeline, mut events) = setup(config);

    let seq = clipboard.set(vec![(ClipboardFormat::Png, common::large_png(12))]);
    assert_eq!(pipeline.handle_change(seq), Outcome::Ignored(IgnoreReason::Disabled));
    assert_eq!(clipboard.read_count(), 0);
    assert!(common::drain(&mut events).is_empty());
}

#[test]
fn test_new_session_replaces_previous_one() {
    let (clipboard, mut pipeline, _events) = setup(OptimizerConfig::default());

    let first = common::large_png(13);
    let second = common::large_png(14);
    let seq = clipboard.set(vec![(ClipboardFormat::Png, first)]);
    assert!(matches!(pipeline.handle_change(seq), Outcome::Committed { .. }));
    let seq = clipboard.set(vec![(ClipboardFormat::Png, second.clone())]);
    assert!(matches!(pipeline.handle_change(seq), Outcome::Committed { .. }));

    assert_eq!(pipeline.revert(), Ok(RevertOutcome::Reverted));
    assert_eq!(clipboard.contents().payload(ClipboardFormat::Png), Some(second.as_slice()));
    assert_eq!(pipeline.revert(), Ok(RevertOutcome::NothingToRevert));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn committed_results_are_always_smaller(
        width in 16u32..200,
        height in 16u32..200,
        seed in any::<u32>(),
        as_jpeg in any::<bool>(),
    ) {
        let config = OptimizerConfig {
            min_source_bytes: 0,
            jpeg_min_source_bytes: 0,
            ..OptimizerConfig::default()
        };
        let (clipboard, mut pipeline, mut events) = setup(config);
        let image = common::noisy_photo(width, height, seed);
        let (format, bytes) = if as_jpeg {
            (ClipboardFormat::Jpeg, common::encode(&image.to_rgb8().into(), image::ImageFormat::Jpeg))
        } else {
            (ClipboardFormat::Png, common::encode(&image, image::ImageFormat::Png))
        };

        let seq = clipboard.set(vec![(format, bytes.clone())]);
        match pipeline.handle_change(seq) {
            Outcome::Committed { original_size, new_size } => {
                prop_assert!(new_size < original_size);
                prop_assert_eq!(original_size, bytes.len() as u64);
                let completed = common::drain(&mut events);
                prop_assert_eq!(
                    completed.last().copied(),
                    Some(OptimizerEvent::Completed(CompletionPayload { original_size, new_size }))
                );
            }
            Outcome::Skipped(SkipReason::NoGain) => {
                let contents = clipboard.contents();
                prop_assert_eq!(contents.payload(format), Some(bytes.as_slice()));
            }
            other => prop_assert!(false, "unexpected outcome {:?}", other),
        }
        prop_assert_eq!(pipeline.state(), PipelineState::Idle);
    }
}
