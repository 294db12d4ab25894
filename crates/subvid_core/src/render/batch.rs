//! Batch partitioning and the rendering worker pool.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::media::MediaToolkit;
use crate::models::{Batch, FrameRecord, VideoSegment};
use crate::orchestrator::CancelHandle;

use super::{RenderError, RenderResult};

/// Batches never drop below this many frames; tiny batches waste more
/// time on encoder startup than on encoding.
pub const MIN_BATCH_SIZE: usize = 50;

const WORKER_MIN: usize = 2;
const WORKER_MAX: usize = 4;

/// Validation tolerance between a segment's expected and probed length.
const SEGMENT_DRIFT_WARN_MS: i64 = 500;

/// Frames per batch: a tenth of the job, but at least [`MIN_BATCH_SIZE`].
pub fn compute_batch_size(frame_count: usize) -> usize {
    (frame_count / 10).max(MIN_BATCH_SIZE)
}

/// Split frames into consecutively indexed batches.
pub fn partition(frames: Vec<FrameRecord>) -> Vec<Batch> {
    let size = compute_batch_size(frames.len());
    let mut batches = Vec::with_capacity(frames.len().div_ceil(size.max(1)));
    let mut frames = frames.into_iter().peekable();
    let mut batch_index = 0;

    while frames.peek().is_some() {
        let chunk: Vec<_> = frames.by_ref().take(size).collect();
        batches.push(Batch {
            batch_index,
            frames: chunk,
        });
        batch_index += 1;
    }

    batches
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub frame_rate: u32,
    /// Worker count override; `None` derives one from the host and
    /// clamps it to the pool's supported range.
    pub workers: Option<usize>,
    /// Keep per-batch frame manifests in the scratch directory for
    /// post-mortem inspection.
    pub keep_manifests: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            frame_rate: 30,
            workers: None,
            keep_manifests: false,
        }
    }
}

/// What the worker pool produced.
#[derive(Debug)]
pub struct RenderOutcome {
    /// Successfully rendered segments, in batch order.
    pub segments: Vec<VideoSegment>,
    /// Batch indices that failed or produced an invalid segment.
    pub failed_batches: Vec<usize>,
}

fn worker_count(requested: Option<usize>) -> usize {
    let derived = requested.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get() / 2)
            .unwrap_or(WORKER_MIN)
    });
    derived.clamp(WORKER_MIN, WORKER_MAX)
}

fn write_manifest(batch: &Batch, dir: &Path) -> RenderResult<()> {
    let path = dir.join(format!("batch_{:04}.json", batch.batch_index));
    let body = serde_json::to_string_pretty(&batch.frames)
        .map_err(|e| RenderError::io("manifest serialization", e.into()))?;
    std::fs::write(&path, body).map_err(|e| RenderError::io("manifest write", e))
}

/// Preserve what a failed batch was working from: its frame list and a
/// copy of the first frame image.
fn save_diagnostics(batch: &Batch, scratch_dir: &Path) {
    let debug_dir = scratch_dir.join("debug").join(format!("batch_{:04}", batch.batch_index));
    if let Err(e) = std::fs::create_dir_all(&debug_dir) {
        tracing::warn!(batch = batch.batch_index, error = %e, "could not create debug area");
        return;
    }
    if let Err(e) = write_manifest(batch, &debug_dir) {
        tracing::warn!(batch = batch.batch_index, error = %e, "could not save frame manifest");
    }
    if let Some(first) = batch.frames.first() {
        if let Some(name) = first.path.file_name() {
            let _ = std::fs::copy(&first.path, debug_dir.join(name));
        }
    }
    tracing::info!(
        batch = batch.batch_index,
        dir = %debug_dir.display(),
        "saved failed-batch diagnostics"
    );
}

fn render_one(
    batch: &Batch,
    media: &dyn MediaToolkit,
    scratch_dir: &Path,
    opts: &RenderOptions,
) -> RenderResult<VideoSegment> {
    let out_path = scratch_dir.join(format!("segment_{:04}.mp4", batch.batch_index));

    if opts.keep_manifests {
        write_manifest(batch, scratch_dir)?;
    }

    let expected_ms: i64 = batch.frames.iter().map(|f| f.duration_ms).sum();
    let frames: Vec<_> = batch
        .frames
        .iter()
        .map(|f| (f.path.clone(), f.duration_ms as f64 / 1_000.0))
        .collect();

    media.render_batch(&frames, &out_path, opts.frame_rate)?;

    // A segment only counts once the container proves it holds video.
    let info = media.probe_streams(&out_path)?;
    if !info.has_video {
        return Err(RenderError::invalid_segment(
            batch.batch_index,
            "no video stream in rendered output",
        ));
    }
    if info.duration_ms <= 0 {
        return Err(RenderError::invalid_segment(
            batch.batch_index,
            "rendered output has zero duration",
        ));
    }
    if (info.duration_ms - expected_ms).abs() > SEGMENT_DRIFT_WARN_MS {
        tracing::warn!(
            batch = batch.batch_index,
            expected_ms,
            actual_ms = info.duration_ms,
            "rendered segment drifts from its frame durations"
        );
    }

    tracing::debug!(
        batch = batch.batch_index,
        frames = batch.frames.len(),
        duration_ms = info.duration_ms,
        "rendered segment"
    );

    Ok(VideoSegment {
        batch_index: batch.batch_index,
        path: out_path,
    })
}

/// Render every batch on a small worker pool.
///
/// Workers claim batches from a shared counter. A failed batch is
/// logged with diagnostics and skipped; its siblings keep going. Only
/// cancellation stops the pool early, honored between claims so
/// in-flight encoder calls finish undisturbed.
pub fn render_batches(
    batches: &[Batch],
    media: &dyn MediaToolkit,
    scratch_dir: &Path,
    opts: &RenderOptions,
    cancel: &CancelHandle,
) -> RenderResult<RenderOutcome> {
    if batches.is_empty() {
        return Ok(RenderOutcome {
            segments: Vec::new(),
            failed_batches: Vec::new(),
        });
    }

    let workers = worker_count(opts.workers).min(batches.len());
    tracing::info!(batches = batches.len(), workers, "starting batch render");

    let next = AtomicUsize::new(0);
    let slots: Mutex<Vec<Option<VideoSegment>>> =
        Mutex::new((0..batches.len()).map(|_| None).collect());
    let failed: Mutex<Vec<usize>> = Mutex::new(Vec::new());

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                if cancel.is_cancelled() {
                    break;
                }
                let index = next.fetch_add(1, Ordering::SeqCst);
                if index >= batches.len() {
                    break;
                }
                let batch = &batches[index];
                match render_one(batch, media, scratch_dir, opts) {
                    Ok(segment) => {
                        slots.lock()[index] = Some(segment);
                    }
                    Err(error) => {
                        tracing::warn!(
                            batch = batch.batch_index,
                            error = %error,
                            "batch failed, skipping"
                        );
                        save_diagnostics(batch, scratch_dir);
                        failed.lock().push(batch.batch_index);
                    }
                }
            });
        }
    });

    if cancel.is_cancelled() {
        return Err(RenderError::Cancelled);
    }

    // Slots fill in claim order, which is batch order.
    let segments: Vec<_> = slots.into_inner().into_iter().flatten().collect();
    let mut failed_batches = failed.into_inner();
    failed_batches.sort_unstable();

    tracing::info!(
        rendered = segments.len(),
        failed = failed_batches.len(),
        "batch render finished"
    );

    Ok(RenderOutcome {
        segments,
        failed_batches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaError, MediaResult};
    use crate::models::{ConcatMode, StreamInfo};
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn frame(name: &str, duration_ms: i64) -> FrameRecord {
        FrameRecord {
            path: PathBuf::from(name),
            duration_ms,
        }
    }

    fn frames(count: usize) -> Vec<FrameRecord> {
        (0..count).map(|i| frame(&format!("{i}.png"), 100)).collect()
    }

    /// Fake encoder that records render calls and writes empty files.
    #[derive(Default)]
    struct FakeEncoder {
        renders: AtomicUsize,
        fail_batches_containing: Option<String>,
    }

    impl MediaToolkit for FakeEncoder {
        fn measure_duration_ms(&self, _path: &Path) -> MediaResult<i64> {
            unimplemented!("not used by the renderer")
        }

        fn change_tempo(&self, _path: &Path, _speed: f64) -> MediaResult<()> {
            unimplemented!("not used by the renderer")
        }

        fn render_batch(
            &self,
            frames: &[(PathBuf, f64)],
            out_path: &Path,
            _frame_rate: u32,
        ) -> MediaResult<()> {
            if let Some(marker) = &self.fail_batches_containing {
                if frames.iter().any(|(p, _)| p.to_string_lossy().contains(marker.as_str())) {
                    return Err(MediaError::command_failed("ffmpeg", 1, "boom"));
                }
            }
            self.renders.fetch_add(1, Ordering::SeqCst);
            std::fs::write(out_path, b"segment").unwrap();
            Ok(())
        }

        fn probe_streams(&self, _path: &Path) -> MediaResult<StreamInfo> {
            Ok(StreamInfo {
                has_video: true,
                has_audio: false,
                duration_ms: 5_000,
            })
        }

        fn concat(&self, _: &[PathBuf], _: &Path, _: ConcatMode) -> MediaResult<()> {
            unimplemented!("not used by the renderer")
        }

        fn mux_audio_video(&self, _: &Path, _: &Path, _: &Path) -> MediaResult<()> {
            unimplemented!("not used by the renderer")
        }
    }

    #[test]
    fn batch_size_is_a_tenth_with_a_floor() {
        assert_eq!(compute_batch_size(10), 50);
        assert_eq!(compute_batch_size(500), 50);
        assert_eq!(compute_batch_size(1_000), 100);
        assert_eq!(compute_batch_size(0), 50);
    }

    #[test]
    fn partition_preserves_order_and_indexes_consecutively() {
        let batches = partition(frames(120));

        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].batch_index, 0);
        assert_eq!(batches[0].frames.len(), 50);
        assert_eq!(batches[2].frames.len(), 20);
        assert_eq!(batches[1].frames[0].path, PathBuf::from("50.png"));
    }

    #[test]
    fn worker_count_stays_in_range() {
        assert_eq!(worker_count(Some(1)), 2);
        assert_eq!(worker_count(Some(3)), 3);
        assert_eq!(worker_count(Some(64)), 4);
    }

    #[test]
    fn renders_all_batches_in_order() {
        let dir = TempDir::new().unwrap();
        let encoder = FakeEncoder::default();
        let batches = partition(frames(120));

        let outcome = render_batches(
            &batches,
            &encoder,
            dir.path(),
            &RenderOptions::default(),
            &CancelHandle::new(),
        )
        .unwrap();

        assert_eq!(outcome.segments.len(), 3);
        assert!(outcome.failed_batches.is_empty());
        assert_eq!(encoder.renders.load(Ordering::SeqCst), 3);
        for (i, segment) in outcome.segments.iter().enumerate() {
            assert_eq!(segment.batch_index, i);
            assert!(segment.path.exists());
        }
    }

    #[test]
    fn failed_batch_is_skipped_with_diagnostics_while_siblings_continue() {
        let dir = TempDir::new().unwrap();
        let encoder = FakeEncoder {
            fail_batches_containing: Some("55.png".to_string()),
            ..FakeEncoder::default()
        };
        let batches = partition(frames(120));

        let outcome = render_batches(
            &batches,
            &encoder,
            dir.path(),
            &RenderOptions::default(),
            &CancelHandle::new(),
        )
        .unwrap();

        assert_eq!(outcome.failed_batches, vec![1]);
        let indices: Vec<_> = outcome.segments.iter().map(|s| s.batch_index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert!(dir
            .path()
            .join("debug")
            .join("batch_0001")
            .join("batch_0001.json")
            .exists());
    }

    #[test]
    fn cancellation_wins_over_partial_progress() {
        let dir = TempDir::new().unwrap();
        let encoder = FakeEncoder::default();
        let batches = partition(frames(60));
        let cancel = CancelHandle::new();
        cancel.cancel();

        let err = render_batches(
            &batches,
            &encoder,
            dir.path(),
            &RenderOptions::default(),
            &cancel,
        )
        .unwrap_err();

        assert!(matches!(err, RenderError::Cancelled));
        assert_eq!(encoder.renders.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn manifests_are_written_when_requested() {
        let dir = TempDir::new().unwrap();
        let encoder = FakeEncoder::default();
        let batches = partition(frames(10));
        let opts = RenderOptions {
            keep_manifests: true,
            ..RenderOptions::default()
        };

        render_batches(&batches, &encoder, dir.path(), &opts, &CancelHandle::new()).unwrap();

        assert!(dir.path().join("batch_0000.json").exists());
    }

    #[test]
    fn segment_without_video_stream_is_discarded() {
        struct NoVideo;
        impl MediaToolkit for NoVideo {
            fn measure_duration_ms(&self, _: &Path) -> MediaResult<i64> {
                unimplemented!()
            }
            fn change_tempo(&self, _: &Path, _: f64) -> MediaResult<()> {
                unimplemented!()
            }
            fn render_batch(&self, _: &[(PathBuf, f64)], out: &Path, _: u32) -> MediaResult<()> {
                std::fs::write(out, b"x").unwrap();
                Ok(())
            }
            fn probe_streams(&self, _: &Path) -> MediaResult<StreamInfo> {
                Ok(StreamInfo {
                    has_video: false,
                    has_audio: false,
                    duration_ms: 0,
                })
            }
            fn concat(&self, _: &[PathBuf], _: &Path, _: ConcatMode) -> MediaResult<()> {
                unimplemented!()
            }
            fn mux_audio_video(&self, _: &Path, _: &Path, _: &Path) -> MediaResult<()> {
                unimplemented!()
            }
        }

        let dir = TempDir::new().unwrap();
        let batches = partition(frames(10));

        let outcome = render_batches(
            &batches,
            &NoVideo,
            dir.path(),
            &RenderOptions::default(),
            &CancelHandle::new(),
        )
        .unwrap();

        assert!(outcome.segments.is_empty());
        assert_eq!(outcome.failed_batches, vec![0]);
    }
}
