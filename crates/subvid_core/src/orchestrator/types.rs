//! Core types for the orchestrator pipeline.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::audio::TrackReport;
use crate::config::Settings;
use crate::logging::JobLogger;
use crate::media::MediaToolkit;
use crate::models::{FrameRecord, ShiftResult, SpeechSegment, TimedEntry, VideoSegment};
use crate::synth::SpeechSynthesizer;

/// Progress callback type for reporting pipeline progress.
///
/// Arguments: (step_name, percent_complete, message)
pub type ProgressCallback = Box<dyn Fn(&str, u32, &str) + Send + Sync>;

/// Cooperative cancellation flag shared between the caller and every
/// pipeline step and rendering worker.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Read-only context passed to pipeline steps.
///
/// Holds the job's inputs, configuration, and shared collaborators.
/// Mutable results accumulate in [`RunState`].
pub struct Context {
    /// Timed cues as `(start_ms, end_ms, text)`, already sorted.
    pub cues: Vec<(i64, i64, String)>,
    /// Rendered frame images with raw durations, in display order.
    pub frames: Vec<FrameRecord>,
    /// Application settings.
    pub settings: Settings,
    /// Job name/identifier.
    pub job_name: String,
    /// Job-specific scratch directory.
    pub scratch_dir: PathBuf,
    /// Where the final artifact goes.
    pub output_path: PathBuf,
    /// Per-job logger.
    pub logger: Arc<JobLogger>,
    /// Speech engine collaborator.
    pub synth: Arc<dyn SpeechSynthesizer>,
    /// Encoder collaborator.
    pub media: Arc<dyn MediaToolkit>,
    /// Cooperative cancellation flag.
    pub cancel: CancelHandle,
    progress_callback: Option<ProgressCallback>,
}

impl Context {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cues: Vec<(i64, i64, String)>,
        frames: Vec<FrameRecord>,
        settings: Settings,
        job_name: impl Into<String>,
        scratch_dir: PathBuf,
        output_path: PathBuf,
        logger: Arc<JobLogger>,
        synth: Arc<dyn SpeechSynthesizer>,
        media: Arc<dyn MediaToolkit>,
        cancel: CancelHandle,
    ) -> Self {
        Self {
            cues,
            frames,
            settings,
            job_name: job_name.into(),
            scratch_dir,
            output_path,
            logger,
            synth,
            media,
            cancel,
            progress_callback: None,
        }
    }

    /// Set the progress callback.
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Report progress to the callback, if set.
    pub fn report_progress(&self, step_name: &str, percent: u32, message: &str) {
        if let Some(ref callback) = self.progress_callback {
            callback(step_name, percent, message);
        }
    }
}

/// How a step finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    /// The step decided there was nothing to do, with a reason.
    Skipped(String),
}

/// Mutable job state that accumulates results from pipeline steps.
///
/// Steps fill in their own slice and read what earlier steps produced;
/// nothing is overwritten once set. Serializable so a finished run can be
/// dumped next to the artifact for inspection.
#[derive(Debug, Default, serde::Serialize)]
pub struct RunState {
    pub entries: Vec<TimedEntry>,
    /// Entry indices whose end time had to be coerced during timeline
    /// construction.
    pub coerced_entries: Vec<usize>,
    pub segments: Vec<SpeechSegment>,
    pub placements: Vec<ShiftResult>,
    pub track: Option<TrackReport>,
    /// Frame durations after rescaling to the track length.
    pub scaled_frames: Vec<FrameRecord>,
    pub video_segments: Vec<VideoSegment>,
    /// Batch indices that failed to render.
    pub failed_batches: Vec<usize>,
    pub output_path: Option<PathBuf>,
}
