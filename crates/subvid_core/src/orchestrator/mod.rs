//! Pipeline orchestrator coordinating a full assembly run.
//!
//! # Architecture
//!
//! ```text
//! Pipeline
//!     ├── Step: Timeline
//!     ├── Step: Synthesize
//!     ├── Step: Tempo
//!     ├── Step: Shift
//!     ├── Step: AudioTrack
//!     ├── Step: Rescale
//!     ├── Step: Render
//!     └── Step: Assemble
//! ```
//!
//! The usual entry point is [`assemble`], which owns job setup (scratch
//! directory, logging) and returns the final artifact path plus every
//! warning raised along the way. Callers needing finer control can
//! compose a [`Pipeline`] themselves.

mod errors;
mod pipeline;
mod step;
pub mod steps;
mod types;

pub use errors::{PipelineError, PipelineResult, StepError, StepResult};
pub use pipeline::{Pipeline, PipelineRunResult};
pub use step::PipelineStep;
pub use steps::{
    AssembleStep, AudioTrackStep, RenderStep, RescaleStep, ShiftStep, SynthesizeStep, TempoStep,
    TimelineStep,
};
pub use types::{CancelHandle, Context, ProgressCallback, RunState, StepOutcome};

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Settings;
use crate::logging::{JobLogger, LogConfig};
use crate::media::MediaToolkit;
use crate::models::FrameRecord;
use crate::synth::SpeechSynthesizer;

/// Create the standard pipeline with all steps in execution order.
pub fn create_standard_pipeline(cancel: CancelHandle) -> Pipeline {
    Pipeline::new(cancel)
        .with_step(TimelineStep::new())
        .with_step(SynthesizeStep::new())
        .with_step(TempoStep::new())
        .with_step(ShiftStep::new())
        .with_step(AudioTrackStep::new())
        .with_step(RescaleStep::new())
        .with_step(RenderStep::new())
        .with_step(AssembleStep::new())
}

/// Everything a single assembly job needs from the caller.
pub struct AssembleRequest {
    /// Job name, used for the scratch directory and log file.
    pub job_name: String,
    /// Timed cues as `(start_ms, end_ms, text)`, sorted by start.
    pub cues: Vec<(i64, i64, String)>,
    /// Rendered frame images with raw durations, in display order.
    pub frames: Vec<FrameRecord>,
    /// Where to write the final artifact.
    pub output_path: PathBuf,
}

/// What a finished run hands back to the caller.
#[derive(Debug)]
pub struct AssembleOutcome {
    pub output_path: PathBuf,
    /// Every warning raised during the run, in order.
    pub warnings: Vec<String>,
    pub steps_completed: Vec<String>,
    pub steps_skipped: Vec<String>,
    /// Log file location, when file logging is enabled.
    pub log_path: Option<PathBuf>,
}

/// Run a complete assembly job from cues and frames to a muxed artifact.
///
/// Fatal errors abort with the failing step attached; recoverable
/// problems degrade the output and land in `warnings` instead.
pub fn assemble(
    request: AssembleRequest,
    synth: Arc<dyn SpeechSynthesizer>,
    media: Arc<dyn MediaToolkit>,
    settings: &Settings,
    cancel: CancelHandle,
) -> PipelineResult<AssembleOutcome> {
    let job_name = request.job_name.clone();

    if request.cues.is_empty() {
        return Err(PipelineError::validation_failed(&job_name, "no cues supplied"));
    }
    if request.frames.is_empty() {
        return Err(PipelineError::validation_failed(&job_name, "no frames supplied"));
    }

    let scratch_dir = PathBuf::from(&settings.paths.scratch_root).join(&job_name);
    std::fs::create_dir_all(&scratch_dir)
        .map_err(|e| PipelineError::setup_failed(&job_name, e.to_string()))?;

    let logger = if settings.logging.job_log_enabled {
        let config = LogConfig {
            tail_lines: settings.logging.tail_lines,
            ..LogConfig::default()
        };
        let logger = JobLogger::new(&job_name, &settings.paths.logs_folder, config, None)
            .map_err(|e| PipelineError::setup_failed(&job_name, e.to_string()))?;
        Arc::new(logger)
    } else {
        Arc::new(JobLogger::memory_only(&job_name, None))
    };

    let log_path = settings
        .logging
        .job_log_enabled
        .then(|| logger.log_path().to_path_buf());

    let ctx = Context::new(
        request.cues,
        request.frames,
        settings.clone(),
        &job_name,
        scratch_dir,
        request.output_path,
        Arc::clone(&logger),
        synth,
        media,
        cancel.clone(),
    );
    let mut state = RunState::default();

    let pipeline = create_standard_pipeline(cancel);
    let run = pipeline.run(&ctx, &mut state)?;

    let output_path = state.output_path.clone().ok_or_else(|| {
        PipelineError::validation_failed(&job_name, "pipeline finished without an artifact")
    })?;

    if settings.paths.keep_segments {
        match persist_segments(&ctx.scratch_dir, &output_path, &job_name, &state) {
            Ok(saved) => logger.info(&format!("scratch clips saved to {}", saved.display())),
            Err(e) => logger.warn(&format!("could not save scratch clips: {e}")),
        }
    } else if let Err(e) = std::fs::remove_dir_all(&ctx.scratch_dir) {
        logger.warn(&format!("could not remove scratch directory: {e}"));
    }

    logger.close();

    Ok(AssembleOutcome {
        output_path,
        warnings: logger.warnings(),
        steps_completed: run.steps_completed,
        steps_skipped: run.steps_skipped,
        log_path,
    })
}

/// Copy the run's scratch files next to the artifact and drop a serialized
/// run state beside them, returning the destination directory.
fn persist_segments(
    scratch_dir: &std::path::Path,
    output_path: &std::path::Path,
    job_name: &str,
    state: &RunState,
) -> std::io::Result<PathBuf> {
    let parent = output_path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let dest = parent.join(format!("{job_name}_segments"));
    std::fs::create_dir_all(&dest)?;

    for item in std::fs::read_dir(scratch_dir)? {
        let item = item?;
        if item.file_type()?.is_file() {
            std::fs::copy(item.path(), dest.join(item.file_name()))?;
        }
    }

    let summary = serde_json::to_string_pretty(state)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(dest.join("run_state.json"), summary)?;

    Ok(dest)
}
