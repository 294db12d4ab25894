//! Assemble step - concatenates segments and muxes the final artifact.

use crate::assemble::{self, AssembleOptions};
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, RunState, StepOutcome};

/// Produces the final program from rendered segments and the track.
pub struct AssembleStep;

impl AssembleStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AssembleStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for AssembleStep {
    fn name(&self) -> &str {
        "Assemble"
    }

    fn description(&self) -> &str {
        "Concatenate segments and mux the final artifact"
    }

    fn validate_input(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        if state.track.is_none() {
            return Err(StepError::invalid_input("narration track not assembled"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        let render_cfg = &ctx.settings.render;
        let opts = AssembleOptions {
            concat_mode: render_cfg.concat_mode,
            sync_tolerance_ms: render_cfg.sync_tolerance_ms,
        };

        let track_path = state.track.as_ref().map(|t| t.path.clone());
        let report = assemble::assemble_program(
            state.video_segments.clone(),
            track_path.as_deref(),
            ctx.media.as_ref(),
            &ctx.scratch_dir,
            &opts,
            &ctx.output_path,
        )?;

        if report.audio_speed != 1.0 {
            ctx.logger.warn(&format!(
                "narration stretched {:.3}x to close audio/video drift",
                report.audio_speed
            ));
        }
        ctx.logger.info(&format!(
            "final artifact written: {} ({}ms video)",
            report.output_path.display(),
            report.video_ms
        ));

        state.output_path = Some(report.output_path);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        match &state.output_path {
            Some(path) if path.exists() => Ok(()),
            Some(path) => Err(StepError::invalid_output(format!(
                "final artifact missing: {}",
                path.display()
            ))),
            None => Err(StepError::invalid_output("output path not recorded")),
        }
    }
}
