//! Rescale step - locks frame durations to the finished narration track.

use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, RunState, StepOutcome};
use crate::rescale;

/// Scales the job's frame durations so the video matches the track.
pub struct RescaleStep;

impl RescaleStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RescaleStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for RescaleStep {
    fn name(&self) -> &str {
        "Rescale"
    }

    fn description(&self) -> &str {
        "Rescale frame durations to the narration length"
    }

    fn validate_input(&self, ctx: &Context, state: &RunState) -> StepResult<()> {
        if ctx.frames.is_empty() {
            return Err(StepError::invalid_input("no frames supplied"));
        }
        if state.track.is_none() {
            return Err(StepError::invalid_input("narration track not assembled"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        let track = state
            .track
            .as_ref()
            .ok_or_else(|| StepError::invalid_input("narration track not assembled"))?;

        let report = rescale::rescale(
            &ctx.frames,
            track.total_ms,
            f64::from(ctx.settings.render.frame_rate),
        )?;

        if report.overshoot_ms > 0 {
            ctx.logger.warn(&format!(
                "video will run {}ms past the narration: minimum frame duration reached",
                report.overshoot_ms
            ));
        }
        ctx.logger.info(&format!(
            "rescaled {} frames by {:.4}x to {}ms ({} floored)",
            report.frames.len(),
            report.scale,
            track.total_ms,
            report.floored
        ));

        state.scaled_frames = report.frames;
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, ctx: &Context, state: &RunState) -> StepResult<()> {
        if state.scaled_frames.len() != ctx.frames.len() {
            return Err(StepError::invalid_output("frame count changed during rescale"));
        }
        Ok(())
    }
}
