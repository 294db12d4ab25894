//! Render step - validates frames and renders batches concurrently.

use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, RunState, StepOutcome};
use crate::render::{self, RenderOptions};

/// Renders the scaled frame sequence into ordered video segments.
pub struct RenderStep;

impl RenderStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RenderStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for RenderStep {
    fn name(&self) -> &str {
        "Render"
    }

    fn description(&self) -> &str {
        "Render frame batches into video segments"
    }

    fn validate_input(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        if state.scaled_frames.is_empty() {
            return Err(StepError::invalid_input("frames not rescaled"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        let render_cfg = &ctx.settings.render;

        let prep = render::validate_frames(
            &state.scaled_frames,
            &ctx.scratch_dir,
            render_cfg.width,
            render_cfg.height,
        )?;
        for position in &prep.replaced {
            ctx.logger.warn(&format!(
                "frame {} was unreadable and replaced with a filler",
                position
            ));
        }

        let batches = render::partition(prep.frames);
        ctx.logger.info(&format!(
            "rendering {} frames in {} batches",
            state.scaled_frames.len(),
            batches.len()
        ));

        let opts = RenderOptions {
            frame_rate: render_cfg.frame_rate,
            workers: (render_cfg.workers > 0).then_some(render_cfg.workers),
            keep_manifests: render_cfg.keep_manifests,
        };
        let outcome = render::render_batches(
            &batches,
            ctx.media.as_ref(),
            &ctx.scratch_dir,
            &opts,
            &ctx.cancel,
        )?;

        for batch in &outcome.failed_batches {
            ctx.logger.warn(&format!(
                "batch {} failed to render; diagnostics saved to the debug area",
                batch
            ));
        }
        ctx.logger.info(&format!(
            "rendered {} segments ({} batches failed)",
            outcome.segments.len(),
            outcome.failed_batches.len()
        ));

        state.video_segments = outcome.segments;
        state.failed_batches = outcome.failed_batches;
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        // All-failed is the assembler's NoValidSegments; partial loss is
        // survivable and already surfaced as warnings.
        for segment in &state.video_segments {
            if !segment.path.exists() {
                return Err(StepError::invalid_output(format!(
                    "segment for batch {} missing from disk",
                    segment.batch_index
                )));
            }
        }
        Ok(())
    }
}
