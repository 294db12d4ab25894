//! Synthesize step - renders one speech clip per entry.

use std::path::PathBuf;

use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, RunState, StepOutcome};
use crate::synth::{self, SynthesisParams};

/// Calls the speech engine once per entry and measures each clip.
pub struct SynthesizeStep;

impl SynthesizeStep {
    pub fn new() -> Self {
        Self
    }

    fn params(ctx: &Context) -> SynthesisParams {
        let s = &ctx.settings.synthesis;
        SynthesisParams {
            language: (!s.language.is_empty()).then(|| s.language.clone()),
            speaker_wav: (!s.speaker_wav.is_empty()).then(|| PathBuf::from(&s.speaker_wav)),
            speaker: (!s.speaker.is_empty()).then(|| s.speaker.clone()),
        }
    }
}

impl Default for SynthesizeStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for SynthesizeStep {
    fn name(&self) -> &str {
        "Synthesize"
    }

    fn description(&self) -> &str {
        "Render speech clips for every entry"
    }

    fn validate_input(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        if state.entries.is_empty() {
            return Err(StepError::invalid_input("timeline not built"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        let params = Self::params(ctx);
        ctx.logger.info(&format!(
            "synthesizing {} clips into {}",
            state.entries.len(),
            ctx.scratch_dir.display()
        ));

        let segments = synth::generate_segments(
            &state.entries,
            ctx.synth.as_ref(),
            ctx.media.as_ref(),
            &params,
            &ctx.scratch_dir,
        )?;

        let total_ms: i64 = segments.iter().map(|s| s.length_ms).sum();
        ctx.logger
            .info(&format!("synthesized {}ms of speech", total_ms));

        state.segments = segments;
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        if state.segments.len() != state.entries.len() {
            return Err(StepError::invalid_output("segment count mismatch"));
        }
        for segment in &state.segments {
            if !segment.clip_path.exists() {
                return Err(StepError::invalid_output(format!(
                    "clip for entry {} missing from scratch area",
                    segment.entry_index
                )));
            }
        }
        Ok(())
    }
}
