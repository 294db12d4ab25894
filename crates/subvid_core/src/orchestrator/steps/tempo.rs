//! Tempo step - speeds up clips that outgrow their slots.

use crate::models::TempoPolicy;
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, RunState, StepOutcome};
use crate::timing::{self, TempoOptions, TEMPO_SAFE_MAX, TEMPO_SAFE_MIN};

/// Applies the configured tempo policy to every speech segment.
pub struct TempoStep;

impl TempoStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TempoStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for TempoStep {
    fn name(&self) -> &str {
        "Tempo"
    }

    fn description(&self) -> &str {
        "Resolve clip overflow by tempo adjustment"
    }

    fn is_optional(&self) -> bool {
        true
    }

    fn validate_input(&self, ctx: &Context, state: &RunState) -> StepResult<()> {
        if state.segments.is_empty() {
            return Err(StepError::invalid_input("no speech segments"));
        }
        let timing_cfg = &ctx.settings.timing;
        if matches!(
            timing_cfg.tempo_policy,
            TempoPolicy::Overflow | TempoPolicy::Precise
        ) && timing_cfg.tempo_limit < TEMPO_SAFE_MIN
        {
            return Err(StepError::invalid_input(format!(
                "tempo_limit {:.2} is below the minimum usable speed {:.1}",
                timing_cfg.tempo_limit, TEMPO_SAFE_MIN
            )));
        }
        if timing_cfg.tempo_policy == TempoPolicy::Uniform
            && !(TEMPO_SAFE_MIN..=TEMPO_SAFE_MAX).contains(&timing_cfg.uniform_speed)
        {
            ctx.logger.warn(&format!(
                "uniform speed {:.2}x is outside the encoder safe range [{:.1}, {:.1}] and will be clamped",
                timing_cfg.uniform_speed, TEMPO_SAFE_MIN, TEMPO_SAFE_MAX
            ));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        let timing_cfg = &ctx.settings.timing;
        if timing_cfg.tempo_policy == TempoPolicy::None {
            return Ok(StepOutcome::Skipped("tempo policy is none".to_string()));
        }

        let opts = TempoOptions {
            policy: timing_cfg.tempo_policy,
            uniform_speed: timing_cfg.uniform_speed,
            tempo_limit: timing_cfg.tempo_limit,
        };

        let outcome = timing::resolve_tempo(
            &state.entries,
            &mut state.segments,
            ctx.media.as_ref(),
            &opts,
        );

        for clamp in outcome.clamps() {
            ctx.logger.warn(&format!(
                "entry {}: required speed {:.2}x clamped to {:.2}x, residual overflow remains",
                clamp.entry_index, clamp.required_speed, clamp.applied_speed
            ));
        }
        for failure in outcome.failures() {
            ctx.logger.warn(&format!(
                "entry {}: tempo change failed, clip kept at original speed",
                failure.entry_index
            ));
        }
        ctx.logger.info(&format!(
            "tempo pass adjusted {} of {} segments",
            outcome.adjustments.len(),
            state.segments.len()
        ));

        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, ctx: &Context, state: &RunState) -> StepResult<()> {
        // The limit bounds overflow resolution; a uniform speed is the
        // caller's explicit choice and may sit anywhere in the safe range.
        if ctx.settings.timing.tempo_policy == TempoPolicy::Uniform {
            return Ok(());
        }
        let limit = ctx.settings.timing.tempo_limit;
        for segment in &state.segments {
            if segment.applied_speed > limit + 1e-9 {
                return Err(StepError::invalid_output(format!(
                    "entry {} exceeds tempo limit: {:.2}x > {:.2}x",
                    segment.entry_index, segment.applied_speed, limit
                )));
            }
        }
        Ok(())
    }
}
