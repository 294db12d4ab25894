//! Shift step - moves entry start times for overflow tempo could not fix.

use crate::models::ShiftPolicy;
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, RunState, StepOutcome};
use crate::timing::{self, OVERFLOW_TOLERANCE_MS};

/// Resolves residual overflow under the configured shift policy.
pub struct ShiftStep;

impl ShiftStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ShiftStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for ShiftStep {
    fn name(&self) -> &str {
        "Shift"
    }

    fn description(&self) -> &str {
        "Move entry start times to absorb residual overflow"
    }

    fn validate_input(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        if state.segments.len() != state.entries.len() {
            return Err(StepError::invalid_input("segments out of step with timeline"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        let timing_cfg = &ctx.settings.timing;

        if timing_cfg.shift_policy == ShiftPolicy::None {
            // Placements still have to exist for the track assembler;
            // every entry keeps its timeline start.
            let outcome =
                timing::resolve_shifts(&state.entries, &state.segments, ShiftPolicy::None, None)?;
            state.placements = outcome.results;
            return Ok(StepOutcome::Skipped("shift policy is none".to_string()));
        }

        let limit_ms = if timing_cfg.shift_limit.is_empty() {
            None
        } else {
            Some(timing::parse_shift_limit(&timing_cfg.shift_limit)?)
        };

        let outcome = timing::resolve_shifts(
            &state.entries,
            &state.segments,
            timing_cfg.shift_policy,
            limit_ms,
        )?;

        for unresolved in outcome.unresolved() {
            ctx.logger.warn(&format!(
                "entry {}: {}ms of overflow remains after shifting",
                unresolved.entry_index, unresolved.residual_overflow_ms
            ));
        }
        let shifted = outcome
            .results
            .iter()
            .filter(|r| r.achieved_shift_ms != 0)
            .count();
        ctx.logger
            .info(&format!("shift pass moved {} entries", shifted));

        state.placements = outcome.results;
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, ctx: &Context, state: &RunState) -> StepResult<()> {
        if state.placements.len() != state.entries.len() {
            return Err(StepError::invalid_output("placement count mismatch"));
        }
        if !ctx.settings.timing.shift_limit.is_empty() {
            let limit = timing::parse_shift_limit(&ctx.settings.timing.shift_limit)?;
            // Tolerance covers the same slack the shifters themselves allow.
            if let Some(bad) = state
                .placements
                .iter()
                .find(|p| p.achieved_shift_ms.abs() > limit + OVERFLOW_TOLERANCE_MS)
            {
                return Err(StepError::invalid_output(format!(
                    "entry {} shifted {}ms past the {}ms limit",
                    bad.entry_index, bad.achieved_shift_ms, limit
                )));
            }
        }
        Ok(())
    }
}
