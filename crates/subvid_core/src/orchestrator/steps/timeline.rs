//! Timeline step - builds the slot-aware timeline from raw cues.

use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, RunState, StepOutcome};
use crate::timeline;

/// Builds `TimedEntry` records with slot durations from the job's cues.
pub struct TimelineStep;

impl TimelineStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TimelineStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for TimelineStep {
    fn name(&self) -> &str {
        "Timeline"
    }

    fn description(&self) -> &str {
        "Build slot-aware timeline from timed cues"
    }

    fn validate_input(&self, ctx: &Context, _state: &RunState) -> StepResult<()> {
        if ctx.cues.is_empty() {
            return Err(StepError::invalid_input("no timed cues supplied"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        let report = timeline::build(&ctx.cues)?;

        for index in &report.coerced {
            ctx.logger.warn(&format!(
                "entry {} had a non-positive duration and was coerced to 1ms",
                index
            ));
        }
        ctx.logger.info(&format!(
            "timeline built: {} entries spanning {}ms",
            report.timeline.len(),
            report.timeline.span_ms()
        ));

        state.coerced_entries = report.coerced;
        state.entries = report.timeline.entries;
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, ctx: &Context, state: &RunState) -> StepResult<()> {
        if state.entries.len() != ctx.cues.len() {
            return Err(StepError::invalid_output(format!(
                "timeline holds {} entries for {} cues",
                state.entries.len(),
                ctx.cues.len()
            )));
        }
        Ok(())
    }
}
