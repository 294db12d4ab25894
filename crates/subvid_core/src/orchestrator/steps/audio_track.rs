//! Audio track step - mixes resolved clips onto the silent base track.

use crate::audio::{self, TrackOptions};
use crate::orchestrator::errors::{StepError, StepResult};
use crate::orchestrator::step::PipelineStep;
use crate::orchestrator::types::{Context, RunState, StepOutcome};

/// Assembles the narration track from placed speech segments.
pub struct AudioTrackStep;

impl AudioTrackStep {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AudioTrackStep {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStep for AudioTrackStep {
    fn name(&self) -> &str {
        "AudioTrack"
    }

    fn description(&self) -> &str {
        "Mix speech clips onto the narration track"
    }

    fn validate_input(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        if state.placements.len() != state.segments.len() {
            return Err(StepError::invalid_input("placements not resolved"));
        }
        Ok(())
    }

    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome> {
        let out_path = ctx.scratch_dir.join("track.wav");
        let opts = TrackOptions {
            strict_timing: ctx.settings.timing.strict_timing,
        };

        let report = audio::assemble_track(&state.segments, &state.placements, opts, &out_path)?;

        for entry in &report.skipped {
            ctx.logger.warn(&format!(
                "entry {} skipped: it would overlap the previous clip",
                entry
            ));
        }
        for entry in &report.overlapped {
            ctx.logger.warn(&format!(
                "entry {} overlaps the previous clip and was mixed anyway",
                entry
            ));
        }
        for entry in &report.truncated {
            ctx.logger
                .warn(&format!("entry {} truncated at the end of the track", entry));
        }
        ctx.logger.info(&format!(
            "narration track assembled: {}ms at {}Hz",
            report.total_ms, report.sample_rate
        ));

        state.track = Some(report);
        Ok(StepOutcome::Success)
    }

    fn validate_output(&self, _ctx: &Context, state: &RunState) -> StepResult<()> {
        match &state.track {
            Some(report) if report.path.exists() && report.total_ms > 0 => Ok(()),
            Some(_) => Err(StepError::invalid_output("track file missing or empty")),
            None => Err(StepError::invalid_output("track not recorded")),
        }
    }
}
