//! Pipeline step trait definition.
//!
//! All pipeline steps implement this trait, providing a consistent
//! interface for validation and execution.

use super::errors::StepResult;
use super::types::{Context, RunState, StepOutcome};

/// Trait for pipeline steps.
///
/// The pipeline runner calls these methods in order:
///
/// 1. `validate_input` - check preconditions before execution
/// 2. `execute` - perform the step's work
/// 3. `validate_output` - verify the step produced valid output
pub trait PipelineStep: Send + Sync {
    /// Step name, used in logging and error context.
    fn name(&self) -> &str;

    /// Validate inputs before execution.
    ///
    /// Should check that all required preconditions are met (inputs
    /// present, previous steps completed).
    fn validate_input(&self, ctx: &Context, state: &RunState) -> StepResult<()>;

    /// Execute the step's main work.
    ///
    /// Records results in `state`. Returns `StepOutcome::Skipped` when
    /// the step decided it has nothing to do, which is not an error.
    fn execute(&self, ctx: &Context, state: &mut RunState) -> StepResult<StepOutcome>;

    /// Validate outputs after a successful execution.
    fn validate_output(&self, ctx: &Context, state: &RunState) -> StepResult<()>;

    /// Whether this step can be skipped based on configuration.
    fn is_optional(&self) -> bool {
        false
    }

    /// Human-readable description of what this step does.
    fn description(&self) -> &str {
        self.name()
    }
}
