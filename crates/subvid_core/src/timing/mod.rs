//! Timing reconciliation: tempo resolution and overflow shifting.
//!
//! Synthesized speech rarely fits its subtitle window exactly. The tempo
//! resolver speeds clips up (bounded, pitch-preserving) to close most of the
//! gap; the overflow shifter then moves entry start times for whatever
//! overflow remains. Both stages are sequential by design: each entry's
//! resolution depends on its neighbours' already-resolved timing.

mod shift;
mod tempo;

pub use shift::{parse_shift_limit, resolve_shifts, ShiftError, ShiftOutcome};
pub use tempo::{resolve_tempo, TempoAdjustment, TempoOptions, TempoOutcome};

/// Residual overflow below this threshold is treated as resolved.
///
/// Covers rounding drift from tempo adjustment and clip measurement.
pub const OVERFLOW_TOLERANCE_MS: i64 = 10;

/// Safe operating range of the encoder's pitch-preserving tempo filter.
pub const TEMPO_SAFE_MIN: f64 = 0.5;
pub const TEMPO_SAFE_MAX: f64 = 4.0;
