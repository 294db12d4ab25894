//! Policy enums used throughout the pipeline.

use serde::{Deserialize, Serialize};

/// How speech clips are sped up to fit their time windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TempoPolicy {
    /// Leave every clip untouched (overlap risk).
    None,
    /// Apply one fixed multiplier to every clip.
    Uniform,
    /// Speed up clips longer than the gap-aware slot.
    #[default]
    Overflow,
    /// Speed up clips longer than the entry's own display duration.
    Precise,
}

impl std::fmt::Display for TempoPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TempoPolicy::None => write!(f, "none"),
            TempoPolicy::Uniform => write!(f, "uniform"),
            TempoPolicy::Overflow => write!(f, "overflow"),
            TempoPolicy::Precise => write!(f, "precise"),
        }
    }
}

/// How entry start times are moved when tempo alone cannot resolve overflow.
///
/// `Right` and `Left` are the dependable policies. `Interpose` splits the
/// shift between reclaiming idle time before the entry and pushing the next
/// entry later, but the forward push is not propagated to entries further
/// down the timeline; treat it as best-effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShiftPolicy {
    /// No shifting at all; entries keep their timeline starts and any
    /// residual overlap is left to the track assembler.
    #[default]
    None,
    /// Push every subsequent entry later. Always resolves fully.
    Right,
    /// Move the overflowing entry earlier into idle time of preceding slots.
    Left,
    /// Split between a backward reclaim and a (non-propagated) forward push.
    Interpose,
    /// `Left`, but residual overflow is accepted with a warning.
    LeftOverlap,
    /// `Interpose`, but residual overflow is accepted with a warning.
    InterposeOverlap,
}

impl ShiftPolicy {
    /// Whether residual overflow is tolerated instead of treated as an error.
    pub fn allows_overlap(&self) -> bool {
        matches!(self, ShiftPolicy::LeftOverlap | ShiftPolicy::InterposeOverlap)
    }
}

impl std::fmt::Display for ShiftPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShiftPolicy::None => write!(f, "none"),
            ShiftPolicy::Right => write!(f, "right"),
            ShiftPolicy::Left => write!(f, "left"),
            ShiftPolicy::Interpose => write!(f, "interpose"),
            ShiftPolicy::LeftOverlap => write!(f, "left-overlap"),
            ShiftPolicy::InterposeOverlap => write!(f, "interpose-overlap"),
        }
    }
}

/// How segment files are joined by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcatMode {
    /// Stream copy without re-encoding.
    Copy,
    /// Re-encode while joining.
    Encode,
}
