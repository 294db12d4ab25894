//! Overflow shifting: move entry start times when tempo resolution could
//! not make a clip fit.

use thiserror::Error;

use crate::models::{ShiftPolicy, ShiftResult, SpeechSegment, TimedEntry};

use super::OVERFLOW_TOLERANCE_MS;

/// Errors from the overflow shifter.
#[derive(Error, Debug)]
pub enum ShiftError {
    /// Overflow remained after shifting and the policy does not tolerate
    /// overlap.
    #[error("cannot resolve {residual_ms}ms overflow for entry {entry_index} without overlap")]
    Unresolved { entry_index: usize, residual_ms: i64 },

    /// The shift limit string could not be parsed.
    #[error("invalid shift limit '{raw}': expected milliseconds, 'Nms' or 'N.Ns'")]
    InvalidLimit { raw: String },
}

/// Summary of a shift pass.
#[derive(Debug, Clone)]
pub struct ShiftOutcome {
    /// One result per entry, in entry order. Immutable after the pass.
    pub results: Vec<ShiftResult>,
}

impl ShiftOutcome {
    /// Entries left with residual overflow beyond the tolerance.
    pub fn unresolved(&self) -> impl Iterator<Item = &ShiftResult> {
        self.results
            .iter()
            .filter(|r| r.residual_overflow_ms > OVERFLOW_TOLERANCE_MS)
    }
}

/// Parse a shift limit given as bare milliseconds, `Nms`, or `N.Ns`.
pub fn parse_shift_limit(raw: &str) -> Result<i64, ShiftError> {
    let s = raw.trim().to_lowercase();
    let invalid = || ShiftError::InvalidLimit {
        raw: raw.to_string(),
    };

    let ms = if let Some(prefix) = s.strip_suffix("ms") {
        prefix.trim().parse::<i64>().map_err(|_| invalid())?
    } else if let Some(prefix) = s.strip_suffix('s') {
        let seconds = prefix.trim().parse::<f64>().map_err(|_| invalid())?;
        if !seconds.is_finite() {
            return Err(invalid());
        }
        (seconds * 1000.0).round() as i64
    } else {
        s.parse::<i64>().map_err(|_| invalid())?
    };

    Ok(ms.max(0))
}

/// Resolve remaining overflow by moving entry start times.
///
/// `limit_ms` is a hard per-entry ceiling on the shift performed on behalf
/// of any single entry, regardless of policy. `None` means unbounded.
pub fn resolve_shifts(
    entries: &[TimedEntry],
    segments: &[SpeechSegment],
    policy: ShiftPolicy,
    limit_ms: Option<i64>,
) -> Result<ShiftOutcome, ShiftError> {
    tracing::debug!(%policy, ?limit_ms, "resolving overflow shifts");

    match policy {
        ShiftPolicy::None => Ok(identity_shift(entries, segments)),
        ShiftPolicy::Right => Ok(right_shift(entries, segments, limit_ms)),
        ShiftPolicy::Left | ShiftPolicy::LeftOverlap => {
            left_shift(entries, segments, limit_ms, policy.allows_overlap())
        }
        ShiftPolicy::Interpose | ShiftPolicy::InterposeOverlap => {
            interpose_shift(entries, segments, limit_ms, policy.allows_overlap())
        }
    }
}

fn bounded(overflow: i64, limit_ms: Option<i64>) -> i64 {
    match limit_ms {
        Some(limit) => overflow.min(limit),
        None => overflow,
    }
}

fn overflow_of(entry: &TimedEntry, segment: &SpeechSegment) -> i64 {
    segment.length_ms - entry.slot_ms.max(1)
}

/// No shifting: every entry keeps its timeline start, any overflow is
/// recorded as residual for the track assembler to deal with.
fn identity_shift(entries: &[TimedEntry], segments: &[SpeechSegment]) -> ShiftOutcome {
    let results = entries
        .iter()
        .zip(segments)
        .map(|(entry, segment)| ShiftResult {
            entry_index: entry.index,
            start_ms: entry.start_ms,
            achieved_shift_ms: 0,
            residual_overflow_ms: overflow_of(entry, segment).max(0),
        })
        .collect();
    ShiftOutcome { results }
}

/// Push every entry after a bottleneck later by the bottleneck's bounded
/// overflow. Resolves fully by construction: there is always room at the
/// end of the timeline.
fn right_shift(
    entries: &[TimedEntry],
    segments: &[SpeechSegment],
    limit_ms: Option<i64>,
) -> ShiftOutcome {
    let mut results = Vec::with_capacity(entries.len());
    let mut total_shift = 0i64;

    for (entry, segment) in entries.iter().zip(segments) {
        // Delay accumulated from earlier bottlenecks applies first.
        let start_ms = entry.start_ms + total_shift;

        let overflow = overflow_of(entry, segment);
        let mut contributed = 0i64;
        let mut residual = 0i64;

        if overflow > 0 {
            contributed = bounded(overflow, limit_ms);
            residual = overflow - contributed;
            if residual > 0 {
                tracing::warn!(
                    entry = entry.index,
                    overflow,
                    contributed,
                    "overflow exceeds shift limit, residual remains"
                );
            }
            total_shift += contributed;
        }

        results.push(ShiftResult {
            entry_index: entry.index,
            start_ms,
            achieved_shift_ms: contributed,
            residual_overflow_ms: residual,
        });
    }

    ShiftOutcome { results }
}

/// Walk backward from the end, moving each overflowing entry earlier into
/// idle time inside preceding entries' slots.
fn left_shift(
    entries: &[TimedEntry],
    segments: &[SpeechSegment],
    limit_ms: Option<i64>,
    allow_overlap: bool,
) -> Result<ShiftOutcome, ShiftError> {
    let count = entries.len();
    let mut results: Vec<ShiftResult> = entries
        .iter()
        .map(|e| ShiftResult {
            entry_index: e.index,
            start_ms: e.start_ms,
            achieved_shift_ms: 0,
            residual_overflow_ms: 0,
        })
        .collect();

    for i in (0..count).rev() {
        let overflow = overflow_of(&entries[i], &segments[i]);
        if overflow <= 0 {
            continue;
        }

        let max_shift = bounded(overflow, limit_ms);
        let mut needed = max_shift;
        let mut achieved = 0i64;

        for j in (0..i).rev() {
            let idle = entries[j].slot_ms - segments[j].length_ms;
            if idle <= 0 {
                continue;
            }

            let steal = needed.min(idle);
            results[i].start_ms -= steal;
            achieved += steal;
            needed -= steal;
            if needed <= 0 {
                break;
            }
        }

        let short_of_max = max_shift - achieved;
        if short_of_max > OVERFLOW_TOLERANCE_MS && !allow_overlap {
            return Err(ShiftError::Unresolved {
                entry_index: entries[i].index,
                residual_ms: short_of_max,
            });
        }

        let residual = overflow - achieved;
        if residual > OVERFLOW_TOLERANCE_MS {
            tracing::warn!(
                entry = entries[i].index,
                residual_ms = residual,
                "overflow remains after left shift, overlap may occur"
            );
        }

        results[i].achieved_shift_ms = -achieved;
        results[i].residual_overflow_ms = residual.max(0);
    }

    Ok(ShiftOutcome { results })
}

/// Split the needed shift between a backward reclaim from the immediately
/// preceding slot and a forward push of the next entry.
///
/// The forward-push half is recorded against the entry but NOT propagated
/// to subsequent entries, so this policy frequently leaves residual
/// overflow; `Right` and `Left` are the dependable policies.
fn interpose_shift(
    entries: &[TimedEntry],
    segments: &[SpeechSegment],
    limit_ms: Option<i64>,
    allow_overlap: bool,
) -> Result<ShiftOutcome, ShiftError> {
    let count = entries.len();
    let mut results: Vec<ShiftResult> = entries
        .iter()
        .map(|e| ShiftResult {
            entry_index: e.index,
            start_ms: e.start_ms,
            achieved_shift_ms: 0,
            residual_overflow_ms: 0,
        })
        .collect();

    let mut any_push = false;

    for i in 0..count {
        let overflow = overflow_of(&entries[i], &segments[i]);
        if overflow <= 0 {
            continue;
        }

        let max_shift = bounded(overflow, limit_ms);

        let prev_idle = if i > 0 {
            (entries[i - 1].slot_ms - segments[i - 1].length_ms).max(0)
        } else {
            0
        };

        let take_from_prev = (max_shift / 2).min(prev_idle);
        results[i].start_ms -= take_from_prev;

        let push_forward = max_shift - take_from_prev;
        if push_forward > 0 && i + 1 < count {
            any_push = true;
            tracing::debug!(
                entry = entries[i].index,
                push_ms = push_forward,
                "forward push needed for next entry (not propagated)"
            );
        }

        let achieved = take_from_prev;
        let short_of_max = max_shift - achieved;
        if short_of_max > OVERFLOW_TOLERANCE_MS && !allow_overlap {
            return Err(ShiftError::Unresolved {
                entry_index: entries[i].index,
                residual_ms: short_of_max,
            });
        }

        results[i].achieved_shift_ms = -achieved;
        results[i].residual_overflow_ms = (overflow - achieved).max(0);
    }

    if any_push {
        tracing::warn!(
            "interpose shift does not propagate forward pushes to later entries; \
             prefer right or left shifting when full resolution matters"
        );
    }

    Ok(ShiftOutcome { results })
}
