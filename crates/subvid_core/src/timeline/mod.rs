//! Canonical representation of ordered timed entries.
//!
//! The timeline turns raw `(start_ms, end_ms, text)` triples into
//! [`TimedEntry`] values with gap-aware slot durations. Slot computation is
//! the only place in the pipeline that looks at neighbouring entries, so
//! every later stage can treat entries independently.

use thiserror::Error;

use crate::models::TimedEntry;

/// Errors for timeline construction.
#[derive(Error, Debug)]
pub enum TimelineError {
    /// The input contained no entries at all.
    #[error("timeline contains no entries")]
    Empty,

    /// Entries were not sorted by start time.
    #[error("entry {index} starts at {start_ms}ms, before the preceding entry at {prev_start_ms}ms")]
    OutOfOrder {
        index: usize,
        start_ms: i64,
        prev_start_ms: i64,
    },
}

/// Result type for timeline operations.
pub type TimelineResult<T> = Result<T, TimelineError>;

/// An ordered sequence of timed entries with slots computed.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    pub entries: Vec<TimedEntry>,
}

impl Timeline {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total span from the first start to the last end, in milliseconds.
    pub fn span_ms(&self) -> i64 {
        match (self.entries.first(), self.entries.last()) {
            (Some(first), Some(last)) => last.end_ms - first.start_ms,
            _ => 0,
        }
    }
}

/// Timeline plus the indexes of entries whose timestamps needed repair.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub timeline: Timeline,
    /// 1-based indexes of entries whose end time was coerced to a 1ms
    /// minimum duration because it did not come after the start time.
    pub coerced: Vec<usize>,
}

/// Build a timeline from sorted `(start_ms, end_ms, text)` triples.
///
/// An entry whose end does not come after its start is coerced to a 1ms
/// minimum duration and reported, not rejected — a single sloppy timestamp
/// must not kill the whole run. An empty input or out-of-order starts are
/// hard failures because all downstream timing math depends on ordering.
pub fn build(raw: &[(i64, i64, String)]) -> TimelineResult<BuildReport> {
    if raw.is_empty() {
        return Err(TimelineError::Empty);
    }

    let mut coerced = Vec::new();
    let mut entries = Vec::with_capacity(raw.len());

    for (i, (start_ms, end_ms, text)) in raw.iter().enumerate() {
        let index = i + 1;

        if i > 0 && *start_ms < raw[i - 1].0 {
            return Err(TimelineError::OutOfOrder {
                index,
                start_ms: *start_ms,
                prev_start_ms: raw[i - 1].0,
            });
        }

        let mut end_ms = *end_ms;
        if end_ms <= *start_ms {
            tracing::warn!(
                entry = index,
                start_ms,
                end_ms,
                "end time does not follow start time, coercing to 1ms duration"
            );
            end_ms = start_ms + 1;
            coerced.push(index);
        }

        entries.push(TimedEntry {
            index,
            start_ms: *start_ms,
            end_ms,
            text: text.clone(),
            slot_ms: 0, // filled below once the next start is known
        });
    }

    let count = entries.len();
    for i in 0..count {
        let slot = if i + 1 < count {
            entries[i + 1].start_ms - entries[i].start_ms
        } else {
            entries[i].end_ms - entries[i].start_ms
        };
        entries[i].slot_ms = slot.max(1);
    }

    Ok(BuildReport {
        timeline: Timeline { entries },
        coerced,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(entries: &[(i64, i64, &str)]) -> Vec<(i64, i64, String)> {
        entries
            .iter()
            .map(|(s, e, t)| (*s, *e, t.to_string()))
            .collect()
    }

    #[test]
    fn slot_is_distance_to_next_start() {
        let report = build(&raw(&[
            (0, 2_000, "one"),
            (5_000, 7_000, "two"),
            (8_000, 9_500, "three"),
        ]))
        .unwrap();

        let entries = &report.timeline.entries;
        assert_eq!(entries[0].slot_ms, 5_000);
        assert_eq!(entries[1].slot_ms, 3_000);
        // Last entry falls back to its own duration.
        assert_eq!(entries[2].slot_ms, 1_500);
    }

    #[test]
    fn empty_input_is_fatal() {
        assert!(matches!(build(&[]), Err(TimelineError::Empty)));
    }

    #[test]
    fn out_of_order_starts_are_fatal() {
        let result = build(&raw(&[(5_000, 6_000, "late"), (0, 1_000, "early")]));
        assert!(matches!(result, Err(TimelineError::OutOfOrder { index: 2, .. })));
    }

    #[test]
    fn inverted_end_is_coerced_not_rejected() {
        let report = build(&raw(&[(1_000, 1_000, "zero"), (4_000, 3_000, "inverted")])).unwrap();

        assert_eq!(report.coerced, vec![1, 2]);
        let entries = &report.timeline.entries;
        assert_eq!(entries[0].end_ms, 1_001);
        assert_eq!(entries[1].end_ms, 4_001);
        // Coerced last entry keeps the minimum slot.
        assert_eq!(entries[1].slot_ms, 1);
    }

    #[test]
    fn slot_never_drops_below_one() {
        // Two entries starting at the same millisecond.
        let report = build(&raw(&[(2_000, 3_000, "a"), (2_000, 4_000, "b")])).unwrap();
        assert_eq!(report.timeline.entries[0].slot_ms, 1);
    }
}
