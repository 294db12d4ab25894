//! Tempo resolution: fit speech clips into their time windows by bounded
//! speed-up.

use crate::media::MediaToolkit;
use crate::models::{SpeechSegment, TempoPolicy, TimedEntry};

use super::{TEMPO_SAFE_MAX, TEMPO_SAFE_MIN};

/// Speed changes smaller than this are not worth an encoder round-trip.
const SPEED_EPSILON: f64 = 1e-3;

/// Per-run tempo configuration.
#[derive(Debug, Clone)]
pub struct TempoOptions {
    pub policy: TempoPolicy,
    /// Fixed multiplier for [`TempoPolicy::Uniform`].
    pub uniform_speed: f64,
    /// Upper bound on computed speed-up for overflow/precise policies.
    pub tempo_limit: f64,
}

impl Default for TempoOptions {
    fn default() -> Self {
        Self {
            policy: TempoPolicy::Overflow,
            uniform_speed: 1.0,
            tempo_limit: 2.0,
        }
    }
}

/// What happened to one segment during tempo resolution.
#[derive(Debug, Clone)]
pub struct TempoAdjustment {
    pub entry_index: usize,
    /// Speed the timing math asked for before any clamping.
    pub required_speed: f64,
    /// Speed actually applied (1.0 when nothing was done).
    pub applied_speed: f64,
    /// Whether `required_speed` was clamped to the configured limit.
    pub clamped: bool,
    /// Encoder failure message, if the tempo call failed. The segment keeps
    /// its original length in that case.
    pub failure: Option<String>,
}

/// Summary of a tempo resolution pass.
#[derive(Debug, Clone, Default)]
pub struct TempoOutcome {
    /// One record per segment whose speed was recomputed (including clamps
    /// and failures); untouched segments are not listed.
    pub adjustments: Vec<TempoAdjustment>,
}

impl TempoOutcome {
    /// Adjustments where the encoder call failed and the clip was kept as-is.
    pub fn failures(&self) -> impl Iterator<Item = &TempoAdjustment> {
        self.adjustments.iter().filter(|a| a.failure.is_some())
    }

    /// Adjustments whose requested speed hit the configured limit.
    pub fn clamps(&self) -> impl Iterator<Item = &TempoAdjustment> {
        self.adjustments.iter().filter(|a| a.clamped)
    }
}

/// Apply the configured tempo policy to every segment, in entry order.
///
/// Segments are mutated in place: `applied_speed` records the multiplier
/// and `length_ms` is re-measured from disk after each successful encoder
/// call. Encoder failures are recovered locally — the clip stays at its
/// original speed and the failure is reported in the outcome — because a
/// slightly long clip degrades sync while an aborted run produces nothing.
///
/// Re-running on already-resolved segments is a no-op: a clip whose length
/// fits its target never gets touched.
pub fn resolve_tempo(
    entries: &[TimedEntry],
    segments: &mut [SpeechSegment],
    media: &dyn MediaToolkit,
    opts: &TempoOptions,
) -> TempoOutcome {
    let mut outcome = TempoOutcome::default();

    if opts.policy == TempoPolicy::None {
        return outcome;
    }

    for (entry, segment) in entries.iter().zip(segments.iter_mut()) {
        if segment.length_ms <= 0 {
            tracing::warn!(entry = entry.index, "zero-length clip, skipping tempo");
            continue;
        }

        let required_speed = match opts.policy {
            TempoPolicy::None => unreachable!(),
            TempoPolicy::Uniform => opts.uniform_speed,
            TempoPolicy::Overflow | TempoPolicy::Precise => {
                let target_ms = match opts.policy {
                    TempoPolicy::Overflow => entry.slot_ms,
                    _ => entry.duration_ms(),
                }
                .max(1);

                if segment.length_ms <= target_ms {
                    continue;
                }
                segment.length_ms as f64 / target_ms as f64
            }
        };

        let mut applied_speed = required_speed;
        let mut clamped = false;

        if matches!(opts.policy, TempoPolicy::Overflow | TempoPolicy::Precise)
            && applied_speed > opts.tempo_limit
        {
            tracing::warn!(
                entry = entry.index,
                required = required_speed,
                limit = opts.tempo_limit,
                "required speed exceeds tempo limit, clamping"
            );
            applied_speed = opts.tempo_limit;
            clamped = true;
        }

        // The encoder's atempo filter misbehaves outside this range.
        let safe_speed = applied_speed.clamp(TEMPO_SAFE_MIN, TEMPO_SAFE_MAX);
        if (safe_speed - applied_speed).abs() > SPEED_EPSILON {
            tracing::warn!(
                entry = entry.index,
                requested = applied_speed,
                clamped_to = safe_speed,
                "speed outside encoder safe range"
            );
            applied_speed = safe_speed;
            clamped = true;
        }

        if (applied_speed - 1.0).abs() <= SPEED_EPSILON {
            continue;
        }

        let mut adjustment = TempoAdjustment {
            entry_index: entry.index,
            required_speed,
            applied_speed,
            clamped,
            failure: None,
        };

        match media.change_tempo(&segment.clip_path, applied_speed) {
            Ok(()) => {
                segment.applied_speed = applied_speed;
                match media.measure_duration_ms(&segment.clip_path) {
                    Ok(new_length) => {
                        tracing::debug!(
                            entry = entry.index,
                            speed = applied_speed,
                            new_length_ms = new_length,
                            "tempo adjusted"
                        );
                        segment.length_ms = new_length;
                    }
                    Err(e) => {
                        // Fall back to the arithmetic length; the clip on
                        // disk was still adjusted.
                        tracing::warn!(entry = entry.index, error = %e, "re-measure failed");
                        segment.length_ms =
                            (segment.length_ms as f64 / applied_speed).round() as i64;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    entry = entry.index,
                    error = %e,
                    "tempo adjustment failed, keeping original clip"
                );
                adjustment.applied_speed = 1.0;
                adjustment.failure = Some(e.to_string());
            }
        }

        outcome.adjustments.push(adjustment);
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaError, MediaResult};
    use crate::models::{ConcatMode, StreamInfo};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    /// Tracks per-clip lengths and applies tempo changes arithmetically.
    struct FakeMedia {
        lengths: Mutex<HashMap<PathBuf, i64>>,
        fail_tempo: bool,
    }

    impl FakeMedia {
        fn new(lengths: &[(&str, i64)]) -> Self {
            Self {
                lengths: Mutex::new(
                    lengths
                        .iter()
                        .map(|(p, l)| (PathBuf::from(p), *l))
                        .collect(),
                ),
                fail_tempo: false,
            }
        }
    }

    impl MediaToolkit for FakeMedia {
        fn measure_duration_ms(&self, path: &Path) -> MediaResult<i64> {
            self.lengths
                .lock()
                .get(path)
                .copied()
                .ok_or_else(|| MediaError::FileNotFound(path.to_path_buf()))
        }

        fn change_tempo(&self, path: &Path, speed: f64) -> MediaResult<()> {
            if self.fail_tempo {
                return Err(MediaError::command_failed("ffmpeg", 1, "atempo failed"));
            }
            let mut lengths = self.lengths.lock();
            let len = lengths
                .get_mut(path)
                .ok_or_else(|| MediaError::FileNotFound(path.to_path_buf()))?;
            *len = (*len as f64 / speed).round() as i64;
            Ok(())
        }

        fn render_batch(&self, _: &[(PathBuf, f64)], _: &Path, _: u32) -> MediaResult<()> {
            unimplemented!()
        }

        fn probe_streams(&self, _: &Path) -> MediaResult<StreamInfo> {
            unimplemented!()
        }

        fn concat(&self, _: &[PathBuf], _: &Path, _: ConcatMode) -> MediaResult<()> {
            unimplemented!()
        }

        fn mux_audio_video(&self, _: &Path, _: &Path, _: &Path) -> MediaResult<()> {
            unimplemented!()
        }
    }

    fn entry(index: usize, start_ms: i64, end_ms: i64, slot_ms: i64) -> TimedEntry {
        TimedEntry {
            index,
            start_ms,
            end_ms,
            text: format!("entry {index}"),
            slot_ms,
        }
    }

    fn segment(index: usize, path: &str, length_ms: i64) -> SpeechSegment {
        SpeechSegment::new(index, PathBuf::from(path), length_ms)
    }

    #[test]
    fn fitting_clips_are_left_alone() {
        // Two 4s clips in 5s slots: nothing to do.
        let entries = vec![entry(1, 0, 4_500, 5_000), entry(2, 5_000, 9_500, 5_000)];
        let mut segments = vec![segment(1, "/t/1.wav", 4_000), segment(2, "/t/2.wav", 4_000)];
        let media = FakeMedia::new(&[("/t/1.wav", 4_000), ("/t/2.wav", 4_000)]);

        let outcome = resolve_tempo(
            &entries,
            &mut segments,
            &media,
            &TempoOptions {
                policy: TempoPolicy::Overflow,
                uniform_speed: 1.0,
                tempo_limit: 2.0,
            },
        );

        assert!(outcome.adjustments.is_empty());
        assert_eq!(segments[0].applied_speed, 1.0);
        assert_eq!(segments[1].applied_speed, 1.0);
        assert_eq!(segments[0].length_ms, 4_000);
    }

    #[test]
    fn overflowing_clip_clamps_to_limit() {
        // 5s clip in a 2s slot wants 2.5x but the limit is 2.0.
        let entries = vec![entry(1, 0, 2_000, 2_000)];
        let mut segments = vec![segment(1, "/t/1.wav", 5_000)];
        let media = FakeMedia::new(&[("/t/1.wav", 5_000)]);

        let outcome = resolve_tempo(
            &entries,
            &mut segments,
            &media,
            &TempoOptions {
                policy: TempoPolicy::Overflow,
                uniform_speed: 1.0,
                tempo_limit: 2.0,
            },
        );

        assert_eq!(outcome.adjustments.len(), 1);
        assert!(outcome.adjustments[0].clamped);
        assert_eq!(outcome.adjustments[0].applied_speed, 2.0);
        assert_eq!(segments[0].applied_speed, 2.0);
        // 5000ms at 2x leaves 2500ms: 500ms of residual overflow for the shifter.
        assert_eq!(segments[0].length_ms, 2_500);
    }

    #[test]
    fn precise_policy_targets_display_duration() {
        // Slot is generous (4s) but the display window is only 1s.
        let entries = vec![entry(1, 0, 1_000, 4_000)];
        let mut segments = vec![segment(1, "/t/1.wav", 2_000)];
        let media = FakeMedia::new(&[("/t/1.wav", 2_000)]);

        resolve_tempo(
            &entries,
            &mut segments,
            &media,
            &TempoOptions {
                policy: TempoPolicy::Precise,
                uniform_speed: 1.0,
                tempo_limit: 4.0,
            },
        );

        assert_eq!(segments[0].applied_speed, 2.0);
        assert_eq!(segments[0].length_ms, 1_000);
    }

    #[test]
    fn uniform_policy_hits_every_segment() {
        let entries = vec![entry(1, 0, 2_000, 3_000), entry(2, 3_000, 5_000, 3_000)];
        let mut segments = vec![segment(1, "/t/1.wav", 1_000), segment(2, "/t/2.wav", 2_000)];
        let media = FakeMedia::new(&[("/t/1.wav", 1_000), ("/t/2.wav", 2_000)]);

        resolve_tempo(
            &entries,
            &mut segments,
            &media,
            &TempoOptions {
                policy: TempoPolicy::Uniform,
                uniform_speed: 1.5,
                tempo_limit: 2.0,
            },
        );

        assert_eq!(segments[0].length_ms, 667);
        assert_eq!(segments[1].length_ms, 1_333);
        assert_eq!(segments[0].applied_speed, 1.5);
    }

    #[test]
    fn encoder_failure_keeps_clip_unadjusted() {
        let entries = vec![entry(1, 0, 2_000, 2_000)];
        let mut segments = vec![segment(1, "/t/1.wav", 5_000)];
        let mut media = FakeMedia::new(&[("/t/1.wav", 5_000)]);
        media.fail_tempo = true;

        let outcome = resolve_tempo(
            &entries,
            &mut segments,
            &media,
            &TempoOptions::default(),
        );

        assert_eq!(outcome.failures().count(), 1);
        assert_eq!(segments[0].length_ms, 5_000);
        assert_eq!(segments[0].applied_speed, 1.0);
    }

    #[test]
    fn rerun_on_resolved_segment_is_a_noop() {
        // 5s clip in a 3s slot wants 5/3x, within the 2.0 limit.
        let entries = vec![entry(1, 0, 3_000, 3_000)];
        let mut segments = vec![segment(1, "/t/1.wav", 5_000)];
        let media = FakeMedia::new(&[("/t/1.wav", 5_000)]);
        let opts = TempoOptions::default();

        resolve_tempo(&entries, &mut segments, &media, &opts);
        let length_after_first = segments[0].length_ms;
        assert_eq!(length_after_first, 3_000);

        // Second pass: clip now fits its slot, nothing changes.
        // applied_speed is reset only by a fresh synthesis, so keep a copy.
        let mut second = vec![SpeechSegment::new(
            1,
            segments[0].clip_path.clone(),
            length_after_first,
        )];
        let outcome = resolve_tempo(&entries, &mut second, &media, &opts);

        assert!(outcome.adjustments.is_empty());
        assert_eq!(second[0].applied_speed, 1.0);
        assert_eq!(second[0].length_ms, length_after_first);
    }
}
