//! Assembly of the final narration track.
//!
//! Clips are mixed onto a silent base track at their resolved start
//! positions. The base track always outlives the last clip by a fixed
//! tail so downstream muxing never has to pad.

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::models::{ShiftResult, SpeechSegment};
use crate::timing::OVERFLOW_TOLERANCE_MS;

/// Silence appended after the final clip, in milliseconds.
pub const TRACK_TAIL_MS: i64 = 1_000;

pub type AudioResult<T> = Result<T, AudioError>;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("failed to read clip '{path}': {source}")]
    ClipRead {
        path: String,
        #[source]
        source: hound::Error,
    },

    #[error("clip '{path}' is {channels}ch {bits}-bit, expected mono 16-bit")]
    ClipFormat {
        path: String,
        channels: u16,
        bits: u16,
    },

    #[error("clip '{path}' has sample rate {found}Hz, track uses {expected}Hz")]
    SampleRateMismatch {
        path: String,
        found: u32,
        expected: u32,
    },

    #[error("segment and placement counts differ ({segments} vs {placements})")]
    PlacementMismatch { segments: usize, placements: usize },

    #[error("failed to write track '{path}': {source}")]
    TrackWrite {
        path: String,
        #[source]
        source: hound::Error,
    },
}

impl AudioError {
    fn read(path: &Path, source: hound::Error) -> Self {
        Self::ClipRead {
            path: path.display().to_string(),
            source,
        }
    }

    fn write(path: &Path, source: hound::Error) -> Self {
        Self::TrackWrite {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Timing enforcement for clip placement.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackOptions {
    /// Drop clips that would overlap the previous one beyond tolerance
    /// instead of mixing them in.
    pub strict_timing: bool,
}

/// What actually happened while mixing the track.
#[derive(Debug, Clone, Serialize)]
pub struct TrackReport {
    pub path: PathBuf,
    pub total_ms: i64,
    pub sample_rate: u32,
    /// Entry indices dropped under strict timing.
    pub skipped: Vec<usize>,
    /// Entry indices mixed despite overlapping the previous clip.
    pub overlapped: Vec<usize>,
    /// Entry indices whose tail ran past the end of the track.
    pub truncated: Vec<usize>,
}

fn ms_to_samples(ms: i64, sample_rate: u32) -> usize {
    ((ms.max(0) as u64) * sample_rate as u64 / 1_000) as usize
}

fn read_clip(path: &Path, expected_rate: Option<u32>) -> AudioResult<(Vec<i16>, u32)> {
    let mut reader = hound::WavReader::open(path).map_err(|e| AudioError::read(path, e))?;
    let wavspec = reader.spec();

    if wavspec.channels != 1 || wavspec.bits_per_sample != 16 {
        return Err(AudioError::ClipFormat {
            path: path.display().to_string(),
            channels: wavspec.channels,
            bits: wavspec.bits_per_sample,
        });
    }
    if let Some(expected) = expected_rate {
        if wavspec.sample_rate != expected {
            return Err(AudioError::SampleRateMismatch {
                path: path.display().to_string(),
                found: wavspec.sample_rate,
                expected,
            });
        }
    }

    let samples = reader
        .samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AudioError::read(path, e))?;
    Ok((samples, wavspec.sample_rate))
}

/// Mix every clip onto a silent base track and write it to `out_path`.
///
/// Placements must be in entry order and parallel to `segments`. The
/// track length is the furthest clip end plus [`TRACK_TAIL_MS`]. The
/// sample rate is taken from the first clip.
pub fn assemble_track(
    segments: &[SpeechSegment],
    placements: &[ShiftResult],
    opts: TrackOptions,
    out_path: &Path,
) -> AudioResult<TrackReport> {
    if segments.len() != placements.len() {
        return Err(AudioError::PlacementMismatch {
            segments: segments.len(),
            placements: placements.len(),
        });
    }

    let mut clips = Vec::with_capacity(segments.len());
    let mut sample_rate = None;
    for segment in segments {
        let (samples, rate) = read_clip(&segment.clip_path, sample_rate)?;
        sample_rate.get_or_insert(rate);
        clips.push(samples);
    }
    let sample_rate = sample_rate.unwrap_or(crate::synth::PLACEHOLDER_SAMPLE_RATE);

    let track_end_ms = segments
        .iter()
        .zip(placements)
        .map(|(seg, place)| place.start_ms.max(0) + seg.length_ms)
        .max()
        .unwrap_or(0);
    let total_ms = track_end_ms + TRACK_TAIL_MS;
    let total_samples = ms_to_samples(total_ms, sample_rate);

    // Mix in a wider type so overlapping clips sum without wrapping.
    let mut mix = vec![0i32; total_samples];

    let mut report = TrackReport {
        path: out_path.to_path_buf(),
        total_ms,
        sample_rate,
        skipped: Vec::new(),
        overlapped: Vec::new(),
        truncated: Vec::new(),
    };

    // Starts at zero, matching the clamped floor for placements; no clip
    // can legally end earlier.
    let mut prev_end_ms = 0i64;
    for ((segment, placement), samples) in segments.iter().zip(placements).zip(&clips) {
        let mut start_ms = placement.start_ms;
        if start_ms < 0 {
            tracing::warn!(
                entry = segment.entry_index,
                start_ms,
                "clip starts before the timeline, clamping to zero"
            );
            start_ms = 0;
        }

        if start_ms < prev_end_ms - OVERFLOW_TOLERANCE_MS {
            if opts.strict_timing {
                tracing::warn!(
                    entry = segment.entry_index,
                    overlap_ms = prev_end_ms - start_ms,
                    "dropping clip that overlaps the previous one"
                );
                report.skipped.push(segment.entry_index);
                continue;
            }
            report.overlapped.push(segment.entry_index);
        }

        let offset = ms_to_samples(start_ms, sample_rate);
        let available = total_samples.saturating_sub(offset);
        if samples.len() > available {
            report.truncated.push(segment.entry_index);
        }

        for (i, &sample) in samples.iter().take(available).enumerate() {
            mix[offset + i] += i32::from(sample);
        }

        prev_end_ms = prev_end_ms.max(start_ms + segment.length_ms);
    }

    let wavspec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::create(out_path, wavspec).map_err(|e| AudioError::write(out_path, e))?;
    for value in mix {
        let clamped = value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
        writer
            .write_sample(clamped)
            .map_err(|e| AudioError::write(out_path, e))?;
    }
    writer.finalize().map_err(|e| AudioError::write(out_path, e))?;

    tracing::debug!(
        path = %out_path.display(),
        total_ms,
        skipped = report.skipped.len(),
        overlapped = report.overlapped.len(),
        "assembled narration track"
    );

    Ok(report)
}
