//! Core data types shared across the pipeline.

mod enums;

pub use enums::{ConcatMode, ShiftPolicy, TempoPolicy};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One timed line with the window it has to play in.
///
/// `slot_ms` is the time available until the *next* entry begins, which is
/// usually larger than the entry's own display duration because of gaps
/// between lines. The last entry's slot is its own duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedEntry {
    /// 1-based entry number.
    pub index: usize,
    /// Display start, in milliseconds.
    pub start_ms: i64,
    /// Display end, in milliseconds (always > start_ms).
    pub end_ms: i64,
    /// Line text (already stripped of markup by the caller).
    pub text: String,
    /// Time available before the next entry starts, in milliseconds (>= 1).
    pub slot_ms: i64,
}

impl TimedEntry {
    /// The entry's own display duration.
    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }
}

/// A synthesized speech clip bound to one timed entry.
///
/// The length is always measured from the file on disk, never assumed from
/// the synthesis request. Tempo resolution and shifting mutate this in
/// place; the audio assembler consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechSegment {
    /// 1-based entry number this clip belongs to.
    pub entry_index: usize,
    /// Rendered clip in the run's scratch area.
    pub clip_path: PathBuf,
    /// Measured clip length, in milliseconds.
    pub length_ms: i64,
    /// Playback speed actually applied by tempo resolution (1.0 = untouched).
    pub applied_speed: f64,
}

impl SpeechSegment {
    pub fn new(entry_index: usize, clip_path: PathBuf, length_ms: i64) -> Self {
        Self {
            entry_index,
            clip_path,
            length_ms,
            applied_speed: 1.0,
        }
    }
}

/// Final placement for one entry after the overflow shifter ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftResult {
    /// 1-based entry number.
    pub entry_index: usize,
    /// Start position after shifting, in milliseconds.
    pub start_ms: i64,
    /// Shift performed on behalf of this entry's overflow (negative = moved
    /// earlier). Bounded by the configured shift limit.
    pub achieved_shift_ms: i64,
    /// Overflow that could not be resolved, in milliseconds.
    pub residual_overflow_ms: i64,
}

/// One rendered still frame and how long it should stay on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Rendered image on disk.
    pub path: PathBuf,
    /// On-screen duration, in milliseconds.
    pub duration_ms: i64,
}

/// A contiguous run of frames rendered together into one video segment.
///
/// Owned exclusively by one rendering worker for its lifetime.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Position of this batch in the overall frame sequence.
    pub batch_index: usize,
    /// Frames in original order.
    pub frames: Vec<FrameRecord>,
}

/// One independently rendered video chunk, validated by probing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSegment {
    /// Batch this segment was rendered from; assembly order key.
    pub batch_index: usize,
    /// Segment file on disk.
    pub path: PathBuf,
}

/// Stream layout and duration of a probed media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamInfo {
    pub has_video: bool,
    pub has_audio: bool,
    /// Container duration, in milliseconds.
    pub duration_ms: i64,
}
