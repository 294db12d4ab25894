//! Proportional rescaling of frame durations to hit a target total.
//!
//! Used when a rendered section must land on an exact length: every
//! frame duration is scaled by the same factor, clamped to the shortest
//! duration the frame rate can represent, and the final frame absorbs
//! rounding so the sum is exact.

use thiserror::Error;

use crate::models::FrameRecord;

pub type RescaleResult<T> = Result<T, RescaleError>;

#[derive(Error, Debug)]
pub enum RescaleError {
    #[error("target duration must be positive, got {target_ms}ms")]
    InvalidTarget { target_ms: i64 },

    #[error("frame rate must be positive and finite, got {frame_rate}")]
    InvalidFrameRate { frame_rate: f64 },
}

/// Shortest duration a single frame may hold at the given frame rate,
/// rounded up to whole milliseconds.
pub fn min_frame_ms(frame_rate: f64) -> i64 {
    (1_000.0 / frame_rate).ceil() as i64
}

/// Outcome of a rescale pass.
#[derive(Debug, Clone)]
pub struct RescaleReport {
    pub frames: Vec<FrameRecord>,
    /// Factor every duration was multiplied by before clamping.
    pub scale: f64,
    /// Frames clamped up to the minimum representable duration.
    pub floored: usize,
    /// Milliseconds the result overshoots the target when flooring made
    /// the exact total unreachable. Zero in the normal case.
    pub overshoot_ms: i64,
}

/// Scale `frames` so their durations sum to `target_ms`.
///
/// All frames but the last are scaled and rounded independently; the
/// last frame takes whatever remains so the total is exact. Every frame
/// keeps at least [`min_frame_ms`], which can make short targets
/// overshoot.
pub fn rescale(
    frames: &[FrameRecord],
    target_ms: i64,
    frame_rate: f64,
) -> RescaleResult<RescaleReport> {
    if target_ms <= 0 {
        return Err(RescaleError::InvalidTarget { target_ms });
    }
    if !frame_rate.is_finite() || frame_rate <= 0.0 {
        return Err(RescaleError::InvalidFrameRate { frame_rate });
    }

    let total: i64 = frames.iter().map(|f| f.duration_ms).sum();
    if total <= 0 {
        // Covers the empty list too. Nothing meaningful to scale, so
        // hand the input back untouched rather than guessing at durations.
        tracing::error!(target_ms, "frames have zero total duration, leaving them unchanged");
        return Ok(RescaleReport {
            frames: frames.to_vec(),
            scale: 1.0,
            floored: 0,
            overshoot_ms: 0,
        });
    }

    let scale = target_ms as f64 / total as f64;
    let floor = min_frame_ms(frame_rate);

    let mut scaled = Vec::with_capacity(frames.len());
    let mut floored = 0usize;
    let mut consumed = 0i64;

    for frame in &frames[..frames.len() - 1] {
        let raw = (frame.duration_ms as f64 * scale).round() as i64;
        let duration_ms = if raw < floor {
            floored += 1;
            floor
        } else {
            raw
        };
        consumed += duration_ms;
        scaled.push(FrameRecord {
            path: frame.path.clone(),
            duration_ms,
        });
    }

    // The last frame closes the gap exactly, subject to the floor.
    let last = frames.last().expect("frames is non-empty");
    let remainder = target_ms - consumed;
    let last_ms = if remainder < floor {
        floored += 1;
        floor
    } else {
        remainder
    };
    scaled.push(FrameRecord {
        path: last.path.clone(),
        duration_ms: last_ms,
    });

    let overshoot_ms = (consumed + last_ms - target_ms).max(0);
    if overshoot_ms > 0 {
        tracing::warn!(
            target_ms,
            overshoot_ms,
            floor_ms = floor,
            "minimum frame duration prevents exact rescale"
        );
    }

    tracing::debug!(
        frames = scaled.len(),
        scale,
        target_ms,
        floored,
        "rescaled frame durations"
    );

    Ok(RescaleReport {
        frames: scaled,
        scale,
        floored,
        overshoot_ms,
    })
}
