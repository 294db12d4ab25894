//! Batched video rendering.
//!
//! Frames are validated, split into batches, and handed to a small pool
//! of workers that drive the encoder concurrently. Each rendered
//! segment is probed before it counts as done.

mod batch;
mod frames;

pub use batch::{
    compute_batch_size, partition, render_batches, RenderOptions, RenderOutcome, MIN_BATCH_SIZE,
};
pub use frames::{validate_frames, FramePrep};

use thiserror::Error;

use crate::media::MediaError;

pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("failed to generate filler frame '{path}': {source}")]
    Filler {
        path: String,
        #[source]
        source: image::ImageError,
    },

    #[error("rendered segment for batch {batch_index} failed validation: {reason}")]
    InvalidSegment { batch_index: usize, reason: String },

    #[error("rendering was cancelled")]
    Cancelled,

    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

impl RenderError {
    fn invalid_segment(batch_index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidSegment {
            batch_index,
            reason: reason.into(),
        }
    }

    fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}
