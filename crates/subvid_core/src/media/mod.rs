//! External media toolkit interface.
//!
//! Everything the pipeline needs from an encoder goes through the
//! [`MediaToolkit`] trait: duration probing, pitch-preserving tempo change,
//! frame-list rendering, concatenation and muxing. The shipped
//! implementation shells out to ffmpeg/ffprobe; tests substitute mocks.
//!
//! All durations cross this boundary as integer milliseconds. Conversion to
//! the encoder's seconds happens inside the adapter, nowhere else.

mod ffmpeg;
mod probe;

pub use ffmpeg::FfmpegToolkit;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::{ConcatMode, StreamInfo};

/// Errors from external encoder invocations.
#[derive(Error, Debug)]
pub enum MediaError {
    /// The tool binary could not be started at all.
    #[error("failed to spawn {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    /// The tool ran but exited with a failure status.
    #[error("{tool} failed with exit code {exit_code}: {message}")]
    CommandFailed {
        tool: String,
        exit_code: i32,
        message: String,
    },

    /// The tool produced output we could not interpret.
    #[error("failed to parse {what}: {message}")]
    ParseError { what: String, message: String },

    /// An input file was missing before the tool was even invoked.
    #[error("media file not found: {0}")]
    FileNotFound(PathBuf),

    /// Filesystem error while staging tool input/output.
    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: io::Error,
    },
}

impl MediaError {
    pub fn spawn(tool: impl Into<String>, source: io::Error) -> Self {
        Self::Spawn {
            tool: tool.into(),
            source,
        }
    }

    pub fn command_failed(tool: impl Into<String>, exit_code: i32, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            tool: tool.into(),
            exit_code,
            message: message.into(),
        }
    }

    pub fn parse_error(what: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError {
            what: what.into(),
            message: message.into(),
        }
    }

    pub fn io(operation: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Abstract encoder the pipeline drives.
///
/// Implementations must be safe to call from multiple rendering workers at
/// once; each call is blocking and owns its own scratch files.
pub trait MediaToolkit: Send + Sync {
    /// Measure a media file's duration, in milliseconds.
    fn measure_duration_ms(&self, path: &Path) -> MediaResult<i64>;

    /// Change audio playback speed in place without pitch distortion.
    ///
    /// `speed` > 1.0 shortens the clip. Callers keep `speed` within the
    /// encoder's safe operating range of roughly 0.5x-4.0x.
    fn change_tempo(&self, path: &Path, speed: f64) -> MediaResult<()>;

    /// Render an ordered list of (image, duration-in-seconds) pairs into one
    /// video segment at a fixed constant frame rate.
    fn render_batch(&self, frames: &[(PathBuf, f64)], out_path: &Path, frame_rate: u32)
        -> MediaResult<()>;

    /// Report which stream types a file carries and its duration.
    fn probe_streams(&self, path: &Path) -> MediaResult<StreamInfo>;

    /// Concatenate media files in the given order into one output.
    fn concat(&self, inputs: &[PathBuf], out_path: &Path, mode: ConcatMode) -> MediaResult<()>;

    /// Multiplex a video stream and an audio track into one container.
    fn mux_audio_video(&self, video: &Path, audio: &Path, out_path: &Path) -> MediaResult<()>;
}
