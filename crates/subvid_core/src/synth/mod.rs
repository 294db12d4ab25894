//! Speech segment generation.
//!
//! Calls the external text-to-speech engine once per timed entry and
//! captures the measured clip length. Synthesis failures are fatal for the
//! whole run: a missing clip makes every downstream timing decision
//! meaningless, so there is no per-entry recovery here.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::media::{MediaError, MediaToolkit};
use crate::models::{SpeechSegment, TimedEntry};

/// Sample rate used for silent placeholder clips.
pub const PLACEHOLDER_SAMPLE_RATE: u32 = 24_000;

/// Length of the placeholder written for entries with no text.
pub const PLACEHOLDER_MS: i64 = 10;

/// Shared parameters for every synthesis call in a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesisParams {
    /// Target language code (e.g. "en"), required by multilingual engines.
    #[serde(default)]
    pub language: Option<String>,
    /// Reference voice sample for cloning engines.
    #[serde(default)]
    pub speaker_wav: Option<PathBuf>,
    /// Named preset voice, used when no reference sample is given.
    #[serde(default)]
    pub speaker: Option<String>,
}

/// Opaque engine failure reported by a synthesizer implementation.
pub type EngineError = Box<dyn std::error::Error + Send + Sync>;

/// External text-to-speech engine.
///
/// Implementations render `text` as speech into `out_path` (a WAV file in
/// the run's scratch area). The pipeline never inspects engine internals;
/// it only measures what lands on disk.
pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(
        &self,
        text: &str,
        params: &SynthesisParams,
        out_path: &Path,
    ) -> Result<(), EngineError>;
}

/// Errors during speech segment generation. All fatal.
#[derive(Error, Debug)]
pub enum SynthesisError {
    /// The engine call itself failed.
    #[error("synthesis failed for entry {entry_index}: {cause}")]
    EntryFailed { entry_index: usize, cause: String },

    /// The engine reported success but produced no file.
    #[error("synthesized clip for entry {entry_index} missing at {path}")]
    ClipMissing { entry_index: usize, path: PathBuf },

    /// The rendered clip's length could not be measured.
    #[error("failed to measure clip for entry {entry_index}: {source}")]
    Measure {
        entry_index: usize,
        #[source]
        source: MediaError,
    },

    /// Writing a silent placeholder failed.
    #[error("failed to write placeholder for entry {entry_index}: {source}")]
    Placeholder {
        entry_index: usize,
        #[source]
        source: hound::Error,
    },
}

/// Result type for synthesis operations.
pub type SynthesisResult<T> = Result<T, SynthesisError>;

/// Generate one speech clip per entry into `scratch_dir`.
///
/// Entries with empty text get a 10ms silent placeholder instead of an
/// engine call. Clip lengths are measured from disk after synthesis.
pub fn generate_segments(
    entries: &[TimedEntry],
    synth: &dyn SpeechSynthesizer,
    media: &dyn MediaToolkit,
    params: &SynthesisParams,
    scratch_dir: &Path,
) -> SynthesisResult<Vec<SpeechSegment>> {
    let mut segments = Vec::with_capacity(entries.len());

    for entry in entries {
        let clip_path = scratch_dir.join(format!("{}_audio.wav", entry.index));
        let text = entry.text.trim();

        if text.is_empty() {
            tracing::warn!(entry = entry.index, "empty text, writing silent placeholder");
            write_silence(&clip_path, PLACEHOLDER_MS).map_err(|e| {
                SynthesisError::Placeholder {
                    entry_index: entry.index,
                    source: e,
                }
            })?;
            segments.push(SpeechSegment::new(entry.index, clip_path, PLACEHOLDER_MS));
            continue;
        }

        tracing::debug!(entry = entry.index, "synthesizing speech clip");
        synth
            .synthesize(text, params, &clip_path)
            .map_err(|e| SynthesisError::EntryFailed {
                entry_index: entry.index,
                cause: e.to_string(),
            })?;

        if !clip_path.exists() {
            return Err(SynthesisError::ClipMissing {
                entry_index: entry.index,
                path: clip_path,
            });
        }

        let length_ms = media
            .measure_duration_ms(&clip_path)
            .map_err(|e| SynthesisError::Measure {
                entry_index: entry.index,
                source: e,
            })?;

        tracing::debug!(entry = entry.index, length_ms, "clip rendered");
        segments.push(SpeechSegment::new(entry.index, clip_path, length_ms));
    }

    Ok(segments)
}

/// Write a mono 16-bit silent WAV of the given length.
pub fn write_silence(path: &Path, length_ms: i64) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: PLACEHOLDER_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let samples = (length_ms.max(0) * PLACEHOLDER_SAMPLE_RATE as i64) / 1000;
    let mut writer = hound::WavWriter::create(path, spec)?;
    for _ in 0..samples {
        writer.write_sample(0i16)?;
    }
    writer.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TimedEntry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingSynth {
        calls: AtomicUsize,
        fail_on: Option<usize>,
    }

    impl SpeechSynthesizer for RecordingSynth {
        fn synthesize(
            &self,
            _text: &str,
            _params: &SynthesisParams,
            out_path: &Path,
        ) -> Result<(), EngineError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on == Some(call) {
                return Err("engine exploded".into());
            }
            write_silence(out_path, 500).map_err(|e| -> EngineError { Box::new(e) })
        }
    }

    struct WavMeasure;

    impl MediaToolkit for WavMeasure {
        fn measure_duration_ms(&self, path: &Path) -> crate::media::MediaResult<i64> {
            let reader = hound::WavReader::open(path)
                .map_err(|e| MediaError::parse_error("wav", e.to_string()))?;
            let spec = reader.spec();
            let frames = reader.duration() as i64;
            Ok(frames * 1000 / spec.sample_rate as i64)
        }

        fn change_tempo(&self, _path: &Path, _speed: f64) -> crate::media::MediaResult<()> {
            unimplemented!()
        }

        fn render_batch(
            &self,
            _frames: &[(PathBuf, f64)],
            _out: &Path,
            _fps: u32,
        ) -> crate::media::MediaResult<()> {
            unimplemented!()
        }

        fn probe_streams(&self, _path: &Path) -> crate::media::MediaResult<crate::models::StreamInfo> {
            unimplemented!()
        }

        fn concat(
            &self,
            _inputs: &[PathBuf],
            _out: &Path,
            _mode: crate::models::ConcatMode,
        ) -> crate::media::MediaResult<()> {
            unimplemented!()
        }

        fn mux_audio_video(
            &self,
            _video: &Path,
            _audio: &Path,
            _out: &Path,
        ) -> crate::media::MediaResult<()> {
            unimplemented!()
        }
    }

    fn entry(index: usize, text: &str) -> TimedEntry {
        TimedEntry {
            index,
            start_ms: (index as i64 - 1) * 2_000,
            end_ms: (index as i64 - 1) * 2_000 + 1_500,
            text: text.to_string(),
            slot_ms: 2_000,
        }
    }

    #[test]
    fn empty_text_gets_placeholder_without_engine_call() {
        let dir = tempfile::tempdir().unwrap();
        let synth = RecordingSynth {
            calls: AtomicUsize::new(0),
            fail_on: None,
        };

        let segments = generate_segments(
            &[entry(1, "   "), entry(2, "spoken")],
            &synth,
            &WavMeasure,
            &SynthesisParams::default(),
            dir.path(),
        )
        .unwrap();

        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
        assert_eq!(segments[0].length_ms, PLACEHOLDER_MS);
        assert_eq!(segments[1].length_ms, 500);
        assert!(segments[0].clip_path.exists());
    }

    #[test]
    fn engine_failure_aborts_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let synth = RecordingSynth {
            calls: AtomicUsize::new(0),
            fail_on: Some(2),
        };

        let err = generate_segments(
            &[entry(1, "one"), entry(2, "two"), entry(3, "three")],
            &synth,
            &WavMeasure,
            &SynthesisParams::default(),
            dir.path(),
        )
        .unwrap_err();

        match err {
            SynthesisError::EntryFailed { entry_index, cause } => {
                assert_eq!(entry_index, 2);
                assert!(cause.contains("engine exploded"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn measured_lengths_come_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let synth = RecordingSynth {
            calls: AtomicUsize::new(0),
            fail_on: None,
        };

        let segments = generate_segments(
            &[entry(1, "hello")],
            &synth,
            &WavMeasure,
            &SynthesisParams::default(),
            dir.path(),
        )
        .unwrap();

        // RecordingSynth always writes a 500ms clip regardless of text.
        assert_eq!(segments[0].length_ms, 500);
    }
}
