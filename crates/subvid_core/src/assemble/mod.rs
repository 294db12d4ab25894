//! Final program assembly.
//!
//! Rendered batch segments are ordered, concatenated, reconciled
//! against the narration track's length, and muxed into the output
//! container.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::media::{MediaError, MediaToolkit};
use crate::models::{ConcatMode, VideoSegment};
use crate::timing::{TEMPO_SAFE_MAX, TEMPO_SAFE_MIN};

pub type AssembleResult<T> = Result<T, AssembleError>;

#[derive(Error, Debug)]
pub enum AssembleError {
    #[error("no valid video segments to assemble")]
    NoValidSegments,

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("concatenated video carries no video stream: {path}")]
    MissingVideoStream { path: String },

    #[error(
        "audio/video drift of {drift_ms}ms could not be reconciled \
         (video {video_ms}ms, audio {audio_ms}ms)"
    )]
    SyncReconciliation {
        video_ms: i64,
        audio_ms: i64,
        drift_ms: i64,
    },

    #[error("I/O error in {operation}: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

impl AssembleError {
    fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssembleOptions {
    pub concat_mode: ConcatMode,
    /// Largest audio/video length difference accepted without
    /// stretching the narration track.
    pub sync_tolerance_ms: i64,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        Self {
            concat_mode: ConcatMode::Copy,
            sync_tolerance_ms: 100,
        }
    }
}

/// What the assembly pass produced.
#[derive(Debug, Clone)]
pub struct AssembleReport {
    pub output_path: PathBuf,
    pub video_ms: i64,
    /// Final narration length, `None` when assembling video only.
    pub audio_ms: Option<i64>,
    /// Speed applied to the narration track to close the drift, 1.0
    /// when no stretch was needed.
    pub audio_speed: f64,
}

fn ordered_existing(mut segments: Vec<VideoSegment>) -> Vec<VideoSegment> {
    segments.retain(|segment| {
        let present = segment.path.is_file();
        if !present {
            tracing::warn!(
                batch = segment.batch_index,
                path = %segment.path.display(),
                "dropping segment whose file is missing"
            );
        }
        present
    });
    // Workers may have finished out of order; playback order is batch order.
    segments.sort_by_key(|segment| segment.batch_index);
    segments
}

/// Stretch the narration to the video's length when drift exceeds
/// tolerance. Works on a scratch copy so the original track survives.
fn reconcile_audio(
    audio: &Path,
    video_ms: i64,
    media: &dyn MediaToolkit,
    scratch_dir: &Path,
    tolerance_ms: i64,
) -> AssembleResult<(PathBuf, i64, f64)> {
    let audio_ms = media.measure_duration_ms(audio)?;
    let drift = audio_ms - video_ms;
    if drift.abs() <= tolerance_ms {
        return Ok((audio.to_path_buf(), audio_ms, 1.0));
    }

    let speed = audio_ms as f64 / video_ms as f64;
    if !(TEMPO_SAFE_MIN..=TEMPO_SAFE_MAX).contains(&speed) {
        return Err(AssembleError::SyncReconciliation {
            video_ms,
            audio_ms,
            drift_ms: drift,
        });
    }

    tracing::info!(
        video_ms,
        audio_ms,
        speed,
        "stretching narration track to match video length"
    );

    let synced = scratch_dir.join("track_synced.wav");
    std::fs::copy(audio, &synced).map_err(|e| AssembleError::io("audio staging", e))?;
    media.change_tempo(&synced, speed)?;

    let synced_ms = media.measure_duration_ms(&synced)?;
    let remaining = synced_ms - video_ms;
    if remaining.abs() > tolerance_ms {
        return Err(AssembleError::SyncReconciliation {
            video_ms,
            audio_ms: synced_ms,
            drift_ms: remaining,
        });
    }

    Ok((synced, synced_ms, speed))
}

/// Concatenate rendered segments, align the narration track to the
/// result, and mux both into `out_path`.
///
/// With `audio_track` absent the concatenated video itself becomes the
/// output.
pub fn assemble_program(
    segments: Vec<VideoSegment>,
    audio_track: Option<&Path>,
    media: &dyn MediaToolkit,
    scratch_dir: &Path,
    opts: &AssembleOptions,
    out_path: &Path,
) -> AssembleResult<AssembleReport> {
    let segments = ordered_existing(segments);
    if segments.is_empty() {
        return Err(AssembleError::NoValidSegments);
    }

    let inputs: Vec<_> = segments.iter().map(|s| s.path.clone()).collect();
    let combined = scratch_dir.join("combined.mp4");
    media.concat(&inputs, &combined, opts.concat_mode)?;

    let info = media.probe_streams(&combined)?;
    if !info.has_video {
        return Err(AssembleError::MissingVideoStream {
            path: combined.display().to_string(),
        });
    }
    let video_ms = info.duration_ms;

    let Some(audio) = audio_track else {
        std::fs::copy(&combined, out_path).map_err(|e| AssembleError::io("video copy", e))?;
        tracing::info!(path = %out_path.display(), video_ms, "assembled video-only program");
        return Ok(AssembleReport {
            output_path: out_path.to_path_buf(),
            video_ms,
            audio_ms: None,
            audio_speed: 1.0,
        });
    };

    let (aligned_audio, audio_ms, audio_speed) = reconcile_audio(
        audio,
        video_ms,
        media,
        scratch_dir,
        opts.sync_tolerance_ms,
    )?;

    media.mux_audio_video(&combined, &aligned_audio, out_path)?;
    tracing::info!(
        path = %out_path.display(),
        video_ms,
        audio_ms,
        audio_speed,
        "assembled program"
    );

    Ok(AssembleReport {
        output_path: out_path.to_path_buf(),
        video_ms,
        audio_ms: Some(audio_ms),
        audio_speed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaResult;
    use crate::models::StreamInfo;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// Fake encoder with path-keyed durations and call recording.
    struct FakeMedia {
        durations: Mutex<HashMap<PathBuf, i64>>,
        video_ms: i64,
        concat_inputs: Mutex<Vec<PathBuf>>,
        muxed: Mutex<Option<(PathBuf, PathBuf)>>,
    }

    impl FakeMedia {
        fn new(video_ms: i64) -> Self {
            Self {
                durations: Mutex::new(HashMap::new()),
                video_ms,
                concat_inputs: Mutex::new(Vec::new()),
                muxed: Mutex::new(None),
            }
        }

        fn set_duration(&self, path: &Path, ms: i64) {
            self.durations.lock().insert(path.to_path_buf(), ms);
        }

        /// Resolves staged copies too: an unknown path inherits the
        /// duration of the ledger entry with identical file contents.
        fn duration_of(&self, path: &Path) -> i64 {
            let durations = self.durations.lock();
            if let Some(ms) = durations.get(path) {
                return *ms;
            }
            let bytes = std::fs::read(path).unwrap();
            for (known, ms) in durations.iter() {
                if known.is_file() && std::fs::read(known).unwrap() == bytes {
                    return *ms;
                }
            }
            panic!("no duration registered for {}", path.display());
        }
    }

    impl MediaToolkit for FakeMedia {
        fn measure_duration_ms(&self, path: &Path) -> MediaResult<i64> {
            Ok(self.duration_of(path))
        }

        fn change_tempo(&self, path: &Path, speed: f64) -> MediaResult<()> {
            let current = self.duration_of(path);
            self.durations
                .lock()
                .insert(path.to_path_buf(), (current as f64 / speed).round() as i64);
            Ok(())
        }

        fn render_batch(&self, _: &[(PathBuf, f64)], _: &Path, _: u32) -> MediaResult<()> {
            unimplemented!("not used by assembly")
        }

        fn probe_streams(&self, _: &Path) -> MediaResult<StreamInfo> {
            Ok(StreamInfo {
                has_video: true,
                has_audio: false,
                duration_ms: self.video_ms,
            })
        }

        fn concat(&self, inputs: &[PathBuf], out: &Path, _: ConcatMode) -> MediaResult<()> {
            *self.concat_inputs.lock() = inputs.to_vec();
            std::fs::write(out, b"video").unwrap();
            Ok(())
        }

        fn mux_audio_video(&self, video: &Path, audio: &Path, out: &Path) -> MediaResult<()> {
            *self.muxed.lock() = Some((video.to_path_buf(), audio.to_path_buf()));
            std::fs::write(out, b"program").unwrap();
            Ok(())
        }
    }

    fn segment(dir: &TempDir, batch_index: usize) -> VideoSegment {
        let path = dir.path().join(format!("segment_{batch_index:04}.mp4"));
        std::fs::write(&path, b"seg").unwrap();
        VideoSegment { batch_index, path }
    }

    fn audio_track(dir: &TempDir, media: &FakeMedia, ms: i64) -> PathBuf {
        let path = dir.path().join("track.wav");
        std::fs::write(&path, b"wav").unwrap();
        media.set_duration(&path, ms);
        path
    }

    #[test]
    fn segments_are_concatenated_in_batch_order() {
        let dir = TempDir::new().unwrap();
        let media = FakeMedia::new(10_000);
        let segments = vec![segment(&dir, 2), segment(&dir, 0), segment(&dir, 1)];
        let audio = audio_track(&dir, &media, 10_050);
        let out = dir.path().join("out.mp4");

        assemble_program(
            segments,
            Some(&audio),
            &media,
            dir.path(),
            &AssembleOptions::default(),
            &out,
        )
        .unwrap();

        let inputs = media.concat_inputs.lock();
        let names: Vec<_> = inputs
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["segment_0000.mp4", "segment_0001.mp4", "segment_0002.mp4"]
        );
    }

    #[test]
    fn missing_segment_files_are_dropped_and_empty_input_fails() {
        let dir = TempDir::new().unwrap();
        let media = FakeMedia::new(10_000);
        let ghost = VideoSegment {
            batch_index: 0,
            path: dir.path().join("never-rendered.mp4"),
        };
        let out = dir.path().join("out.mp4");

        let err = assemble_program(
            vec![ghost],
            None,
            &media,
            dir.path(),
            &AssembleOptions::default(),
            &out,
        )
        .unwrap_err();

        assert!(matches!(err, AssembleError::NoValidSegments));
    }

    #[test]
    fn small_drift_skips_the_stretch() {
        let dir = TempDir::new().unwrap();
        let media = FakeMedia::new(10_000);
        let segments = vec![segment(&dir, 0)];
        let audio = audio_track(&dir, &media, 10_080);
        let out = dir.path().join("out.mp4");

        let report = assemble_program(
            segments,
            Some(&audio),
            &media,
            dir.path(),
            &AssembleOptions::default(),
            &out,
        )
        .unwrap();

        assert_eq!(report.audio_speed, 1.0);
        assert_eq!(report.audio_ms, Some(10_080));
        // The original track was muxed, not a stretched copy.
        let (_, muxed_audio) = media.muxed.lock().clone().unwrap();
        assert_eq!(muxed_audio, audio);
    }

    #[test]
    fn large_drift_stretches_the_narration() {
        let dir = TempDir::new().unwrap();
        let media = FakeMedia::new(10_000);
        let segments = vec![segment(&dir, 0)];
        let audio = audio_track(&dir, &media, 12_000);
        let out = dir.path().join("out.mp4");

        let report = assemble_program(
            segments,
            Some(&audio),
            &media,
            dir.path(),
            &AssembleOptions::default(),
            &out,
        )
        .unwrap();

        assert!((report.audio_speed - 1.2).abs() < 1e-9);
        assert_eq!(report.audio_ms, Some(10_000));
        let (_, muxed_audio) = media.muxed.lock().clone().unwrap();
        assert_eq!(muxed_audio, dir.path().join("track_synced.wav"));
        // The stretch worked on a staged copy, never the original track.
        assert_eq!(*media.durations.lock().get(&audio).unwrap(), 12_000);
    }

    #[test]
    fn absurd_drift_is_an_error() {
        let dir = TempDir::new().unwrap();
        let media = FakeMedia::new(10_000);
        let segments = vec![segment(&dir, 0)];
        // 5x longer than the video, outside the encoder's safe range.
        let audio = audio_track(&dir, &media, 50_000);
        let out = dir.path().join("out.mp4");

        let err = assemble_program(
            segments,
            Some(&audio),
            &media,
            dir.path(),
            &AssembleOptions::default(),
            &out,
        )
        .unwrap_err();

        assert!(matches!(err, AssembleError::SyncReconciliation { .. }));
    }

    #[test]
    fn video_only_output_copies_the_concatenation() {
        let dir = TempDir::new().unwrap();
        let media = FakeMedia::new(8_000);
        let segments = vec![segment(&dir, 0), segment(&dir, 1)];
        let out = dir.path().join("out.mp4");

        let report = assemble_program(
            segments,
            None,
            &media,
            dir.path(),
            &AssembleOptions::default(),
            &out,
        )
        .unwrap();

        assert!(out.exists());
        assert_eq!(report.audio_ms, None);
        assert!(media.muxed.lock().is_none());
    }
}
