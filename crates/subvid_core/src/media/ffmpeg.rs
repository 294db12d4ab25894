//! ffmpeg-backed implementation of the media toolkit.
//!
//! Every operation spawns the system `ffmpeg`/`ffprobe` binaries and blocks
//! until they exit. Stderr is captured and folded into errors so a failed
//! invocation can be diagnosed from the log alone.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::models::{ConcatMode, StreamInfo};

use super::probe;
use super::{MediaError, MediaResult, MediaToolkit};

/// How many trailing stderr bytes to keep in error messages.
const STDERR_TAIL: usize = 2048;

/// Media toolkit backed by the ffmpeg command line tools.
#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    ffmpeg_bin: String,
    ffprobe_bin: String,
}

impl Default for FfmpegToolkit {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegToolkit {
    /// Use `ffmpeg` and `ffprobe` from PATH.
    pub fn new() -> Self {
        Self {
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
        }
    }

    /// Use explicit binary locations.
    pub fn with_binaries(ffmpeg_bin: impl Into<String>, ffprobe_bin: impl Into<String>) -> Self {
        Self {
            ffmpeg_bin: ffmpeg_bin.into(),
            ffprobe_bin: ffprobe_bin.into(),
        }
    }

    /// Run a prepared command, mapping non-zero exit to `CommandFailed`.
    fn run(&self, mut cmd: Command, tool: &str) -> MediaResult<Vec<u8>> {
        cmd.stdin(Stdio::null());
        tracing::debug!(?cmd, "running {}", tool);

        let output = cmd
            .output()
            .map_err(|e| MediaError::spawn(tool, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail_start = stderr.len().saturating_sub(STDERR_TAIL);
            return Err(MediaError::command_failed(
                tool,
                output.status.code().unwrap_or(-1),
                stderr[tail_start..].to_string(),
            ));
        }

        Ok(output.stdout)
    }

    fn ffmpeg(&self) -> Command {
        let mut cmd = Command::new(&self.ffmpeg_bin);
        cmd.arg("-hide_banner").arg("-y");
        cmd
    }

    /// Write a concat-demuxer list file for (path, duration) pairs.
    ///
    /// The final frame is listed once more without a duration line; the
    /// concat demuxer otherwise ignores the last entry's duration.
    fn write_frame_list(frames: &[(PathBuf, f64)], list_path: &Path) -> MediaResult<()> {
        let mut body = String::new();
        for (path, duration_s) in frames {
            body.push_str(&format!("file '{}'\n", escape_concat_path(path)));
            body.push_str(&format!("duration {:.3}\n", duration_s));
        }
        if let Some((last, _)) = frames.last() {
            body.push_str(&format!("file '{}'\n", escape_concat_path(last)));
        }

        let mut file = fs::File::create(list_path)
            .map_err(|e| MediaError::io("create concat list", e))?;
        file.write_all(body.as_bytes())
            .map_err(|e| MediaError::io("write concat list", e))?;
        Ok(())
    }

    fn write_concat_list(inputs: &[PathBuf], list_path: &Path) -> MediaResult<()> {
        let mut body = String::new();
        for path in inputs {
            body.push_str(&format!("file '{}'\n", escape_concat_path(path)));
        }
        fs::write(list_path, body).map_err(|e| MediaError::io("write concat list", e))
    }
}

/// Build an `atempo` filter chain for the requested speed.
///
/// A single atempo stage only accepts 0.5-2.0, so larger factors are split
/// across two stages (2.0 * rest covers everything up to 4.0).
fn atempo_chain(speed: f64) -> String {
    if speed > 2.0 {
        format!("atempo=2.0,atempo={:.6}", speed / 2.0)
    } else if speed < 0.5 {
        format!("atempo=0.5,atempo={:.6}", speed / 0.5)
    } else {
        format!("atempo={:.6}", speed)
    }
}

/// Escape single quotes for the concat demuxer's quoting rules.
fn escape_concat_path(path: &Path) -> String {
    path.display().to_string().replace('\'', "'\\''")
}

impl MediaToolkit for FfmpegToolkit {
    fn measure_duration_ms(&self, path: &Path) -> MediaResult<i64> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }

        let mut cmd = Command::new(&self.ffprobe_bin);
        cmd.arg("-v")
            .arg("error")
            .arg("-show_entries")
            .arg("format=duration")
            .arg("-of")
            .arg("json")
            .arg(path);

        let stdout = self.run(cmd, "ffprobe")?;
        probe::parse_duration_ms(&stdout)
    }

    fn change_tempo(&self, path: &Path, speed: f64) -> MediaResult<()> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }

        // Filter into a sibling temp file, then replace the original.
        let tmp = path.with_extension("tempo.wav");
        let mut cmd = self.ffmpeg();
        cmd.arg("-i")
            .arg(path)
            .arg("-filter:a")
            .arg(atempo_chain(speed))
            .arg("-acodec")
            .arg("pcm_s16le")
            .arg(&tmp);

        match self.run(cmd, "ffmpeg") {
            Ok(_) => {
                fs::rename(&tmp, path).map_err(|e| MediaError::io("replace tempo output", e))
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                Err(e)
            }
        }
    }

    fn render_batch(
        &self,
        frames: &[(PathBuf, f64)],
        out_path: &Path,
        frame_rate: u32,
    ) -> MediaResult<()> {
        if frames.is_empty() {
            return Err(MediaError::parse_error("frame list", "no frames to render"));
        }

        let list_path = out_path.with_extension("frames.txt");
        Self::write_frame_list(frames, &list_path)?;

        let mut cmd = self.ffmpeg();
        cmd.arg("-f")
            .arg("concat")
            .arg("-safe")
            .arg("0")
            .arg("-i")
            .arg(&list_path)
            // Constant frame rate keeps segment durations predictable for
            // the later concatenation pass.
            .arg("-fps_mode")
            .arg("cfr")
            .arg("-r")
            .arg(frame_rate.to_string())
            .arg("-c:v")
            .arg("libx264")
            .arg("-pix_fmt")
            .arg("yuv420p")
            .arg("-crf")
            .arg("18")
            .arg("-preset")
            .arg("veryfast")
            .arg("-movflags")
            .arg("+faststart")
            .arg(out_path);

        let result = self.run(cmd, "ffmpeg");
        let _ = fs::remove_file(&list_path);
        result.map(|_| ())
    }

    fn probe_streams(&self, path: &Path) -> MediaResult<StreamInfo> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }

        let mut cmd = Command::new(&self.ffprobe_bin);
        cmd.arg("-v")
            .arg("error")
            .arg("-show_streams")
            .arg("-show_format")
            .arg("-of")
            .arg("json")
            .arg(path);

        let stdout = self.run(cmd, "ffprobe")?;
        probe::parse_stream_info(&stdout)
    }

    fn concat(&self, inputs: &[PathBuf], out_path: &Path, mode: ConcatMode) -> MediaResult<()> {
        if inputs.is_empty() {
            return Err(MediaError::parse_error("concat inputs", "no files to join"));
        }

        let list_path = out_path.with_extension("concat.txt");
        Self::write_concat_list(inputs, &list_path)?;

        let mut cmd = self.ffmpeg();
        cmd.arg("-f")
            .arg("concat")
            .arg("-safe")
            .arg("0")
            .arg("-i")
            .arg(&list_path);

        match mode {
            ConcatMode::Copy => {
                cmd.arg("-c").arg("copy");
            }
            ConcatMode::Encode => {
                cmd.arg("-c:v")
                    .arg("libx264")
                    .arg("-pix_fmt")
                    .arg("yuv420p")
                    .arg("-c:a")
                    .arg("aac");
            }
        }
        cmd.arg("-movflags").arg("+faststart").arg(out_path);

        let result = self.run(cmd, "ffmpeg");
        let _ = fs::remove_file(&list_path);
        result.map(|_| ())
    }

    fn mux_audio_video(&self, video: &Path, audio: &Path, out_path: &Path) -> MediaResult<()> {
        let mut cmd = self.ffmpeg();
        cmd.arg("-i")
            .arg(video)
            .arg("-i")
            .arg(audio)
            .arg("-map")
            .arg("0:v:0")
            .arg("-map")
            .arg("1:a:0")
            .arg("-c:v")
            .arg("copy")
            .arg("-c:a")
            .arg("aac")
            .arg("-b:a")
            .arg("192k")
            .arg("-movflags")
            .arg("+faststart")
            .arg(out_path);

        self.run(cmd, "ffmpeg").map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atempo_chain_splits_large_factors() {
        assert_eq!(atempo_chain(1.5), "atempo=1.500000");
        assert_eq!(atempo_chain(3.0), "atempo=2.0,atempo=1.500000");
        assert_eq!(atempo_chain(4.0), "atempo=2.0,atempo=2.000000");
        assert_eq!(atempo_chain(0.5), "atempo=0.500000");
    }

    #[test]
    fn frame_list_repeats_last_frame() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("frames.txt");
        let frames = vec![
            (PathBuf::from("/tmp/a.png"), 1.5),
            (PathBuf::from("/tmp/b.png"), 2.0),
        ];

        FfmpegToolkit::write_frame_list(&frames, &list).unwrap();
        let body = fs::read_to_string(&list).unwrap();

        assert!(body.contains("file '/tmp/a.png'\nduration 1.500\n"));
        assert!(body.contains("duration 2.000\n"));
        // Last file is listed twice so its duration is honoured.
        assert_eq!(body.matches("file '/tmp/b.png'").count(), 2);
    }

    #[test]
    fn missing_input_is_reported_without_spawning() {
        let toolkit = FfmpegToolkit::new();
        let err = toolkit
            .measure_duration_ms(Path::new("/nonexistent/clip.wav"))
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
