//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Every field has a default so a partial file still loads.

use serde::{Deserialize, Serialize};

use crate::models::{ConcatMode, ShiftPolicy, TempoPolicy};

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Path-related settings.
    #[serde(default)]
    pub paths: PathSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Speech synthesis settings.
    #[serde(default)]
    pub synthesis: SynthesisSettings,

    /// Timing resolution settings.
    #[serde(default)]
    pub timing: TimingSettings,

    /// Video rendering and assembly settings.
    #[serde(default)]
    pub render: RenderSettings,
}

/// Path configuration for scratch space, logs, and tool binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    /// Root folder for per-job scratch directories.
    #[serde(default = "default_scratch_root")]
    pub scratch_root: String,

    /// Folder for job log files.
    #[serde(default = "default_logs_folder")]
    pub logs_folder: String,

    /// ffmpeg binary to invoke.
    #[serde(default = "default_ffmpeg_bin")]
    pub ffmpeg_bin: String,

    /// ffprobe binary to invoke.
    #[serde(default = "default_ffprobe_bin")]
    pub ffprobe_bin: String,

    /// Copy the per-run speech clips next to the output artifact instead
    /// of deleting the scratch directory after a successful run.
    #[serde(default)]
    pub keep_segments: bool,
}

fn default_scratch_root() -> String {
    ".subvid_tmp".to_string()
}

fn default_logs_folder() -> String {
    ".logs".to_string()
}

fn default_ffmpeg_bin() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_bin() -> String {
    "ffprobe".to_string()
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            scratch_root: default_scratch_root(),
            logs_folder: default_logs_folder(),
            ffmpeg_bin: default_ffmpeg_bin(),
            ffprobe_bin: default_ffprobe_bin(),
            keep_segments: false,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Write a per-job log file alongside the tracing output.
    #[serde(default = "default_true")]
    pub job_log_enabled: bool,

    /// Lines kept in the in-memory tail for error reporting.
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,
}

fn default_true() -> bool {
    true
}

fn default_tail_lines() -> usize {
    100
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            job_log_enabled: true,
            tail_lines: default_tail_lines(),
        }
    }
}

/// Speech synthesis configuration passed through to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisSettings {
    /// Language code handed to the engine.
    #[serde(default = "default_language")]
    pub language: String,

    /// Named speaker preset, empty for the engine default.
    #[serde(default)]
    pub speaker: String,

    /// Reference voice sample for cloning engines, empty to disable.
    #[serde(default)]
    pub speaker_wav: String,
}

fn default_language() -> String {
    "en".to_string()
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            language: default_language(),
            speaker: String::new(),
            speaker_wav: String::new(),
        }
    }
}

/// How clips that outgrow their slots are handled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    /// Tempo resolution policy.
    #[serde(default)]
    pub tempo_policy: TempoPolicy,

    /// Speed applied to every clip under the uniform policy.
    #[serde(default = "default_uniform_speed")]
    pub uniform_speed: f64,

    /// Upper bound on per-clip speedup for overflow and precise policies.
    #[serde(default = "default_tempo_limit")]
    pub tempo_limit: f64,

    /// Shift policy for overflow that tempo could not absorb.
    #[serde(default = "default_shift_policy")]
    pub shift_policy: ShiftPolicy,

    /// Per-entry shift ceiling: milliseconds, `Nms`, or `N.Ns`. Empty
    /// means unbounded.
    #[serde(default)]
    pub shift_limit: String,

    /// Drop clips that would overlap instead of mixing them.
    #[serde(default)]
    pub strict_timing: bool,
}

fn default_uniform_speed() -> f64 {
    1.0
}

fn default_tempo_limit() -> f64 {
    2.0
}

fn default_shift_policy() -> ShiftPolicy {
    ShiftPolicy::None
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            tempo_policy: TempoPolicy::default(),
            uniform_speed: default_uniform_speed(),
            tempo_limit: default_tempo_limit(),
            shift_policy: default_shift_policy(),
            shift_limit: String::new(),
            strict_timing: false,
        }
    }
}

/// Rendering and final assembly configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Constant frame rate for rendered segments.
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// Filler frame width.
    #[serde(default = "default_width")]
    pub width: u32,

    /// Filler frame height.
    #[serde(default = "default_height")]
    pub height: u32,

    /// Rendering workers, 0 derives a count from the host.
    #[serde(default)]
    pub workers: usize,

    /// Keep per-batch frame manifests for inspection.
    #[serde(default)]
    pub keep_manifests: bool,

    /// Concatenation mode for rendered segments.
    #[serde(default = "default_concat_mode")]
    pub concat_mode: ConcatMode,

    /// Largest tolerated audio/video length difference before the
    /// narration track is stretched.
    #[serde(default = "default_sync_tolerance_ms")]
    pub sync_tolerance_ms: i64,
}

fn default_frame_rate() -> u32 {
    30
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}

fn default_concat_mode() -> ConcatMode {
    ConcatMode::Copy
}

fn default_sync_tolerance_ms() -> i64 {
    100
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            frame_rate: default_frame_rate(),
            width: default_width(),
            height: default_height(),
            workers: 0,
            keep_manifests: false,
            concat_mode: default_concat_mode(),
            sync_tolerance_ms: default_sync_tolerance_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_roundtrip_through_toml() {
        let settings = Settings::default();
        let toml_str = toml::to_string_pretty(&settings).unwrap();
        let parsed: Settings = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.render.frame_rate, 30);
        assert_eq!(parsed.timing.tempo_limit, 2.0);
        assert_eq!(parsed.timing.shift_policy, ShiftPolicy::None);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let content = r#"
            [timing]
            tempo_policy = "precise"
            shift_limit = "1.5s"

            [render]
            frame_rate = 24
        "#;
        let settings: Settings = toml::from_str(content).unwrap();

        assert_eq!(settings.timing.tempo_policy, TempoPolicy::Precise);
        assert_eq!(settings.timing.shift_limit, "1.5s");
        assert_eq!(settings.timing.tempo_limit, 2.0);
        assert_eq!(settings.render.frame_rate, 24);
        assert_eq!(settings.paths.ffmpeg_bin, "ffmpeg");
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert!(settings.logging.job_log_enabled);
        assert_eq!(settings.synthesis.language, "en");
    }
}
