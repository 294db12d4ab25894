//! Parsing of ffprobe JSON output.

use serde_json::Value;

use crate::models::StreamInfo;

use super::{MediaError, MediaResult};

/// Parse `ffprobe -show_entries format=duration -of json` output into
/// integer milliseconds.
pub(super) fn parse_duration_ms(stdout: &[u8]) -> MediaResult<i64> {
    let json: Value = serde_json::from_slice(stdout)
        .map_err(|e| MediaError::parse_error("ffprobe output", e.to_string()))?;

    let seconds = json
        .get("format")
        .and_then(|f| f.get("duration"))
        .and_then(|d| d.as_str())
        .and_then(|s| s.parse::<f64>().ok())
        .ok_or_else(|| MediaError::parse_error("ffprobe output", "missing format.duration"))?;

    Ok((seconds * 1000.0).round() as i64)
}

/// Parse `ffprobe -show_streams -show_format -of json` output.
pub(super) fn parse_stream_info(stdout: &[u8]) -> MediaResult<StreamInfo> {
    let json: Value = serde_json::from_slice(stdout)
        .map_err(|e| MediaError::parse_error("ffprobe output", e.to_string()))?;

    let mut info = StreamInfo::default();

    if let Some(streams) = json.get("streams").and_then(|s| s.as_array()) {
        for stream in streams {
            match stream.get("codec_type").and_then(|t| t.as_str()) {
                Some("video") => info.has_video = true,
                Some("audio") => info.has_audio = true,
                _ => {}
            }
        }
    }

    if let Some(seconds) = json
        .get("format")
        .and_then(|f| f.get("duration"))
        .and_then(|d| d.as_str())
        .and_then(|s| s.parse::<f64>().ok())
    {
        info.duration_ms = (seconds * 1000.0).round() as i64;
    }

    Ok(info)
}
