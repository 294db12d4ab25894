//! Frame validation and filler substitution.

use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::models::FrameRecord;

use super::{RenderError, RenderResult};

/// Frames ready for rendering, with any substitutions noted.
#[derive(Debug, Clone)]
pub struct FramePrep {
    pub frames: Vec<FrameRecord>,
    /// Positions (0-based) whose image was missing or unreadable and was
    /// replaced with the filler frame.
    pub replaced: Vec<usize>,
}

fn frame_is_usable(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    // Decoding only the header is enough to catch truncated or
    // misnamed files before the encoder chokes on them.
    image::image_dimensions(path).is_ok()
}

fn filler_path(scratch_dir: &Path, width: u32, height: u32) -> RenderResult<PathBuf> {
    let path = scratch_dir.join(format!("filler_{width}x{height}.png"));
    if !path.exists() {
        let blank = RgbImage::new(width, height);
        blank.save(&path).map_err(|source| RenderError::Filler {
            path: path.display().to_string(),
            source,
        })?;
    }
    Ok(path)
}

/// Replace missing or undecodable frame images with a solid black
/// filler so a bad frame costs one blank moment instead of the batch.
pub fn validate_frames(
    frames: &[FrameRecord],
    scratch_dir: &Path,
    width: u32,
    height: u32,
) -> RenderResult<FramePrep> {
    let mut prepared = Vec::with_capacity(frames.len());
    let mut replaced = Vec::new();
    let mut filler: Option<PathBuf> = None;

    for (position, frame) in frames.iter().enumerate() {
        if frame_is_usable(&frame.path) {
            prepared.push(frame.clone());
            continue;
        }

        tracing::warn!(
            frame = %frame.path.display(),
            position,
            "frame unusable, substituting filler"
        );
        let substitute = match filler.as_ref() {
            Some(path) => path.clone(),
            None => {
                let path = filler_path(scratch_dir, width, height)?;
                filler = Some(path.clone());
                path
            }
        };
        prepared.push(FrameRecord {
            path: substitute,
            duration_ms: frame.duration_ms,
        });
        replaced.push(position);
    }

    Ok(FramePrep {
        frames: prepared,
        replaced,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn frame(path: PathBuf, duration_ms: i64) -> FrameRecord {
        FrameRecord { path, duration_ms }
    }

    fn write_png(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        RgbImage::new(4, 4).save(&path).unwrap();
        path
    }

    #[test]
    fn valid_frames_pass_through_untouched() {
        let dir = TempDir::new().unwrap();
        let a = write_png(&dir, "a.png");
        let frames = vec![frame(a.clone(), 100)];

        let prep = validate_frames(&frames, dir.path(), 4, 4).unwrap();

        assert!(prep.replaced.is_empty());
        assert_eq!(prep.frames[0].path, a);
    }

    #[test]
    fn missing_frames_get_the_filler_with_original_duration() {
        let dir = TempDir::new().unwrap();
        let a = write_png(&dir, "a.png");
        let frames = vec![
            frame(a, 100),
            frame(dir.path().join("missing.png"), 250),
        ];

        let prep = validate_frames(&frames, dir.path(), 8, 8).unwrap();

        assert_eq!(prep.replaced, vec![1]);
        assert_eq!(prep.frames[1].duration_ms, 250);
        assert!(prep.frames[1].path.exists());
        assert_eq!(image::image_dimensions(&prep.frames[1].path).unwrap(), (8, 8));
    }

    #[test]
    fn corrupt_images_are_replaced() {
        let dir = TempDir::new().unwrap();
        let bad = dir.path().join("bad.png");
        std::fs::write(&bad, b"not an image").unwrap();
        let frames = vec![frame(bad, 40)];

        let prep = validate_frames(&frames, dir.path(), 4, 4).unwrap();

        assert_eq!(prep.replaced, vec![0]);
    }

    #[test]
    fn filler_is_generated_once_per_size() {
        let dir = TempDir::new().unwrap();
        let frames = vec![
            frame(dir.path().join("x.png"), 10),
            frame(dir.path().join("y.png"), 20),
        ];

        let prep = validate_frames(&frames, dir.path(), 4, 4).unwrap();

        assert_eq!(prep.frames[0].path, prep.frames[1].path);
    }
}
