//! Frame sources.
//!
//! A source is a clip: it has a duration and yields the frame shown at any
//! timestamp inside it. The pipeline decides which timestamps to pull.

use std::path::{Path, PathBuf};

use anyhow::Context;
use image::RgbaImage;
use longexpo_common::{LongExposureError, LongExposureResult};
use longexpo_frame_model::{Frame, Size};

/// File extensions recognized as still images.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

/// A clip that frames can be sampled from.
pub trait FrameSource: Send {
    /// Source name for logs and reports.
    fn name(&self) -> &str;

    /// Clip length in seconds.
    fn duration_secs(&self) -> f64;

    /// Frame size, if known without decoding.
    fn frame_size(&self) -> Option<Size>;

    /// The frame shown at `timestamp_secs`.
    fn frame_at(&mut self, timestamp_secs: f64) -> LongExposureResult<Frame>;
}

/// Index of the frame shown at `timestamp_secs` in a clip of `len` frames.
pub(crate) fn frame_index_at(timestamp_secs: f64, fps: f64, len: usize) -> Option<usize> {
    if len == 0 || !timestamp_secs.is_finite() || timestamp_secs < 0.0 {
        return None;
    }
    // 0.3 * 10.0 == 2.9999999999999996
    let index = (timestamp_secs * fps + 1e-9).floor() as usize;
    Some(index.min(len - 1))
}

fn check_fps(fps: f64) -> LongExposureResult<()> {
    if fps.is_finite() && fps > 0.0 {
        Ok(())
    } else {
        Err(LongExposureError::config(format!(
            "frame rate must be positive, got {fps}"
        )))
    }
}

/// Convert a decoded image into a frame.
pub fn frame_from_image(image: RgbaImage) -> LongExposureResult<Frame> {
    let (width, height) = image.dimensions();
    Ok(Frame::from_packed(width, height, image.into_raw())?)
}

/// Convert a frame into an encodable image.
pub fn frame_to_image(frame: &Frame) -> LongExposureResult<RgbaImage> {
    RgbaImage::from_raw(frame.width(), frame.height(), frame.to_packed()).ok_or_else(|| {
        LongExposureError::InvalidFrame {
            message: format!("buffer does not fit a {} image", frame.size()),
        }
    })
}

/// A directory of still images played back at a fixed frame rate.
///
/// Files are ordered by name, so zero-padded numbering sorts naturally.
#[derive(Debug, Clone)]
pub struct ImageSequenceSource {
    name: String,
    paths: Vec<PathBuf>,
    fps: f64,
}

impl ImageSequenceSource {
    /// List the images in `dir`.
    pub fn open(dir: &Path, fps: f64) -> LongExposureResult<Self> {
        check_fps(fps)?;
        if !dir.is_dir() {
            return Err(LongExposureError::FileNotFound {
                path: dir.to_path_buf(),
            });
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_image_path(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        tracing::debug!(dir = %dir.display(), images = paths.len(), fps, "Opened image sequence");

        Ok(Self {
            name: dir.display().to_string(),
            paths,
            fps,
        })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

impl FrameSource for ImageSequenceSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn duration_secs(&self) -> f64 {
        self.paths.len() as f64 / self.fps
    }

    fn frame_size(&self) -> Option<Size> {
        let first = self.paths.first()?;
        image::image_dimensions(first)
            .ok()
            .map(|(w, h)| Size::new(w, h))
    }

    fn frame_at(&mut self, timestamp_secs: f64) -> LongExposureResult<Frame> {
        let index = frame_index_at(timestamp_secs, self.fps, self.paths.len()).ok_or_else(|| {
            LongExposureError::frame_source(format!(
                "no frame at {timestamp_secs:.3}s in {}",
                self.name
            ))
        })?;
        let path = &self.paths[index];
        let decoded = image::open(path)
            .with_context(|| format!("failed to decode {}", path.display()))?;
        frame_from_image(decoded.to_rgba8())
    }
}

/// Frames held in memory, played back at a fixed frame rate.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    frames: Vec<Frame>,
    fps: f64,
}

impl MemorySource {
    pub fn new(frames: Vec<Frame>, fps: f64) -> LongExposureResult<Self> {
        check_fps(fps)?;
        Ok(Self {
            name: "memory".to_string(),
            frames,
            fps,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl FrameSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn duration_secs(&self) -> f64 {
        self.frames.len() as f64 / self.fps
    }

    fn frame_size(&self) -> Option<Size> {
        self.frames.first().map(Frame::size)
    }

    fn frame_at(&mut self, timestamp_secs: f64) -> LongExposureResult<Frame> {
        frame_index_at(timestamp_secs, self.fps, self.frames.len())
            .map(|i| self.frames[i].clone())
            .ok_or_else(|| {
                LongExposureError::frame_source(format!("no frame at {timestamp_secs:.3}s"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray(v: u8) -> Frame {
        Frame::filled(Size::new(4, 3), [v, v, v, 255]).unwrap()
    }

    #[test]
    fn test_frame_index_at() {
        assert_eq!(frame_index_at(0.0, 10.0, 5), Some(0));
        assert_eq!(frame_index_at(0.3, 10.0, 5), Some(3));
        assert_eq!(frame_index_at(9.0, 10.0, 5), Some(4));
        assert_eq!(frame_index_at(-1.0, 10.0, 5), None);
        assert_eq!(frame_index_at(0.0, 10.0, 0), None);
    }

    #[test]
    fn test_memory_source_playback() {
        let mut source = MemorySource::new(vec![gray(1), gray(2), gray(3)], 2.0).unwrap();
        assert!((source.duration_secs() - 1.5).abs() < 1e-12);
        assert_eq!(source.frame_size(), Some(Size::new(4, 3)));
        assert_eq!(source.frame_at(0.0).unwrap(), gray(1));
        assert_eq!(source.frame_at(0.5).unwrap(), gray(2));
        assert_eq!(source.frame_at(1.4).unwrap(), gray(3));
    }

    #[test]
    fn test_rejects_non_positive_fps() {
        assert!(MemorySource::new(vec![gray(1)], 0.0).is_err());
        assert!(ImageSequenceSource::open(Path::new("."), -1.0).is_err());
    }

    #[test]
    fn test_image_roundtrip_keeps_pixels() {
        let frame = Frame::from_fn(Size::new(3, 2), |x, y| [x as u8, y as u8, 9, 200]).unwrap();
        let image = frame_to_image(&frame).unwrap();
        assert_eq!(image.get_pixel(2, 1).0, [2, 1, 9, 200]);
        assert_eq!(frame_from_image(image).unwrap(), frame);
    }

    #[test]
    fn test_image_sequence_lists_sorted_images() {
        let dir = std::env::temp_dir().join("longexpo_test_image_sequence");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        for (name, v) in [("b_0001.png", 20u8), ("a_0000.png", 10), ("c_0002.png", 30)] {
            frame_to_image(&gray(v))
                .unwrap()
                .save(dir.join(name))
                .unwrap();
        }
        std::fs::write(dir.join("notes.txt"), "not an image").unwrap();

        let mut source = ImageSequenceSource::open(&dir, 10.0).unwrap();
        assert_eq!(source.len(), 3);
        assert_eq!(source.frame_size(), Some(Size::new(4, 3)));
        assert!((source.duration_secs() - 0.3).abs() < 1e-12);
        assert_eq!(source.frame_at(0.0).unwrap(), gray(10));
        assert_eq!(source.frame_at(0.2).unwrap(), gray(30));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_directory_is_file_not_found() {
        let err = ImageSequenceSource::open(Path::new("/nonexistent/longexpo"), 10.0).unwrap_err();
        assert!(matches!(err, LongExposureError::FileNotFound { .. }));
    }
}
