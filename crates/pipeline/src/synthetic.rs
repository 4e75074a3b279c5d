//! Procedural test scenes.
//!
//! Each scene is a static, textured backdrop with moving elements, filmed
//! by a camera that shakes a few pixels per frame. The shake is a
//! deterministic function of the frame index, so the offset registration
//! should recover for every frame is known exactly.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::Context;
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_filled_circle_mut;
use longexpo_common::{LongExposureError, LongExposureResult};
use longexpo_frame_model::{Frame, Offset, ParseOptionError, Size};

use crate::source::{frame_from_image, frame_index_at, FrameSource};

/// Scene content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SceneKind {
    /// Car lights streaking across a dark city.
    #[default]
    LightTrails,
    /// Water drops falling in front of a dim wall.
    Droplets,
    /// Soft clouds drifting over a blue sky.
    Clouds,
}

impl SceneKind {
    pub const ALL: [SceneKind; 3] = [
        SceneKind::LightTrails,
        SceneKind::Droplets,
        SceneKind::Clouds,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SceneKind::LightTrails => "light-trails",
            SceneKind::Droplets => "droplets",
            SceneKind::Clouds => "clouds",
        }
    }
}

impl fmt::Display for SceneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SceneKind {
    type Err = ParseOptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light-trails" | "lights" | "trails" => Ok(SceneKind::LightTrails),
            "droplets" | "water" | "rain" => Ok(SceneKind::Droplets),
            "clouds" | "sky" => Ok(SceneKind::Clouds),
            _ => Err(ParseOptionError {
                kind: "scene",
                value: s.to_string(),
                expected: "light-trails, droplets, clouds",
            }),
        }
    }
}

/// A rendered-on-demand procedural clip.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    kind: SceneKind,
    size: Size,
    frame_count: usize,
    fps: f64,
    jitter: f64,
}

impl SyntheticSource {
    /// A clip of `frame_count` frames at 10 fps with 3 px of camera shake.
    pub fn new(kind: SceneKind, size: Size, frame_count: usize) -> Self {
        Self {
            kind,
            size,
            frame_count,
            fps: 10.0,
            jitter: 3.0,
        }
    }

    pub fn with_fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }

    /// Peak camera shake in pixels; zero gives a locked-off camera.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.max(0.0);
        self
    }

    pub fn kind(&self) -> SceneKind {
        self.kind
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Camera position for frame `index`. Frame 0 is always at the origin.
    pub fn camera_position(&self, index: usize) -> (i64, i64) {
        let i = index as f64;
        (
            (self.jitter * (i * 1.7).sin()).round() as i64,
            (self.jitter * (i * 2.3).sin()).round() as i64,
        )
    }

    /// Offset a registration of frame `index` against frame 0 should find.
    pub fn expected_offset(&self, index: usize) -> Offset {
        let (cx, cy) = self.camera_position(index);
        Offset::new(-cx as f64, -cy as f64)
    }

    /// Render frame `index`.
    pub fn render(&self, index: usize) -> RgbaImage {
        let (cam_x, cam_y) = self.camera_position(index);
        let t = index as f64 / self.fps;
        let kind = self.kind;

        let mut img = RgbaImage::from_fn(self.size.width, self.size.height, |x, y| {
            backdrop(kind, x as i64 + cam_x, y as i64 + cam_y)
        });

        let to_screen =
            |wx: f64, wy: f64| ((wx as i64 - cam_x) as i32, (wy as i64 - cam_y) as i32);
        let (w, h) = (self.size.width as f64, self.size.height as f64);

        match kind {
            SceneKind::LightTrails => {
                for lane in 0..4 {
                    let speed = 40.0 + 25.0 * lane as f64;
                    let y = h * (0.55 + 0.1 * lane as f64);
                    let x = (t * speed + 37.0 * lane as f64) % (w + 40.0) - 20.0;
                    let color = if lane % 2 == 0 {
                        Rgba([255, 60, 40, 255])
                    } else {
                        Rgba([255, 240, 200, 255])
                    };
                    draw_filled_circle_mut(&mut img, to_screen(x, y), 3, color);
                }
            }
            SceneKind::Droplets => {
                for column in 0..6 {
                    let x = w * (0.1 + 0.15 * column as f64);
                    let speed = 30.0 + 11.0 * column as f64;
                    let y = (t * speed + 23.0 * column as f64) % (h + 20.0) - 10.0;
                    let drop = Rgba([140, 190, 255, 255]);
                    draw_filled_circle_mut(&mut img, to_screen(x, y), 2, drop);
                }
            }
            SceneKind::Clouds => {
                for cloud in 0..3 {
                    let speed = 4.0 + 2.0 * cloud as f64;
                    let x = (t * speed + w * 0.3 * cloud as f64) % (w + 60.0) - 30.0;
                    let y = h * (0.2 + 0.15 * cloud as f64);
                    let radius = (self.size.longest_side() / 10).max(4) as i32;
                    let puff = Rgba([235, 235, 240, 255]);
                    draw_filled_circle_mut(&mut img, to_screen(x, y), radius, puff);
                }
            }
        }

        img
    }

    /// Render frame `index` as an engine frame.
    pub fn frame(&self, index: usize) -> LongExposureResult<Frame> {
        frame_from_image(self.render(index))
    }

    /// Write every frame to `dir` as `frame_NNNN.png`.
    pub fn write_sequence(&self, dir: &Path) -> LongExposureResult<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(self.frame_count);
        for index in 0..self.frame_count {
            let path = dir.join(format!("frame_{index:04}.png"));
            self.render(index)
                .save(&path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            written.push(path);
        }
        tracing::info!(
            scene = %self.kind,
            frames = written.len(),
            dir = %dir.display(),
            "Wrote synthetic sequence"
        );
        Ok(written)
    }
}

/// Static scene texture at world coordinate `(wx, wy)`.
///
/// A smooth base per scene plus hashed grain, so every window of the
/// backdrop has structure to register against.
fn backdrop(kind: SceneKind, wx: i64, wy: i64) -> Rgba<u8> {
    let h = hash(wx, wy);
    let grain = (h >> 59) as i64 - 16;
    let sparkle = (h & 0x3FF) == 0;

    let (r, g, b) = match kind {
        SceneKind::LightTrails => {
            let windows = if (wx / 6 + wy / 9) % 3 == 0 { 40 } else { 0 };
            (20 + windows, 22 + windows, 40 + windows / 2)
        }
        SceneKind::Droplets => {
            let bricks = if (wy / 8) % 2 == 0 { (wx / 16) % 2 } else { (wx / 16 + 1) % 2 };
            (70 + 15 * bricks, 60 + 10 * bricks, 55)
        }
        SceneKind::Clouds => {
            let horizon = wy.clamp(0, 255) / 4;
            (90 + horizon, 140 + horizon, 220)
        }
    };

    let channel = |base: i64| {
        if sparkle {
            255
        } else {
            (base + grain).clamp(0, 255) as u8
        }
    };
    Rgba([channel(r), channel(g), channel(b), 255])
}

fn hash(x: i64, y: i64) -> u64 {
    let h = (x.wrapping_mul(73_856_093) ^ y.wrapping_mul(19_349_663)) as u64;
    h.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    fn duration_secs(&self) -> f64 {
        if self.fps > 0.0 {
            self.frame_count as f64 / self.fps
        } else {
            0.0
        }
    }

    fn frame_size(&self) -> Option<Size> {
        Some(self.size)
    }

    fn frame_at(&mut self, timestamp_secs: f64) -> LongExposureResult<Frame> {
        let index = frame_index_at(timestamp_secs, self.fps, self.frame_count).ok_or_else(|| {
            LongExposureError::frame_source(format!("no frame at {timestamp_secs:.3}s"))
        })?;
        self.frame(index)
    }
}
