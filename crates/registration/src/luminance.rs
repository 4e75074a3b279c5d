//! Luminance extraction and downsampling.
//!
//! Registration works on a single-channel image, box-filtered down so the
//! longest side fits the analysis budget. Box filtering by an integer factor
//! keeps the mapping back to full resolution a plain multiplication.

use longexpo_frame_model::{Frame, CHANNELS};

/// Rec.601 luma weights, applied to channels in stored order.
const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// A single-channel floating point image in `[0, 255]`.
#[derive(Debug, Clone, PartialEq)]
pub struct LumaImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl LumaImage {
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    pub fn mean(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().sum::<f32>() / self.data.len() as f32
    }

    /// Population variance of the pixel values.
    pub fn variance(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        self.data
            .iter()
            .map(|v| {
                let d = v - mean;
                d * d
            })
            .sum::<f32>()
            / self.data.len() as f32
    }
}

/// Integer downsample factor that brings the longest side to `max_dim` or less.
pub fn downsample_factor(width: u32, height: u32, max_dim: u32) -> u32 {
    let longest = width.max(height).max(1);
    let max_dim = max_dim.max(1);
    longest.div_ceil(max_dim).max(1)
}

/// Convert a frame to luminance, box-averaging `factor x factor` blocks.
///
/// Trailing rows/columns that do not fill a whole block are dropped, which
/// keeps every output sample an average of exactly `factor^2` pixels.
pub fn luminance(frame: &Frame, factor: u32) -> LumaImage {
    let factor = factor.max(1) as usize;
    let width = (frame.width() as usize / factor).max(1);
    let height = (frame.height() as usize / factor).max(1);
    let block_w = factor.min(frame.width() as usize);
    let block_h = factor.min(frame.height() as usize);
    let norm = 1.0 / (block_w * block_h) as f32;

    let mut data = vec![0.0f32; width * height];
    for (oy, out_row) in data.chunks_exact_mut(width).enumerate() {
        for sy in oy * factor..oy * factor + block_h {
            let row = frame.row(sy as u32);
            for (ox, out) in out_row.iter_mut().enumerate() {
                let start = ox * factor * CHANNELS;
                let block = &row[start..start + block_w * CHANNELS];
                *out += block.chunks_exact(CHANNELS).map(pixel_luma).sum::<f32>();
            }
        }
        for out in out_row.iter_mut() {
            *out *= norm;
        }
    }

    LumaImage {
        width,
        height,
        data,
    }
}

#[inline]
fn pixel_luma(px: &[u8]) -> f32 {
    LUMA_WEIGHTS[0] * px[0] as f32 + LUMA_WEIGHTS[1] * px[1] as f32 + LUMA_WEIGHTS[2] * px[2] as f32
}
