//! Bitmap frames.
//!
//! Every frame uses one fixed pixel format: 4 interleaved 8-bit channels,
//! row-major, with a stride of at least `width * 4` bytes. Channel order is
//! opaque to the engine; it only has to be consistent across a run.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::offset::Offset;

/// Number of interleaved channels per pixel.
pub const CHANNELS: usize = 4;

/// Pixel dimensions of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels covered by this size.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Number of bytes in one tightly packed row.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * CHANNELS
    }

    /// True if either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// The longer of the two sides.
    pub fn longest_side(&self) -> u32 {
        self.width.max(self.height)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Errors raised when constructing a frame from a raw buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("Frame dimensions must be non-zero, got {size}")]
    ZeroDimension { size: Size },

    #[error("Stride {stride} is smaller than the minimum row size {min}")]
    StrideTooSmall { stride: usize, min: usize },

    #[error("Pixel buffer holds {len} bytes, {required} required")]
    BufferTooSmall { len: usize, required: usize },

    #[error("Stride {stride} over {height} rows does not fit in memory")]
    StrideOverflow { stride: usize, height: u32 },
}

/// An immutable bitmap.
///
/// The pixel buffer is reference counted, so cloning a frame is cheap and
/// never copies pixels. A frame is never mutated after construction.
#[derive(Clone)]
pub struct Frame {
    size: Size,
    stride: usize,
    data: Arc<[u8]>,
}

impl Frame {
    /// Wrap a raw buffer with an explicit stride (bytes per row).
    pub fn new(width: u32, height: u32, stride: usize, data: Vec<u8>) -> Result<Self, FrameError> {
        let size = Size::new(width, height);
        if size.is_empty() {
            return Err(FrameError::ZeroDimension { size });
        }

        let min = size.row_bytes();
        if stride < min {
            return Err(FrameError::StrideTooSmall { stride, min });
        }

        // The last row only needs its pixels, not trailing padding.
        let required = stride
            .checked_mul(height as usize - 1)
            .and_then(|n| n.checked_add(min))
            .ok_or(FrameError::StrideOverflow { stride, height })?;
        if data.len() < required {
            return Err(FrameError::BufferTooSmall {
                len: data.len(),
                required,
            });
        }

        Ok(Self {
            size,
            stride,
            data: data.into(),
        })
    }

    /// Wrap a tightly packed buffer (`stride == width * 4`).
    pub fn from_packed(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        Self::new(width, height, width as usize * CHANNELS, data)
    }

    /// A frame where every pixel has the same value.
    pub fn filled(size: Size, pixel: [u8; CHANNELS]) -> Result<Self, FrameError> {
        let data = pixel
            .iter()
            .copied()
            .cycle()
            .take(size.pixel_count() * CHANNELS)
            .collect();
        Self::from_packed(size.width, size.height, data)
    }

    /// Build a frame by evaluating `f(x, y)` for every pixel.
    pub fn from_fn(
        size: Size,
        mut f: impl FnMut(u32, u32) -> [u8; CHANNELS],
    ) -> Result<Self, FrameError> {
        let mut data = Vec::with_capacity(size.pixel_count() * CHANNELS);
        for y in 0..size.height {
            for x in 0..size.width {
                data.extend_from_slice(&f(x, y));
            }
        }
        Self::from_packed(size.width, size.height, data)
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Bytes between the starts of two consecutive rows.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// The pixels of row `y`, without stride padding.
    ///
    /// # Panics
    /// Panics if `y >= height`.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.size.row_bytes()]
    }

    /// Iterate over all rows, top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.size.height).map(move |y| self.row(y))
    }

    /// The pixel at `(x, y)`.
    ///
    /// # Panics
    /// Panics if the coordinate is out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; CHANNELS] {
        let i = y as usize * self.stride + x as usize * CHANNELS;
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    /// True if rows are stored back to back without padding.
    pub fn is_packed(&self) -> bool {
        self.stride == self.size.row_bytes()
    }

    /// Copy the pixels into a tightly packed buffer.
    pub fn to_packed(&self) -> Vec<u8> {
        if self.is_packed() {
            return self.data[..self.size.pixel_count() * CHANNELS].to_vec();
        }
        let mut out = Vec::with_capacity(self.size.pixel_count() * CHANNELS);
        for row in self.rows() {
            out.extend_from_slice(row);
        }
        out
    }

    /// True if both frames have the same size and pixel values.
    ///
    /// Stride padding is ignored.
    pub fn same_pixels(&self, other: &Frame) -> bool {
        if self.size != other.size {
            return false;
        }
        if Arc::ptr_eq(&self.data, &other.data) && self.stride == other.stride {
            return true;
        }
        self.rows().zip(other.rows()).all(|(a, b)| a == b)
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.same_pixels(other)
    }
}

impl Eq for Frame {}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("size", &self.size)
            .field("stride", &self.stride)
            .finish_non_exhaustive()
    }
}

/// A frame resampled into the reference frame's coordinate space.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedFrame {
    /// Resampled pixels, sized like the reference frame.
    pub frame: Frame,
    /// The offset that was applied to produce `frame`.
    pub offset: Offset,
    /// Position of the source frame in the sampled sequence.
    pub source_index: usize,
}

impl AlignedFrame {
    pub fn new(frame: Frame, offset: Offset, source_index: usize) -> Self {
        Self {
            frame,
            offset,
            source_index,
        }
    }

    /// Wrap a frame that needs no resampling (the reference frame).
    pub fn passthrough(frame: Frame, source_index: usize) -> Self {
        Self::new(frame, Offset::ZERO, source_index)
    }

    pub fn size(&self) -> Size {
        self.frame.size()
    }
}
