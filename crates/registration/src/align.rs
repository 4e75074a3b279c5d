//! Frame alignment.
//!
//! Translates a frame by `-offset` into a canvas of the output size:
//! `aligned(x, y) = frame(x + dx, y + dy)`. Sub-pixel offsets are resampled
//! bilinearly; integral offsets take an exact copy path. Source coordinates
//! outside the frame are resolved by the [`FillPolicy`], per interpolation
//! tap, so a constant fill blends into the border over one pixel.

use longexpo_frame_model::{AlignedFrame, FillPolicy, Frame, FrameError, Offset, Size, CHANNELS};
use rayon::prelude::*;

/// Resamples frames into one output canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameAligner {
    output_size: Size,
    fill: FillPolicy,
}

impl FrameAligner {
    pub fn new(output_size: Size, fill: FillPolicy) -> Self {
        Self { output_size, fill }
    }

    pub fn output_size(&self) -> Size {
        self.output_size
    }

    pub fn fill(&self) -> FillPolicy {
        self.fill
    }

    /// Align `frame` by `offset`.
    ///
    /// A zero offset on a frame that already has the output size shares the
    /// input pixels instead of copying them.
    pub fn align(
        &self,
        frame: &Frame,
        offset: Offset,
        source_index: usize,
    ) -> Result<AlignedFrame, FrameError> {
        if offset.is_zero() && frame.size() == self.output_size {
            return Ok(AlignedFrame::new(frame.clone(), Offset::ZERO, source_index));
        }

        let shift = self.sampling_offset(frame, offset);
        let row_bytes = self.output_size.row_bytes();
        let mut data = vec![0u8; row_bytes * self.output_size.height as usize];
        if row_bytes > 0 {
            if shift.is_integral() {
                let (ix, iy) = shift.rounded();
                data.par_chunks_mut(row_bytes)
                    .enumerate()
                    .for_each(|(y, row)| self.copy_row(frame, row, y as i64 + iy, ix));
            } else {
                data.par_chunks_mut(row_bytes)
                    .enumerate()
                    .for_each(|(y, row)| {
                        self.interpolate_row(frame, row, y as f64 + shift.dy, shift.dx)
                    });
            }
        }

        let aligned = Frame::from_packed(self.output_size.width, self.output_size.height, data)?;
        Ok(AlignedFrame::new(aligned, offset, source_index))
    }

    /// `offset` limited to the range where some output pixel can still see
    /// the frame. Anything beyond samples only fill, and the clamped value
    /// keeps tap coordinates far from `i64` overflow.
    fn sampling_offset(&self, frame: &Frame, offset: Offset) -> Offset {
        let reach_x = (frame.width() as f64) + (self.output_size.width as f64) + 1.0;
        let reach_y = (frame.height() as f64) + (self.output_size.height as f64) + 1.0;
        Offset::new(
            offset.dx.clamp(-reach_x, reach_x),
            offset.dy.clamp(-reach_y, reach_y),
        )
    }

    fn copy_row(&self, frame: &Frame, out: &mut [u8], sy: i64, ix: i64) {
        let w = frame.width() as i64;
        let in_rows = sy >= 0 && sy < frame.height() as i64;

        for (x, px) in out.chunks_exact_mut(CHANNELS).enumerate() {
            let sx = x as i64 + ix;
            if in_rows && sx >= 0 && sx < w {
                px.copy_from_slice(&frame.pixel(sx as u32, sy as u32));
            } else {
                px.copy_from_slice(&self.tap(frame, sx, sy));
            }
        }
    }

    fn interpolate_row(&self, frame: &Frame, out: &mut [u8], sy: f64, dx: f64) {
        let y0 = sy.floor();
        let fy = sy - y0;
        let y0 = y0 as i64;

        for (x, px) in out.chunks_exact_mut(CHANNELS).enumerate() {
            let sx = x as f64 + dx;
            let x0 = sx.floor();
            let fx = sx - x0;
            let x0 = x0 as i64;

            let taps = [
                (self.tap(frame, x0, y0), (1.0 - fx) * (1.0 - fy)),
                (self.tap(frame, x0 + 1, y0), fx * (1.0 - fy)),
                (self.tap(frame, x0, y0 + 1), (1.0 - fx) * fy),
                (self.tap(frame, x0 + 1, y0 + 1), fx * fy),
            ];
            for (c, out) in px.iter_mut().enumerate() {
                let v: f64 = taps.iter().map(|(p, w)| p[c] as f64 * w).sum();
                *out = (v + 0.5).floor().clamp(0.0, 255.0) as u8;
            }
        }
    }

    /// Pixel at `(sx, sy)`, resolving out-of-bounds coordinates by fill policy.
    #[inline]
    fn tap(&self, frame: &Frame, sx: i64, sy: i64) -> [u8; CHANNELS] {
        let w = frame.width() as i64;
        let h = frame.height() as i64;
        if sx >= 0 && sx < w && sy >= 0 && sy < h {
            return frame.pixel(sx as u32, sy as u32);
        }
        match self.fill.constant() {
            Some(color) => color,
            None => frame.pixel(sx.clamp(0, w - 1) as u32, sy.clamp(0, h - 1) as u32),
        }
    }
}

/// Align `frame` by `offset` into an `output_size` canvas.
pub fn align(
    frame: &Frame,
    offset: Offset,
    output_size: Size,
    fill: FillPolicy,
) -> Result<AlignedFrame, FrameError> {
    FrameAligner::new(output_size, fill).align(frame, offset, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn gradient(size: Size) -> Frame {
        Frame::from_fn(size, |x, y| [(x * 10) as u8, (y * 10) as u8, 200, 255]).unwrap()
    }

    #[test]
    fn test_zero_offset_passes_through() {
        let frame = gradient(Size::new(8, 6));
        let aligned = align(&frame, Offset::ZERO, frame.size(), FillPolicy::default()).unwrap();
        assert_eq!(aligned.frame, frame);
        assert_eq!(aligned.offset, Offset::ZERO);
    }

    #[test]
    fn test_integer_offset_shifts_content() {
        let frame = gradient(Size::new(8, 6));
        let offset = Offset::new(2.0, 1.0);
        let aligned = align(&frame, offset, frame.size(), FillPolicy::BLACK).unwrap();

        assert_eq!(aligned.frame.pixel(0, 0), frame.pixel(2, 1));
        assert_eq!(aligned.frame.pixel(5, 4), frame.pixel(7, 5));
        assert_eq!(aligned.frame.pixel(6, 0), [0, 0, 0, 255]);
        assert_eq!(aligned.frame.pixel(0, 5), [0, 0, 0, 255]);
        assert_eq!(aligned.offset, Offset::new(2.0, 1.0));
    }

    #[test]
    fn test_edge_clamp_repeats_border() {
        let frame = gradient(Size::new(8, 6));
        let offset = Offset::new(-3.0, 0.0);
        let aligned = align(&frame, offset, frame.size(), FillPolicy::EdgeClamp).unwrap();
        assert_eq!(aligned.frame.pixel(0, 2), frame.pixel(0, 2));
        assert_eq!(aligned.frame.pixel(2, 2), frame.pixel(0, 2));
        assert_eq!(aligned.frame.pixel(3, 2), frame.pixel(0, 2));
        assert_eq!(aligned.frame.pixel(4, 2), frame.pixel(1, 2));
    }

    #[test]
    fn test_transparent_fill() {
        let frame = gradient(Size::new(4, 4));
        let offset = Offset::new(0.0, -1.0);
        let aligned = align(&frame, offset, frame.size(), FillPolicy::Transparent).unwrap();
        assert_eq!(aligned.frame.pixel(1, 0), [0, 0, 0, 0]);
        assert_eq!(aligned.frame.pixel(1, 1), frame.pixel(1, 0));
    }

    #[test]
    fn test_half_pixel_offset_interpolates() {
        let frame = gradient(Size::new(6, 2));
        let offset = Offset::new(0.5, 0.0);
        let aligned = align(&frame, offset, frame.size(), FillPolicy::EdgeClamp).unwrap();
        for x in 0..5 {
            assert_eq!(aligned.frame.pixel(x, 0)[0], (x * 10 + 5) as u8);
        }
        // Last column blends the border with its clamped copy.
        assert_eq!(aligned.frame.pixel(5, 0)[0], 50);
    }

    #[test]
    fn test_output_canvas_can_differ_from_frame() {
        let frame = Frame::filled(Size::new(2, 2), [9, 9, 9, 255]).unwrap();
        let aligned = align(&frame, Offset::ZERO, Size::new(4, 3), FillPolicy::BLACK).unwrap();
        assert_eq!(aligned.size(), Size::new(4, 3));
        assert_eq!(aligned.frame.pixel(1, 1), [9, 9, 9, 255]);
        assert_eq!(aligned.frame.pixel(3, 2), [0, 0, 0, 255]);
    }

    #[test]
    fn test_huge_offset_yields_all_fill() {
        let frame = gradient(Size::new(4, 4));
        for offset in [
            Offset::new(1e300, 0.0),
            Offset::new(1e300, 0.25),
            Offset::new(-1e300, -1e300),
            Offset::new(0.5, f64::MAX),
        ] {
            let aligned = align(&frame, offset, frame.size(), FillPolicy::BLACK).unwrap();
            assert!(
                aligned.frame.rows().all(|row| row
                    .chunks_exact(CHANNELS)
                    .all(|px| px == [0, 0, 0, 255])),
                "offset {offset}"
            );
            assert_eq!(aligned.offset, offset);
        }
    }

    #[test]
    fn test_huge_offset_with_edge_clamp_repeats_corner() {
        let frame = gradient(Size::new(4, 4));
        let aligned = align(
            &frame,
            Offset::new(1e300, -1e300),
            frame.size(),
            FillPolicy::EdgeClamp,
        )
        .unwrap();
        assert_eq!(aligned.frame.pixel(0, 0), frame.pixel(3, 0));
        assert_eq!(aligned.frame.pixel(3, 3), frame.pixel(3, 0));
    }

    #[test]
    fn test_zero_sized_canvas_is_an_error() {
        let frame = gradient(Size::new(4, 4));
        let result = align(&frame, Offset::new(1.0, 0.0), Size::new(0, 4), FillPolicy::BLACK);
        assert!(result.is_err());
    }

    proptest! {
        #[test]
        fn test_integer_alignment_matches_source(dx in -6i64..6, dy in -4i64..4) {
            let frame = gradient(Size::new(12, 9));
            let aligned = align(
                &frame,
                Offset::new(dx as f64, dy as f64),
                frame.size(),
                FillPolicy::Transparent,
            )
            .unwrap();

            for y in 0..9i64 {
                for x in 0..12i64 {
                    let (sx, sy) = (x + dx, y + dy);
                    let expected = if (0..12).contains(&sx) && (0..9).contains(&sy) {
                        frame.pixel(sx as u32, sy as u32)
                    } else {
                        [0, 0, 0, 0]
                    };
                    prop_assert_eq!(aligned.frame.pixel(x as u32, y as u32), expected);
                }
            }
        }
    }
}
