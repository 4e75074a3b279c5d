//! Per-pixel accumulation state.

use longexpo_common::{LongExposureError, LongExposureResult};
use longexpo_frame_model::{BlendMode, Frame, Size};
use rayon::prelude::*;

/// Running state for one composite, one lane per pixel channel.
///
/// Max lanes start at 0 and min lanes at 255, the identities of their
/// combine rules, so the first fold needs no special case.
#[derive(Debug, Clone)]
pub struct Accumulator {
    mode: BlendMode,
    size: Size,
    count: usize,
    lanes: Lanes,
}

#[derive(Debug, Clone)]
enum Lanes {
    /// Average and additive: exact sums, wide enough for `count * 255`.
    Sum(Vec<u64>),
    /// Max and min: running extrema.
    Extreme(Vec<u8>),
}

impl Accumulator {
    pub fn new(mode: BlendMode, size: Size) -> Self {
        let len = size.row_bytes() * size.height as usize;
        let lanes = match mode {
            BlendMode::Average | BlendMode::Additive => Lanes::Sum(vec![0; len]),
            BlendMode::Max => Lanes::Extreme(vec![u8::MIN; len]),
            BlendMode::Min => Lanes::Extreme(vec![u8::MAX; len]),
        };
        Self {
            mode,
            size,
            count: 0,
            lanes,
        }
    }

    pub fn mode(&self) -> BlendMode {
        self.mode
    }

    pub fn size(&self) -> Size {
        self.size
    }

    /// Frames folded so far, including merged partials.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Fold one frame. `index` is reported on a size mismatch.
    pub fn fold(&mut self, index: usize, frame: &Frame) -> LongExposureResult<()> {
        if frame.size() != self.size {
            return Err(LongExposureError::dimension_mismatch(
                index,
                self.size,
                frame.size(),
            ));
        }

        let row_bytes = self.size.row_bytes();
        match (&mut self.lanes, self.mode) {
            (Lanes::Sum(sums), _) => {
                sums.par_chunks_mut(row_bytes)
                    .enumerate()
                    .for_each(|(y, lane)| {
                        for (sum, &v) in lane.iter_mut().zip(frame.row(y as u32)) {
                            *sum += u64::from(v);
                        }
                    });
            }
            (Lanes::Extreme(values), BlendMode::Max) => {
                values
                    .par_chunks_mut(row_bytes)
                    .enumerate()
                    .for_each(|(y, lane)| {
                        for (acc, &v) in lane.iter_mut().zip(frame.row(y as u32)) {
                            *acc = (*acc).max(v);
                        }
                    });
            }
            (Lanes::Extreme(values), _) => {
                values
                    .par_chunks_mut(row_bytes)
                    .enumerate()
                    .for_each(|(y, lane)| {
                        for (acc, &v) in lane.iter_mut().zip(frame.row(y as u32)) {
                            *acc = (*acc).min(v);
                        }
                    });
            }
        }

        self.count += 1;
        Ok(())
    }

    /// Combine another partial accumulator into this one.
    ///
    /// Uses the same per-mode rule as [`fold`](Self::fold): sums add,
    /// extrema take the element-wise max or min.
    pub fn merge(&mut self, other: Accumulator) -> LongExposureResult<()> {
        if other.mode != self.mode {
            return Err(LongExposureError::config(format!(
                "cannot merge a {} accumulator into a {} accumulator",
                other.mode, self.mode
            )));
        }
        if other.size != self.size {
            return Err(LongExposureError::dimension_mismatch(
                self.count,
                self.size,
                other.size,
            ));
        }

        match (&mut self.lanes, other.lanes) {
            (Lanes::Sum(a), Lanes::Sum(b)) => {
                a.par_iter_mut().zip(b.par_iter()).for_each(|(x, y)| *x += y);
            }
            (Lanes::Extreme(a), Lanes::Extreme(b)) => {
                if self.mode == BlendMode::Max {
                    a.par_iter_mut().zip(b.par_iter()).for_each(|(x, y)| *x = (*x).max(*y));
                } else {
                    a.par_iter_mut().zip(b.par_iter()).for_each(|(x, y)| *x = (*x).min(*y));
                }
            }
            _ => return Err(LongExposureError::config("accumulator lane shapes differ")),
        }

        self.count += other.count;
        Ok(())
    }

    /// Convert the lanes into output pixels.
    ///
    /// Average rounds half up in exact integer arithmetic; additive clamps
    /// to 255; max and min pass through.
    pub fn finalize(self) -> LongExposureResult<Frame> {
        if self.count == 0 {
            return Err(LongExposureError::EmptyInput);
        }

        let count = self.count as u64;
        let data: Vec<u8> = match self.lanes {
            Lanes::Sum(sums) => match self.mode {
                BlendMode::Average => sums
                    .par_iter()
                    .map(|&sum| ((2 * sum + count) / (2 * count)) as u8)
                    .collect(),
                _ => sums.par_iter().map(|&sum| sum.min(255) as u8).collect(),
            },
            Lanes::Extreme(values) => values,
        };

        Ok(Frame::from_packed(self.size.width, self.size.height, data)?)
    }
}
