//! Composite execution.
//!
//! A run validates the whole sequence up front, then folds frames into an
//! [`Accumulator`] either in order on one owner or as parallel partitions
//! merged at the end. Cancellation is checked before every fold and
//! progress is reported after every fold.

use std::time::Instant;

use longexpo_common::{LongExposureError, LongExposureResult};
use longexpo_frame_model::{
    ignore_progress, AlignedFrame, BlendMode, CancellationToken, CompositeStrategy, Frame,
    ProgressCounter, ProgressFn,
};
use rayon::prelude::*;

use crate::accumulator::Accumulator;

/// The final image of a composite run.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeResult {
    /// Output pixels, sized like the reference frame.
    pub image: Frame,
    pub mode: BlendMode,
    /// Frames folded into `image`.
    pub frame_count: usize,
}

/// Blends aligned frames with one blend mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Compositor {
    mode: BlendMode,
    strategy: CompositeStrategy,
}

impl Compositor {
    pub fn new(mode: BlendMode) -> Self {
        Self {
            mode,
            strategy: CompositeStrategy::Sequential,
        }
    }

    pub fn with_strategy(mut self, strategy: CompositeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn mode(&self) -> BlendMode {
        self.mode
    }

    pub fn strategy(&self) -> CompositeStrategy {
        self.strategy
    }

    /// Composite `frames`.
    ///
    /// # Errors
    /// - [`LongExposureError::EmptyInput`] if `frames` is empty
    /// - [`LongExposureError::DimensionMismatch`] if any frame's size differs
    ///   from the first frame's
    /// - [`LongExposureError::Cancelled`] if `cancel` fires before the last fold
    pub fn run(
        &self,
        frames: &[AlignedFrame],
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> LongExposureResult<CompositeResult> {
        let Some(first) = frames.first() else {
            return Err(LongExposureError::EmptyInput);
        };
        let size = first.size();
        if let Some((index, frame)) = frames
            .iter()
            .enumerate()
            .find(|(_, frame)| frame.size() != size)
        {
            return Err(LongExposureError::dimension_mismatch(
                index,
                size,
                frame.size(),
            ));
        }

        let start = Instant::now();
        let counter = ProgressCounter::new(frames.len(), progress);

        let accumulator = match self.strategy {
            CompositeStrategy::Sequential => self.fold_range(frames, 0, &counter, cancel)?,
            CompositeStrategy::Partitioned { partitions } => {
                let chunk_len = frames.len().div_ceil(partitions.max(1));
                let partials = frames
                    .par_chunks(chunk_len)
                    .enumerate()
                    .map(|(chunk, slice)| {
                        self.fold_range(slice, chunk * chunk_len, &counter, cancel)
                    })
                    .collect::<LongExposureResult<Vec<_>>>()?;

                let mut partials = partials.into_iter();
                let mut merged = partials
                    .next()
                    .ok_or(LongExposureError::EmptyInput)?;
                for partial in partials {
                    merged.merge(partial)?;
                }
                merged
            }
        };

        let frame_count = accumulator.count();
        let image = accumulator.finalize()?;

        tracing::info!(
            mode = %self.mode,
            frames = frame_count,
            size = %size,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Composite finished"
        );

        Ok(CompositeResult {
            image,
            mode: self.mode,
            frame_count,
        })
    }

    /// Fold a contiguous slice into a fresh accumulator. `base` is the
    /// sequence index of `frames[0]`.
    fn fold_range(
        &self,
        frames: &[AlignedFrame],
        base: usize,
        counter: &ProgressCounter<'_>,
        cancel: &CancellationToken,
    ) -> LongExposureResult<Accumulator> {
        let mut accumulator = Accumulator::new(self.mode, frames[0].size());
        for (i, aligned) in frames.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::debug!(frame = base + i, "Composite cancelled");
                return Err(LongExposureError::Cancelled);
            }
            accumulator.fold(base + i, &aligned.frame)?;
            counter.advance();
        }
        Ok(accumulator)
    }
}

/// Composite `frames` sequentially, without progress or cancellation.
pub fn composite(frames: &[AlignedFrame], mode: BlendMode) -> LongExposureResult<CompositeResult> {
    Compositor::new(mode).run(frames, &ignore_progress, &CancellationToken::new())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use longexpo_frame_model::{Size, StageProgress};

    fn single_channel(values: [[u8; 2]; 2], index: usize) -> AlignedFrame {
        let frame = Frame::from_fn(Size::new(2, 2), |x, y| {
            let v = values[y as usize][x as usize];
            [v, v, v, 255]
        })
        .unwrap();
        AlignedFrame::passthrough(frame, index)
    }

    fn scenario() -> Vec<AlignedFrame> {
        vec![
            single_channel([[10, 20], [30, 40]], 0),
            single_channel([[20, 20], [20, 20]], 1),
            single_channel([[0, 60], [30, 10]], 2),
        ]
    }

    #[test]
    fn test_average_scenario_rounds_per_cell() {
        let result = composite(&scenario(), BlendMode::Average).unwrap();
        assert_eq!(result.frame_count, 3);
        assert_eq!(result.image.pixel(0, 0)[0], 10);
        assert_eq!(result.image.pixel(1, 0)[0], 33);
        assert_eq!(result.image.pixel(0, 1)[0], 27);
        assert_eq!(result.image.pixel(1, 1)[0], 23);
        assert_eq!(result.image.pixel(1, 1)[3], 255);
    }

    #[test]
    fn test_max_and_min_scenario() {
        let max = composite(&scenario(), BlendMode::Max).unwrap().image;
        let min = composite(&scenario(), BlendMode::Min).unwrap().image;
        assert_eq!(max.pixel(1, 0)[0], 60);
        assert_eq!(max.pixel(1, 1)[0], 40);
        assert_eq!(min.pixel(0, 0)[0], 0);
        assert_eq!(min.pixel(1, 1)[0], 10);
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let err = composite(&[], BlendMode::Average).unwrap_err();
        assert!(matches!(err, LongExposureError::EmptyInput));
    }

    #[test]
    fn test_dimension_mismatch_names_the_frame() {
        let mut frames = scenario();
        let odd = Frame::filled(Size::new(3, 2), [0, 0, 0, 255]).unwrap();
        frames.push(AlignedFrame::passthrough(odd, 3));

        let err = composite(&frames, BlendMode::Max).unwrap_err();
        match err {
            LongExposureError::DimensionMismatch {
                index,
                expected,
                actual,
            } => {
                assert_eq!(index, 3);
                assert_eq!(expected, Size::new(2, 2));
                assert_eq!(actual, Size::new(3, 2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_progress_is_monotonic_and_complete() {
        let seen = Mutex::new(Vec::new());
        let record = |p: StageProgress| seen.lock().unwrap().push(p.fraction());
        Compositor::new(BlendMode::Additive)
            .run(&scenario(), &record, &CancellationToken::new())
            .unwrap();

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seen.last().copied(), Some(1.0));
    }

    #[test]
    fn test_cancelled_before_first_fold() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = Compositor::new(BlendMode::Average)
            .run(&scenario(), &ignore_progress, &cancel)
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_cancel_mid_run_stops_folding() {
        let cancel = CancellationToken::new();
        let folds = Mutex::new(0usize);
        let on_progress = |_: StageProgress| {
            *folds.lock().unwrap() += 1;
            cancel.cancel();
        };
        let err = Compositor::new(BlendMode::Max)
            .run(&scenario(), &on_progress, &cancel)
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(*folds.lock().unwrap(), 1);
    }

    #[test]
    fn test_partitioned_matches_sequential() {
        let frames: Vec<AlignedFrame> = (0..7)
            .map(|i| {
                let v = (i * 37 % 256) as u8;
                single_channel([[v, 255 - v], [v / 2, 200]], i)
            })
            .collect();

        for mode in BlendMode::ALL {
            let sequential = composite(&frames, mode).unwrap();
            for partitions in [1, 2, 3, 16] {
                let partitioned = Compositor::new(mode)
                    .with_strategy(CompositeStrategy::Partitioned { partitions })
                    .run(&frames, &ignore_progress, &CancellationToken::new())
                    .unwrap();
                assert_eq!(partitioned, sequential, "{mode} with {partitions} partitions");
            }
        }
    }
}
