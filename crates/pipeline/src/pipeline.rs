//! Long-exposure run coordinator.
//!
//! One [`LongExposurePipeline::run`] call owns everything it touches: the
//! sampled frames, the aligned frames, the accumulator and the progress
//! counters. Nothing is shared between runs, and nothing is published
//! unless the run reaches `Done`.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use longexpo_common::{LongExposureError, LongExposureResult, SamplingPlan};
use longexpo_compositor::Compositor;
use longexpo_frame_model::{
    AlignedFrame, CancellationToken, EngineConfig, Frame, ProgressCounter, ProgressFn,
    StageProgress,
};
use longexpo_registration::{
    FrameAligner, IdentityEstimator, PhaseCorrelationEstimator, Registration,
    RegistrationEstimator,
};
use rayon::prelude::*;

use crate::report::{FrameRegistration, RunReport, StageTimings};
use crate::source::FrameSource;
use crate::state::{PipelineProgress, PipelineProgressFn, PipelineState, StateTracker};

/// A frame pulled from a source, with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledFrame {
    /// Position in the sampled sequence. Frame 0 is the reference.
    pub index: usize,
    pub timestamp_secs: f64,
    pub frame: Frame,
}

/// The published result of a successful run.
#[derive(Debug, Clone)]
pub struct LongExposure {
    pub image: Frame,
    pub report: RunReport,
}

/// Runs the extract, align and composite stages with one configuration.
pub struct LongExposurePipeline {
    config: EngineConfig,
    estimator: Box<dyn RegistrationEstimator>,
}

impl LongExposurePipeline {
    /// Validate `config` and pick the estimator it asks for.
    pub fn new(config: EngineConfig) -> LongExposureResult<Self> {
        config.validate()?;
        let estimator: Box<dyn RegistrationEstimator> = if config.registration.enabled {
            Box::new(PhaseCorrelationEstimator::new(config.registration.clone()))
        } else {
            Box::new(IdentityEstimator)
        };
        Ok(Self { config, estimator })
    }

    /// Replace the registration estimator.
    pub fn with_estimator(mut self, estimator: Box<dyn RegistrationEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run every stage against `source`.
    ///
    /// Emits a terminal `Done`, `Error` or `Cancelled` update before
    /// returning. A cancelled run returns [`LongExposureError::Cancelled`].
    pub fn run(
        &self,
        source: &mut dyn FrameSource,
        progress: PipelineProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> LongExposureResult<LongExposure> {
        let tracker = StateTracker::new(progress);
        let emit = |p: PipelineProgress| tracker.emit(p);
        let result = self.run_stages(source, &emit, cancel);
        finish(result, &emit)
    }

    /// Run the align and composite stages on frames already extracted.
    pub fn run_frames(
        &self,
        source_name: &str,
        frames: Vec<SampledFrame>,
        progress: PipelineProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> LongExposureResult<LongExposure> {
        let tracker = StateTracker::new(progress);
        let emit = |p: PipelineProgress| tracker.emit(p);
        let result = self.align_and_composite(
            source_name,
            frames,
            StageTimings::default(),
            &emit,
            cancel,
        );
        finish(result, &emit)
    }

    fn run_stages(
        &self,
        source: &mut dyn FrameSource,
        progress: PipelineProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> LongExposureResult<LongExposure> {
        let started = Instant::now();
        let on_extract =
            |p: StageProgress| progress(PipelineProgress::new(PipelineState::Extracting, p));
        let frames = self.extract(source, &on_extract, cancel)?;
        let timings = StageTimings {
            extract_ms: elapsed_ms(started),
            ..StageTimings::default()
        };

        self.align_and_composite(source.name(), frames, timings, progress, cancel)
    }

    /// Sample frames from `source` according to the sampling config.
    ///
    /// Frames that fail to decode are skipped. A frame whose size differs
    /// from the first extracted frame aborts with `DimensionMismatch`.
    pub fn extract(
        &self,
        source: &mut dyn FrameSource,
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> LongExposureResult<Vec<SampledFrame>> {
        let plan = SamplingPlan::from_config(source.duration_secs(), &self.config.sampling);
        tracing::info!(
            source = source.name(),
            duration_secs = source.duration_secs(),
            planned = plan.len(),
            "Extracting frames"
        );

        progress(StageProgress::new(0, plan.len()));
        let counter = ProgressCounter::new(plan.len(), progress);
        let mut frames: Vec<SampledFrame> = Vec::with_capacity(plan.len());

        for &timestamp_secs in plan.timestamps() {
            if cancel.is_cancelled() {
                return Err(LongExposureError::Cancelled);
            }

            match source.frame_at(timestamp_secs) {
                Ok(frame) => {
                    if let Some(first) = frames.first() {
                        if frame.size() != first.frame.size() {
                            return Err(LongExposureError::dimension_mismatch(
                                frames.len(),
                                first.frame.size(),
                                frame.size(),
                            ));
                        }
                    }
                    frames.push(SampledFrame {
                        index: frames.len(),
                        timestamp_secs,
                        frame,
                    });
                }
                Err(err) if err.is_cancelled() => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        timestamp_secs,
                        error = %err,
                        "Skipping frame that could not be extracted"
                    );
                }
            }
            counter.advance();
        }

        if frames.is_empty() {
            return Err(LongExposureError::EmptyInput);
        }
        tracing::info!(
            extracted = frames.len(),
            skipped = plan.len() - frames.len(),
            size = %frames[0].frame.size(),
            "Extraction finished"
        );
        Ok(frames)
    }

    /// Register every frame against frame 0 and resample it into the
    /// reference canvas.
    ///
    /// Frames are processed in parallel; results come back in input order.
    /// The reference passes through with a zero offset.
    pub fn align(
        &self,
        frames: &[SampledFrame],
        progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> LongExposureResult<(Vec<AlignedFrame>, Vec<FrameRegistration>)> {
        let Some(reference) = frames.first() else {
            return Err(LongExposureError::EmptyInput);
        };
        let size = reference.frame.size();
        if let Some(odd) = frames.iter().find(|f| f.frame.size() != size) {
            return Err(LongExposureError::dimension_mismatch(
                odd.index,
                size,
                odd.frame.size(),
            ));
        }

        tracing::info!(
            frames = frames.len(),
            estimator = self.estimator.name(),
            fill = %self.config.fill_policy,
            "Aligning frames"
        );

        progress(StageProgress::new(0, frames.len()));
        let counter = ProgressCounter::new(frames.len(), progress);
        let prepared = self.estimator.prepare(&reference.frame);
        let aligner = FrameAligner::new(size, self.config.fill_policy);

        let results = frames
            .par_iter()
            .enumerate()
            .map(|(position, sampled)| {
                if cancel.is_cancelled() {
                    return Err(LongExposureError::Cancelled);
                }

                let registration = if position == 0 {
                    Registration::reference()
                } else {
                    prepared.register(&sampled.frame)
                };
                tracing::debug!(
                    frame = sampled.index,
                    dx = registration.offset.dx,
                    dy = registration.offset.dy,
                    confidence = registration.confidence,
                    status = %registration.status,
                    "Registered frame"
                );

                let aligned = aligner.align(&sampled.frame, registration.offset, sampled.index)?;
                counter.advance();
                Ok((
                    aligned,
                    FrameRegistration::new(sampled.index, sampled.timestamp_secs, &registration),
                ))
            })
            .collect::<LongExposureResult<Vec<_>>>()?;

        let (aligned, registrations): (Vec<_>, Vec<_>) = results.into_iter().unzip();
        let low_confidence = registrations
            .iter()
            .filter(|r| r.is_low_confidence())
            .count();
        if low_confidence > 0 {
            tracing::warn!(
                low_confidence,
                frames = registrations.len(),
                "Some frames could not be registered and were composited unaligned"
            );
        }

        Ok((aligned, registrations))
    }

    fn align_and_composite(
        &self,
        source_name: &str,
        frames: Vec<SampledFrame>,
        mut timings: StageTimings,
        progress: PipelineProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> LongExposureResult<LongExposure> {
        let on_align =
            |p: StageProgress| progress(PipelineProgress::new(PipelineState::Aligning, p));
        let on_composite =
            |p: StageProgress| progress(PipelineProgress::new(PipelineState::Compositing, p));

        let pool = self.thread_pool()?;

        let started = Instant::now();
        let (aligned, registrations) = match &pool {
            Some(pool) => pool.install(|| self.align(&frames, &on_align, cancel))?,
            None => self.align(&frames, &on_align, cancel)?,
        };
        timings.align_ms = elapsed_ms(started);
        drop(frames);

        let started = Instant::now();
        progress(PipelineProgress::started(
            PipelineState::Compositing,
            aligned.len(),
        ));
        let compositor =
            Compositor::new(self.config.blend_mode).with_strategy(self.config.compositor.strategy);
        let result = match &pool {
            Some(pool) => pool.install(|| compositor.run(&aligned, &on_composite, cancel))?,
            None => compositor.run(&aligned, &on_composite, cancel)?,
        };
        timings.composite_ms = elapsed_ms(started);

        let low_confidence_frames = registrations
            .iter()
            .filter(|r| r.is_low_confidence())
            .count();
        let report = RunReport {
            source: source_name.to_string(),
            blend_mode: self.config.blend_mode,
            fill_policy: self.config.fill_policy,
            estimator: self.estimator.name().to_string(),
            frame_count: result.frame_count,
            size: result.image.size(),
            frames: registrations,
            low_confidence_frames,
            timings,
            generated_at: Utc::now(),
        };

        tracing::info!(
            mode = %report.blend_mode,
            frames = report.frame_count,
            low_confidence = report.low_confidence_frames,
            elapsed_ms = report.timings.total_ms(),
            "Long exposure finished"
        );

        Ok(LongExposure {
            image: result.image,
            report,
        })
    }

    /// A dedicated pool when the thread count is pinned.
    fn thread_pool(&self) -> LongExposureResult<Option<rayon::ThreadPool>> {
        let Some(threads) = self.config.worker_threads else {
            return Ok(None);
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("longexpo-worker-{i}"))
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build worker pool: {e}"))?;
        Ok(Some(pool))
    }
}

/// Emit the terminal state for `result`.
fn finish(
    result: LongExposureResult<LongExposure>,
    progress: PipelineProgressFn<'_>,
) -> LongExposureResult<LongExposure> {
    match &result {
        Ok(_) => progress(PipelineProgress::finished(PipelineState::Done)),
        Err(err) if err.is_cancelled() => {
            tracing::info!("Long exposure cancelled");
            progress(PipelineProgress::finished(PipelineState::Cancelled));
        }
        Err(err) => {
            tracing::debug!(error = %err, "Long exposure failed");
            progress(PipelineProgress::finished(PipelineState::Error));
        }
    }
    result
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Run a pipeline on tokio's blocking pool.
///
/// The source moves onto the blocking thread for the length of the run.
pub async fn run_long_exposure(
    config: EngineConfig,
    source: Box<dyn FrameSource>,
    progress: Arc<dyn Fn(PipelineProgress) + Send + Sync>,
    cancel: CancellationToken,
) -> LongExposureResult<LongExposure> {
    let pipeline = LongExposurePipeline::new(config)?;
    tokio::task::spawn_blocking(move || {
        let mut source = source;
        pipeline.run(source.as_mut(), progress.as_ref(), &cancel)
    })
    .await
    .map_err(|e| anyhow::anyhow!("pipeline task failed: {e}"))?
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::source::MemorySource;
    use longexpo_frame_model::{ignore_progress, BlendMode, Size};

    fn gray(v: u8) -> Frame {
        Frame::filled(Size::new(8, 6), [v, v, v, 255]).unwrap()
    }

    fn no_progress(_: PipelineProgress) {}

    #[test]
    fn test_extract_follows_sampling_plan() {
        let mut config = EngineConfig::default();
        config.sampling.frame_interval_secs = 0.2;
        let pipeline = LongExposurePipeline::new(config).unwrap();

        let frames: Vec<Frame> = (0..10).map(|i| gray(i * 10)).collect();
        let mut source = MemorySource::new(frames, 10.0).unwrap();
        let sampled = pipeline
            .extract(&mut source, &ignore_progress, &CancellationToken::new())
            .unwrap();

        assert_eq!(sampled.len(), 5);
        assert_eq!(sampled[1].frame, gray(20));
        assert_eq!(sampled[4].index, 4);
    }

    #[test]
    fn test_max_frames_caps_extraction() {
        let mut config = EngineConfig::default();
        config.sampling.max_frames = 3;
        let pipeline = LongExposurePipeline::new(config).unwrap();

        let mut source = MemorySource::new((0..20).map(gray).collect(), 10.0).unwrap();
        let result = pipeline
            .run(&mut source, &no_progress, &CancellationToken::new())
            .unwrap();
        assert_eq!(result.report.frame_count, 3);
    }

    #[test]
    fn test_empty_source_is_empty_input() {
        let pipeline = LongExposurePipeline::new(EngineConfig::default()).unwrap();
        let mut source = MemorySource::new(Vec::new(), 10.0).unwrap();
        let states = Mutex::new(Vec::new());
        let record = |p: PipelineProgress| states.lock().unwrap().push(p.state);

        let err = pipeline
            .run(&mut source, &record, &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, LongExposureError::EmptyInput));
        assert_eq!(states.lock().unwrap().last(), Some(&PipelineState::Error));
    }

    #[test]
    fn test_mismatched_frame_sizes_abort() {
        let pipeline = LongExposurePipeline::new(EngineConfig::default()).unwrap();
        let odd = Frame::filled(Size::new(4, 4), [0, 0, 0, 255]).unwrap();
        let mut source = MemorySource::new(vec![gray(1), gray(2), odd], 10.0).unwrap();

        let err = pipeline
            .run(&mut source, &no_progress, &CancellationToken::new())
            .unwrap_err();
        match err {
            LongExposureError::DimensionMismatch { index, .. } => assert_eq!(index, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cancelled_run_ends_in_cancelled_state() {
        let pipeline = LongExposurePipeline::new(EngineConfig::default()).unwrap();
        let mut source = MemorySource::new((0..5).map(gray).collect(), 10.0).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let states = Mutex::new(Vec::new());
        let record = |p: PipelineProgress| states.lock().unwrap().push(p.state);
        let err = pipeline.run(&mut source, &record, &cancel).unwrap_err();

        assert!(err.is_cancelled());
        let states = states.into_inner().unwrap();
        assert_eq!(states.last(), Some(&PipelineState::Cancelled));
        assert!(!states.contains(&PipelineState::Done));
    }

    #[test]
    fn test_disabled_registration_uses_identity() {
        let mut config = EngineConfig::default();
        config.registration.enabled = false;
        config.blend_mode = BlendMode::Max;
        let pipeline = LongExposurePipeline::new(config).unwrap();

        let mut source = MemorySource::new(vec![gray(10), gray(90), gray(50)], 10.0).unwrap();
        let result = pipeline
            .run(&mut source, &no_progress, &CancellationToken::new())
            .unwrap();
        assert_eq!(result.report.estimator, "identity");
        assert_eq!(result.image, gray(90));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.sampling.max_frames = 0;
        assert!(matches!(
            LongExposurePipeline::new(config),
            Err(LongExposureError::Config { .. })
        ));
    }

    #[test]
    fn test_pinned_worker_threads() {
        let config = EngineConfig {
            worker_threads: Some(2),
            ..EngineConfig::default()
        };
        let pipeline = LongExposurePipeline::new(config).unwrap();
        let frames = vec![
            SampledFrame {
                index: 0,
                timestamp_secs: 0.0,
                frame: gray(40),
            },
            SampledFrame {
                index: 1,
                timestamp_secs: 0.1,
                frame: gray(40),
            },
        ];
        let result = pipeline
            .run_frames("test", frames, &no_progress, &CancellationToken::new())
            .unwrap();
        assert_eq!(result.image, gray(40));
        assert_eq!(result.report.source, "test");
    }
}
