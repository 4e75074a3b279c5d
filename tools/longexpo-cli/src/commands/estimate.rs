//! Print registration results for a frame sequence.

use std::path::PathBuf;

use clap::Args;
use longexpo_common::config::AppConfig;
use longexpo_frame_model::{ignore_progress, CancellationToken};
use longexpo_pipeline::{FrameRegistration, ImageSequenceSource, LongExposurePipeline};
use longexpo_registration::{PhaseCorrelationEstimator, RegistrationEstimator};

use super::SamplingArgs;

#[derive(Debug, Args)]
pub struct EstimateArgs {
    /// Directory of frames
    pub path: PathBuf,

    #[command(flatten)]
    pub sampling: SamplingArgs,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: EstimateArgs, config: AppConfig) -> anyhow::Result<()> {
    let mut engine = config.engine;
    args.sampling.apply(&mut engine);
    engine.registration.enabled = true;

    let mut source = ImageSequenceSource::open(&args.path, args.sampling.fps)
        .map_err(|e| anyhow::anyhow!("Failed to open sequence: {e}"))?;
    let pipeline = LongExposurePipeline::new(engine.clone())?;
    let frames = pipeline.extract(&mut source, &ignore_progress, &CancellationToken::new())?;

    let estimator = PhaseCorrelationEstimator::new(engine.registration);
    let prepared = estimator.prepare(&frames[0].frame);
    let registrations: Vec<FrameRegistration> = frames
        .iter()
        .map(|sampled| {
            let registration = prepared.register(&sampled.frame);
            FrameRegistration::new(sampled.index, sampled.timestamp_secs, &registration)
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&registrations)?);
        return Ok(());
    }

    println!("Sequence: {}", args.path.display());
    println!(
        "{:>5}  {:>8}  {:>9}  {:>9}  {:>10}  status",
        "frame", "time", "dx", "dy", "confidence"
    );
    for r in &registrations {
        println!(
            "{:>5}  {:>7.3}s  {:>+9.3}  {:>+9.3}  {:>10.3}  {}",
            r.index, r.timestamp_secs, r.offset.dx, r.offset.dy, r.confidence, r.status
        );
    }

    let low = registrations.iter().filter(|r| r.is_low_confidence()).count();
    if low > 0 {
        println!("\n{low} of {} frames fell back to the identity offset", registrations.len());
    }

    Ok(())
}
