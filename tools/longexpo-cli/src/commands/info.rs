//! Show frame sequence information.

use std::path::PathBuf;

use longexpo_common::config::AppConfig;
use longexpo_common::SamplingPlan;
use longexpo_pipeline::{FrameSource, ImageSequenceSource};

pub fn run(path: PathBuf, fps: f64, config: AppConfig) -> anyhow::Result<()> {
    let source = ImageSequenceSource::open(&path, fps)
        .map_err(|e| anyhow::anyhow!("Failed to open sequence: {e}"))?;

    println!("Sequence: {}", path.display());
    println!("  Images: {}", source.len());
    match source.frame_size() {
        Some(size) => println!("  Size: {size}"),
        None => println!("  Size: unknown"),
    }
    println!("  Duration: {:.2}s @ {}fps", source.duration_secs(), fps);
    if let (Some(first), Some(last)) = (source.paths().first(), source.paths().last()) {
        println!("  First: {}", first.display());
        println!("  Last: {}", last.display());
    }
    println!();

    let sampling = &config.engine.sampling;
    let plan = SamplingPlan::from_config(source.duration_secs(), sampling);
    println!("Sampling:");
    println!(
        "  Interval: {}s, max frames: {}",
        sampling.frame_interval_secs, sampling.max_frames
    );
    println!("  Frames sampled: {}", plan.len());
    if let Some(step) = plan.step_secs() {
        println!("  Effective step: {step:.3}s");
    }

    Ok(())
}
