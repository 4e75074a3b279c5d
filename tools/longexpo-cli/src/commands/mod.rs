//! Subcommand implementations.

pub mod compose;
pub mod config;
pub mod estimate;
pub mod info;
pub mod synth;

use longexpo_frame_model::EngineConfig;

/// Sampling and engine overrides shared by commands that read a sequence.
#[derive(Debug, Clone, clap::Args)]
pub struct SamplingArgs {
    /// Playback frame rate of the sequence
    #[arg(long, default_value = "30")]
    pub fps: f64,

    /// Seconds between sampled frames
    #[arg(long)]
    pub interval: Option<f64>,

    /// Maximum number of sampled frames
    #[arg(long)]
    pub max_frames: Option<usize>,
}

impl SamplingArgs {
    pub fn apply(&self, engine: &mut EngineConfig) {
        if let Some(interval) = self.interval {
            engine.sampling.frame_interval_secs = interval;
        }
        if let Some(max_frames) = self.max_frames {
            engine.sampling.max_frames = max_frames;
        }
    }
}
