//! Write a synthetic frame sequence.

use std::path::PathBuf;

use clap::Args;
use longexpo_frame_model::Size;
use longexpo_pipeline::{SceneKind, SyntheticSource};

#[derive(Debug, Args)]
pub struct SynthArgs {
    /// Output directory
    pub output: PathBuf,

    /// Scene: light-trails|droplets|clouds
    #[arg(long, default_value = "light-trails")]
    pub kind: SceneKind,

    /// Number of frames
    #[arg(long, default_value = "30")]
    pub frames: usize,

    /// Frame width
    #[arg(long, default_value = "640")]
    pub width: u32,

    /// Frame height
    #[arg(long, default_value = "360")]
    pub height: u32,

    /// Peak camera shake in pixels
    #[arg(long, default_value = "3.0")]
    pub jitter: f64,
}

pub fn run(args: SynthArgs) -> anyhow::Result<()> {
    if args.width == 0 || args.height == 0 {
        anyhow::bail!("Frame size must be non-zero, got {}x{}", args.width, args.height);
    }

    let source = SyntheticSource::new(args.kind, Size::new(args.width, args.height), args.frames)
        .with_jitter(args.jitter);

    println!("Writing {} scene to: {}", args.kind, args.output.display());
    let written = source.write_sequence(&args.output)?;
    println!("  Frames: {}", written.len());
    println!("  Size: {}x{}", args.width, args.height);
    println!("  Camera shake: up to {:.1}px", args.jitter);

    Ok(())
}
