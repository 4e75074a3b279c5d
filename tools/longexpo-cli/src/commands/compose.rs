//! Compose a long-exposure image from a frame sequence.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use longexpo_common::config::AppConfig;
use longexpo_frame_model::{BlendMode, CancellationToken, CompositeStrategy, FillPolicy};
use longexpo_pipeline::{
    frame_to_image, run_long_exposure, ImageSequenceSource, PipelineProgress, PipelineState,
};

use super::SamplingArgs;

#[derive(Debug, Args)]
pub struct ComposeArgs {
    /// Directory of frames (png, jpg, bmp, tiff, webp), ordered by file name
    pub path: PathBuf,

    /// Output image path (defaults to the configured output directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Blend mode: average|additive|max|min
    #[arg(long)]
    pub mode: Option<BlendMode>,

    /// Fill for uncovered pixels: edge-clamp|transparent|black|solid:RRGGBB[AA]
    #[arg(long)]
    pub fill: Option<FillPolicy>,

    #[command(flatten)]
    pub sampling: SamplingArgs,

    /// Skip registration and composite frames as they are
    #[arg(long)]
    pub no_align: bool,

    /// Worker threads for alignment and compositing
    #[arg(long)]
    pub threads: Option<usize>,

    /// Fold frames in this many parallel partitions
    #[arg(long)]
    pub partitions: Option<usize>,
}

pub async fn run(args: ComposeArgs, config: AppConfig) -> anyhow::Result<()> {
    let mut engine = config.engine.clone();
    if let Some(mode) = args.mode {
        engine.blend_mode = mode;
    }
    if let Some(fill) = args.fill {
        engine.fill_policy = fill;
    }
    args.sampling.apply(&mut engine);
    if args.no_align {
        engine.registration.enabled = false;
    }
    if let Some(threads) = args.threads {
        engine.worker_threads = Some(threads);
    }
    if let Some(partitions) = args.partitions {
        engine.compositor.strategy = CompositeStrategy::Partitioned { partitions };
    }

    tracing::debug!(?engine, "Resolved engine configuration");

    let source = ImageSequenceSource::open(&args.path, args.sampling.fps)
        .map_err(|e| anyhow::anyhow!("Failed to open sequence: {e}"))?;

    let output_path = args.output.unwrap_or_else(|| {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        config
            .output_dir
            .join(format!("longexpo-{}-{stamp}.png", engine.blend_mode))
    });

    println!("Composing: {}", args.path.display());
    println!("  Images: {} @ {}fps", source.len(), args.sampling.fps);
    println!("  Mode: {}", engine.blend_mode);
    println!("  Fill: {}", engine.fill_policy);
    println!(
        "  Registration: {}",
        if engine.registration.enabled {
            "phase correlation"
        } else {
            "off"
        }
    );
    println!("  Output: {}", output_path.display());

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling...");
            on_ctrl_c.cancel();
        }
    });

    let progress = Arc::new(|p: PipelineProgress| {
        if p.state.is_terminal() {
            return;
        }
        print!(
            "\r  {:<12} {:5.1}% ({}/{})   ",
            p.state.as_str(),
            p.fraction * 100.0,
            p.completed,
            p.total
        );
        let _ = std::io::stdout().flush();
    });

    let result = run_long_exposure(engine, Box::new(source), progress, cancel).await;
    println!();

    let exposure = match result {
        Ok(exposure) => exposure,
        Err(e) if e.is_cancelled() => {
            println!("Cancelled. Nothing was written.");
            return Ok(());
        }
        Err(e) => return Err(anyhow::anyhow!("Composite failed: {e}")),
    };

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    frame_to_image(&exposure.image)?
        .save(&output_path)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    let report_path = output_path.with_extension("report.json");
    exposure.report.save(&report_path)?;

    let report = &exposure.report;
    println!("{}: {}", PipelineState::Done, output_path.display());
    println!("  Frames: {} ({} unaligned)", report.frame_count, report.low_confidence_frames);
    println!("  Size: {}", report.size);
    println!("  Largest shift: {:.2}px", report.max_shift());
    println!(
        "  Time: {}ms (extract {}ms, align {}ms, composite {}ms)",
        report.timings.total_ms(),
        report.timings.extract_ms,
        report.timings.align_ms,
        report.timings.composite_ms
    );
    println!("  Report: {}", report_path.display());

    Ok(())
}
