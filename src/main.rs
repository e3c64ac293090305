use std::path::PathBuf;
use std::process::exit;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use tplot::{config, parser, CoreConfig, HilbertOrder, Pipeline, TplotError};

#[derive(Parser)]
#[command(name = "tplot")]
#[command(version)]
#[command(about = "Render honeypot traffic as an animated Hilbert-curve heatmap", long_about = None)]
struct Cli {
    /// Time bin period (examples: 1m, 5m, 120s, 1h)
    #[arg(short = 'p', long, default_value = "1m", value_name = "DURATION")]
    period: String,

    /// Hilbert curve order (4-16); dimension is 2^order
    #[arg(short = 'k', long, default_value_t = 12, value_name = "ORDER")]
    order: u8,

    /// Decay window for fading sources; auto-scaled unless disabled
    #[arg(long, default_value = "3h", value_name = "DURATION")]
    decay: String,

    /// Output directory for frames and video
    #[arg(short = 'o', long, default_value = "plots", value_name = "DIR")]
    output: PathBuf,

    /// Frame width in pixels
    #[arg(long, default_value_t = config::VIZ_WIDTH_DEFAULT, value_name = "PIXELS")]
    width: u32,

    /// Frame height in pixels
    #[arg(long, default_value_t = config::VIZ_HEIGHT_DEFAULT, value_name = "PIXELS")]
    height: u32,

    /// Video framerate (1-120); auto-scaled from the data span by default
    #[arg(short = 'f', long, default_value_t = config::VIDEO_FPS_DEFAULT, value_name = "FPS")]
    fps: u32,

    /// Video codec (libx264, libx265, libvpx-vp9, ...)
    #[arg(short = 'c', long, default_value = "libx264", value_name = "CODEC")]
    codec: String,

    /// CIDR mapping file for timezone-band layout (default: cidr_map.txt)
    #[arg(short = 'C', long, value_name = "FILE")]
    cidr_map: Option<PathBuf>,

    /// Target video duration in seconds (10-3600)
    #[arg(short = 'D', long, default_value_t = config::TARGET_DURATION_DEFAULT, value_name = "SECS")]
    duration: u32,

    /// Render the bin timestamp below each frame
    #[arg(short = 't', long)]
    timestamp: bool,

    /// Keep the PPM frames, skip video generation
    #[arg(short = 'V', long = "no-video")]
    no_video: bool,

    /// Use the configured FPS and decay instead of auto-scaling
    #[arg(long)]
    no_auto_scale: bool,

    /// Write the run summary as JSON
    #[arg(long, value_name = "PATH")]
    stats_json: Option<PathBuf>,

    /// Log files to process (gzip or plain text)
    #[arg(required = true, value_name = "FILE")]
    files: Vec<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("tplot error: {err:#}");
        exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = CoreConfig {
        bin_seconds: config::parse_duration(&cli.period)?,
        order: HilbertOrder::new(cli.order)?,
        decay_seconds: config::parse_duration(&cli.decay)?,
        viz_width: cli.width,
        viz_height: cli.height,
        target_video_duration: cli.duration,
        auto_scale: !cli.no_auto_scale,
        show_timestamp: cli.timestamp,
        cidr_map_path: cli.cidr_map,
        output_dir: cli.output,
        output_prefix: String::from("frame"),
        generate_video: !cli.no_video,
        video_fps: cli.fps,
        video_codec: cli.codec,
    };

    let mut pipeline = Pipeline::new(config).context("failed to initialize pipeline")?;

    // Order inputs by their first event so multi-file runs form one
    // non-decreasing timeline. Files with no parseable timestamp sort
    // last and keep their relative order.
    let mut files: Vec<PathBuf> = cli.files;
    files.sort_by_cached_key(|path| parser::peek_first_timestamp(path).unwrap_or(i64::MAX));

    let mut unreadable_files = 0usize;
    for path in &files {
        match pipeline.process_file(path) {
            Ok(()) => {}
            Err(TplotError::Io(err)) => {
                warn!(file = %path.display(), error = %err, "skipping input file");
                unreadable_files += 1;
            }
            Err(err) => return Err(err).context("event processing failed"),
        }
    }

    let summary = pipeline.finalize().context("failed to finalize run")?;

    if let Some(path) = &cli.stats_json {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(path, json)
            .with_context(|| format!("cannot write stats to {}", path.display()))?;
    }

    // Frames written so far stay valid, but an unreadable input still
    // fails the run.
    if unreadable_files > 0 {
        anyhow::bail!("{} input file(s) could not be read", unreadable_files);
    }

    Ok(())
}
