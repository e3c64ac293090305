//! # tplot: Honeypot Traffic Heatmap Renderer
//!
//! tplot turns gzip-compressed honeypot logs into an animated heatmap.
//! Source addresses are placed on a Hilbert space-filling curve so CIDR
//! blocks cluster spatially, events are bucketed into wall-clock time
//! bins, and each finished bin becomes one video frame. Recently
//! active sources fade out over a decay window, and a residue layer
//! keeps a dim memory of every cell that ever saw traffic.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use tplot::{CoreConfig, Pipeline};
//!
//! # fn main() -> tplot::Result<()> {
//! let mut config = CoreConfig::default();
//! config.generate_video = false;
//!
//! let mut pipeline = Pipeline::new(config)?;
//! pipeline.process_file(Path::new("honeypot-2024.log.gz"))?;
//!
//! let summary = pipeline.finalize()?;
//! println!(
//!     "{} frames from {} events",
//!     summary.frames_written, summary.events_processed
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! - **Hilbert mapping**: adjacent addresses land on adjacent cells,
//!   so scanning subnets show up as bright contiguous patches
//! - **Time bins**: epoch-aligned buckets; one retired bin = one frame
//! - **Decay**: a source that goes quiet fades linearly instead of
//!   blinking out
//! - **Residue**: cumulative per-cell volume, never reset during a run

pub mod cidr;
pub mod config;
pub mod decay;
pub mod error;
pub mod hilbert;
pub mod mapper;
pub mod mask;
pub mod parser;
pub mod render;
pub mod timebin;
pub mod video;

// Re-exports for convenience
pub use cidr::{CidrEntry, CidrMap};
pub use config::{AutoScale, CoreConfig};
pub use error::{Result, TplotError};
pub use hilbert::HilbertOrder;
pub use mapper::IpMapper;
pub use mask::NonRoutableMask;
pub use parser::{LogEvent, ParserStats};
pub use render::FrameRenderer;
pub use timebin::{TimeBin, TimeBinManager};

use std::path::Path;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

/// Totals reported when a run finishes.
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    /// Events accepted into the timeline
    pub events_processed: u64,
    /// Frames written to disk
    pub frames_written: u32,
    /// Bins ever opened
    pub total_bins: u32,
    /// Timestamp of the earliest event, if any
    pub first_timestamp: Option<i64>,
    /// Timestamp of the latest event, if any
    pub last_timestamp: Option<i64>,
    /// Frame rate used for the video (after auto-scaling)
    pub video_fps: u32,
    /// Decay window in effect at the end of the run
    pub decay_seconds: u32,
    /// Cells that ever saw activity
    pub residue_count: u32,
    /// Peak cumulative volume of any cell
    pub residue_max_volume: u32,
    /// Events dropped for out-of-range coordinates
    pub dropped_events: u64,
    /// Path of the encoded video, when one was produced
    pub video_path: Option<String>,
    /// Aggregated parse counters across all input files
    pub parser: ParserStats,
}

/// The processing pipeline - owns every subsystem for one run.
///
/// Construction validates the configuration, loads the CIDR mapping
/// (falling back to direct Hilbert mapping if it is missing), and
/// builds the non-routable mask once. Events then flow through
/// [`Pipeline::process_file`] or [`Pipeline::process_event`] in
/// timestamp order, and [`Pipeline::finalize`] flushes the last bin,
/// runs the auto-scale governor, and optionally invokes the video
/// encoder.
pub struct Pipeline {
    config: CoreConfig,
    mapper: IpMapper,
    mask: NonRoutableMask,
    bins: TimeBinManager,
    renderer: FrameRenderer,
    stats: ParserStats,
    events_processed: u64,
    frames_written: u32,
    first_timestamp: i64,
    last_timestamp: i64,
    stop_requested: bool,
}

impl Pipeline {
    /// Build a pipeline from a validated configuration.
    ///
    /// Creates the output directory and allocates the per-run grids.
    /// A missing or unreadable CIDR mapping is a warning, never an
    /// error.
    pub fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        std::fs::create_dir_all(&config.output_dir)?;

        let dimension = config.order.dimension();
        let cidr = load_cidr_mapping(config.cidr_map_path.as_deref(), dimension);

        let mut mapper = IpMapper::new(config.order, cidr);
        let mask = NonRoutableMask::build(&mut mapper)?;
        let bins = TimeBinManager::new(config.bin_seconds, config.order, config.decay_seconds)?;
        let renderer = FrameRenderer::new(config.viz_width, config.viz_height, config.show_timestamp);

        info!(
            order = config.order.get(),
            bin_period = %config::format_duration(config.bin_seconds),
            width = config.viz_width,
            height = config.viz_height,
            output = %config.output_dir.display(),
            "pipeline ready"
        );

        Ok(Self {
            config,
            mapper,
            mask,
            bins,
            renderer,
            stats: ParserStats::default(),
            events_processed: 0,
            frames_written: 0,
            first_timestamp: 0,
            last_timestamp: 0,
            stop_requested: false,
        })
    }

    /// The configuration this pipeline runs with.
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Events accepted so far.
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Frames written so far.
    pub fn frames_written(&self) -> u32 {
        self.frames_written
    }

    /// Ask the pipeline to stop. Checked between input lines; the
    /// in-progress bin is discarded, not emitted.
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// Read one log file and route its events into the timeline.
    ///
    /// Unparseable lines are counted and skipped. Files are expected
    /// to be supplied in chronological order; see
    /// [`parser::peek_first_timestamp`] for sorting inputs.
    ///
    /// # Errors
    ///
    /// I/O errors opening or reading the file. The timeline keeps all
    /// previously processed events, so the caller can skip the file
    /// and continue with the next one.
    pub fn process_file(&mut self, path: &Path) -> Result<()> {
        let mut reader = parser::LogReader::open(path)?;
        let started = Instant::now();
        let mut file_stats = ParserStats::default();
        let mut line = String::new();

        loop {
            if self.stop_requested {
                self.bins.discard_current();
                debug!("stop requested, discarding in-progress bin");
                break;
            }

            let bytes = reader.read_line(&mut line)?;
            if bytes == 0 {
                break;
            }

            file_stats.lines_processed += 1;
            file_stats.bytes_read += bytes as u64;

            if file_stats.lines_processed % 1_000_000 == 0 {
                info!(
                    lines_millions = file_stats.lines_processed / 1_000_000,
                    "still reading"
                );
            }

            match parser::parse_honeypot_line(&line) {
                Some(event) => {
                    file_stats.lines_parsed_ok += 1;
                    self.process_event(&event)?;
                }
                None => file_stats.lines_parse_failed += 1,
            }
        }

        file_stats.parse_time_sec = started.elapsed().as_secs_f64();
        file_stats.log_summary(path);
        self.stats.merge(&file_stats);

        Ok(())
    }

    /// Route one already-parsed event into the timeline.
    ///
    /// When the event opens a new bin, the previous bin is rendered
    /// and written out before this call returns.
    pub fn process_event(&mut self, event: &LogEvent) -> Result<()> {
        self.events_processed += 1;

        if self.first_timestamp == 0 || event.timestamp < self.first_timestamp {
            self.first_timestamp = event.timestamp;
        }
        if event.timestamp > self.last_timestamp {
            self.last_timestamp = event.timestamp;
        }

        let (x, y) = self.mapper.to_coord(event.src_ip);
        if let Some(bin) = self.bins.process(event.timestamp, x, y)? {
            self.write_frame(&bin)?;
        }

        Ok(())
    }

    /// Flush the last bin, apply auto-scaling, and run the encoder.
    ///
    /// The encoder step is advisory: a missing or failing ffmpeg is a
    /// warning and the frames stay on disk. Consumes the pipeline.
    pub fn finalize(mut self) -> Result<RunSummary> {
        let mut video_fps = self.config.video_fps;

        if self.config.auto_scale {
            if let Some(scaled) = AutoScale::derive(self.first_timestamp, self.last_timestamp) {
                info!(
                    fps = scaled.fps,
                    decay = %config::format_duration(scaled.decay_seconds),
                    "auto-scaled playback parameters"
                );
                video_fps = scaled.fps;
                self.bins.set_decay_seconds(scaled.decay_seconds);
            }
        }

        if let Some(bin) = self.bins.finish() {
            self.write_frame(&bin)?;
        }

        let mut video_path = None;
        if self.config.generate_video && self.frames_written > 0 && !self.stop_requested {
            let output = self.config.output_dir.join("output.mp4");
            match video::encode_frames(
                &self.config.output_dir,
                &self.config.output_prefix,
                &self.config.video_codec,
                video_fps,
                &output,
            ) {
                Ok(()) => {
                    if let Err(err) =
                        video::cleanup_frames(&self.config.output_dir, &self.config.output_prefix)
                    {
                        warn!(error = %err, "frame cleanup failed");
                    }
                    video_path = Some(output.display().to_string());
                }
                Err(err) => {
                    warn!(error = %err, "video generation failed, frames retained");
                }
            }
        }

        let (cache_hits, cache_misses) = self.mapper.cidr().cache_stats();
        info!(
            events = self.events_processed,
            frames = self.frames_written,
            bins = self.bins.total_bins(),
            residue_cells = self.bins.residue_count(),
            cidr_cache_hits = cache_hits,
            cidr_cache_misses = cache_misses,
            "run complete"
        );

        Ok(RunSummary {
            events_processed: self.events_processed,
            frames_written: self.frames_written,
            total_bins: self.bins.total_bins(),
            first_timestamp: (self.first_timestamp > 0).then_some(self.first_timestamp),
            last_timestamp: (self.last_timestamp > 0).then_some(self.last_timestamp),
            video_fps,
            decay_seconds: self.bins.decay_seconds(),
            residue_count: self.bins.residue_count(),
            residue_max_volume: self.bins.residue_max_volume(),
            dropped_events: self.bins.dropped_events(),
            video_path,
            parser: self.stats,
        })
    }

    fn write_frame(&mut self, bin: &TimeBin) -> Result<()> {
        let path = render::frame_filename(
            &self.config.output_dir,
            &self.config.output_prefix,
            bin.bin_start(),
            self.frames_written,
        );
        self.renderer
            .render_to_file(&path, bin, self.bins.residue(), self.mask.data())?;
        self.frames_written += 1;
        Ok(())
    }
}

/// Load the CIDR mapping, trying the default location when no path is
/// configured. Any failure degrades to direct Hilbert mapping.
fn load_cidr_mapping(path: Option<&Path>, dimension: u32) -> CidrMap {
    let default_path = Path::new("cidr_map.txt");

    let (path, explicit) = match path {
        Some(path) => (path, true),
        None => (default_path, false),
    };

    if !explicit && !path.exists() {
        debug!("no CIDR mapping file, using direct Hilbert mapping");
        return CidrMap::empty();
    }

    match CidrMap::load(path, dimension) {
        Ok(map) => {
            info!(file = %path.display(), entries = map.len(), "CIDR mapping loaded");
            map
        }
        Err(err) => {
            warn!(
                file = %path.display(),
                error = %err,
                "cannot load CIDR mapping, using direct Hilbert mapping"
            );
            CidrMap::empty()
        }
    }
}
