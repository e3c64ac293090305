//! Time-binned heatmap aggregation.
//!
//! Events are bucketed into fixed-duration bins aligned to the Unix
//! epoch, each carrying a dense intensity grid. When an event lands
//! outside the live bin, the live bin is retired: the decay cache is
//! overlaid, statistics are finalized, and the bin is handed back to
//! the caller for rendering.
//!
//! Events must arrive in non-decreasing timestamp order. An earlier
//! timestamp is not an error, it just closes the live bin early.

use tracing::debug;

use crate::decay::{DecayCache, DECAY_MAX_ENTRIES};
use crate::error::{Result, TplotError};
use crate::hilbert::HilbertOrder;

/// How many retired bins between decay-cache compaction passes.
const COMPACT_INTERVAL: u32 = 10;

/// One frame's worth of binned intensity data.
pub struct TimeBin {
    bin_start: i64,
    bin_end: i64,
    dimension: u32,
    heatmap: Vec<u32>,
    event_count: u64,
    unique_cells: u32,
    max_intensity: u32,
}

impl TimeBin {
    /// Allocate a zeroed bin covering `[bin_start, bin_start + bin_seconds)`.
    pub fn new(bin_start: i64, bin_seconds: u32, dimension: u32) -> Result<Self> {
        let size = dimension as usize * dimension as usize;
        let mut heatmap = Vec::new();
        heatmap
            .try_reserve_exact(size)
            .map_err(|_| TplotError::Resource(format!("bin heatmap ({} cells)", size)))?;
        heatmap.resize(size, 0u32);

        Ok(Self {
            bin_start,
            bin_end: bin_start + i64::from(bin_seconds),
            dimension,
            heatmap,
            event_count: 0,
            unique_cells: 0,
            max_intensity: 0,
        })
    }

    /// Start of the bin's time window (epoch seconds).
    pub fn bin_start(&self) -> i64 {
        self.bin_start
    }

    /// End of the bin's time window (exclusive).
    pub fn bin_end(&self) -> i64 {
        self.bin_end
    }

    /// Grid side length.
    pub fn dimension(&self) -> u32 {
        self.dimension
    }

    /// Row-major intensity grid.
    pub fn heatmap(&self) -> &[u32] {
        &self.heatmap
    }

    /// Events accepted into this bin (before any decay overlay).
    pub fn event_count(&self) -> u64 {
        self.event_count
    }

    /// Cells with non-zero intensity, computed at finalization.
    pub fn unique_cells(&self) -> u32 {
        self.unique_cells
    }

    /// Peak cell intensity.
    pub fn max_intensity(&self) -> u32 {
        self.max_intensity
    }

    /// Count one event at a coordinate. Out-of-range coordinates are
    /// rejected and the bin is unchanged.
    fn record(&mut self, x: u32, y: u32) -> bool {
        if x >= self.dimension || y >= self.dimension {
            return false;
        }

        let idx = (y * self.dimension + x) as usize;
        self.heatmap[idx] += 1;
        self.event_count += 1;
        if self.heatmap[idx] > self.max_intensity {
            self.max_intensity = self.heatmap[idx];
        }
        true
    }

    /// Add decayed intensity at a coordinate without counting an event.
    pub(crate) fn overlay(&mut self, x: u32, y: u32, intensity: u32) {
        let idx = (y * self.dimension + x) as usize;
        self.heatmap[idx] = self.heatmap[idx].saturating_add(intensity);
        if self.heatmap[idx] > self.max_intensity {
            self.max_intensity = self.heatmap[idx];
        }
    }

    /// Compute final statistics. Called once when the bin retires,
    /// after the decay overlay has been applied.
    fn finalize(&mut self) {
        self.unique_cells = self.heatmap.iter().filter(|&&v| v > 0).count() as u32;
    }
}

/// Manages the live bin, the decay cache, and the residue map.
///
/// Owns all cross-bin mutable state. At most one bin is live at a
/// time; retiring it returns the finalized bin to the caller, which
/// renders and drops it.
pub struct TimeBinManager {
    bin_seconds: u32,
    dimension: u32,
    decay_seconds: u32,
    current: Option<TimeBin>,
    total_bins: u32,
    bins_completed: u32,
    decay: DecayCache,
    residue: Vec<u32>,
    residue_count: u32,
    residue_max_volume: u32,
    dropped_events: u64,
}

impl TimeBinManager {
    /// Create a manager for the given bin duration, curve order, and
    /// decay window.
    pub fn new(bin_seconds: u32, order: HilbertOrder, decay_seconds: u32) -> Result<Self> {
        let dimension = order.dimension();
        let size = dimension as usize * dimension as usize;

        let mut residue = Vec::new();
        residue
            .try_reserve_exact(size)
            .map_err(|_| TplotError::Resource(format!("residue map ({} cells)", size)))?;
        residue.resize(size, 0u32);

        Ok(Self {
            bin_seconds,
            dimension,
            decay_seconds,
            current: None,
            total_bins: 0,
            bins_completed: 0,
            decay: DecayCache::new(DECAY_MAX_ENTRIES),
            residue,
            residue_count: 0,
            residue_max_volume: 0,
            dropped_events: 0,
        })
    }

    /// Epoch-aligned floor of a timestamp to its bin start.
    pub fn bin_start_for(event_time: i64, bin_seconds: u32) -> i64 {
        let step = i64::from(bin_seconds);
        event_time.div_euclid(step) * step
    }

    /// Route one event into its bin.
    ///
    /// If the event opens a new bin, the previous bin is retired
    /// (decay overlay applied, statistics finalized) and returned for
    /// rendering. Returns `None` while the event lands in the live bin.
    pub fn process(&mut self, event_time: i64, x: u32, y: u32) -> Result<Option<TimeBin>> {
        let bin_start = Self::bin_start_for(event_time, self.bin_seconds);

        let mut retired = None;
        let needs_new = match &self.current {
            Some(bin) => bin.bin_start() != bin_start,
            None => true,
        };

        if needs_new {
            retired = self.retire_current();
            self.current = Some(TimeBin::new(bin_start, self.bin_seconds, self.dimension)?);
            self.total_bins += 1;
        }

        self.decay.record(x, y, event_time, 1);
        self.mark_residue(x, y);

        let bin = self.current.as_mut().expect("live bin exists after rotation");
        if !bin.record(x, y) {
            self.dropped_events += 1;
        }

        Ok(retired)
    }

    /// Retire the live bin at end of stream, if one exists.
    pub fn finish(&mut self) -> Option<TimeBin> {
        self.retire_current()
    }

    /// Discard the live bin without finalizing it (cooperative stop).
    pub fn discard_current(&mut self) {
        self.current = None;
    }

    fn retire_current(&mut self) -> Option<TimeBin> {
        let mut bin = self.current.take()?;

        self.decay.overlay(&mut bin, self.decay_seconds);
        bin.finalize();
        self.bins_completed += 1;

        if self.bins_completed % COMPACT_INTERVAL == 0 {
            self.decay.compact(bin.bin_start(), self.decay_seconds);
        }

        debug!(
            bin_start = bin.bin_start(),
            events = bin.event_count(),
            unique_cells = bin.unique_cells(),
            max_intensity = bin.max_intensity(),
            cached = self.decay.len(),
            "bin retired"
        );

        Some(bin)
    }

    fn mark_residue(&mut self, x: u32, y: u32) {
        if x >= self.dimension || y >= self.dimension {
            return;
        }

        let idx = (y * self.dimension + x) as usize;
        if self.residue[idx] == 0 {
            self.residue_count += 1;
        }
        self.residue[idx] = self.residue[idx].saturating_add(1);
        if self.residue[idx] > self.residue_max_volume {
            self.residue_max_volume = self.residue[idx];
        }
    }

    /// Whether a bin is currently live.
    pub fn has_current(&self) -> bool {
        self.current.is_some()
    }

    /// Bins ever created.
    pub fn total_bins(&self) -> u32 {
        self.total_bins
    }

    /// Bins retired so far.
    pub fn bins_completed(&self) -> u32 {
        self.bins_completed
    }

    /// Cumulative per-cell event volume across the whole run.
    pub fn residue(&self) -> &[u32] {
        &self.residue
    }

    /// Cells that have ever seen activity.
    pub fn residue_count(&self) -> u32 {
        self.residue_count
    }

    /// Highest cumulative volume of any cell.
    pub fn residue_max_volume(&self) -> u32 {
        self.residue_max_volume
    }

    /// Live decay-cache entries.
    pub fn decay_len(&self) -> usize {
        self.decay.len()
    }

    /// Events rejected for out-of-range coordinates.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events
    }

    /// Replace the decay window, e.g. after auto-scaling.
    pub fn set_decay_seconds(&mut self, decay_seconds: u32) {
        self.decay_seconds = decay_seconds;
    }

    /// Current decay window in seconds.
    pub fn decay_seconds(&self) -> u32 {
        self.decay_seconds
    }
}
