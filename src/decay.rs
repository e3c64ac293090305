//! Coordinate decay cache.
//!
//! Tracks when each grid cell last saw activity and how much, so that
//! sources that went quiet still fade out visibly over the following
//! frames instead of vanishing. A persistent scanner that stops for a
//! few minutes stays on screen, dimming, until its age crosses the
//! decay window.
//!
//! The cache is an append-oriented array with linear lookup. At the
//! design scale (65536 entries, one lookup per event) this is fine;
//! a hash map keyed on the packed coordinate would preserve the same
//! observable behavior if a larger curve ever demands it.

use crate::timebin::TimeBin;

/// Maximum cached coordinates.
pub const DECAY_MAX_ENTRIES: usize = 65_536;

/// One tracked coordinate.
#[derive(Clone, Copy, Debug)]
struct DecayEntry {
    /// Packed coordinate: `(x << 16) | y`
    coord_key: u32,
    /// Timestamp of the most recent event at this coordinate
    last_seen: i64,
    /// Accumulated event intensity
    intensity: u32,
}

/// Recency cache that overlays fading activity onto outgoing bins.
pub struct DecayCache {
    entries: Vec<DecayEntry>,
    capacity: usize,
}

impl DecayCache {
    /// Create an empty cache with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record activity at a coordinate.
    ///
    /// An existing entry gets its `last_seen` replaced and intensity
    /// added. New coordinates append until the cache is full; once
    /// full, new coordinates are dropped until compaction frees space.
    pub fn record(&mut self, x: u32, y: u32, event_time: i64, intensity: u32) {
        let coord_key = (x << 16) | y;

        for entry in &mut self.entries {
            if entry.coord_key == coord_key {
                entry.last_seen = event_time;
                entry.intensity = entry.intensity.saturating_add(intensity);
                return;
            }
        }

        if self.entries.len() < self.capacity {
            self.entries.push(DecayEntry {
                coord_key,
                last_seen: event_time,
                intensity,
            });
        }
    }

    /// Overlay the cache onto an outgoing bin with linear fade.
    ///
    /// Age is measured against the bin's start time. An entry with
    /// `0 <= age < decay_seconds` contributes
    /// `floor(intensity * (1 - age / decay_seconds))`, floored at 1 so
    /// a not-yet-expired coordinate never disappears. Entries at or
    /// past the decay window, or from the future, contribute nothing.
    pub fn overlay(&self, bin: &mut TimeBin, decay_seconds: u32) {
        let window = i64::from(decay_seconds);
        let dimension = bin.dimension();

        for entry in &self.entries {
            let age = bin.bin_start() - entry.last_seen;
            if age < 0 || age >= window {
                continue;
            }

            let fade = 1.0 - (age as f64 / window as f64);
            let mut contribution = (f64::from(entry.intensity) * fade) as u32;
            if contribution == 0 {
                // Minimum visibility for anything still inside the window.
                contribution = 1;
            }

            let x = entry.coord_key >> 16;
            let y = entry.coord_key & 0xFFFF;
            if x >= dimension || y >= dimension {
                continue;
            }

            bin.overlay(x, y, contribution);
        }
    }

    /// Drop entries older than the decay window (or from the future),
    /// preserving the order of the survivors.
    pub fn compact(&mut self, now: i64, decay_seconds: u32) {
        let window = i64::from(decay_seconds);
        self.entries.retain(|entry| {
            let age = now - entry.last_seen;
            (0..=window).contains(&age)
        });
    }
}

impl Default for DecayCache {
    fn default() -> Self {
        Self::new(DECAY_MAX_ENTRIES)
    }
}
