//! CIDR-to-band mapping with longest-prefix lookup.
//!
//! Loads a text file that assigns CIDR blocks to timezone bands on the
//! X axis of the plot. Entries are sorted once by prefix length
//! (descending) then network (ascending), which turns longest-prefix
//! match into a linear scan that stops at the first hit.
//!
//! Attack traffic is bursty, so repeated lookups for the same source
//! are common. A small direct-mapped cache keyed on the low byte of
//! the IP short-circuits them, and it caches "no match" too so
//! unmapped address space does not rescan the table on every event.

use std::cmp::Reverse;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::Result;

/// Slots in the direct-mapped lookup cache. Power of two so the index
/// is a single mask.
const LOOKUP_CACHE_SIZE: usize = 256;

/// One CIDR block mapped to a timezone band.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CidrEntry {
    /// Network address in canonical form (`network & mask == network`)
    pub network: u32,
    /// Precomputed bitmask for the prefix
    pub mask: u32,
    /// Prefix length, 0..=32
    pub prefix_len: u8,
    /// UTC offset of the band, -12..=14
    pub tz_offset: i32,
    /// First X column of the band (inclusive)
    pub x_start: u32,
    /// Last X column of the band (exclusive)
    pub x_end: u32,
}

impl CidrEntry {
    /// Whether this entry covers the given address.
    pub fn covers(&self, ip: u32) -> bool {
        (ip & self.mask) == self.network
    }
}

#[derive(Clone, Copy, Default)]
struct CacheSlot {
    ip: u32,
    /// Index into `entries`, or None for a cached miss
    entry: Option<usize>,
    valid: bool,
}

/// Longest-prefix CIDR map with a direct-mapped lookup cache.
pub struct CidrMap {
    entries: Vec<CidrEntry>,
    cache: Box<[CacheSlot; LOOKUP_CACHE_SIZE]>,
    skipped_lines: u32,
    hits: u64,
    misses: u64,
}

impl CidrMap {
    /// An empty map. Lookups always miss, so the mapper falls back to
    /// direct Hilbert scaling.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            cache: Box::new([CacheSlot::default(); LOOKUP_CACHE_SIZE]),
            skipped_lines: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Load a mapping file.
    ///
    /// Each non-comment, non-blank line must be
    /// `A.B.C.D/P TZ X_START X_END`. Lines that do not parse are
    /// skipped with a warning and counted. After loading, entries are
    /// sorted by prefix length descending, network ascending, and
    /// masks are applied so every stored network is canonical.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read. Malformed
    /// content is never an error.
    pub fn load(path: &Path, dimension: u32) -> Result<Self> {
        let text = fs::read_to_string(path)?;

        let mut entries = Vec::new();
        let mut skipped_lines = 0u32;

        for (idx, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match parse_entry(trimmed, dimension) {
                Some(entry) => entries.push(entry),
                None => {
                    warn!(line = idx + 1, content = trimmed, "skipping invalid CIDR mapping line");
                    skipped_lines += 1;
                }
            }
        }

        // Most specific first; network ascending breaks ties deterministically.
        entries.sort_unstable_by_key(|e| (Reverse(e.prefix_len), e.network));

        debug!(entries = entries.len(), skipped = skipped_lines, "CIDR mapping loaded");

        Ok(Self {
            entries,
            cache: Box::new([CacheSlot::default(); LOOKUP_CACHE_SIZE]),
            skipped_lines,
            hits: 0,
            misses: 0,
        })
    }

    /// Number of loaded entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lines rejected during load.
    pub fn skipped_lines(&self) -> u32 {
        self.skipped_lines
    }

    /// Cache hit/miss counters since load.
    pub fn cache_stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    /// Find the most specific entry covering `ip`, if any.
    ///
    /// Checks the direct-mapped cache first; both positive and
    /// negative results are cached. On a miss, scans the sorted table
    /// and stops at the first covering entry, which is the longest
    /// prefix by construction.
    pub fn find(&mut self, ip: u32) -> Option<&CidrEntry> {
        let slot_idx = (ip as usize) & (LOOKUP_CACHE_SIZE - 1);
        let slot = self.cache[slot_idx];

        if slot.valid && slot.ip == ip {
            self.hits += 1;
            return slot.entry.map(|i| &self.entries[i]);
        }

        self.misses += 1;

        let found = self.entries.iter().position(|e| e.covers(ip));
        self.cache[slot_idx] = CacheSlot {
            ip,
            entry: found,
            valid: true,
        };

        found.map(|i| &self.entries[i])
    }
}

/// Bitmask for a prefix length: /24 = 0xFFFFFF00, /0 = 0.
fn prefix_mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        !((1u32 << (32 - u32::from(prefix_len))) - 1)
    }
}

/// Parse one `A.B.C.D/P TZ X_START X_END` line.
fn parse_entry(line: &str, dimension: u32) -> Option<CidrEntry> {
    let mut fields = line.split_whitespace();
    let net = fields.next()?;
    let tz_offset: i32 = fields.next()?.parse().ok()?;
    let x_start: u32 = fields.next()?.parse().ok()?;
    let x_end: u32 = fields.next()?.parse().ok()?;

    let (addr, prefix) = net.split_once('/')?;
    let prefix_len: u8 = prefix.parse().ok()?;

    let mut octets = addr.split('.');
    let mut network = 0u32;
    for _ in 0..4 {
        let octet: u8 = octets.next()?.parse().ok()?;
        network = (network << 8) | u32::from(octet);
    }
    if octets.next().is_some() {
        return None;
    }

    if prefix_len > 32 || !(-12..=14).contains(&tz_offset) {
        return None;
    }
    if x_start >= x_end || x_end > dimension {
        return None;
    }

    let mask = prefix_mask(prefix_len);

    Some(CidrEntry {
        network: network & mask,
        mask,
        prefix_len,
        tz_offset,
        x_start,
        x_end,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_from(lines: &[&str], dimension: u32) -> CidrMap {
        let mut entries = Vec::new();
        let mut skipped = 0;
        for line in lines {
            match parse_entry(line, dimension) {
                Some(e) => entries.push(e),
                None => skipped += 1,
            }
        }
        entries.sort_unstable_by_key(|e| (Reverse(e.prefix_len), e.network));
        CidrMap {
            entries,
            cache: Box::new([CacheSlot::default(); LOOKUP_CACHE_SIZE]),
            skipped_lines: skipped,
            hits: 0,
            misses: 0,
        }
    }

    fn ip(a: u8, b: u8, c: u8, d: u8) -> u32 {
        u32::from_be_bytes([a, b, c, d])
    }

    #[test]
    fn test_parse_entry() {
        let e = parse_entry("10.0.0.0/8 -5 0 100", 4096).unwrap();
        assert_eq!(e.network, ip(10, 0, 0, 0));
        assert_eq!(e.mask, 0xFF00_0000);
        assert_eq!(e.prefix_len, 8);
        assert_eq!(e.tz_offset, -5);
        assert_eq!(e.x_start, 0);
        assert_eq!(e.x_end, 100);
    }

    #[test]
    fn test_parse_entry_canonicalizes_network() {
        // Host bits set in the file are masked off on load.
        let e = parse_entry("10.1.2.3/8 0 0 10", 4096).unwrap();
        assert_eq!(e.network, ip(10, 0, 0, 0));
    }

    #[test]
    fn test_parse_entry_rejects_bad_lines() {
        assert!(parse_entry("10.0.0.0/33 0 0 10", 4096).is_none());
        assert!(parse_entry("10.0.0.0/8 15 0 10", 4096).is_none());
        assert!(parse_entry("10.0.0.0/8 0 10 10", 4096).is_none());
        assert!(parse_entry("10.0.0.0/8 0 0 5000", 4096).is_none());
        assert!(parse_entry("10.0.0/8 0 0 10", 4096).is_none());
        assert!(parse_entry("not a line", 4096).is_none());
    }

    #[test]
    fn test_prefix_mask_boundaries() {
        assert_eq!(prefix_mask(0), 0);
        assert_eq!(prefix_mask(8), 0xFF00_0000);
        assert_eq!(prefix_mask(16), 0xFFFF_0000);
        assert_eq!(prefix_mask(24), 0xFFFF_FF00);
        assert_eq!(prefix_mask(32), 0xFFFF_FFFF);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut map = map_from(
            &["10.0.0.0/8 -5 0 100", "10.1.0.0/16 1 100 200"],
            4096,
        );

        let e = map.find(ip(10, 1, 2, 3)).unwrap();
        assert_eq!(e.prefix_len, 16);
        assert_eq!(e.x_start, 100);

        let e = map.find(ip(10, 2, 0, 0)).unwrap();
        assert_eq!(e.prefix_len, 8);
        assert_eq!(e.x_start, 0);
    }

    #[test]
    fn test_find_no_match() {
        let mut map = map_from(&["10.0.0.0/8 -5 0 100"], 4096);
        assert!(map.find(ip(11, 0, 0, 1)).is_none());
    }

    #[test]
    fn test_cache_hit_and_negative_caching() {
        let mut map = map_from(&["10.0.0.0/8 -5 0 100"], 4096);

        assert!(map.find(ip(10, 0, 0, 1)).is_some());
        assert!(map.find(ip(10, 0, 0, 1)).is_some());
        let (hits, misses) = map.cache_stats();
        assert_eq!((hits, misses), (1, 1));

        // Negative results are cached too.
        assert!(map.find(ip(99, 0, 0, 7)).is_none());
        assert!(map.find(ip(99, 0, 0, 7)).is_none());
        let (hits, misses) = map.cache_stats();
        assert_eq!((hits, misses), (2, 2));
    }

    #[test]
    fn test_cache_slot_collision_overwrites() {
        let mut map = map_from(&["10.0.0.0/8 -5 0 100"], 4096);

        // Same low byte, different IPs: second lookup evicts the first.
        assert!(map.find(ip(10, 0, 0, 5)).is_some());
        assert!(map.find(ip(11, 0, 0, 5)).is_none());
        assert!(map.find(ip(10, 0, 0, 5)).is_some());
        let (hits, misses) = map.cache_stats();
        assert_eq!(hits, 0);
        assert_eq!(misses, 3);
    }

    #[test]
    fn test_tie_break_is_network_ascending() {
        let mut map = map_from(
            &["20.0.0.0/8 0 100 200", "10.0.0.0/8 0 0 100"],
            4096,
        );
        // Both are /8; table order after sort is 10/8 then 20/8.
        assert_eq!(map.find(ip(10, 9, 9, 9)).unwrap().x_start, 0);
        assert_eq!(map.find(ip(20, 9, 9, 9)).unwrap().x_start, 100);
    }

    #[test]
    fn test_load_skips_comments_and_bad_lines() {
        let dir = std::env::temp_dir().join("tplot_cidr_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("map.txt");
        std::fs::write(
            &path,
            "# timezone allocation header\n\n10.0.0.0/8 -5 0 100\nbogus line here\n192.168.0.0/16 1 100 200\n",
        )
        .unwrap();

        let map = CidrMap::load(&path, 4096).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.skipped_lines(), 1);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = CidrMap::load(Path::new("/nonexistent/cidr_map.txt"), 4096);
        assert!(err.is_err());
    }
}
