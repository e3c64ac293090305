//! IP-to-coordinate mapping.
//!
//! Two modes, selected per address:
//!
//! - **Band mode**: when a CIDR mapping covers the address, the X axis
//!   is consumed by the geographic timezone band and the Y axis spreads
//!   the remaining bits. There is no Hilbert structure on this path.
//! - **Direct mode**: the full 32-bit address is scaled losslessly onto
//!   the curve, `d = (ip * total_points) >> 32`, so adjacent addresses
//!   land on adjacent curve cells and CIDR blocks stay contiguous.
//!
//! Both modes are deterministic: the same address always maps to the
//! same cell for a fixed order and mapping.

use crate::cidr::CidrMap;
use crate::hilbert::{self, HilbertOrder};

/// Maps IPv4 addresses to grid coordinates.
pub struct IpMapper {
    order: HilbertOrder,
    cidr: CidrMap,
}

impl IpMapper {
    /// Create a mapper for the given order and CIDR mapping.
    ///
    /// Pass [`CidrMap::empty`] to always use direct Hilbert scaling.
    pub fn new(order: HilbertOrder, cidr: CidrMap) -> Self {
        Self { order, cidr }
    }

    /// The curve order this mapper targets.
    pub fn order(&self) -> HilbertOrder {
        self.order
    }

    /// The CIDR mapping in use.
    pub fn cidr(&self) -> &CidrMap {
        &self.cidr
    }

    /// Map an address to `(x, y)` grid coordinates.
    pub fn to_coord(&mut self, ip: u32) -> (u32, u32) {
        let dimension = self.order.dimension();

        if !self.cidr.is_empty() {
            if let Some(entry) = self.cidr.find(ip) {
                // Band width of at least one column so the division below
                // always lands inside the band.
                let width = u64::from((entry.x_end - entry.x_start).max(1));

                let high16 = u64::from(ip >> 16);
                let low16 = u64::from(ip & 0xFFFF);

                let mut x = entry.x_start + ((high16 * width) >> 16) as u32;
                if x >= entry.x_end {
                    x = entry.x_end.saturating_sub(1);
                }

                let y = ((low16 * u64::from(dimension)) >> 16) as u32;
                return (x, y);
            }
        }

        // Lossless proportional scaling across the whole curve. The full
        // 32-bit value participates; nothing is dropped by shifting.
        let total = self.order.total_points();
        let mut index = (u64::from(ip) * total) >> 32;
        if index >= total {
            index = total - 1;
        }

        hilbert::xy_of(index, self.order)
    }

    /// Map an address to its curve index.
    pub fn to_index(&mut self, ip: u32) -> u64 {
        let (x, y) = self.to_coord(ip);
        hilbert::index_of(x, y, self.order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cidr::CidrMap;
    use crate::hilbert::xy_of;

    fn direct_mapper(order: u8) -> IpMapper {
        IpMapper::new(HilbertOrder::new(order).unwrap(), CidrMap::empty())
    }

    fn banded_mapper(name: &str, order: u8, lines: &[&str]) -> IpMapper {
        let hilbert_order = HilbertOrder::new(order).unwrap();
        let dir = std::env::temp_dir().join("tplot_mapper_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("map_{}.txt", name));
        std::fs::write(&path, lines.join("\n")).unwrap();
        let map = CidrMap::load(&path, hilbert_order.dimension()).unwrap();
        std::fs::remove_file(&path).ok();
        IpMapper::new(hilbert_order, map)
    }

    #[test]
    fn test_direct_scaling_endpoints() {
        let mut mapper = direct_mapper(4);
        let order = mapper.order();

        assert_eq!(mapper.to_coord(0x0000_0000), xy_of(0, order));
        assert_eq!(
            mapper.to_coord(0xFFFF_FFFF),
            xy_of(order.total_points() - 1, order)
        );
    }

    #[test]
    fn test_direct_scaling_order4() {
        // 256 total points, so index = ip >> 24. 1.1.1.1 lands on index 1.
        let mut mapper = direct_mapper(4);
        let order = mapper.order();
        assert_eq!(mapper.to_coord(0x0101_0101), xy_of(1, order));
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let mut mapper = direct_mapper(12);
        let a = mapper.to_coord(0x2B37_F72B);
        let b = mapper.to_coord(0x2B37_F72B);
        assert_eq!(a, b);
    }

    #[test]
    fn test_adjacent_ips_stay_close() {
        // At order 12 consecutive addresses differ by at most one curve
        // index, so they are at most one grid step apart.
        let mut mapper = direct_mapper(12);
        let base = 0x2D4B_0000u32;
        let mut prev = mapper.to_index(base);
        for offset in 1..1024u32 {
            let idx = mapper.to_index(base + offset);
            assert!(idx >= prev);
            assert!(idx - prev <= 1);
            prev = idx;
        }
    }

    #[test]
    fn test_band_mode_x_within_band() {
        let mut mapper = banded_mapper("x_band", 12, &["10.0.0.0/8 -5 0 100"]);
        for d in [0u8, 1, 77, 255] {
            let (x, _) = mapper.to_coord(u32::from_be_bytes([10, d, 0, 1]));
            assert!(x < 100, "x={} escaped the band", x);
        }
    }

    #[test]
    fn test_band_mode_y_spreads_low_bits() {
        let mut mapper = banded_mapper("y_spread", 12, &["10.0.0.0/8 -5 0 100"]);
        let (_, y_low) = mapper.to_coord(u32::from_be_bytes([10, 0, 0, 0]));
        let (_, y_high) = mapper.to_coord(u32::from_be_bytes([10, 0, 255, 255]));
        assert_eq!(y_low, 0);
        assert!(y_high > 4000, "high low-16 bits should land near the bottom");
    }

    #[test]
    fn test_single_column_band() {
        // A one-column band pins every covered address to that column.
        let mut mapper = banded_mapper("clamp", 12, &["203.0.113.0/24 10 50 51"]);
        let (x, _) = mapper.to_coord(u32::from_be_bytes([203, 0, 113, 200]));
        assert_eq!(x, 50);
    }

    #[test]
    fn test_unmapped_ip_falls_back_to_hilbert() {
        let mut mapper = banded_mapper("fallback", 12, &["10.0.0.0/8 -5 0 100"]);
        let order = mapper.order();

        let ip = u32::from_be_bytes([45, 55, 247, 43]);
        let expected = {
            let total = order.total_points();
            xy_of((u64::from(ip) * total) >> 32, order)
        };
        assert_eq!(mapper.to_coord(ip), expected);
    }
}
