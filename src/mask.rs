//! Non-routable IP space mask.
//!
//! Marks the grid cells that any RFC-reserved IPv4 address maps to, so
//! the renderer can tint private and special-use space. The IPv4 space
//! is sampled with a fixed stride rather than enumerated; at order 12
//! that is ~16M probes for 4.3B addresses, which covers every cell the
//! reserved ranges can reach.
//!
//! The mask depends only on the curve order and the CIDR mapping, so
//! it is built once per run and shared read-only.

use tracing::debug;

use crate::error::{Result, TplotError};
use crate::mapper::IpMapper;

/// Whether an IPv4 address (host byte order) is inside a reserved,
/// non-routable range.
///
/// Covers RFC1918 private space, loopback, link-local, carrier-grade
/// NAT, documentation nets, benchmarking, multicast, and the reserved
/// top of the address space.
pub fn is_nonroutable(ip: u32) -> bool {
    let octet1 = (ip >> 24) as u8;
    let octet2 = (ip >> 16) as u8;
    let octet3 = (ip >> 8) as u8;

    match octet1 {
        // 0.0.0.0/8 current network, 10.0.0.0/8 private, 127.0.0.0/8 loopback
        0 | 10 | 127 => true,
        // 100.64.0.0/10 carrier-grade NAT
        100 => (64..=127).contains(&octet2),
        // 169.254.0.0/16 link-local
        169 => octet2 == 254,
        // 172.16.0.0/12 private
        172 => (16..=31).contains(&octet2),
        192 => match (octet2, octet3) {
            // 192.0.0.0/24 IETF, 192.0.2.0/24 TEST-NET-1
            (0, 0) | (0, 2) => true,
            // 192.88.99.0/24 6to4 relay
            (88, 99) => true,
            // 192.168.0.0/16 private
            (168, _) => true,
            _ => false,
        },
        198 => match octet2 {
            // 198.18.0.0/15 benchmarking
            18 | 19 => true,
            // 198.51.100.0/24 TEST-NET-2
            51 => octet3 == 100,
            _ => false,
        },
        // 203.0.113.0/24 TEST-NET-3
        203 => octet2 == 0 && octet3 == 113,
        // 224.0.0.0/4 multicast, 240.0.0.0/4 reserved
        224..=255 => true,
        _ => false,
    }
}

/// The reserved ranges, as (network, prefix length) pairs. Every base
/// is coarser-aligned than the sampling stride, so walking the ranges
/// visits exactly the stride-aligned addresses a full IPv4 sweep would
/// find inside them.
const RESERVED_RANGES: [(u32, u8); 15] = [
    (0x0000_0000, 8),  // current network
    (0x0A00_0000, 8),  // private
    (0x6440_0000, 10), // carrier-grade NAT
    (0x7F00_0000, 8),  // loopback
    (0xA9FE_0000, 16), // link-local
    (0xAC10_0000, 12), // private
    (0xC000_0000, 24), // IETF protocol assignments
    (0xC000_0200, 24), // TEST-NET-1
    (0xC058_6300, 24), // 6to4 relay
    (0xC0A8_0000, 16), // private
    (0xC612_0000, 15), // benchmarking
    (0xC633_6400, 24), // TEST-NET-2
    (0xCB00_7100, 24), // TEST-NET-3
    (0xE000_0000, 4),  // multicast
    (0xF000_0000, 4),  // reserved
];

/// Dense per-cell bitmap of non-routable coverage.
pub struct NonRoutableMask {
    data: Vec<u8>,
    dimension: u32,
}

impl NonRoutableMask {
    /// Build the mask by sampling the reserved ranges through the
    /// mapper.
    ///
    /// The stride is 64 for small curves (order <= 10) and 256 above
    /// that. The last address is probed explicitly since the strided
    /// walk stops short of it.
    pub fn build(mapper: &mut IpMapper) -> Result<Self> {
        let order = mapper.order();
        let dimension = order.dimension();
        let size = dimension as usize * dimension as usize;

        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| TplotError::Resource(format!("non-routable mask ({} bytes)", size)))?;
        data.resize(size, 0u8);

        let stride: u64 = if order.get() <= 10 { 64 } else { 256 };

        for (network, prefix_len) in RESERVED_RANGES {
            let base = u64::from(network);
            let end = base + (1u64 << (32 - prefix_len));
            let mut ip = base;
            while ip < end {
                debug_assert!(is_nonroutable(ip as u32));
                let (x, y) = mapper.to_coord(ip as u32);
                data[(y * dimension + x) as usize] = 1;
                ip += stride;
            }
        }

        // The strided walk never lands on 255.255.255.255.
        if is_nonroutable(u32::MAX) {
            let (x, y) = mapper.to_coord(u32::MAX);
            data[(y * dimension + x) as usize] = 1;
        }

        let marked = data.iter().filter(|&&v| v != 0).count();
        debug!(
            order = order.get(),
            stride,
            marked,
            total = size,
            "non-routable mask built"
        );

        Ok(Self { data, dimension })
    }

    /// Grid side length the mask was built for.
    pub fn dimension(&self) -> u32 {
        self.dimension
    }

    /// Raw row-major cell data, values 0 or 1.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Whether the cell at a row-major index is marked.
    pub fn is_set(&self, idx: usize) -> bool {
        self.data[idx] != 0
    }

    /// Number of marked cells.
    pub fn marked(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }
}
