//! Honeypot log ingestion.
//!
//! Reads gzip-compressed (or plain) syslog streams line by line and
//! extracts connection events from the honeypot sensor format:
//!
//! ```text
//! Feb 22 09:26:39 10.10.10.40 honeypi00 sensor: PacketTime:2019-02-22 17:26:39.092449
//!     Len:60 IPv4/TCP 45.55.247.43:35398 -> 10.10.10.40:5900 ...
//! ```
//!
//! Lines that do not match are counted and skipped; the parser never
//! fails a run over malformed input. A minimal FortiGate timestamp
//! extractor exists solely so multi-file runs can be ordered
//! chronologically before processing.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::offset::LocalResult;
use chrono::{Local, NaiveDate, TimeZone};
use flate2::read::MultiGzDecoder;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;

/// TCP protocol number.
pub const PROTO_TCP: u8 = 6;

/// UDP protocol number.
pub const PROTO_UDP: u8 = 17;

/// ICMP protocol number.
pub const PROTO_ICMP: u8 = 1;

/// Lines examined when peeking for a file's first timestamp.
const PEEK_LINE_LIMIT: usize = 1000;

/// Read buffer for the decompressed stream.
const READ_BUFFER_SIZE: usize = 128 * 1024;

/// One parsed connection event.
///
/// Addresses are host byte order: the top octet of the integer is the
/// first byte of the dotted quad. Bin assignment uses `timestamp`
/// only; the microseconds are informational.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogEvent {
    /// Event time, epoch seconds
    pub timestamp: i64,
    /// Sub-second component
    pub timestamp_us: u32,
    /// Source address
    pub src_ip: u32,
    /// Destination address
    pub dst_ip: u32,
    /// Source port
    pub src_port: u16,
    /// Destination port
    pub dst_port: u16,
    /// IP protocol number
    pub protocol: u8,
}

/// Per-file parse counters.
#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct ParserStats {
    /// Lines read from the stream
    pub lines_processed: u64,
    /// Lines that produced an event
    pub lines_parsed_ok: u64,
    /// Lines that did not match the format
    pub lines_parse_failed: u64,
    /// Decompressed bytes read
    pub bytes_read: u64,
    /// Wall seconds spent in the read/parse loop
    pub parse_time_sec: f64,
}

impl ParserStats {
    /// Fold another file's counters into this one.
    pub fn merge(&mut self, other: &ParserStats) {
        self.lines_processed += other.lines_processed;
        self.lines_parsed_ok += other.lines_parsed_ok;
        self.lines_parse_failed += other.lines_parse_failed;
        self.bytes_read += other.bytes_read;
        self.parse_time_sec += other.parse_time_sec;
    }

    /// Log a throughput summary for a finished file.
    pub fn log_summary(&self, path: &Path) {
        let rate = if self.parse_time_sec > 0.0 {
            self.lines_processed as f64 / self.parse_time_sec
        } else {
            0.0
        };
        info!(
            file = %path.display(),
            lines = self.lines_processed,
            parsed = self.lines_parsed_ok,
            failed = self.lines_parse_failed,
            mib = self.bytes_read / (1024 * 1024),
            lines_per_sec = rate as u64,
            "file processed"
        );
    }
}

/// Line reader over a gzip or plain-text log file.
///
/// The compression is sniffed from the gzip magic bytes, so plain
/// files read transparently, matching how the logs are archived in
/// practice (rotated then gzipped).
pub struct LogReader {
    inner: Box<dyn BufRead>,
}

impl LogReader {
    /// Open a log file for line-by-line reading.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut buffered = BufReader::with_capacity(READ_BUFFER_SIZE, file);

        let is_gzip = {
            let head = buffered.fill_buf()?;
            head.len() >= 2 && head[0] == 0x1f && head[1] == 0x8b
        };

        let inner: Box<dyn BufRead> = if is_gzip {
            Box::new(BufReader::with_capacity(
                READ_BUFFER_SIZE,
                MultiGzDecoder::new(buffered),
            ))
        } else {
            Box::new(buffered)
        };

        Ok(Self { inner })
    }

    /// Read the next line into `buf` (cleared first). Returns the byte
    /// count, 0 at end of stream.
    pub fn read_line(&mut self, buf: &mut String) -> Result<usize> {
        buf.clear();
        Ok(self.inner.read_line(buf)?)
    }
}

/// Parse a dotted quad into a host-order integer.
fn parse_ipv4(text: &str) -> Option<u32> {
    let mut value = 0u32;
    let mut octets = 0;
    for part in text.split('.') {
        if part.is_empty() || part.len() > 3 {
            return None;
        }
        let octet: u8 = part.parse().ok()?;
        value = (value << 8) | u32::from(octet);
        octets += 1;
    }
    if octets != 4 {
        return None;
    }
    Some(value)
}

/// Pull `IP:PORT` off the front of `text`.
///
/// Returns the address, the port, and the remainder of the line. The
/// port check is an explicit range test; port 0 is accepted.
fn extract_ip_port(text: &str) -> Option<(u32, u16, &str)> {
    let text = text.trim_start();

    let colon = text.find(':')?;
    let ip = parse_ipv4(&text[..colon])?;

    let rest = &text[colon + 1..];
    let port_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if port_end == 0 {
        return None;
    }
    let port: u32 = rest[..port_end].parse().ok()?;
    if port > 65535 {
        return None;
    }

    Some((ip, port as u16, &rest[port_end..]))
}

/// Convert a wall-clock naive datetime to epoch seconds in the local
/// timezone. Ambiguous DST times resolve to the earlier instant.
fn local_epoch(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
) -> Option<i64> {
    let naive = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.timestamp()),
        LocalResult::Ambiguous(dt, _) => Some(dt.timestamp()),
        LocalResult::None => None,
    }
}

/// Parse `YYYY-MM-DD HH:MM:SS[.micros]` starting at the front of
/// `text`. Returns epoch seconds and the sub-second component.
fn parse_packet_time(text: &str) -> Option<(i64, u32)> {
    // Fixed-width date and time, 19 characters.
    if text.len() < 19 {
        return None;
    }
    let (stamp, rest) = text.split_at(19);

    let year: i32 = stamp.get(0..4)?.parse().ok()?;
    let month: u32 = stamp.get(5..7)?.parse().ok()?;
    let day: u32 = stamp.get(8..10)?.parse().ok()?;
    let hour: u32 = stamp.get(11..13)?.parse().ok()?;
    let minute: u32 = stamp.get(14..16)?.parse().ok()?;
    let second: u32 = stamp.get(17..19)?.parse().ok()?;
    if stamp.get(4..5)? != "-" || stamp.get(10..11)? != " " || stamp.get(16..17)? != ":" {
        return None;
    }

    let timestamp = local_epoch(year, month, day, hour, minute, second)?;

    let mut micros = 0u32;
    if let Some(frac) = rest.strip_prefix('.') {
        let digits: String = frac.chars().take_while(|c| c.is_ascii_digit()).take(6).collect();
        if !digits.is_empty() {
            micros = digits.parse().ok()?;
        }
    }

    Some((timestamp, micros))
}

/// Parse one honeypot sensor line into an event.
///
/// Returns `None` for anything that does not carry a `PacketTime`, an
/// `IPv4/TCP` or `IPv4/UDP` marker, and a `SRC:PORT -> DST:PORT` pair
/// with valid addresses.
pub fn parse_honeypot_line(line: &str) -> Option<LogEvent> {
    let time_pos = line.find("PacketTime:")?;
    let (timestamp, timestamp_us) = parse_packet_time(&line[time_pos + 11..])?;

    let proto_pos = line.find("IPv4/")?;
    let after_proto = &line[proto_pos..];
    let (protocol, rest) = if let Some(rest) = after_proto.strip_prefix("IPv4/TCP") {
        (PROTO_TCP, rest)
    } else if let Some(rest) = after_proto.strip_prefix("IPv4/UDP") {
        (PROTO_UDP, rest)
    } else {
        return None;
    };

    let (src_ip, src_port, rest) = extract_ip_port(rest)?;
    if src_ip == 0 {
        return None;
    }

    let arrow = rest.find(" -> ")?;
    let (dst_ip, dst_port, _) = extract_ip_port(&rest[arrow + 4..])?;
    if dst_ip == 0 {
        return None;
    }

    Some(LogEvent {
        timestamp,
        timestamp_us,
        src_ip,
        dst_ip,
        src_port,
        dst_port,
        protocol,
    })
}

/// Extract just the timestamp from a FortiGate-format line
/// (`date=YYYY-MM-DD ... time=HH:MM:SS`). Used only for chronological
/// file ordering.
pub fn parse_fortigate_timestamp(line: &str) -> Option<i64> {
    let date_pos = line.find("date=")?;
    let date = &line[date_pos + 5..];
    let year: i32 = date.get(0..4)?.parse().ok()?;
    let month: u32 = date.get(5..7)?.parse().ok()?;
    let day: u32 = date.get(8..10)?.parse().ok()?;

    let time_pos = line.find("time=")?;
    let time = &line[time_pos + 5..];
    let hour: u32 = time.get(0..2)?.parse().ok()?;
    let minute: u32 = time.get(3..5)?.parse().ok()?;
    let second: u32 = time.get(6..8)?.parse().ok()?;

    local_epoch(year, month, day, hour, minute, second)
}

/// Timestamp of the first parseable event in a file.
///
/// Scans at most [`PEEK_LINE_LIMIT`] lines so a corrupt file cannot
/// stall startup. Used to order multi-file runs into one timeline.
pub fn peek_first_timestamp(path: &Path) -> Option<i64> {
    let mut reader = match LogReader::open(path) {
        Ok(reader) => reader,
        Err(err) => {
            warn!(file = %path.display(), error = %err, "cannot peek first timestamp");
            return None;
        }
    };

    let mut line = String::new();
    for _ in 0..PEEK_LINE_LIMIT {
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(_) => break,
        }

        if let Some(event) = parse_honeypot_line(&line) {
            return Some(event.timestamp);
        }
        if let Some(timestamp) = parse_fortigate_timestamp(&line) {
            return Some(timestamp);
        }
    }

    warn!(file = %path.display(), "no parseable timestamp found");
    None
}
