//! Error types for tplot.

use thiserror::Error;

/// tplot error types.
#[derive(Error, Debug)]
pub enum TplotError {
    /// Hilbert curve order outside the supported range
    #[error("invalid Hilbert order: {0} (must be 4-16)")]
    InvalidOrder(u8),

    /// Rejected option value or malformed duration string
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Cannot open or read a log file, CIDR map, or frame destination
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Allocation failure for a bin, mask, or cache
    #[error("resource exhausted: {0}")]
    Resource(String),

    /// External video encoder exited abnormally
    #[error("video encoder failed: {0}")]
    Encoder(String),
}

/// Result type alias for tplot operations.
pub type Result<T> = std::result::Result<T, TplotError>;
