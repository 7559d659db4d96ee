//! Format-level error type.

use thiserror::Error;

/// Errors produced while encoding or decoding the on-disk format.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The header carries a format version other than 400 or 401.
    #[error("unsupported history format version: {0}")]
    UnsupportedFormatVersion(u32),

    /// The header carries a period id that is not one of the 9 standard timeframes.
    #[error("unsupported timeframe period id: {0}")]
    UnsupportedTimeframe(u32),

    /// A byte slice does not have the exact size of the record it should hold.
    #[error("corrupt record: expected {expected} byte(s), got {actual}")]
    CorruptRecord {
        /// Record size required by the format version.
        expected: usize,
        /// Size of the slice that was handed in.
        actual: usize,
    },

    /// OHLC/tick invariants were violated right before a disk write.
    #[error("invalid bar data: {0}")]
    InvalidBarData(String),
}
