//! Store-level error type and result alias.

use std::path::PathBuf;

use hst_format::FormatError;
use thiserror::Error;

/// The unified error type for the `hst_store` crate.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// A caller passed a bad offset, length, timeframe or digits value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Header or trailing-byte validation failed at open time.
    #[error("corrupt history file {path}: {reason}")]
    CorruptFile {
        /// The file that failed validation.
        path: PathBuf,
        /// What exactly did not add up.
        reason: String,
    },

    /// A set member file disagrees with the set's price precision.
    #[error("digits mismatch in {path}: set has {expected}, file has {actual}")]
    DigitsMismatch {
        /// The offending member file.
        path: PathBuf,
        /// Digits of the set.
        expected: u32,
        /// Digits found in the file header.
        actual: u32,
    },

    /// A caller appended bars not newer than the last known M1 time.
    #[error("out-of-order append: last M1 time is {last}, attempted {attempted}")]
    OutOfOrderAppend {
        /// Latest M1 open time ever applied.
        last: i64,
        /// Open time of the rejected bar.
        attempted: i64,
    },

    /// Another non-closed set already claims the same symbol/directory.
    #[error("history set already open for {symbol} in {directory}")]
    ConflictingOpenSet {
        /// Symbol of the conflicting set.
        symbol: String,
        /// Server directory of the conflicting set.
        directory: PathBuf,
    },

    /// The file or set was used after `close()`.
    #[error("history file/set is closed")]
    Closed,

    /// A record or header failed to encode or decode.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// A generic I/O error.
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, HistoryError>;
