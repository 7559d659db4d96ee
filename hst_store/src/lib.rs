//! Append-mostly storage engine for MetaTrader `.hst` bar history.
//!
//! [`HistoryFile`] owns one file per (symbol, timeframe) with a
//! write-behind buffer, binary time search and splice support;
//! [`HistorySet`] groups the 9 standard timeframes of one symbol and
//! derives M5…MN1 bars from the incoming M1 stream. Single-threaded,
//! synchronous I/O; one open set per (symbol, server directory) per
//! [`SetRegistry`].

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod file;
pub mod registry;
pub mod set;

pub use config::{StoreOptions, load_options_path, load_options_str};
pub use error::{HistoryError, Result};
pub use file::{HistoryFile, SeriesRange, history_file_name, parse_history_file_name};
pub use registry::SetRegistry;
pub use set::HistorySet;
