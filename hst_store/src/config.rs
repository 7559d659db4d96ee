//! Store options: parsing and defaults.
//!
//! A TOML-backed options block controlling the write-behind buffer and
//! the defaults applied when files are created:
//!
//! ```toml
//! bar_buffer_size = 10000
//! format = 400
//! copyright = "(C)opyright 2003, MetaQuotes Software Corp."
//! ```
//!
//! Entrypoints:
//! - Parse from a TOML string: [`load_options_str`]
//! - Parse from a file path: [`load_options_path`]
//!
//! All fields default individually, so a partial (or empty) TOML block
//! is valid.

use std::path::Path;

use anyhow::Context;
use hst_format::HstFormat;
use serde::Deserialize;

use crate::error::{HistoryError, Result};

/// Default copyright string written into fresh headers.
pub const DEFAULT_COPYRIGHT: &str = "(C)opyright 2003, MetaQuotes Software Corp.";

/// Soft limit of the write-behind buffer before a partial flush.
pub const DEFAULT_BAR_BUFFER_SIZE: usize = 10_000;

/// Options applied to history files and sets.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreOptions {
    /// Buffered-bar count above which appends trigger a partial flush.
    ///
    /// This is a backpressure valve, not a hard limit: a single large
    /// append may still exceed it before the next flush check.
    #[serde(default = "default_buffer_size")]
    pub bar_buffer_size: usize,

    /// Format version (400 or 401) used when creating files.
    #[serde(default = "default_format")]
    pub format: u32,

    /// Copyright string written into fresh headers.
    #[serde(default = "default_copyright")]
    pub copyright: String,
}

fn default_buffer_size() -> usize {
    DEFAULT_BAR_BUFFER_SIZE
}

fn default_format() -> u32 {
    400
}

fn default_copyright() -> String {
    DEFAULT_COPYRIGHT.to_string()
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            bar_buffer_size: default_buffer_size(),
            format: default_format(),
            copyright: default_copyright(),
        }
    }
}

impl StoreOptions {
    /// The default format as a typed value.
    pub fn default_format(&self) -> Result<HstFormat> {
        HstFormat::try_from_u32(self.format).map_err(HistoryError::from)
    }
}

/// Parse options from a TOML string.
pub fn load_options_str(s: &str) -> anyhow::Result<StoreOptions> {
    let opt: StoreOptions = toml::from_str(s).context("parsing store options TOML")?;
    opt.default_format()
        .context("validating store options format version")?;
    Ok(opt)
}

/// Parse options from a TOML file path.
pub fn load_options_path(path: impl AsRef<Path>) -> anyhow::Result<StoreOptions> {
    let path = path.as_ref();
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading store options from {}", path.display()))?;
    load_options_str(&s)
}
