//! One open `.hst` file per (symbol, timeframe).
//!
//! ## What this does
//! - Owns the file handle and a write-behind bar buffer (insertion
//!   order = chronological).
//! - Keeps two parallel metadata views: `stored` (bytes on disk) and
//!   `full` (stored + buffered — the logical series a reader sees).
//! - Aggregates incoming M1 bars into the file's own period via an
//!   explicit roll-over state machine (`open_until`).
//!
//! ## Consistency
//! Reads go through the buffer first, so `get_bar` returns the same
//! data for a given offset whether the bar is buffered or flushed.
//! A flush writes bars in order at the stored tail, then rewrites the
//! header with the refreshed sync time. The header-then-data double
//! write is not atomic; a reopen after a crash recomputes metadata
//! from the file itself and never trusts stale in-memory state.
//!
//! ## Mutability
//! Stored bars are immutable with one exception: the newest bar of a
//! derived timeframe stays open until time advances past its close,
//! and an M1 bar landing inside that window rewrites the newest
//! record in place.

mod search;
mod splice;

use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use hst_format::{
    Bar, HEADER_SIZE, HistoryHeader, HstFormat, Timeframe, decode_bar, decode_header,
    encode_bar, encode_header,
    timeframe::SECS_PER_MINUTE,
};
use tracing::{debug, warn};

use crate::config::StoreOptions;
use crate::error::{HistoryError, Result};

/// Maximum visible characters in a header symbol field.
const MAX_SYMBOL_LEN: usize = 11;

/// Bookkeeping for one view of the bar series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeriesRange {
    /// Number of bars in this view.
    pub bars: u64,
    /// Open time of the oldest bar, 0 when empty.
    pub from_open_time: i64,
    /// Close time of the oldest bar, 0 when empty.
    pub from_close_time: i64,
    /// Open time of the newest bar, 0 when empty.
    pub to_open_time: i64,
    /// Close time of the newest bar, 0 when empty.
    pub to_close_time: i64,
    /// Timestamp through which this view is known synchronized.
    pub last_sync_time: i64,
}

impl SeriesRange {
    /// Offset of the oldest bar, -1 when empty.
    pub fn from_offset(&self) -> i64 {
        if self.bars == 0 { -1 } else { 0 }
    }

    /// Offset of the newest bar, -1 when empty.
    pub fn to_offset(&self) -> i64 {
        self.bars as i64 - 1
    }
}

/// One open history file.
#[derive(Debug)]
pub struct HistoryFile {
    file: File,
    path: PathBuf,
    symbol: String,
    timeframe: Timeframe,
    digits: u32,
    format: HstFormat,
    copyright: String,
    sync_marker: u32,
    buffer: Vec<Bar>,
    buffer_limit: usize,
    /// Close time of the in-progress aggregation bar, if one is open.
    open_until: Option<i64>,
    stored: SeriesRange,
    full: SeriesRange,
    last_m1_time: i64,
    closed: bool,
}

/// `{SYMBOL}{minutes}.hst`
pub fn history_file_name(symbol: &str, timeframe: Timeframe) -> String {
    format!("{}{}.hst", symbol.to_ascii_uppercase(), timeframe.minutes())
}

/// Parse `{SYMBOL}{minutes}.hst` back into its parts.
///
/// The period is the longest trailing digit run (without a leading
/// zero) that maps to a standard timeframe, so symbols containing
/// digits ("DE30") resolve correctly.
pub fn parse_history_file_name(name: &str) -> Option<(String, Timeframe)> {
    let stem = name.strip_suffix(".hst").or_else(|| name.strip_suffix(".HST"))?;
    let digits_at = stem
        .rfind(|c: char| !c.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    let mut at = digits_at;
    while at < stem.len() {
        let suffix = &stem[at..];
        if !suffix.starts_with('0') {
            if let Ok(minutes) = suffix.parse::<u32>() {
                if let Ok(tf) = Timeframe::from_minutes(minutes) {
                    let symbol = &stem[..at];
                    if !symbol.is_empty() {
                        return Some((symbol.to_string(), tf));
                    }
                }
            }
        }
        at += 1;
    }
    None
}

impl HistoryFile {
    /// Creates (or truncates) the file for `symbol`/`timeframe` in
    /// `directory` and writes a fresh header.
    pub fn create(
        directory: &Path,
        symbol: &str,
        timeframe: Timeframe,
        digits: u32,
        format: HstFormat,
        options: &StoreOptions,
    ) -> Result<HistoryFile> {
        if symbol.is_empty() || symbol.len() > MAX_SYMBOL_LEN {
            return Err(HistoryError::InvalidArgument(format!(
                "symbol {symbol:?} must be 1..={MAX_SYMBOL_LEN} characters"
            )));
        }
        if digits > 15 {
            return Err(HistoryError::InvalidArgument(format!(
                "digits {digits} out of range"
            )));
        }
        std::fs::create_dir_all(directory)?;
        let path = directory.join(history_file_name(symbol, timeframe));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let mut hf = HistoryFile {
            file,
            path,
            symbol: symbol.to_ascii_uppercase(),
            timeframe,
            digits,
            format,
            copyright: options.copyright.clone(),
            sync_marker: 0,
            buffer: Vec::new(),
            buffer_limit: options.bar_buffer_size,
            open_until: None,
            stored: SeriesRange::default(),
            full: SeriesRange::default(),
            last_m1_time: 0,
            closed: false,
        };
        hf.write_header()?;
        Ok(hf)
    }

    /// Opens an existing file, validating header and record sizing.
    pub fn open(path: &Path, options: &StoreOptions) -> Result<HistoryFile> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        let (name_symbol, timeframe) = parse_history_file_name(name).ok_or_else(|| {
            HistoryError::CorruptFile {
                path: path.to_path_buf(),
                reason: format!("unrecognized history file name {name:?}"),
            }
        })?;

        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let size = file.metadata()?.len();
        if size < HEADER_SIZE as u64 {
            return Err(HistoryError::CorruptFile {
                path: path.to_path_buf(),
                reason: format!("file size {size} is below the header size"),
            });
        }

        let mut head = [0u8; HEADER_SIZE];
        file.read_exact(&mut head)?;
        let header = decode_header(&head)?;
        if !header.symbol.eq_ignore_ascii_case(&name_symbol) {
            return Err(HistoryError::CorruptFile {
                path: path.to_path_buf(),
                reason: format!(
                    "header symbol {:?} does not match file name symbol {:?}",
                    header.symbol, name_symbol
                ),
            });
        }
        if header.period != timeframe {
            return Err(HistoryError::CorruptFile {
                path: path.to_path_buf(),
                reason: format!(
                    "header period {} does not match file name period {}",
                    header.period, timeframe
                ),
            });
        }

        let bar_size = header.format.bar_size() as u64;
        let trailing = size - HEADER_SIZE as u64;
        if trailing % bar_size != 0 {
            return Err(HistoryError::CorruptFile {
                path: path.to_path_buf(),
                reason: format!(
                    "{trailing} trailing byte(s) are not a multiple of the {bar_size}-byte record"
                ),
            });
        }

        let mut hf = HistoryFile {
            file,
            path: path.to_path_buf(),
            symbol: header.symbol.to_ascii_uppercase(),
            timeframe,
            digits: header.digits,
            format: header.format,
            copyright: header.copyright,
            sync_marker: header.sync_marker,
            buffer: Vec::new(),
            buffer_limit: options.bar_buffer_size,
            open_until: None,
            stored: SeriesRange {
                bars: trailing / bar_size,
                last_sync_time: header.last_sync_time,
                ..SeriesRange::default()
            },
            full: SeriesRange::default(),
            last_m1_time: 0,
            closed: false,
        };
        hf.reload_boundaries()?;
        hf.full = hf.stored;
        // The newest bar may still be open/incomplete. A derived file
        // resumes from the M1 stream position, not from its own bar
        // end, which lies minutes ahead inside the open period.
        hf.last_m1_time = if timeframe == Timeframe::M1 {
            hf.stored.to_close_time.max(hf.stored.last_sync_time)
        } else {
            hf.stored.last_sync_time
        }
        .saturating_sub(SECS_PER_MINUTE)
        .max(0);
        if hf.stored.bars > 0 {
            hf.open_until = Some(hf.timeframe.close_time(hf.stored.to_open_time));
        }
        Ok(hf)
    }

    // ---- metadata accessors ----

    /// The instrument symbol (uppercase).
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// The bar period of this file.
    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Price precision (fractional digits).
    pub fn digits(&self) -> u32 {
        self.digits
    }

    /// On-disk format version.
    pub fn format(&self) -> HstFormat {
        self.format
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bookkeeping for the bars actually on disk.
    pub fn stored(&self) -> SeriesRange {
        self.stored
    }

    /// Bookkeeping for the logical series (stored + buffered).
    pub fn full(&self) -> SeriesRange {
        self.full
    }

    /// Number of bars currently in the write buffer.
    pub fn buffered_bars(&self) -> usize {
        self.buffer.len()
    }

    /// Latest M1 open time ever applied to this file.
    pub fn last_m1_time(&self) -> i64 {
        self.last_m1_time
    }

    /// Whether `close()` has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(HistoryError::Closed)
        } else {
            Ok(())
        }
    }

    // ---- random access ----

    /// Returns the bar at `offset`, or `None` past the end of the
    /// logical series. Buffered bars are served from memory.
    pub fn get_bar(&mut self, offset: i64) -> Result<Option<Bar>> {
        self.ensure_open()?;
        if offset < 0 {
            return Err(HistoryError::InvalidArgument(format!(
                "negative bar offset {offset}"
            )));
        }
        let offset = offset as u64;
        if offset >= self.full.bars {
            return Ok(None);
        }
        if offset >= self.stored.bars {
            return Ok(Some(self.buffer[(offset - self.stored.bars) as usize]));
        }
        self.read_stored_bar(offset).map(Some)
    }

    fn read_stored_bar(&mut self, offset: u64) -> Result<Bar> {
        let bar_size = self.format.bar_size();
        let pos = HEADER_SIZE as u64 + offset * bar_size as u64;
        self.file.seek(SeekFrom::Start(pos))?;
        let mut buf = [0u8; hst_format::BAR_SIZE_V401];
        self.file.read_exact(&mut buf[..bar_size])?;
        Ok(decode_bar(&buf[..bar_size], self.digits, self.format)?)
    }

    fn write_stored_bar(&mut self, offset: u64, bar: &Bar) -> Result<()> {
        let mut out = Vec::with_capacity(self.format.bar_size());
        encode_bar(bar, self.digits, self.format, &mut out)?;
        let pos = HEADER_SIZE as u64 + offset * self.format.bar_size() as u64;
        self.file.seek(SeekFrom::Start(pos))?;
        self.file.write_all(&out)?;
        Ok(())
    }

    // ---- appending ----

    /// Applies a batch of M1 bars, sorted ascending by open time.
    ///
    /// M1 files take the bars verbatim; derived timeframes either
    /// extend their in-progress bar or roll over to a new
    /// period-aligned one. Bars not strictly newer than the last known
    /// M1 time are rejected up front with
    /// [`HistoryError::OutOfOrderAppend`], leaving all state unchanged.
    ///
    /// The buffer limit is checked after every bar, so a batch larger
    /// than the limit drains in limit-sized partial flushes.
    pub fn append_bars(&mut self, bars: &[Bar]) -> Result<()> {
        self.ensure_open()?;
        self.check_in_order(bars)?;
        for bar in bars {
            if self.timeframe == Timeframe::M1 {
                self.push_m1(bar);
            } else {
                self.roll_into_period(bar)?;
            }
            self.last_m1_time = bar.time;
            self.full.last_sync_time = bar.time + SECS_PER_MINUTE;
            if self.buffer.len() > self.buffer_limit {
                self.flush(Some(self.buffer_limit))?;
            }
        }
        Ok(())
    }

    fn check_in_order(&self, bars: &[Bar]) -> Result<()> {
        let mut last = self.last_m1_time;
        for bar in bars {
            if bar.time <= last {
                return Err(HistoryError::OutOfOrderAppend {
                    last,
                    attempted: bar.time,
                });
            }
            last = bar.time;
        }
        Ok(())
    }

    fn push_m1(&mut self, bar: &Bar) {
        self.buffer.push(*bar);
        self.advance_full_tail(bar.time, bar.time + SECS_PER_MINUTE);
    }

    fn roll_into_period(&mut self, m1: &Bar) -> Result<()> {
        if let Some(close) = self.open_until {
            if m1.time < close {
                return self.extend_open_bar(m1);
            }
        }
        let open_time = self.timeframe.align(m1.time);
        let bar = Bar {
            time: open_time,
            open: m1.open,
            high: m1.high,
            low: m1.low,
            close: m1.close,
            ticks: m1.ticks,
            spread: m1.spread,
            volume: m1.volume,
        };
        self.open_until = Some(self.timeframe.close_time(open_time));
        self.buffer.push(bar);
        self.advance_full_tail(open_time, self.timeframe.close_time(open_time));
        Ok(())
    }

    /// Folds one more M1 bar into the in-progress bar, which lives
    /// either at the buffer tail or, right after a full flush, as the
    /// newest stored record (rewritten in place).
    fn extend_open_bar(&mut self, m1: &Bar) -> Result<()> {
        if let Some(open) = self.buffer.last_mut() {
            open.high = open.high.max(m1.high);
            open.low = open.low.min(m1.low);
            open.close = m1.close;
            open.ticks += m1.ticks;
            return Ok(());
        }
        debug_assert!(self.stored.bars > 0, "open bar without any bars");
        let offset = self.stored.bars - 1;
        let mut open = self.read_stored_bar(offset)?;
        open.high = open.high.max(m1.high);
        open.low = open.low.min(m1.low);
        open.close = m1.close;
        open.ticks += m1.ticks;
        self.write_stored_bar(offset, &open)
    }

    fn advance_full_tail(&mut self, open_time: i64, close_time: i64) {
        if self.full.bars == 0 {
            self.full.from_open_time = open_time;
            self.full.from_close_time = close_time;
        }
        self.full.bars += 1;
        self.full.to_open_time = open_time;
        self.full.to_close_time = close_time;
    }

    // ---- flushing ----

    /// Writes up to `limit` buffered bars (all of them when `None`) to
    /// the stored tail, normalizing points to real prices on the way
    /// out, then rewrites the header with the refreshed sync time.
    /// Returns the number of bars written; an empty buffer is a no-op.
    pub fn flush(&mut self, limit: Option<usize>) -> Result<usize> {
        self.ensure_open()?;
        let count = limit.unwrap_or(usize::MAX).min(self.buffer.len());
        if count == 0 {
            return Ok(0);
        }

        let bar_size = self.format.bar_size();
        let mut out = Vec::with_capacity(count * bar_size);
        for bar in &self.buffer[..count] {
            encode_bar(bar, self.digits, self.format, &mut out)?;
        }
        let pos = HEADER_SIZE as u64 + self.stored.bars * bar_size as u64;
        self.file.seek(SeekFrom::Start(pos))?;
        self.file.write_all(&out)?;

        let first = self.buffer[0];
        let last = self.buffer[count - 1];
        if self.stored.bars == 0 {
            self.stored.from_open_time = first.time;
            self.stored.from_close_time = self.timeframe.close_time(first.time);
        }
        self.stored.bars += count as u64;
        self.stored.to_open_time = last.time;
        self.stored.to_close_time = self.timeframe.close_time(last.time);
        self.stored.last_sync_time = if count < self.buffer.len() {
            self.stored.to_close_time
        } else {
            self.last_m1_time + SECS_PER_MINUTE
        };
        self.write_header()?;
        self.buffer.drain(..count);
        debug!(
            path = %self.path.display(),
            bars = count,
            remaining = self.buffer.len(),
            "flushed bar(s)"
        );
        Ok(count)
    }

    fn write_header(&mut self) -> Result<()> {
        let header = HistoryHeader {
            format: self.format,
            copyright: self.copyright.clone(),
            symbol: self.symbol.clone(),
            period: self.timeframe,
            digits: self.digits,
            sync_marker: self.sync_marker,
            last_sync_time: self.stored.last_sync_time,
        };
        let buf = encode_header(&header);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&buf)?;
        Ok(())
    }

    /// Re-reads the first and last stored bars to refresh the stored
    /// range after the on-disk series changed shape.
    pub(crate) fn reload_boundaries(&mut self) -> Result<()> {
        if self.stored.bars == 0 {
            let sync = self.stored.last_sync_time;
            self.stored = SeriesRange {
                last_sync_time: sync,
                ..SeriesRange::default()
            };
            return Ok(());
        }
        let first = self.read_stored_bar(0)?;
        let last = self.read_stored_bar(self.stored.bars - 1)?;
        self.stored.from_open_time = first.time;
        self.stored.from_close_time = self.timeframe.close_time(first.time);
        self.stored.to_open_time = last.time;
        self.stored.to_close_time = self.timeframe.close_time(last.time);
        Ok(())
    }

    // ---- closing ----

    /// Flushes pending bars and releases the handle. Idempotent:
    /// returns whether this call actually performed the close.
    pub fn close(&mut self) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        self.flush(None)?;
        self.closed = true;
        Ok(true)
    }

    /// Marks the file closed without flushing. Used when a superseding
    /// set has already recreated the on-disk files and a late flush
    /// would corrupt them.
    pub(crate) fn discard_and_close(&mut self) {
        self.buffer.clear();
        self.closed = true;
    }
}

impl Drop for HistoryFile {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.close() {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to flush history file on drop"
                );
            }
        }
    }
}
