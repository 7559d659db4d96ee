//! Series splicing and M1 synchronization.
//!
//! ## What this does
//! - `remove_bars`/`insert_bars`: byte-level surgery on the stored
//!   series — the buffer is flushed first, then the tail beyond the
//!   edit point is moved as raw bytes and the file length adjusted, so
//!   offsets stay dense with no gaps.
//! - `splice_bars`: remove + insert at one offset, with slice
//!   semantics for negative offsets (counting from the end).
//! - `synchronize`: reconciles freshly supplied M1 bars with data that
//!   is already stored, replacing the overlapping stored range and
//!   appending the rest. Safe to replay: bars at or before the sync
//!   time are discarded as already applied.

use std::io::{Read, Seek, SeekFrom, Write};

use hst_format::{Bar, HEADER_SIZE, Timeframe, encode_bar, timeframe::SECS_PER_MINUTE};
use tracing::debug;

use crate::error::{HistoryError, Result};
use crate::file::HistoryFile;

impl HistoryFile {
    /// Reconciles previously written data with a fresh batch of M1
    /// bars (sorted ascending). Bars whose close time is not past the
    /// current sync time are discarded; the remainder either replaces
    /// the overlapping stored range or is appended.
    ///
    /// Only M1 files synchronize directly; derived timeframes are
    /// rebuilt from the M1 stream instead.
    pub fn synchronize(&mut self, bars: &[Bar]) -> Result<()> {
        if self.is_closed() {
            return Err(HistoryError::Closed);
        }
        if self.timeframe() != Timeframe::M1 {
            return Err(HistoryError::InvalidArgument(format!(
                "synchronize supports M1 files only, not {}",
                self.timeframe()
            )));
        }
        require_sorted(bars)?;

        let sync_time = self.full().last_sync_time;
        let Some(first_new) = bars
            .iter()
            .position(|bar| bar.time + SECS_PER_MINUTE > sync_time)
        else {
            // everything supplied is older than what we already applied
            return Ok(());
        };
        let window = &bars[first_new..];

        let full = self.full();
        if full.bars == 0 || window[0].time > full.to_open_time {
            return self.append_bars(window);
        }

        // Late-arriving corrections: replace exactly the stored range
        // the window overlaps, then take over its sync bookkeeping.
        // Bars newer than the window survive untouched.
        let last = window[window.len() - 1];
        let start = self.find_time_offset(window[0].time)?;
        debug_assert!(start >= 0, "window start is within the stored range");
        let end = self.find_time_offset(last.time + SECS_PER_MINUTE)?;
        let length = if end < 0 {
            self.full().bars as i64 - start
        } else {
            end - start
        };
        self.splice_bars(start, length as usize, window)?;

        self.set_synchronized_through(last.time + SECS_PER_MINUTE)
    }

    /// Removes `length` bars at `offset` and inserts `replacement` in
    /// their place. A negative `offset` counts from the end of the
    /// series; `length` is clamped at the series tail.
    pub fn splice_bars(&mut self, offset: i64, length: usize, replacement: &[Bar]) -> Result<()> {
        if self.is_closed() {
            return Err(HistoryError::Closed);
        }
        let bars = self.full().bars;
        let resolved = if offset < 0 { bars as i64 + offset } else { offset };
        if resolved < 0 || resolved as u64 > bars {
            return Err(HistoryError::InvalidArgument(format!(
                "splice offset {offset} out of range for {bars} bar(s)"
            )));
        }
        let resolved = resolved as u64;
        let length = (length as u64).min(bars - resolved);
        debug!(
            path = %self.path().display(),
            offset = resolved,
            removing = length,
            inserting = replacement.len(),
            "splicing bar(s)"
        );
        self.remove_bars(resolved, length)?;
        self.insert_bars(resolved, replacement)
    }

    /// Removes `length` bars starting at `offset`, shifting the tail
    /// left and truncating the file.
    pub fn remove_bars(&mut self, offset: u64, length: u64) -> Result<()> {
        if self.is_closed() {
            return Err(HistoryError::Closed);
        }
        if length == 0 {
            return Ok(());
        }
        if offset + length > self.full().bars {
            return Err(HistoryError::InvalidArgument(format!(
                "cannot remove {length} bar(s) at offset {offset} from {} bar(s)",
                self.full().bars
            )));
        }
        self.flush(None)?;
        debug!(
            path = %self.path().display(),
            "removing {} bar(s) from offset {} to {}",
            length,
            offset,
            offset + length - 1
        );

        let bar_size = self.format().bar_size() as u64;
        let tail = self.read_raw_tail(offset + length)?;
        self.seek_to_bar(offset)?;
        self.file.write_all(&tail)?;
        let stored_bars = self.stored.bars - length;
        self.file
            .set_len(HEADER_SIZE as u64 + stored_bars * bar_size)?;

        self.rebuild_after_surgery(stored_bars)
    }

    /// Inserts `bars` (sorted ascending) at `offset`, shifting the
    /// tail right.
    pub fn insert_bars(&mut self, offset: u64, bars: &[Bar]) -> Result<()> {
        if self.is_closed() {
            return Err(HistoryError::Closed);
        }
        if bars.is_empty() {
            return Ok(());
        }
        if offset > self.full().bars {
            return Err(HistoryError::InvalidArgument(format!(
                "cannot insert at offset {offset} past {} bar(s)",
                self.full().bars
            )));
        }
        require_sorted(bars)?;
        self.flush(None)?;
        debug!(
            path = %self.path().display(),
            "inserting {} bar(s) at offset {}",
            bars.len(),
            offset
        );

        let mut encoded = Vec::with_capacity(bars.len() * self.format().bar_size());
        for bar in bars {
            encode_bar(bar, self.digits(), self.format(), &mut encoded)?;
        }
        let tail = self.read_raw_tail(offset)?;
        self.seek_to_bar(offset)?;
        self.file.write_all(&encoded)?;
        self.file.write_all(&tail)?;

        let stored_bars = self.stored.bars + bars.len() as u64;
        self.rebuild_after_surgery(stored_bars)
    }

    fn seek_to_bar(&mut self, offset: u64) -> Result<()> {
        let pos = HEADER_SIZE as u64 + offset * self.format().bar_size() as u64;
        self.file.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    /// Raw bytes of every record from `offset` to the stored end.
    fn read_raw_tail(&mut self, offset: u64) -> Result<Vec<u8>> {
        let bar_size = self.format().bar_size() as u64;
        let len = (self.stored.bars - offset) * bar_size;
        self.seek_to_bar(offset)?;
        let mut tail = vec![0u8; len as usize];
        self.file.read_exact(&mut tail)?;
        Ok(tail)
    }

    /// After byte surgery the series shape changed: recompute both
    /// metadata views from the file itself. The in-progress
    /// aggregation bar, if any, does not survive an edit.
    fn rebuild_after_surgery(&mut self, stored_bars: u64) -> Result<()> {
        self.stored.bars = stored_bars;
        self.reload_boundaries()?;
        let full_sync = self.full.last_sync_time;
        self.full = self.stored;
        self.full.last_sync_time = full_sync;
        self.open_until = None;
        Ok(())
    }

    /// Records that the series is now reconciled through `sync_time`
    /// and persists it in the header.
    fn set_synchronized_through(&mut self, sync_time: i64) -> Result<()> {
        // stored bars may extend past the reconciled range
        self.last_m1_time = sync_time.max(self.full.to_close_time) - SECS_PER_MINUTE;
        self.full.last_sync_time = sync_time;
        self.stored.last_sync_time = sync_time;
        self.write_header()
    }
}

fn require_sorted(bars: &[Bar]) -> Result<()> {
    for pair in bars.windows(2) {
        if pair[1].time <= pair[0].time {
            return Err(HistoryError::InvalidArgument(format!(
                "bars are not sorted ascending by open time ({} then {})",
                pair[0].time, pair[1].time
            )));
        }
    }
    Ok(())
}
