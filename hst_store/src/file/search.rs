//! Offset/time search over the bar series.
//!
//! All searches run over the logical series (stored + buffered) by
//! bisecting on bar open times, which are strictly increasing by
//! offset. The bisection narrows until the window is two bars wide and
//! then returns the upper bound, which matches the legacy behavior for
//! ties.

use hst_format::Bar;

use crate::error::{HistoryError, Result};
use crate::file::HistoryFile;

impl HistoryFile {
    /// Offset of the first bar whose open time is `>= time` (the
    /// insertion point), or -1 when `time` is newer than the newest
    /// bar's open time.
    pub fn find_time_offset(&mut self, time: i64) -> Result<i64> {
        if self.is_closed() {
            return Err(HistoryError::Closed);
        }
        let full = self.full();
        if full.bars == 0 || time > full.to_open_time {
            return Ok(-1);
        }
        if time <= full.from_open_time {
            return Ok(0);
        }
        let mut lo = 0i64; // open time < time
        let mut hi = full.to_offset(); // open time >= time
        while hi - lo > 1 {
            let mid = lo + (hi - lo) / 2;
            if self.bar_at(mid)?.time >= time {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        Ok(hi)
    }

    /// Offset of the bar whose `[open_time, close_time)` interval
    /// contains `time` exactly, or -1 when `time` falls into a gap or
    /// outside the series.
    pub fn find_bar_offset(&mut self, time: i64) -> Result<i64> {
        let offset = self.find_time_offset(time)?;
        let tf = self.timeframe();
        if offset == -1 {
            let full = self.full();
            if full.bars > 0 && time < full.to_close_time {
                return Ok(full.to_offset());
            }
            return Ok(-1);
        }
        if self.bar_at(offset)?.time == time {
            return Ok(offset);
        }
        if offset > 0 {
            let previous = self.bar_at(offset - 1)?;
            if time < tf.close_time(previous.time) {
                return Ok(offset - 1);
            }
        }
        Ok(-1)
    }

    /// Like [`find_bar_offset`](Self::find_bar_offset), but a gap
    /// resolves to the nearest earlier bar. -1 still means "before the
    /// oldest bar".
    pub fn find_bar_offset_previous(&mut self, time: i64) -> Result<i64> {
        let offset = self.find_time_offset(time)?;
        if offset == -1 {
            return Ok(self.full().to_offset());
        }
        if self.bar_at(offset)?.time == time {
            return Ok(offset);
        }
        Ok(offset - 1)
    }

    /// Like [`find_bar_offset`](Self::find_bar_offset), but a gap
    /// resolves to the nearest later bar. -1 still means "after the
    /// newest bar's close".
    pub fn find_bar_offset_next(&mut self, time: i64) -> Result<i64> {
        let offset = self.find_time_offset(time)?;
        let tf = self.timeframe();
        if offset == -1 {
            let full = self.full();
            if full.bars > 0 && time < full.to_close_time {
                return Ok(full.to_offset());
            }
            return Ok(-1);
        }
        if self.bar_at(offset)?.time == time {
            return Ok(offset);
        }
        if offset > 0 {
            let previous = self.bar_at(offset - 1)?;
            if time < tf.close_time(previous.time) {
                return Ok(offset - 1);
            }
        }
        Ok(offset)
    }

    /// `get_bar` for offsets the search already knows to be in range.
    fn bar_at(&mut self, offset: i64) -> Result<Bar> {
        self.get_bar(offset)?.ok_or_else(|| {
            HistoryError::InvalidArgument(format!("bar offset {offset} out of range"))
        })
    }
}
