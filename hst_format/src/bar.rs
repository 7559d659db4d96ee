//! Fixed-size bar record codec.
//!
//! Record spec, format 400 (44 bytes, little-endian, packed):
//! ```text
//! Offset  0: (u32) open time, seconds, server/FXT
//! Offset  4: (f64) open
//! Offset 12: (f64) low
//! Offset 20: (f64) high
//! Offset 28: (f64) close
//! Offset 36: (f64) ticks
//! ```
//! Note the on-disk float order is open/LOW/HIGH/close.
//!
//! Record spec, format 401 (60 bytes, little-endian):
//! ```text
//! Offset  0: (u32) open time
//! Offset  4: ([4]) alignment padding
//! Offset  8: (f64) open
//! Offset 16: (f64) high
//! Offset 24: (f64) low
//! Offset 32: (f64) close
//! Offset 40: (u64) ticks
//! Offset 48: (u32) spread
//! Offset 52: (u64) volume
//! ```
//!
//! Prices live in the record as real doubles; the in-memory [`Bar`]
//! carries them as points (fixed-point, scale `10^digits`). The codec
//! converts at the boundary. The layout is little-endian on disk
//! regardless of host.

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::error::FormatError;
use crate::header::HstFormat;

/// Record size of format 400.
pub const BAR_SIZE_V400: usize = 44;
/// Record size of format 401.
pub const BAR_SIZE_V401: usize = 60;

/// One OHLC price bar.
///
/// `open`/`high`/`low`/`close` are points: real price × `10^digits`.
/// `spread` and `volume` are carried for format 401 only and are never
/// touched by aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bar {
    /// Bar-open instant, seconds, server/FXT time.
    pub time: i64,
    /// Open price in points.
    pub open: i64,
    /// Highest price in points.
    pub high: i64,
    /// Lowest price in points.
    pub low: i64,
    /// Close price in points.
    pub close: i64,
    /// Tick count (volume proxy), at least 1 for a valid bar.
    pub ticks: u64,
    /// Spread in points (format 401 only).
    pub spread: u32,
    /// Real volume (format 401 only).
    pub volume: u64,
}

impl Bar {
    /// Checks the OHLC/tick invariants enforced before every disk write.
    pub fn validate(&self) -> Result<(), FormatError> {
        if self.low > self.open || self.open > self.high {
            return Err(FormatError::InvalidBarData(format!(
                "open {} outside low/high range [{}, {}] at time {}",
                self.open, self.low, self.high, self.time
            )));
        }
        if self.low > self.close || self.close > self.high {
            return Err(FormatError::InvalidBarData(format!(
                "close {} outside low/high range [{}, {}] at time {}",
                self.close, self.low, self.high, self.time
            )));
        }
        if self.ticks < 1 {
            return Err(FormatError::InvalidBarData(format!(
                "bar at time {} has zero ticks",
                self.time
            )));
        }
        Ok(())
    }
}

/// `10^digits`, the points-per-unit scale.
pub fn point_scale(digits: u32) -> f64 {
    10f64.powi(digits as i32)
}

fn to_price(points: i64, digits: u32) -> f64 {
    points as f64 / point_scale(digits)
}

fn to_points(price: f64, digits: u32) -> i64 {
    (price * point_scale(digits)).round() as i64
}

/// Validates `bar` and appends its encoded record to `out`.
pub fn encode_bar(
    bar: &Bar,
    digits: u32,
    format: HstFormat,
    out: &mut Vec<u8>,
) -> Result<(), FormatError> {
    bar.validate()?;
    let mut buf = [0u8; BAR_SIZE_V401];
    match format {
        HstFormat::V400 => {
            LittleEndian::write_u32(&mut buf[0..4], bar.time as u32);
            LittleEndian::write_f64(&mut buf[4..12], to_price(bar.open, digits));
            LittleEndian::write_f64(&mut buf[12..20], to_price(bar.low, digits));
            LittleEndian::write_f64(&mut buf[20..28], to_price(bar.high, digits));
            LittleEndian::write_f64(&mut buf[28..36], to_price(bar.close, digits));
            LittleEndian::write_f64(&mut buf[36..44], bar.ticks as f64);
            out.extend_from_slice(&buf[..BAR_SIZE_V400]);
        }
        HstFormat::V401 => {
            LittleEndian::write_u32(&mut buf[0..4], bar.time as u32);
            // bytes 4..8 stay zero (legacy struct alignment)
            LittleEndian::write_f64(&mut buf[8..16], to_price(bar.open, digits));
            LittleEndian::write_f64(&mut buf[16..24], to_price(bar.high, digits));
            LittleEndian::write_f64(&mut buf[24..32], to_price(bar.low, digits));
            LittleEndian::write_f64(&mut buf[32..40], to_price(bar.close, digits));
            LittleEndian::write_u64(&mut buf[40..48], bar.ticks);
            LittleEndian::write_u32(&mut buf[48..52], bar.spread);
            LittleEndian::write_u64(&mut buf[52..60], bar.volume);
            out.extend_from_slice(&buf[..BAR_SIZE_V401]);
        }
    }
    Ok(())
}

/// Decodes one record from `bytes`, which must hold exactly one bar.
pub fn decode_bar(bytes: &[u8], digits: u32, format: HstFormat) -> Result<Bar, FormatError> {
    let expected = format.bar_size();
    if bytes.len() != expected {
        return Err(FormatError::CorruptRecord {
            expected,
            actual: bytes.len(),
        });
    }
    let bar = match format {
        HstFormat::V400 => Bar {
            time: LittleEndian::read_u32(&bytes[0..4]) as i64,
            open: to_points(LittleEndian::read_f64(&bytes[4..12]), digits),
            low: to_points(LittleEndian::read_f64(&bytes[12..20]), digits),
            high: to_points(LittleEndian::read_f64(&bytes[20..28]), digits),
            close: to_points(LittleEndian::read_f64(&bytes[28..36]), digits),
            ticks: LittleEndian::read_f64(&bytes[36..44]) as u64,
            spread: 0,
            volume: 0,
        },
        HstFormat::V401 => Bar {
            time: LittleEndian::read_u32(&bytes[0..4]) as i64,
            open: to_points(LittleEndian::read_f64(&bytes[8..16]), digits),
            high: to_points(LittleEndian::read_f64(&bytes[16..24]), digits),
            low: to_points(LittleEndian::read_f64(&bytes[24..32]), digits),
            close: to_points(LittleEndian::read_f64(&bytes[32..40]), digits),
            ticks: LittleEndian::read_u64(&bytes[40..48]),
            spread: LittleEndian::read_u32(&bytes[48..52]),
            volume: LittleEndian::read_u64(&bytes[52..60]),
        },
    };
    Ok(bar)
}
