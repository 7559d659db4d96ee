//! Fixed-size history file header codec.
//!
//! Header spec (148 bytes, little-endian):
//! ```text
//! Offset   0: (u32)      format version, 400 or 401
//! Offset   4: (char[64]) copyright, NUL-padded, max 63 visible
//! Offset  68: (char[12]) symbol, NUL-padded, max 11 visible
//! Offset  80: (u32)      period id (timeframe minutes)
//! Offset  84: (u32)      digits (price precision)
//! Offset  88: (u32)      sync marker
//! Offset  92: (u32)      last sync time
//! Offset  96: ([52])     reserved
//! ```
//! The header is written once at file creation and rewritten at offset
//! 0 on every flush to refresh `last_sync_time`.

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::error::FormatError;
use crate::timeframe::Timeframe;
use crate::{BAR_SIZE_V400, BAR_SIZE_V401};

/// Header size in bytes.
pub const HEADER_SIZE: usize = 148;

const COPYRIGHT_WIDTH: usize = 64;
const SYMBOL_WIDTH: usize = 12;

/// Supported on-disk format versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HstFormat {
    /// Legacy 44-byte records.
    V400,
    /// 60-byte records with spread and real volume.
    V401,
}

impl HstFormat {
    /// The version number stored in the header.
    pub const fn as_u32(self) -> u32 {
        match self {
            HstFormat::V400 => 400,
            HstFormat::V401 => 401,
        }
    }

    /// Record size for this version.
    pub const fn bar_size(self) -> usize {
        match self {
            HstFormat::V400 => BAR_SIZE_V400,
            HstFormat::V401 => BAR_SIZE_V401,
        }
    }

    /// Map a header version number back to a format.
    pub fn try_from_u32(version: u32) -> Result<HstFormat, FormatError> {
        match version {
            400 => Ok(HstFormat::V400),
            401 => Ok(HstFormat::V401),
            other => Err(FormatError::UnsupportedFormatVersion(other)),
        }
    }
}

/// Decoded history file header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryHeader {
    /// On-disk format version.
    pub format: HstFormat,
    /// Copyright string, at most 63 characters survive encoding.
    pub copyright: String,
    /// Instrument symbol, at most 11 characters survive encoding.
    pub symbol: String,
    /// Bar period of the file.
    pub period: Timeframe,
    /// Price precision (fractional digits).
    pub digits: u32,
    /// Opaque sync marker carried through rewrites.
    pub sync_marker: u32,
    /// Timestamp through which the stored series is known synchronized.
    pub last_sync_time: i64,
}

fn write_fixed_str(buf: &mut [u8], s: &str) {
    // truncate to width-1 visible chars, NUL-pad the rest
    let visible = buf.len() - 1;
    let bytes = s.as_bytes();
    let n = bytes.len().min(visible);
    buf[..n].copy_from_slice(&bytes[..n]);
    for b in &mut buf[n..] {
        *b = 0;
    }
}

fn read_fixed_str(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Encodes `header` into its fixed 148-byte layout.
pub fn encode_header(header: &HistoryHeader) -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    LittleEndian::write_u32(&mut buf[0..4], header.format.as_u32());
    write_fixed_str(&mut buf[4..4 + COPYRIGHT_WIDTH], &header.copyright);
    write_fixed_str(&mut buf[68..68 + SYMBOL_WIDTH], &header.symbol);
    LittleEndian::write_u32(&mut buf[80..84], header.period.minutes());
    LittleEndian::write_u32(&mut buf[84..88], header.digits);
    LittleEndian::write_u32(&mut buf[88..92], header.sync_marker);
    LittleEndian::write_u32(&mut buf[92..96], header.last_sync_time as u32);
    // bytes 96..148 stay reserved
    buf
}

/// Decodes a header from `bytes`, which must hold exactly 148 bytes.
pub fn decode_header(bytes: &[u8]) -> Result<HistoryHeader, FormatError> {
    if bytes.len() != HEADER_SIZE {
        return Err(FormatError::CorruptRecord {
            expected: HEADER_SIZE,
            actual: bytes.len(),
        });
    }
    let format = HstFormat::try_from_u32(LittleEndian::read_u32(&bytes[0..4]))?;
    let period = Timeframe::from_minutes(LittleEndian::read_u32(&bytes[80..84]))?;
    Ok(HistoryHeader {
        format,
        copyright: read_fixed_str(&bytes[4..4 + COPYRIGHT_WIDTH]),
        symbol: read_fixed_str(&bytes[68..68 + SYMBOL_WIDTH]),
        period,
        digits: LittleEndian::read_u32(&bytes[84..88]),
        sync_marker: LittleEndian::read_u32(&bytes[88..92]),
        last_sync_time: LittleEndian::read_u32(&bytes[92..96]) as i64,
    })
}

// -------------------- tests --------------------
#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HistoryHeader {
        HistoryHeader {
            format: HstFormat::V400,
            copyright: "(C)opyright 2003, MetaQuotes Software Corp.".to_string(),
            symbol: "EURUSD".to_string(),
            period: Timeframe::M15,
            digits: 5,
            sync_marker: 0,
            last_sync_time: 1_709_733_480,
        }
    }

    #[test]
    fn roundtrip() {
        let header = sample();
        let buf = encode_header(&header);
        assert_eq!(decode_header(&buf).unwrap(), header);
    }

    #[test]
    fn roundtrip_max_length_strings() {
        let mut header = sample();
        header.symbol = "ABCDEFGHIJK".to_string(); // 11 chars
        header.copyright = "c".repeat(63);
        let buf = encode_header(&header);
        assert_eq!(decode_header(&buf).unwrap(), header);
    }

    #[test]
    fn overlong_strings_truncate() {
        let mut header = sample();
        header.symbol = "ABCDEFGHIJKLMNOP".to_string();
        header.copyright = "c".repeat(100);
        let decoded = decode_header(&encode_header(&header)).unwrap();
        assert_eq!(decoded.symbol, "ABCDEFGHIJK");
        assert_eq!(decoded.copyright, "c".repeat(63));
    }

    #[test]
    fn rejects_unknown_format() {
        let mut buf = encode_header(&sample());
        LittleEndian::write_u32(&mut buf[0..4], 402);
        assert!(matches!(
            decode_header(&buf),
            Err(FormatError::UnsupportedFormatVersion(402))
        ));
    }

    #[test]
    fn rejects_unknown_period() {
        let mut buf = encode_header(&sample());
        LittleEndian::write_u32(&mut buf[80..84], 7);
        assert!(matches!(
            decode_header(&buf),
            Err(FormatError::UnsupportedTimeframe(7))
        ));
    }

    #[test]
    fn rejects_short_slice() {
        assert!(matches!(
            decode_header(&[0u8; 100]),
            Err(FormatError::CorruptRecord {
                expected: HEADER_SIZE,
                actual: 100
            })
        ));
    }
}
