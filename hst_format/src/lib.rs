//! Binary codecs and timeframe math for the MetaTrader `.hst` history
//! format: the 148-byte file header, the fixed-size bar records of
//! formats 400 and 401, and the 9 standard bar periods with their
//! boundary arithmetic. Pure data, no I/O.

#![deny(missing_docs)]

pub mod bar;
pub mod error;
pub mod header;
pub mod timeframe;

pub use bar::{BAR_SIZE_V400, BAR_SIZE_V401, Bar, decode_bar, encode_bar, point_scale};
pub use error::FormatError;
pub use header::{HEADER_SIZE, HistoryHeader, HstFormat, decode_header, encode_header};
pub use timeframe::Timeframe;
