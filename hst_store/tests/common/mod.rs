#![allow(dead_code)] // not every test binary uses every helper

use hst_format::Bar;
use hst_store::StoreOptions;

/// An M1 bar with no spread/volume payload.
pub fn m1_bar(time: i64, open: i64, high: i64, low: i64, close: i64, ticks: u64) -> Bar {
    Bar {
        time,
        open,
        high,
        low,
        close,
        ticks,
        spread: 0,
        volume: 0,
    }
}

/// An M1 bar with all prices equal.
pub fn flat_bar(time: i64, price: i64) -> Bar {
    m1_bar(time, price, price, price, price, 1)
}

/// `count` consecutive M1 bars starting at `start`, with slightly
/// wandering prices so OHLC aggregation is observable.
pub fn minute_series(start: i64, count: usize) -> Vec<Bar> {
    (0..count as i64)
        .map(|i| {
            let base = 107_000 + i * 10;
            m1_bar(start + i * 60, base, base + 15, base - 5, base + 8, 3)
        })
        .collect()
}

pub fn options() -> StoreOptions {
    StoreOptions::default()
}

pub fn options_with_buffer(bar_buffer_size: usize) -> StoreOptions {
    StoreOptions {
        bar_buffer_size,
        ..StoreOptions::default()
    }
}
