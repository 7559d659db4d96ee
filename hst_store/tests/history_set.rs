mod common;

use common::{flat_bar, m1_bar, minute_series, options};

use chrono::{TimeZone, Utc};
use hst_format::{HstFormat, Timeframe};
use hst_store::{HistoryError, HistoryFile, HistorySet, SetRegistry, history_file_name};
use tempfile::tempdir;

fn ts(y: i32, mo: u32, d: u32, h: u32, min: u32) -> i64 {
    Utc.with_ymd_and_hms(y, mo, d, h, min, 0).unwrap().timestamp()
}

#[test]
fn m5_aggregation_over_a_full_period() {
    let dir = tempdir().unwrap();
    let registry = SetRegistry::new();
    let mut set = HistorySet::create(
        registry,
        dir.path(),
        "EURUSD",
        5,
        HstFormat::V400,
        options(),
    )
    .unwrap();

    let base = ts(2024, 3, 4, 10, 0);
    let bars = minute_series(base, 5); // 10:00 .. 10:04
    set.append_bars(&bars).unwrap();

    let m5 = set.get_or_create_file(Timeframe::M5).unwrap();
    assert_eq!(m5.full().bars, 1);
    let agg = m5.get_bar(0).unwrap().unwrap();
    assert_eq!(agg.time, base);
    assert_eq!(agg.open, bars[0].open);
    assert_eq!(agg.close, bars[4].close);
    assert_eq!(agg.high, bars.iter().map(|b| b.high).max().unwrap());
    assert_eq!(agg.low, bars.iter().map(|b| b.low).min().unwrap());
    assert_eq!(agg.ticks, bars.iter().map(|b| b.ticks).sum::<u64>());

    // the next minute starts a new M5 bar
    set.append_bars(&[flat_bar(base + 300, 107_100)]).unwrap();
    let m5 = set.get_or_create_file(Timeframe::M5).unwrap();
    assert_eq!(m5.full().bars, 2);
    assert_eq!(m5.get_bar(1).unwrap().unwrap().time, base + 300);

    let m1 = set.get_or_create_file(Timeframe::M1).unwrap();
    assert_eq!(m1.full().bars, 6);
    set.close().unwrap();
}

#[test]
fn calendar_alignment_for_derived_timeframes() {
    let dir = tempdir().unwrap();
    let registry = SetRegistry::new();
    let mut set = HistorySet::create(
        registry,
        dir.path(),
        "EURUSD",
        5,
        HstFormat::V400,
        options(),
    )
    .unwrap();

    // Wednesday 2024-03-06 14:37
    let time = ts(2024, 3, 6, 14, 37);
    set.append_bars(&[m1_bar(time, 107_000, 107_020, 106_990, 107_010, 7)])
        .unwrap();

    let expectations = [
        (Timeframe::H1, ts(2024, 3, 6, 14, 0)),
        (Timeframe::H4, ts(2024, 3, 6, 12, 0)),
        (Timeframe::D1, ts(2024, 3, 6, 0, 0)),
        (Timeframe::W1, ts(2024, 3, 4, 0, 0)), // preceding Monday
        (Timeframe::MN1, ts(2024, 3, 1, 0, 0)), // 1st of the month
    ];
    for (timeframe, expected_open) in expectations {
        let file = set.get_or_create_file(timeframe).unwrap();
        assert_eq!(file.full().bars, 1, "{timeframe}");
        let bar = file.get_bar(0).unwrap().unwrap();
        assert_eq!(bar.time, expected_open, "{timeframe}");
        assert_eq!(bar.ticks, 7, "{timeframe}");
    }
    set.close().unwrap();
}

#[test]
fn derived_bars_extend_across_batches() {
    let dir = tempdir().unwrap();
    let registry = SetRegistry::new();
    let mut set = HistorySet::create(
        registry,
        dir.path(),
        "EURUSD",
        5,
        HstFormat::V400,
        options(),
    )
    .unwrap();

    let base = ts(2024, 3, 4, 10, 0);
    set.append_bars(&minute_series(base, 2)).unwrap();
    set.append_bars(&minute_series(base + 120, 2)).unwrap();

    // all four minutes fall into one H1 bar
    let h1 = set.get_or_create_file(Timeframe::H1).unwrap();
    assert_eq!(h1.full().bars, 1);
    let bar = h1.get_bar(0).unwrap().unwrap();
    assert_eq!(bar.time, base);
    assert_eq!(bar.ticks, 12);
    set.close().unwrap();
}

#[test]
fn create_truncates_all_nine_files() {
    let dir = tempdir().unwrap();
    let registry = SetRegistry::new();
    let mut set = HistorySet::create(
        registry,
        dir.path(),
        "EURUSD",
        5,
        HstFormat::V400,
        options(),
    )
    .unwrap();
    set.append_bars(&minute_series(ts(2024, 3, 4, 10, 0), 3))
        .unwrap();
    set.close().unwrap();

    for timeframe in Timeframe::ALL {
        let path = dir.path().join(history_file_name("EURUSD", timeframe));
        assert!(path.is_file(), "{timeframe} file missing");
        let mut file = HistoryFile::open(&path, &options()).unwrap();
        assert!(file.full().bars >= 1, "{timeframe}");
        file.close().unwrap();
    }
}

#[test]
fn open_mode_conflicts_while_create_mode_revokes() {
    let dir = tempdir().unwrap();
    let registry = SetRegistry::new();

    let mut first = HistorySet::create(
        registry.clone(),
        dir.path(),
        "EURUSD",
        5,
        HstFormat::V400,
        options(),
    )
    .unwrap();
    first
        .append_bars(&minute_series(ts(2024, 3, 4, 10, 0), 3))
        .unwrap();

    // create mode closes the superseded instance…
    let mut second = HistorySet::create(
        registry.clone(),
        dir.path(),
        "EURUSD",
        5,
        HstFormat::V400,
        options(),
    )
    .unwrap();
    assert!(first.is_closed());
    assert!(matches!(
        first.append_bars(&[flat_bar(ts(2024, 3, 4, 11, 0), 1)]),
        Err(HistoryError::Closed)
    ));
    // …and the revoked set must not flush over the recreated files
    drop(first);
    second
        .append_bars(&[flat_bar(ts(2024, 3, 4, 10, 0), 107_000)])
        .unwrap();

    // open mode fails while the second set is still open
    let m1_path = dir.path().join("EURUSD1.hst");
    let seed = HistoryFile::open(&m1_path, &options());
    assert!(matches!(
        seed.map(|s| HistorySet::open(registry.clone(), s, options())),
        Ok(Err(HistoryError::ConflictingOpenSet { .. }))
    ));

    second.close().unwrap();
    assert!(!registry.is_open("EURUSD", dir.path()));

    // the first set's buffered bars were discarded, the second's kept
    let seed = HistoryFile::open(&m1_path, &options()).unwrap();
    assert_eq!(seed.stored().bars, 1);
    let mut reopened = HistorySet::open(registry, seed, options()).unwrap();
    assert_eq!(
        reopened.last_sync_time().unwrap(),
        ts(2024, 3, 4, 10, 1)
    );
    reopened.close().unwrap();
}

#[test]
fn open_mode_rejects_digits_mismatch() {
    let dir = tempdir().unwrap();
    let registry = SetRegistry::new();
    let mut set = HistorySet::create(
        registry.clone(),
        dir.path(),
        "EURUSD",
        5,
        HstFormat::V400,
        options(),
    )
    .unwrap();
    set.append_bars(&minute_series(ts(2024, 3, 4, 10, 0), 3))
        .unwrap();
    set.close().unwrap();

    // recreate the H1 member with a different precision
    let mut h1 = HistoryFile::create(
        dir.path(),
        "EURUSD",
        Timeframe::H1,
        3,
        HstFormat::V400,
        &options(),
    )
    .unwrap();
    h1.close().unwrap();

    let seed = HistoryFile::open(&dir.path().join("EURUSD1.hst"), &options()).unwrap();
    let mut set = HistorySet::open(registry, seed, options()).unwrap();
    assert!(matches!(
        set.get_or_create_file(Timeframe::H1),
        Err(HistoryError::DigitsMismatch {
            expected: 5,
            actual: 3,
            ..
        })
    ));
    set.close().unwrap();
}

#[test]
fn open_mode_creates_missing_members_on_demand() {
    let dir = tempdir().unwrap();
    let registry = SetRegistry::new();
    let mut set = HistorySet::create(
        registry.clone(),
        dir.path(),
        "EURUSD",
        5,
        HstFormat::V400,
        options(),
    )
    .unwrap();
    set.append_bars(&minute_series(ts(2024, 3, 4, 10, 0), 3))
        .unwrap();
    set.close().unwrap();

    let m30_path = dir.path().join(history_file_name("EURUSD", Timeframe::M30));
    std::fs::remove_file(&m30_path).unwrap();

    let seed = HistoryFile::open(&dir.path().join("EURUSD1.hst"), &options()).unwrap();
    let mut set = HistorySet::open(registry, seed, options()).unwrap();
    let m30 = set.get_or_create_file(Timeframe::M30).unwrap();
    assert_eq!(m30.full().bars, 0);
    assert!(m30_path.is_file());
    set.close().unwrap();
}

#[test]
fn reopened_set_resumes_mid_period() {
    let dir = tempdir().unwrap();
    let registry = SetRegistry::new();
    let mut set = HistorySet::create(
        registry.clone(),
        dir.path(),
        "EURUSD",
        5,
        HstFormat::V400,
        options(),
    )
    .unwrap();
    let base = ts(2024, 3, 4, 10, 0);
    set.append_bars(&minute_series(base, 3)).unwrap(); // 10:00..10:02
    set.close().unwrap();

    let seed = HistoryFile::open(&dir.path().join("EURUSD1.hst"), &options()).unwrap();
    let mut set = HistorySet::open(registry, seed, options()).unwrap();
    // 10:03 continues the stream across every timeframe
    set.append_bars(&[m1_bar(base + 180, 107_030, 107_045, 107_025, 107_038, 3)])
        .unwrap();

    let m1 = set.get_or_create_file(Timeframe::M1).unwrap();
    assert_eq!(m1.full().bars, 4);

    // it folds into the still-open 10:00 M5 bar
    let m5 = set.get_or_create_file(Timeframe::M5).unwrap();
    assert_eq!(m5.full().bars, 1);
    let bar = m5.get_bar(0).unwrap().unwrap();
    assert_eq!(bar.time, base);
    assert_eq!(bar.close, 107_038);
    assert_eq!(bar.ticks, 12);
    set.close().unwrap();
}

#[test]
fn set_close_is_idempotent_and_terminal() {
    let dir = tempdir().unwrap();
    let registry = SetRegistry::new();
    let mut set = HistorySet::create(
        registry,
        dir.path(),
        "EURUSD",
        5,
        HstFormat::V400,
        options(),
    )
    .unwrap();
    assert!(set.close().unwrap());
    assert!(!set.close().unwrap());
    assert!(matches!(
        set.append_bars(&[flat_bar(60, 1)]),
        Err(HistoryError::Closed)
    ));
    assert!(matches!(set.synchronize(&[]), Err(HistoryError::Closed)));
}

#[test]
fn synchronize_goes_through_the_m1_member() {
    let dir = tempdir().unwrap();
    let registry = SetRegistry::new();
    let mut set = HistorySet::create(
        registry,
        dir.path(),
        "EURUSD",
        5,
        HstFormat::V400,
        options(),
    )
    .unwrap();
    let base = ts(2024, 3, 4, 10, 0);
    set.append_bars(&minute_series(base, 3)).unwrap();

    set.synchronize(&[flat_bar(base + 180, 107_200), flat_bar(base + 240, 107_210)])
        .unwrap();
    let m1 = set.get_or_create_file(Timeframe::M1).unwrap();
    assert_eq!(m1.full().bars, 5);
    assert_eq!(set.last_sync_time().unwrap(), base + 300);
    set.close().unwrap();
}
