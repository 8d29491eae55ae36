//! Unit tests for feature engineering

use super::*;
use crate::data::{RawTable, VixSeries};

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn wide(csv: &str) -> WideTable {
    WideTable::from_raw(&RawTable::from_reader("test.csv", csv.as_bytes()).unwrap()).unwrap()
}

fn engineer() -> FeatureEngineer {
    FeatureEngineer::new(FeatureConfig::default())
}

/// Closes and 10:30 prices for `n` consecutive days, no other inputs
fn bundle(ticker: &str, closes: &[f64], mids: &[Option<f64>]) -> InputBundle {
    let start = d("2024-01-01");
    let mut close_csv = format!("Date,{ticker}\n");
    let mut mid_csv = format!("Date,{ticker}\n");
    for (i, c) in closes.iter().enumerate() {
        let date = start + chrono::Duration::days(i as i64);
        close_csv.push_str(&format!("{date},{c}\n"));
        let mid = mids.get(i).copied().flatten().map(|m| m.to_string()).unwrap_or_default();
        mid_csv.push_str(&format!("{date},{mid}\n"));
    }
    InputBundle {
        closes: wide(&close_csv),
        mid: wide(&mid_csv),
        ..Default::default()
    }
}

#[test]
fn test_imputed_early_price_gives_zero_drift() {
    let inputs = bundle("X", &[100.0, 102.0], &[None, Some(101.0)]);
    let daily = engineer().daily_features(&inputs.closes, "X");
    let rows = engineer().intraday_rows(&inputs, "X", &daily, &FeatureSet::all());

    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.date, d("2024-01-02"));
    assert_eq!(row.early_source, EarlySource::Imputed);
    assert_eq!(row.p_early, Some(100.0));
    assert_eq!(row.close_t_minus_1, Some(100.0));
    assert_eq!(row.overnight_drift, Some(0.0));
    assert!((row.ret_intraday.unwrap() - 0.01).abs() < 1e-12);
    // No earlier intraday row, so not usable yet
    assert!(!row.is_usable());
}

#[test]
fn test_snapshot_early_price_takes_precedence() {
    let mut inputs = bundle("X", &[100.0, 102.0], &[None, Some(101.0)]);
    inputs.early = Some(wide("Date,X\n2024-01-02,99\n"));

    let daily = engineer().daily_features(&inputs.closes, "X");
    let rows = engineer().intraday_rows(&inputs, "X", &daily, &FeatureSet::all());

    assert_eq!(rows[0].early_source, EarlySource::Snapshot);
    assert_eq!(rows[0].p_early, Some(99.0));
    assert!((rows[0].overnight_drift.unwrap() - (-0.01)).abs() < 1e-12);
}

#[test]
fn test_daily_features_use_prior_close_only() {
    let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
    let mids: Vec<Option<f64>> = closes.iter().map(|c| Some(c + 0.5)).collect();
    let inputs = bundle("X", &closes, &mids);

    let table = engineer().build(&inputs, &FeatureSet::all());
    let row = table.row(d("2024-01-25"), "X").unwrap();

    // Latest close before 2024-01-25 is index 23 (close 123)
    let scale = 0.1;
    assert!((row.ret1.unwrap() - (123.0 / 122.0 - 1.0) * scale).abs() < 1e-12);
    assert!((row.ma5.unwrap() - 121.0 * scale).abs() < 1e-9);
    assert!((row.ma20.unwrap() - 113.5 * scale).abs() < 1e-9);
    // Population std of five consecutive integers is sqrt(2)
    assert!((row.vol5.unwrap() - 2.0_f64.sqrt() * scale).abs() < 1e-9);
}

#[test]
fn test_rolling_windows_span_missing_intraday_days() {
    let closes: Vec<f64> = (0..25).map(|i| 50.0 + i as f64).collect();
    // Only the last three days have a 10:30 snapshot
    let mids: Vec<Option<f64>> = (0..25).map(|i| (i >= 22).then_some(70.0)).collect();
    let inputs = bundle("X", &closes, &mids);

    let table = engineer().build(&inputs, &FeatureSet::all());
    let row = table.row(d("2024-01-25"), "X").unwrap();
    assert!(row.ma20.is_some());
}

#[test]
fn test_prev_return_and_sign() {
    let inputs = bundle(
        "X",
        &[100.0, 100.0, 100.0, 100.0],
        &[None, Some(102.0), Some(100.0), Some(99.0)],
    );
    let table = engineer().build(&inputs, &FeatureSet::all());

    assert_eq!(table.len(), 2);
    let third = table.row(d("2024-01-03"), "X").unwrap();
    assert!((third.ret_intraday_prev.unwrap() - 0.02).abs() < 1e-12);
    assert_eq!(third.ret_intraday_prev_sign, Some(1.0));

    let fourth = table.row(d("2024-01-04"), "X").unwrap();
    assert_eq!(fourth.ret_intraday_prev, Some(0.0));
    assert_eq!(fourth.ret_intraday_prev_sign, Some(0.0));
}

#[test]
fn test_rows_without_mid_are_skipped_before_lag() {
    let inputs = bundle(
        "X",
        &[100.0, 100.0, 100.0, 100.0],
        &[None, Some(101.0), None, Some(103.0)],
    );
    let table = engineer().build(&inputs, &FeatureSet::all());

    // 2024-01-04 lags onto 2024-01-02, the previous surviving row
    let row = table.row(d("2024-01-04"), "X").unwrap();
    assert!((row.ret_intraday_prev.unwrap() - 0.01).abs() < 1e-12);
    assert!(table.row(d("2024-01-03"), "X").is_none());
}

#[test]
fn test_missing_vix_drops_column() {
    let inputs = bundle("X", &[100.0, 101.0], &[None, Some(101.0)]);
    let set = engineer().resolve_feature_set(&inputs, &FeatureSet::all());
    assert!(!set.contains(Feature::DeltaVix));
    assert!(!set.contains(Feature::Rsi14));
    assert!(set.contains(Feature::OvernightDrift));
}

#[test]
fn test_delta_vix_attached_by_date() {
    let mut inputs = bundle("X", &[100.0, 100.0, 100.0], &[None, Some(101.0), Some(102.0)]);
    let mut levels = BTreeMap::new();
    levels.insert(d("2024-01-02"), 14.0);
    levels.insert(d("2024-01-03"), 20.0);
    inputs.vix = Some(VixSeries::from_levels(&levels));

    let table = engineer().build(&inputs, &FeatureSet::all());
    assert!(table.feature_set.contains(Feature::DeltaVix));
    let row = table.row(d("2024-01-03"), "X").unwrap();
    assert_eq!(row.delta_vix, Some(6.0));
}

#[test]
fn test_ta_forward_fill_is_limited_and_backward_only() {
    let n = 8;
    let closes = vec![100.0; n];
    let mids: Vec<Option<f64>> = vec![Some(100.5); n];
    let mut inputs = bundle("X", &closes, &mids);

    let mut ta = TechnicalTable::default();
    ta.insert("X", d("2024-01-04"), Indicator::Rsi14, 40.0);
    inputs.technical = Some(ta);

    let config = FeatureConfig {
        ta_ffill_limit: 2,
        ..Default::default()
    };
    let table = FeatureEngineer::new(config).build(&inputs, &FeatureSet::all());

    let rsi = |day: &str| table.row(d(day), "X").and_then(|r| r.rsi14);
    // Nothing before the first observation
    assert!(table.row(d("2024-01-03"), "X").is_some());
    assert_eq!(rsi("2024-01-03"), None);
    assert_eq!(rsi("2024-01-04"), Some(40.0));
    assert_eq!(rsi("2024-01-05"), Some(40.0));
    assert_eq!(rsi("2024-01-06"), Some(40.0));
    assert_eq!(rsi("2024-01-07"), None);
    // Indicators never seen are dropped from the set
    assert!(table.feature_set.contains(Feature::Rsi14));
    assert!(!table.feature_set.contains(Feature::MacdLine));
}

#[test]
fn test_table_sorted_by_ticker_then_date() {
    let closes = "Date,B,A\n2024-01-01,10,20\n2024-01-02,10,20\n2024-01-03,10,20\n";
    let mids = "Date,B,A\n2024-01-02,10.1,20.2\n2024-01-03,10.2,20.1\n";
    let inputs = InputBundle {
        closes: wide(closes),
        mid: wide(mids),
        ..Default::default()
    };

    let table = engineer().build(&inputs, &FeatureSet::all());
    let keys: Vec<(&str, NaiveDate)> = table.rows.iter().map(|r| (r.ticker.as_str(), r.date)).collect();
    assert_eq!(keys, vec![("A", d("2024-01-03")), ("B", d("2024-01-03"))]);
    assert_eq!(table.tickers(), vec!["A", "B"]);
}

#[test]
fn test_build_is_deterministic() {
    let closes: Vec<f64> = (0..80).map(|i| 100.0 + (i as f64 * 0.7).sin() * 3.0).collect();
    let mids: Vec<Option<f64>> = closes.iter().map(|c| Some(c * 1.001)).collect();
    let inputs = bundle("X", &closes, &mids);

    let a = engineer().build(&inputs, &FeatureSet::all());
    let b = engineer().build(&inputs, &FeatureSet::all());
    assert_eq!(a.rows, b.rows);
}

#[test]
fn test_ta_clip_bounds_come_from_merged_rows() {
    let n = 30;
    let closes = vec![100.0; n];
    let mids: Vec<Option<f64>> = vec![Some(100.5); n];
    let mut inputs = bundle("X", &closes, &mids);

    let mut ta = TechnicalTable::default();
    for i in 0..n {
        let date = d("2024-01-01") + chrono::Duration::days(i as i64);
        ta.insert("X", date, Indicator::Rsi14, if i == 10 { 90.0 } else { 50.0 });
        // A ticker with no intraday prices must not widen the bounds
        ta.insert("Z", date, Indicator::Rsi14, 1_000.0);
    }
    inputs.technical = Some(ta);

    let table = engineer().build(&inputs, &FeatureSet::all());
    assert_eq!(table.rows.len(), n - 2);

    let outlier = table.row(d("2024-01-11"), "X").and_then(|r| r.rsi14).unwrap();
    assert!(outlier > 50.0 && outlier < 90.0);
    assert_eq!(table.row(d("2024-01-12"), "X").and_then(|r| r.rsi14), Some(50.0));
}

#[test]
fn test_winsorize_skips_missing_and_disabled_columns() {
    let mut rows: Vec<FeatureRow> = (0..50)
        .map(|i| {
            let mut row = FeatureRow::new(d("2024-01-01") + chrono::Duration::days(i), "X");
            row.rsi14 = (i % 5 != 0).then_some(i as f64);
            row.bb_pos = Some(if i == 49 { 100.0 } else { 0.5 });
            row
        })
        .collect();
    let set = FeatureSet::all().without(Feature::BbPos);

    winsorize_technical(&mut rows, &set, (0.01, 0.99));

    assert_eq!(rows[0].rsi14, None);
    assert!(rows[49].rsi14.unwrap() < 49.0);
    assert_eq!(rows[49].bb_pos, Some(100.0));
}
