//! Unit tests for history and newswire output

use super::*;
use crate::types::{EarlySource, LABEL_PLACEHOLDER};
use rust_decimal_macros::dec;
use tracing_test::traced_test;

fn row(date: &str, ticker: &str, price: Decimal) -> OutputRow {
    OutputRow {
        date: date.to_string(),
        ticker: ticker.to_string(),
        name: format!("{ticker} Inc."),
        price,
        change: dec!(0.5),
        confidence: dec!(6.2),
        feature1: "Overnight drift".to_string(),
        feature2: "ΔVIX".to_string(),
        feature3: LABEL_PLACEHOLDER.to_string(),
        feature4: LABEL_PLACEHOLDER.to_string(),
    }
}

fn record() -> PredictionRecord {
    PredictionRecord {
        date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        ticker: "AAPL".to_string(),
        predicted_price: 101.23456,
        predicted_change_pct: 0.01249,
        confidence: 7.25,
        red_flag: false,
        top_features: [
            "Overnight drift".to_string(),
            "GARCH vol".to_string(),
            "MA(5)".to_string(),
            LABEL_PLACEHOLDER.to_string(),
        ],
        anchor_price: 100.0,
        early_source: EarlySource::Snapshot,
        prob_up: 0.7,
        margin: 0.4,
        cap: 0.02,
        raw_return: 0.013,
    }
}

#[test]
fn test_from_record_rounds() {
    let out = OutputRow::from_record(&record(), "Apple Inc.").unwrap();
    assert_eq!(out.date, "2024-03-01");
    assert_eq!(out.name, "Apple Inc.");
    assert_eq!(out.price, dec!(101.23));
    assert_eq!(out.change, dec!(1.2));
    assert_eq!(out.confidence, dec!(7.3));
    assert_eq!(out.price.to_string(), "101.23");
    assert_eq!(out.feature4, LABEL_PLACEHOLDER);
}

#[test]
#[traced_test]
fn test_non_finite_record_is_not_written() {
    let mut bad = record();
    bad.predicted_price = f64::NAN;
    assert_eq!(OutputRow::from_record(&bad, "Apple Inc."), None);

    let mut overflow = record();
    overflow.predicted_change_pct = f64::INFINITY;
    assert_eq!(OutputRow::from_record(&overflow, "Apple Inc."), None);

    assert!(logs_contain("Not writing AAPL on 2024-03-01"));
}

#[test]
fn test_fixed_scale_pads() {
    let text = |v: f64, dp: u32| round(v, dp).map(|d| d.to_string());
    assert_eq!(text(2.0, 1).as_deref(), Some("2.0"));
    assert_eq!(text(100.5, 2).as_deref(), Some("100.50"));
    assert_eq!(text(-0.05, 1).as_deref(), Some("-0.1"));
    assert_eq!(round(f64::NAN, 2), None);
}

#[test]
fn test_merge_last_write_wins_and_sorts() {
    let existing = vec![
        row("2024-03-02", "MSFT", dec!(400.00)),
        row("2024-03-01", "AAPL", dec!(180.00)),
    ];
    let new = vec![row("2024-03-01", "AAPL", dec!(181.50)), row("2024-03-01", "AMZN", dec!(170.10))];

    let merged = merge_rows(existing, new);
    let keys: Vec<(&str, &str)> = merged.iter().map(|r| (r.date.as_str(), r.ticker.as_str())).collect();
    assert_eq!(
        keys,
        vec![("2024-03-01", "AAPL"), ("2024-03-01", "AMZN"), ("2024-03-02", "MSFT")]
    );
    assert_eq!(merged[0].price, dec!(181.50));
}

#[test]
fn test_upsert_replaces_existing_key() {
    let dir = tempfile::tempdir().unwrap();
    let writer = HistoryWriter::new(dir.path().join("predictions_history.csv"));

    writer.upsert(&[row("2024-03-01", "AAPL", dec!(180.00))]).unwrap();
    let total = writer.upsert(&[row("2024-03-01", "AAPL", dec!(182.25))]).unwrap();

    assert_eq!(total, 1);
    let rows = writer.read().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].price, dec!(182.25));
}

#[test]
fn test_upsert_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.csv");
    let writer = HistoryWriter::new(&path);
    let rows = vec![
        row("2024-03-01", "MSFT", dec!(400.10)),
        row("2024-03-01", "AAPL", dec!(180.00)),
    ];

    writer.upsert(&rows).unwrap();
    let first = fs::read(&path).unwrap();
    writer.upsert(&rows).unwrap();
    let second = fs::read(&path).unwrap();

    assert_eq!(first, second);
    // Previous version kept as backup
    assert_eq!(fs::read(dir.path().join("history.csv.bak")).unwrap(), first);
    assert!(!dir.path().join("history.csv.tmp").exists());
}

#[test]
fn test_written_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.csv");
    write_atomic(&path, &[row("2024-03-01", "AAPL", dec!(180.00))]).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("date,ticker,name,price,change,confidence,feature1,feature2,feature3,feature4")
    );
    assert_eq!(
        lines.next(),
        Some("2024-03-01,AAPL,AAPL Inc.,180.00,0.5,6.2,Overnight drift,ΔVIX,—,—")
    );
}

#[test]
fn test_empty_history_still_has_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.csv");
    write_atomic(&path, &[]).unwrap();
    assert!(read_rows(&path).unwrap().is_empty());
    assert!(fs::read_to_string(&path).unwrap().starts_with("date,ticker"));
}

#[test]
fn test_newswire_order() {
    let mut a = row("2024-03-01", "AAA", dec!(10.00));
    a.confidence = dec!(5.0);
    a.change = dec!(1.0);
    let mut b = row("2024-03-01", "BBB", dec!(10.00));
    b.confidence = dec!(8.0);
    b.change = dec!(-0.5);
    let mut c = row("2024-03-01", "CCC", dec!(10.00));
    c.confidence = dec!(5.0);
    c.change = dec!(1.5);

    let dir = tempfile::tempdir().unwrap();
    let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let path = write_newswire(dir.path(), date, &[a, b, c]).unwrap();

    assert!(path.ends_with("predictions_newswire_2024-03-01.csv"));
    let tickers: Vec<String> = read_rows(&path).unwrap().into_iter().map(|r| r.ticker).collect();
    assert_eq!(tickers, vec!["BBB", "CCC", "AAA"]);
}

#[test]
fn test_run_lock_is_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("history.csv");

    let lock = RunLock::acquire(&target).unwrap();
    assert!(lock.path().exists());
    assert!(matches!(RunLock::acquire(&target), Err(PipelineError::Locked(_))));

    let lock_path = lock.path().to_path_buf();
    drop(lock);
    assert!(!lock_path.exists());
    assert!(RunLock::acquire(&target).is_ok());
}
