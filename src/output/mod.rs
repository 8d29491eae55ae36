//! Prediction history and newswire CSV output
//!
//! The history table is upserted by (date, ticker), kept sorted, and replaced
//! atomically: `<path>.tmp` is written and synced, the previous file is copied
//! to `<path>.bak`, then the temp file is renamed over it.

#[cfg(test)]
mod tests;

use crate::error::{PipelineError, Result};
use crate::types::PredictionRecord;
use chrono::NaiveDate;
use csv::{ReaderBuilder, WriterBuilder};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const HEADERS: [&str; 10] = [
    "date",
    "ticker",
    "name",
    "price",
    "change",
    "confidence",
    "feature1",
    "feature2",
    "feature3",
    "feature4",
];

/// One row of the history or newswire table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRow {
    pub date: String,
    pub ticker: String,
    pub name: String,
    /// Predicted 10:30 price, 2 dp
    pub price: Decimal,
    /// Predicted change in percent, 1 dp
    pub change: Decimal,
    /// 0-10, 1 dp
    pub confidence: Decimal,
    pub feature1: String,
    pub feature2: String,
    pub feature3: String,
    pub feature4: String,
}

impl OutputRow {
    /// `None`, with a warning, when a number has no decimal form
    pub fn from_record(record: &PredictionRecord, name: &str) -> Option<Self> {
        let (Some(price), Some(change), Some(confidence)) = (
            round(record.predicted_price, 2),
            round(record.predicted_change_pct * 100.0, 1),
            round(record.confidence, 1),
        ) else {
            tracing::warn!(
                price = record.predicted_price,
                change = record.predicted_change_pct,
                confidence = record.confidence,
                "Not writing {} on {}: non-finite prediction",
                record.ticker,
                record.date
            );
            return None;
        };
        let [feature1, feature2, feature3, feature4] = record.top_features.clone();
        Some(Self {
            date: record.date.format("%Y-%m-%d").to_string(),
            ticker: record.ticker.clone(),
            name: name.to_string(),
            price,
            change,
            confidence,
            feature1,
            feature2,
            feature3,
            feature4,
        })
    }

    /// CSV numbers come back without their trailing zeros
    fn canonicalize(mut self) -> Self {
        self.price = fixed(self.price, 2);
        self.change = fixed(self.change, 1);
        self.confidence = fixed(self.confidence, 1);
        self
    }

    fn key(&self) -> (String, String) {
        (self.date.clone(), self.ticker.clone())
    }
}

fn round(value: f64, dp: u32) -> Option<Decimal> {
    Decimal::from_f64(value).map(|d| fixed(d, dp))
}

/// Round and pad to exactly `dp` places so rewrites are byte-stable
fn fixed(value: Decimal, dp: u32) -> Decimal {
    let mut d = value.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    d.rescale(dp);
    d
}

/// Cumulative history table at a fixed path
pub struct HistoryWriter {
    path: PathBuf,
}

impl HistoryWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Existing rows; a missing file is an empty history
    pub fn read(&self) -> Result<Vec<OutputRow>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        read_rows(&self.path)
    }

    /// Insert or replace rows by (date, ticker); returns the table size
    pub fn upsert(&self, rows: &[OutputRow]) -> Result<usize> {
        let existing = self.read()?;
        let before = existing.len();
        let merged = merge_rows(existing, rows.iter().cloned());
        write_atomic(&self.path, &merged)?;

        tracing::info!(
            "Upserted {} rows into {} ({} → {} total)",
            rows.len(),
            self.path.display(),
            before,
            merged.len()
        );
        Ok(merged.len())
    }
}

/// Last write wins per (date, ticker); result sorted by key
pub fn merge_rows(
    existing: impl IntoIterator<Item = OutputRow>,
    new: impl IntoIterator<Item = OutputRow>,
) -> Vec<OutputRow> {
    let mut by_key: BTreeMap<(String, String), OutputRow> = BTreeMap::new();
    for row in existing.into_iter().chain(new) {
        by_key.insert(row.key(), row);
    }
    by_key.into_values().collect()
}

/// Sort for the newswire: confidence desc, change desc, then ticker
pub fn newswire_order(rows: &mut [OutputRow]) {
    rows.sort_by(|a, b| {
        b.confidence
            .cmp(&a.confidence)
            .then(b.change.cmp(&a.change))
            .then(a.ticker.cmp(&b.ticker))
    });
}

/// Write `predictions_newswire_<date>.csv` in `dir`
pub fn write_newswire(dir: &Path, date: NaiveDate, rows: &[OutputRow]) -> Result<PathBuf> {
    let mut sorted = rows.to_vec();
    newswire_order(&mut sorted);
    let path = dir.join(format!("predictions_newswire_{}.csv", date.format("%Y-%m-%d")));
    write_atomic(&path, &sorted)?;
    tracing::info!("Saved newswire: {}", path.display());
    Ok(path)
}

pub fn read_rows(path: &Path) -> Result<Vec<OutputRow>> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let mut rdr = ReaderBuilder::new().from_reader(file);
    let mut rows = Vec::new();
    for row in rdr.deserialize::<OutputRow>() {
        rows.push(row.map_err(|e| PipelineError::csv(path, e))?.canonicalize());
    }
    Ok(rows)
}

/// Replace `path` with `rows` so readers never see a partial table
pub fn write_atomic(path: &Path, rows: &[OutputRow]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }

    let tmp = with_suffix(path, ".tmp");
    let file = File::create(&tmp).map_err(|e| PipelineError::io(&tmp, e))?;
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(file);
    wtr.write_record(HEADERS)
        .map_err(|e| PipelineError::csv(&tmp, e))?;
    for row in rows {
        wtr.serialize(row).map_err(|e| PipelineError::csv(&tmp, e))?;
    }
    let file = wtr
        .into_inner()
        .map_err(|e| PipelineError::io(&tmp, e.into_error()))?;
    file.sync_all().map_err(|e| PipelineError::io(&tmp, e))?;

    if path.exists() {
        let bak = with_suffix(path, ".bak");
        if let Err(e) = fs::copy(path, &bak) {
            tracing::warn!("Could not back up {} to {}: {}", path.display(), bak.display(), e);
        }
    }

    fs::rename(&tmp, path).map_err(|e| PipelineError::io(path, e))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// Exclusive run lock at `<path>.lock`, released on drop
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(target: &Path) -> Result<Self> {
        let path = with_suffix(target, ".lock");
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(PipelineError::Locked(path));
            }
            Err(e) => return Err(PipelineError::io(&path, e)),
        };
        // Best effort; the lock is the file's existence
        let _ = writeln!(file, "{}", std::process::id());
        tracing::debug!("Acquired lock {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("Failed to remove lock {}: {}", self.path.display(), e);
        }
    }
}
