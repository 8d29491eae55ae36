//! Precomputed technical indicators (RSI-14, MACD, Bollinger %B)
//!
//! Accepts either a wide table with `<TICKER>_(rsi14|macd|bbp)` columns or a
//! long table with `Date,ticker,<indicator>...` columns.

use super::{parse_cell, parse_date, RawTable};
use crate::error::Result;
use crate::types::Feature;
use chrono::NaiveDate;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Indicator {
    Rsi14,
    Macd,
    Bbp,
}

impl Indicator {
    pub const ALL: [Indicator; 3] = [Indicator::Rsi14, Indicator::Macd, Indicator::Bbp];

    /// Accepts both the collector suffixes and the canonical feature names
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "rsi14" | "rsi_14" => Some(Indicator::Rsi14),
            "macd" | "macd_line" => Some(Indicator::Macd),
            "bbp" | "bb_pos" => Some(Indicator::Bbp),
            _ => None,
        }
    }

    pub fn feature(&self) -> Feature {
        match self {
            Indicator::Rsi14 => Feature::Rsi14,
            Indicator::Macd => Feature::MacdLine,
            Indicator::Bbp => Feature::BbPos,
        }
    }

    fn slot(&self) -> usize {
        match self {
            Indicator::Rsi14 => 0,
            Indicator::Macd => 1,
            Indicator::Bbp => 2,
        }
    }
}

/// Indicator values keyed by (ticker, date)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TechnicalTable {
    values: BTreeMap<(String, NaiveDate), [Option<f64>; 3]>,
}

impl TechnicalTable {
    pub fn from_raw(raw: &RawTable) -> Result<Self> {
        let date_idx = raw.date_column()?;
        Ok(match raw.column("ticker") {
            Some(ticker_idx) => Self::from_long(raw, date_idx, ticker_idx),
            None => Self::from_wide(raw, date_idx),
        })
    }

    fn from_wide(raw: &RawTable, date_idx: usize) -> Self {
        let mapped: Vec<(usize, String, Indicator)> = raw
            .headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != date_idx)
            .filter_map(|(i, h)| {
                let (ticker, suffix) = h.trim().rsplit_once('_')?;
                let indicator = Indicator::parse(suffix)?;
                is_ticker(ticker).then(|| (i, ticker.to_string(), indicator))
            })
            .collect();

        let mut table = Self::default();
        for record in &raw.records {
            let Some(date) = record.get(date_idx).and_then(parse_date) else {
                continue;
            };
            for (i, ticker, indicator) in &mapped {
                if let Some(v) = record.get(*i).and_then(parse_cell) {
                    table.insert(ticker, date, *indicator, v);
                }
            }
        }
        table
    }

    fn from_long(raw: &RawTable, date_idx: usize, ticker_idx: usize) -> Self {
        let mapped: Vec<(usize, Indicator)> = raw
            .headers
            .iter()
            .enumerate()
            .filter_map(|(i, h)| Indicator::parse(h).map(|ind| (i, ind)))
            .collect();

        let mut table = Self::default();
        for record in &raw.records {
            let Some(date) = record.get(date_idx).and_then(parse_date) else {
                continue;
            };
            let Some(ticker) = record.get(ticker_idx).map(str::trim).filter(|t| !t.is_empty())
            else {
                continue;
            };
            for (i, indicator) in &mapped {
                if let Some(v) = record.get(*i).and_then(parse_cell) {
                    table.insert(ticker, date, *indicator, v);
                }
            }
        }
        table
    }

    pub fn insert(&mut self, ticker: &str, date: NaiveDate, indicator: Indicator, value: f64) {
        let entry = self
            .values
            .entry((ticker.to_string(), date))
            .or_insert([None; 3]);
        // First value per (date, ticker) wins, as duplicates are collector noise
        if entry[indicator.slot()].is_none() {
            entry[indicator.slot()] = Some(value);
        }
    }

    pub fn get(&self, ticker: &str, date: NaiveDate, indicator: Indicator) -> Option<f64> {
        self.values
            .get(&(ticker.to_string(), date))
            .and_then(|v| v[indicator.slot()])
    }

    /// Whether any value exists for an indicator
    pub fn has(&self, indicator: Indicator) -> bool {
        self.values.values().any(|v| v[indicator.slot()].is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Linear-interpolated quantile of a sorted, non-empty slice
pub(crate) fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

fn is_ticker(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}
