//! Core data types shared across the pipeline

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Placeholder label when fewer than four drivers are available
pub const LABEL_PLACEHOLDER: &str = "—";

/// Every feature the model can consume, in canonical column order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    OvernightDrift,
    RetIntradayPrev,
    RetIntradayPrevSign,
    DeltaVix,
    Ret1,
    Vol5,
    Ma5,
    Ma20,
    GarchVol,
    Rsi14,
    MacdLine,
    BbPos,
}

impl Feature {
    pub const ALL: [Feature; 12] = [
        Feature::OvernightDrift,
        Feature::RetIntradayPrev,
        Feature::RetIntradayPrevSign,
        Feature::DeltaVix,
        Feature::Ret1,
        Feature::Vol5,
        Feature::Ma5,
        Feature::Ma20,
        Feature::GarchVol,
        Feature::Rsi14,
        Feature::MacdLine,
        Feature::BbPos,
    ];

    /// Technical-indicator columns merged from the secondary source
    pub const TECHNICAL: [Feature; 3] = [Feature::Rsi14, Feature::MacdLine, Feature::BbPos];

    /// Column name used in exports and config weight tables
    pub fn name(&self) -> &'static str {
        match self {
            Feature::OvernightDrift => "overnight_drift",
            Feature::RetIntradayPrev => "ret_intraday_prev",
            Feature::RetIntradayPrevSign => "ret_intraday_prev_sign",
            Feature::DeltaVix => "delta_vix",
            Feature::Ret1 => "ret1",
            Feature::Vol5 => "vol5",
            Feature::Ma5 => "ma5",
            Feature::Ma20 => "ma20",
            Feature::GarchVol => "garch_vol",
            Feature::Rsi14 => "rsi14",
            Feature::MacdLine => "macd_line",
            Feature::BbPos => "bb_pos",
        }
    }

    /// Human-readable label shown as a top driver
    pub fn label(&self) -> &'static str {
        match self {
            Feature::OvernightDrift => "Overnight drift",
            Feature::RetIntradayPrev => "Prev intraday",
            Feature::RetIntradayPrevSign => "Prev sign",
            Feature::DeltaVix => "ΔVIX",
            Feature::Ret1 => "Daily return (lag1)",
            Feature::Vol5 => "Vol(5)",
            Feature::Ma5 => "MA(5)",
            Feature::Ma20 => "MA(20)",
            Feature::GarchVol => "GARCH vol",
            Feature::Rsi14 => "RSI",
            Feature::MacdLine => "MACD",
            Feature::BbPos => "Bollinger %B",
        }
    }

    /// Domain-assigned importance (integer scale, not learned)
    pub fn default_importance(&self) -> f64 {
        match self {
            Feature::OvernightDrift => 8.0,
            Feature::RetIntradayPrev => 7.0,
            Feature::RetIntradayPrevSign => 4.0,
            Feature::DeltaVix => 9.0,
            Feature::Ret1 => 6.0,
            Feature::Vol5 => 5.0,
            Feature::Ma5 => 3.0,
            Feature::Ma20 => 3.0,
            Feature::GarchVol => 8.0,
            Feature::Rsi14 => 6.0,
            Feature::MacdLine => 7.0,
            Feature::BbPos => 5.0,
        }
    }

    /// Columns fed by an optional input; dropped rather than fatal when absent
    pub fn is_optional(&self) -> bool {
        *self == Feature::DeltaVix || Feature::TECHNICAL.contains(self)
    }

    pub fn from_name(name: &str) -> Option<Feature> {
        Feature::ALL.iter().copied().find(|f| f.name() == name)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered list of features enabled for a run.
///
/// The order fixed here is the column order of every design matrix, so a model
/// fitted against one `FeatureSet` must be replayed against the same one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSet(Vec<Feature>);

impl FeatureSet {
    /// Build from any subset, normalised to canonical order without duplicates
    pub fn new(features: impl IntoIterator<Item = Feature>) -> Self {
        let mut v: Vec<Feature> = features.into_iter().collect();
        v.sort();
        v.dedup();
        Self(v)
    }

    pub fn all() -> Self {
        Self(Feature::ALL.to_vec())
    }

    pub fn without(&self, feature: Feature) -> Self {
        Self(self.0.iter().copied().filter(|f| *f != feature).collect())
    }

    pub fn contains(&self, feature: Feature) -> bool {
        self.0.contains(&feature)
    }

    pub fn features(&self) -> &[Feature] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.0.iter()
    }

    pub fn index_of(&self, feature: Feature) -> Option<usize> {
        self.0.iter().position(|f| *f == feature)
    }
}

/// Where the early-session anchor price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EarlySource {
    /// True 09:00 snapshot
    Snapshot,
    /// Filled from the previous day's close
    Imputed,
    /// Neither snapshot nor prior close available
    Missing,
}

/// One engineered row keyed by (date, ticker)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub ticker: String,
    pub close_t: Option<f64>,
    pub close_t_minus_1: Option<f64>,
    pub p_early: Option<f64>,
    pub early_source: EarlySource,
    pub p_mid: Option<f64>,
    pub overnight_drift: Option<f64>,
    /// Target: p_mid / p_early - 1
    pub ret_intraday: Option<f64>,
    pub ret_intraday_prev: Option<f64>,
    pub ret_intraday_prev_sign: Option<f64>,
    pub delta_vix: Option<f64>,
    pub ret1: Option<f64>,
    pub vol5: Option<f64>,
    pub ma5: Option<f64>,
    pub ma20: Option<f64>,
    pub garch_vol: Option<f64>,
    pub rsi14: Option<f64>,
    pub macd_line: Option<f64>,
    pub bb_pos: Option<f64>,
}

impl FeatureRow {
    /// Empty row for a (date, ticker) key
    pub fn new(date: NaiveDate, ticker: impl Into<String>) -> Self {
        Self {
            date,
            ticker: ticker.into(),
            close_t: None,
            close_t_minus_1: None,
            p_early: None,
            early_source: EarlySource::Missing,
            p_mid: None,
            overnight_drift: None,
            ret_intraday: None,
            ret_intraday_prev: None,
            ret_intraday_prev_sign: None,
            delta_vix: None,
            ret1: None,
            vol5: None,
            ma5: None,
            ma20: None,
            garch_vol: None,
            rsi14: None,
            macd_line: None,
            bb_pos: None,
        }
    }

    pub fn value(&self, feature: Feature) -> Option<f64> {
        match feature {
            Feature::OvernightDrift => self.overnight_drift,
            Feature::RetIntradayPrev => self.ret_intraday_prev,
            Feature::RetIntradayPrevSign => self.ret_intraday_prev_sign,
            Feature::DeltaVix => self.delta_vix,
            Feature::Ret1 => self.ret1,
            Feature::Vol5 => self.vol5,
            Feature::Ma5 => self.ma5,
            Feature::Ma20 => self.ma20,
            Feature::GarchVol => self.garch_vol,
            Feature::Rsi14 => self.rsi14,
            Feature::MacdLine => self.macd_line,
            Feature::BbPos => self.bb_pos,
        }
    }

    pub fn set_value(&mut self, feature: Feature, value: Option<f64>) {
        let slot = match feature {
            Feature::OvernightDrift => &mut self.overnight_drift,
            Feature::RetIntradayPrev => &mut self.ret_intraday_prev,
            Feature::RetIntradayPrevSign => &mut self.ret_intraday_prev_sign,
            Feature::DeltaVix => &mut self.delta_vix,
            Feature::Ret1 => &mut self.ret1,
            Feature::Vol5 => &mut self.vol5,
            Feature::Ma5 => &mut self.ma5,
            Feature::Ma20 => &mut self.ma20,
            Feature::GarchVol => &mut self.garch_vol,
            Feature::Rsi14 => &mut self.rsi14,
            Feature::MacdLine => &mut self.macd_line,
            Feature::BbPos => &mut self.bb_pos,
        };
        *slot = value;
    }

    /// Feature vector in `set` order; missing or non-finite values become NaN
    pub fn vector(&self, set: &FeatureSet) -> Vec<f64> {
        set.iter()
            .map(|f| match self.value(*f) {
                Some(v) if v.is_finite() => v,
                _ => f64::NAN,
            })
            .collect()
    }

    /// Row may take part in training or prediction
    pub fn is_usable(&self) -> bool {
        self.p_early.is_some()
            && self.p_mid.is_some()
            && self.close_t_minus_1.is_some()
            && self.ret_intraday_prev.is_some()
    }

    /// Row is usable and carries a finite target
    pub fn is_trainable(&self) -> bool {
        self.is_usable() && self.ret_intraday.is_some_and(f64::is_finite)
    }
}

/// Engineered feature table plus the feature set enabled for the run
#[derive(Debug, Clone)]
pub struct FeatureTable {
    /// Sorted by (ticker, date)
    pub rows: Vec<FeatureRow>,
    pub feature_set: FeatureSet,
}

impl FeatureTable {
    pub fn tickers(&self) -> Vec<&str> {
        let mut t: Vec<&str> = self.rows.iter().map(|r| r.ticker.as_str()).collect();
        t.dedup();
        t
    }

    /// Rows grouped per ticker, each group in date order
    pub fn by_ticker(&self) -> BTreeMap<&str, Vec<&FeatureRow>> {
        let mut map: BTreeMap<&str, Vec<&FeatureRow>> = BTreeMap::new();
        for row in &self.rows {
            map.entry(row.ticker.as_str()).or_default().push(row);
        }
        map
    }

    pub fn row(&self, date: NaiveDate, ticker: &str) -> Option<&FeatureRow> {
        self.rows
            .iter()
            .find(|r| r.date == date && r.ticker == ticker)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A capped, explainable prediction for one (date, ticker)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub date: NaiveDate,
    pub ticker: String,
    pub predicted_price: f64,
    /// Capped return as a fraction (0.01 = +1%), never the raw model output
    pub predicted_change_pct: f64,
    /// Always within [0, 10]
    pub confidence: f64,
    pub red_flag: bool,
    pub top_features: [String; 4],
    pub anchor_price: f64,
    pub early_source: EarlySource,
    pub prob_up: f64,
    pub margin: f64,
    pub cap: f64,
    /// Blended return before the soft cap
    pub raw_return: f64,
}

/// Outcome of predicting a single date
#[derive(Debug, Clone, PartialEq)]
pub enum DatePredictions {
    Predictions {
        date: NaiveDate,
        records: Vec<PredictionRecord>,
    },
    /// No ticker had both a model and a feature row on this date
    NoPredictions { date: NaiveDate },
}

impl DatePredictions {
    pub fn date(&self) -> NaiveDate {
        match self {
            DatePredictions::Predictions { date, .. } | DatePredictions::NoPredictions { date } => {
                *date
            }
        }
    }

    pub fn records(&self) -> &[PredictionRecord] {
        match self {
            DatePredictions::Predictions { records, .. } => records,
            DatePredictions::NoPredictions { .. } => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}
