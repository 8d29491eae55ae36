//! Feature engineering
//!
//! Builds one [`FeatureRow`] per (date, ticker) in two stages:
//!
//! 1. Daily features (`ret1`, `vol5`, `ma5`, `ma20`, `garch_vol`) over each
//!    ticker's full close history, so rolling windows are never shortened by
//!    missing intraday days.
//! 2. Intraday merge: anchor (09:00, or the prior close when the snapshot is
//!    missing), 10:30 price, overnight drift, the target and its lag, ΔVIX and
//!    the optional technical indicators.
//!
//! Daily features attached to a row dated `t` are those of the latest close
//! strictly before `t`; the same-day close is not known at 10:30.

pub mod volatility;
#[cfg(test)]
mod tests;

use crate::config::FeatureConfig;
use crate::data::{quantile_sorted, Indicator, InputBundle, TechnicalTable, WideTable};
use crate::types::{EarlySource, Feature, FeatureRow, FeatureSet, FeatureTable};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Close-derived features for one ticker on one close date
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DailyFeatures {
    pub close: f64,
    pub ret1: Option<f64>,
    pub vol5: Option<f64>,
    pub ma5: Option<f64>,
    pub ma20: Option<f64>,
    pub garch_vol: Option<f64>,
}

/// Indicator values are clipped to these quantiles of the merged rows
const TA_CLIP_QUANTILES: (f64, f64) = (0.01, 0.99);

pub struct FeatureEngineer {
    config: FeatureConfig,
}

impl FeatureEngineer {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    /// Drop optional columns whose source is absent; logged once per column
    pub fn resolve_feature_set(&self, inputs: &InputBundle, requested: &FeatureSet) -> FeatureSet {
        let mut set = requested.clone();

        if set.contains(Feature::DeltaVix) && inputs.vix.is_none() {
            tracing::warn!("Volatility index unavailable; omitting {} for all tickers", Feature::DeltaVix);
            set = set.without(Feature::DeltaVix);
        }

        for indicator in Indicator::ALL {
            let feature = indicator.feature();
            if !set.contains(feature) {
                continue;
            }
            let available = inputs.technical.as_ref().is_some_and(|t| t.has(indicator));
            if !available {
                tracing::info!("No {} values in technical table; omitting it", feature);
                set = set.without(feature);
            }
        }

        set
    }

    /// Build the full feature table; keeps only rows that satisfy
    /// [`FeatureRow::is_usable`]
    pub fn build(&self, inputs: &InputBundle, requested: &FeatureSet) -> FeatureTable {
        let feature_set = self.resolve_feature_set(inputs, requested);

        let mut rows = Vec::new();
        let mut imputed = 0usize;
        for ticker in inputs.mid.tickers() {
            let daily = self.daily_features(&inputs.closes, ticker);
            let mut ticker_rows = self.intraday_rows(inputs, ticker, &daily, &feature_set);
            ticker_rows.retain(FeatureRow::is_usable);
            imputed += ticker_rows
                .iter()
                .filter(|r| r.early_source == EarlySource::Imputed)
                .count();
            rows.extend(ticker_rows);
        }

        rows.sort_by(|a, b| a.ticker.cmp(&b.ticker).then(a.date.cmp(&b.date)));
        winsorize_technical(&mut rows, &feature_set, TA_CLIP_QUANTILES);

        tracing::info!(
            rows = rows.len(),
            features = feature_set.len(),
            imputed_early = imputed,
            "Feature table ready"
        );

        FeatureTable { rows, feature_set }
    }

    /// Daily features keyed by close date, over every defined close
    pub fn daily_features(&self, closes: &WideTable, ticker: &str) -> BTreeMap<NaiveDate, DailyFeatures> {
        let series: Vec<(NaiveDate, f64)> = closes.series(ticker).into_iter().collect();
        let prices: Vec<f64> = series.iter().map(|(_, c)| *c).collect();
        let scale = self.config.rolling_scale;

        let ret1: Vec<Option<f64>> = (0..prices.len())
            .map(|i| {
                (i > 0 && prices[i - 1] != 0.0).then(|| prices[i] / prices[i - 1] - 1.0)
            })
            .collect();
        let garch = volatility::volatility_proxy(&ret1, &self.config);

        series
            .iter()
            .enumerate()
            .map(|(i, (date, close))| {
                let f = DailyFeatures {
                    close: *close,
                    ret1: ret1[i].map(|r| r * scale),
                    vol5: rolling_std(&prices, i, 5).map(|v| v * scale),
                    ma5: rolling_mean(&prices, i, 5).map(|v| v * scale),
                    ma20: rolling_mean(&prices, i, 20).map(|v| v * scale),
                    garch_vol: garch[i],
                };
                (*date, f)
            })
            .collect()
    }

    /// Merged rows for one ticker that have an anchor and a 10:30 price,
    /// before the participation filter
    pub(crate) fn intraday_rows(
        &self,
        inputs: &InputBundle,
        ticker: &str,
        daily: &BTreeMap<NaiveDate, DailyFeatures>,
        feature_set: &FeatureSet,
    ) -> Vec<FeatureRow> {
        let mid = inputs.mid.series(ticker);
        let early = inputs
            .early
            .as_ref()
            .map(|t| t.series(ticker))
            .unwrap_or_default();

        let mut rows = Vec::with_capacity(mid.len());
        let mut prev_ret: Option<f64> = None;

        for (date, p_mid) in mid {
            let mut row = FeatureRow::new(date, ticker);
            row.p_mid = Some(p_mid);
            row.close_t = daily.get(&date).map(|d| d.close);

            let prior = daily.range(..date).next_back().map(|(_, d)| *d);
            row.close_t_minus_1 = prior.map(|d| d.close);

            let (p_early, source) = match (early.get(&date), row.close_t_minus_1) {
                (Some(p), _) => (Some(*p), EarlySource::Snapshot),
                (None, Some(c)) => (Some(c), EarlySource::Imputed),
                (None, None) => (None, EarlySource::Missing),
            };
            row.p_early = p_early;
            row.early_source = source;

            let Some(anchor) = p_early.filter(|p| *p != 0.0) else {
                continue;
            };

            row.ret_intraday = Some(p_mid / anchor - 1.0);
            row.overnight_drift = row
                .close_t_minus_1
                .filter(|c| *c != 0.0)
                .map(|c| anchor / c - 1.0);
            row.ret_intraday_prev = prev_ret;
            row.ret_intraday_prev_sign = prev_ret.map(sign);
            prev_ret = row.ret_intraday;

            if let Some(d) = prior {
                row.ret1 = d.ret1;
                row.vol5 = d.vol5;
                row.ma5 = d.ma5;
                row.ma20 = d.ma20;
                row.garch_vol = d.garch_vol;
            }

            if feature_set.contains(Feature::DeltaVix) {
                row.delta_vix = inputs.vix.as_ref().and_then(|v| v.delta(date));
            }

            rows.push(row);
        }

        if let Some(technical) = &inputs.technical {
            merge_technical(&mut rows, technical, feature_set, self.config.ta_ffill_limit);
        }

        rows
    }
}

/// Attach indicator values by (date, ticker), carrying the last seen value
/// forward for at most `limit` rows. Only earlier rows feed a fill.
fn merge_technical(rows: &mut [FeatureRow], table: &TechnicalTable, set: &FeatureSet, limit: usize) {
    for indicator in Indicator::ALL {
        let feature = indicator.feature();
        if !set.contains(feature) {
            continue;
        }
        let mut last: Option<f64> = None;
        let mut age = 0usize;
        for row in rows.iter_mut() {
            match table.get(&row.ticker, row.date, indicator) {
                Some(v) => {
                    last = Some(v);
                    age = 0;
                    row.set_value(feature, Some(v));
                }
                None => {
                    age += 1;
                    let filled = last.filter(|_| age <= limit);
                    row.set_value(feature, filled);
                }
            }
        }
    }
}

/// Clip each indicator column to its quantile bounds over the given rows
pub(crate) fn winsorize_technical(
    rows: &mut [FeatureRow],
    set: &FeatureSet,
    (lower, upper): (f64, f64),
) {
    for feature in Feature::TECHNICAL {
        if !set.contains(feature) {
            continue;
        }
        let mut values: Vec<f64> = rows
            .iter()
            .filter_map(|r| r.value(feature))
            .filter(|v| v.is_finite())
            .collect();
        if values.len() < 2 {
            continue;
        }
        values.sort_by(f64::total_cmp);
        let lo = quantile_sorted(&values, lower);
        let hi = quantile_sorted(&values, upper);
        for row in rows.iter_mut() {
            if let Some(v) = row.value(feature) {
                row.set_value(feature, Some(v.clamp(lo, hi)));
            }
        }
    }
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

fn rolling_mean(xs: &[f64], end: usize, window: usize) -> Option<f64> {
    if end + 1 < window {
        return None;
    }
    let slice = &xs[end + 1 - window..=end];
    Some(slice.iter().sum::<f64>() / window as f64)
}

/// Population standard deviation (ddof = 0)
fn rolling_std(xs: &[f64], end: usize, window: usize) -> Option<f64> {
    let mean = rolling_mean(xs, end, window)?;
    let slice = &xs[end + 1 - window..=end];
    let var = slice.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / window as f64;
    Some(var.sqrt())
}
