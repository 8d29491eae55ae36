//! Prediction with classifier/regressor blending and regime-aware soft caps
//!
//! For each ticker with a model and a row on the requested date:
//! magnitude from the regressor, direction from the classifier, blended by
//! classifier margin, then bounded with `tanh(x / cap) · cap`. The cap widens
//! from `cap_base` to `cap_red` on red-flag rows (ΔVIX spike or abnormal
//! GARCH volatility).


use crate::attribution;
use crate::confidence::ConfidenceScorer;
use crate::config::{ConfidenceConfig, PredictionConfig};
use crate::trainer::TickerModel;
use crate::types::{DatePredictions, FeatureRow, FeatureTable, PredictionRecord};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Everything computed for one row before it becomes a record
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    /// Clipped z-scores, unweighted
    pub z: Vec<f64>,
    /// Model input: `z` times the importance weights
    pub weighted: Vec<f64>,
    pub prob_up: f64,
    pub magnitude: f64,
    pub margin: f64,
    /// Blended return before the cap
    pub raw_return: f64,
    pub red_flag: bool,
    pub cap: f64,
    /// Capped return, strictly inside (-cap, cap)
    pub capped_return: f64,
}

/// Signed blend of magnitude and direction. Returns (blended, margin).
pub fn blend(prob_up: f64, magnitude: f64, margin_blend: f64) -> (f64, f64) {
    let signed = if prob_up >= 0.5 {
        magnitude.abs()
    } else {
        -magnitude.abs()
    };
    let margin = ((prob_up - 0.5).abs() * 2.0).min(1.0);
    let blended = signed * ((1.0 - margin_blend) + margin_blend * margin);
    (blended, margin)
}

/// `tanh(x / cap) · cap`, kept strictly below `cap` in magnitude even where
/// tanh saturates to 1.0 in floating point
pub fn soft_cap(x: f64, cap: f64) -> f64 {
    if !x.is_finite() || cap <= 0.0 {
        return 0.0;
    }
    let limit = 1.0 - f64::EPSILON;
    (x / cap).tanh().clamp(-limit, limit) * cap
}

pub fn is_red_flag(
    delta_vix: Option<f64>,
    garch_vol: Option<f64>,
    garch_median: Option<f64>,
    config: &PredictionConfig,
) -> bool {
    let vix_spike = delta_vix.is_some_and(|d| d.abs() >= config.vix_red_threshold);
    let garch_spike = match (garch_vol, garch_median) {
        (Some(g), Some(m)) => g > config.garch_red_factor * m,
        _ => false,
    };
    vix_spike || garch_spike
}

impl TickerModel {
    /// Run one feature row through the fitted model
    pub fn forecast(&self, row: &FeatureRow, config: &PredictionConfig) -> Forecast {
        let transformed = self.preprocessor.transform(&row.vector(&self.feature_set));
        let prob_up = self.classifier.prob_up(&transformed.weighted);
        let magnitude = self.regressor.predict(&transformed.weighted);
        let (raw_return, margin) = blend(prob_up, magnitude, config.margin_blend);

        let red_flag = is_red_flag(row.delta_vix, row.garch_vol, self.garch_median, config);
        let cap = if red_flag { config.cap_red } else { config.cap_base };

        Forecast {
            z: transformed.z,
            weighted: transformed.weighted,
            prob_up,
            magnitude,
            margin,
            raw_return,
            red_flag,
            cap,
            capped_return: soft_cap(raw_return, cap),
        }
    }
}

pub struct Predictor<'a> {
    models: &'a BTreeMap<String, TickerModel>,
    config: PredictionConfig,
    confidence: ConfidenceConfig,
    scorer: ConfidenceScorer,
}

impl<'a> Predictor<'a> {
    pub fn new(
        models: &'a BTreeMap<String, TickerModel>,
        config: PredictionConfig,
        confidence: ConfidenceConfig,
    ) -> Self {
        let scorer = ConfidenceScorer::from_config(&confidence);
        Self {
            models,
            config,
            confidence,
            scorer,
        }
    }

    /// Predict every ticker that has both a model and a row on `date`
    pub fn predict_date(&self, table: &FeatureTable, date: NaiveDate) -> DatePredictions {
        let mut records = Vec::new();
        for row in table.rows.iter().filter(|r| r.date == date) {
            let Some(model) = self.models.get(&row.ticker) else {
                continue;
            };
            if let Some(record) = self.predict_row(model, row) {
                records.push(record);
            }
        }

        if records.is_empty() {
            tracing::info!("No predictions available for {} (no tickers with data on this date)", date);
            return DatePredictions::NoPredictions { date };
        }

        records.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        let red = records.iter().filter(|r| r.red_flag).count();
        tracing::info!(%date, predictions = records.len(), red_flags = red, "Predictions ready");
        DatePredictions::Predictions { date, records }
    }

    fn predict_row(&self, model: &TickerModel, row: &FeatureRow) -> Option<PredictionRecord> {
        let anchor = row.p_early?;
        let f = model.forecast(row, &self.config);

        let weights = self.confidence.weight_vector(&model.feature_set);
        let confidence = self.scorer.score(&f.z, &weights);
        let top_features =
            attribution::top_labels(&model.regressor.explanation(), &f.weighted, &model.feature_set);

        tracing::debug!(
            ticker = %row.ticker,
            prob_up = f.prob_up,
            magnitude = f.magnitude,
            raw = f.raw_return,
            capped = f.capped_return,
            red_flag = f.red_flag,
            "Row forecast"
        );

        Some(PredictionRecord {
            date: row.date,
            ticker: row.ticker.clone(),
            predicted_price: anchor * (1.0 + f.capped_return),
            predicted_change_pct: f.capped_return,
            confidence,
            red_flag: f.red_flag,
            top_features,
            anchor_price: anchor,
            early_source: row.early_source,
            prob_up: f.prob_up,
            margin: f.margin,
            cap: f.cap,
            raw_return: f.raw_return,
        })
    }
}
