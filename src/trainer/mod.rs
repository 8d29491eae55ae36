//! Per-ticker model training
//!
//! Each ticker gets its own imputer, scaler, regressor and direction
//! classifier, fitted on the chronologically earliest rows. The tail is held
//! out for a price-space validation report.


use crate::config::{ModelConfig, PredictionConfig, RegressorKind};
use crate::data::quantile_sorted;
use crate::error::{PipelineError, Result};
use crate::ml::{
    Classifier, ConstantClassifier, GradientBoostingRegressor, LogisticClassifier, Preprocessor,
    Regressor, RidgeRegressor,
};
use crate::types::{Feature, FeatureRow, FeatureSet, FeatureTable};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Validation quality by price-space error percentage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Quality {
    High,
    Medium,
    Low,
    Unknown,
}

impl Quality {
    pub fn from_error_pct(error_pct: Option<f64>) -> Self {
        match error_pct {
            Some(e) if !e.is_finite() => Quality::Unknown,
            Some(e) if e <= 0.5 => Quality::High,
            Some(e) if e <= 1.5 => Quality::Medium,
            Some(_) => Quality::Low,
            None => Quality::Unknown,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Quality::High => "High",
            Quality::Medium => "Medium",
            Quality::Low => "Low",
            Quality::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub ticker: String,
    pub n_train: usize,
    pub n_validation: usize,
    pub mae: Option<f64>,
    pub rmse: Option<f64>,
    /// RMSE as a percentage of the mean anchor price
    pub error_pct: Option<f64>,
    pub quality: Quality,
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opt = |v: Option<f64>, dp: usize| match v {
            Some(v) => format!("{:.*}", dp, v),
            None => "-".to_string(),
        };
        write!(
            f,
            "{:<8} n_train={:<4} n_val={:<3} MAE={:>10} RMSE={:>10} error={:>6}% {}",
            self.ticker,
            self.n_train,
            self.n_validation,
            opt(self.mae, 4),
            opt(self.rmse, 4),
            opt(self.error_pct, 2),
            self.quality
        )
    }
}

/// Everything needed to replay predictions for one ticker
pub struct TickerModel {
    pub ticker: String,
    /// Column order the model was fitted with
    pub feature_set: FeatureSet,
    pub preprocessor: Preprocessor,
    pub regressor: Box<dyn Regressor>,
    pub classifier: Box<dyn Classifier>,
    /// Median GARCH volatility over the ticker's rows, the red-flag baseline
    pub garch_median: Option<f64>,
    pub report: ValidationReport,
}

impl fmt::Debug for TickerModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickerModel")
            .field("ticker", &self.ticker)
            .field("feature_set", &self.feature_set)
            .field("garch_median", &self.garch_median)
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct TrainingOutcome {
    pub models: BTreeMap<String, TickerModel>,
    /// Skipped ticker → reason
    pub skipped: BTreeMap<String, String>,
}

impl TrainingOutcome {
    pub fn reports(&self) -> impl Iterator<Item = &ValidationReport> {
        self.models.values().map(|m| &m.report)
    }
}

pub struct ModelTrainer {
    model: ModelConfig,
    prediction: PredictionConfig,
}

impl ModelTrainer {
    pub fn new(model: ModelConfig, prediction: PredictionConfig) -> Self {
        Self { model, prediction }
    }

    /// Rows held out for validation: n / divisor, at least 1, at most the cap
    pub fn validation_size(&self, n: usize) -> usize {
        (n / self.model.validation_divisor.max(1))
            .max(1)
            .min(self.model.max_validation)
    }

    /// Rows fitted on out of `n` trainable rows, or `None` below `min_rows`
    pub fn train_len(&self, n: usize) -> Option<usize> {
        if n < self.model.min_rows.max(2) {
            return None;
        }
        Some(n - self.validation_size(n).min(n - 1))
    }

    /// Drop optional columns that have no training value for some ticker
    /// that will be fitted; each dropped column is logged once
    pub fn covered_feature_set(
        &self,
        groups: &[(&str, Vec<&FeatureRow>)],
        requested: &FeatureSet,
    ) -> FeatureSet {
        let mut set = requested.clone();
        for feature in requested.iter().copied().filter(Feature::is_optional) {
            let uncovered: Vec<&str> = groups
                .iter()
                .filter_map(|(ticker, rows)| {
                    let trainable = trainable_rows(rows);
                    let n_train = self.train_len(trainable.len())?;
                    let covered = trainable[..n_train]
                        .iter()
                        .any(|r| r.value(feature).is_some_and(f64::is_finite));
                    (!covered).then_some(*ticker)
                })
                .collect();
            if !uncovered.is_empty() {
                tracing::warn!(
                    tickers = ?uncovered,
                    "No training values for {}; omitting it for all tickers",
                    feature
                );
                set = set.without(feature);
            }
        }
        set
    }

    /// Fit every ticker in the table; tickers that cannot be fitted are
    /// skipped with a warning
    pub fn train(&self, table: &FeatureTable) -> TrainingOutcome {
        let groups: Vec<(&str, Vec<&FeatureRow>)> = table.by_ticker().into_iter().collect();
        let feature_set = self.covered_feature_set(&groups, &table.feature_set);

        let fit = |(ticker, rows): &(&str, Vec<&FeatureRow>)| {
            (ticker.to_string(), self.train_ticker(ticker, rows, &feature_set))
        };
        let results: Vec<(String, Result<TickerModel>)> = if self.model.parallel {
            groups.par_iter().map(fit).collect()
        } else {
            groups.iter().map(fit).collect()
        };

        let mut outcome = TrainingOutcome::default();
        for (ticker, result) in results {
            match result {
                Ok(model) => {
                    tracing::info!("{}", model.report);
                    outcome.models.insert(ticker, model);
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", ticker, e);
                    outcome.skipped.insert(ticker, e.to_string());
                }
            }
        }

        tracing::info!(
            trained = outcome.models.len(),
            skipped = outcome.skipped.len(),
            "Training complete"
        );
        outcome
    }

    pub fn train_ticker(
        &self,
        ticker: &str,
        rows: &[&FeatureRow],
        feature_set: &FeatureSet,
    ) -> Result<TickerModel> {
        let trainable = trainable_rows(rows);
        let n = trainable.len();
        let Some(n_train) = self.train_len(n) else {
            return Err(PipelineError::InsufficientData {
                ticker: ticker.to_string(),
                required: self.model.min_rows.max(2),
                actual: n,
            });
        };
        let n_val = n - n_train;

        let vectors: Vec<Vec<f64>> = trainable[..n_train]
            .iter()
            .map(|r| r.vector(feature_set))
            .collect();
        let x = Array2::from_shape_fn((n_train, feature_set.len()), |(i, j)| vectors[i][j]);
        let y: Array1<f64> = trainable[..n_train]
            .iter()
            .map(|r| r.ret_intraday.unwrap_or(f64::NAN))
            .collect();

        let preprocessor = Preprocessor::fit(
            &x,
            Array1::from(self.model.importance_vector(feature_set)),
            self.model.clip_z,
        )
        .map_err(|col| PipelineError::Degenerate {
            ticker: ticker.to_string(),
            reason: format!(
                "feature {} has no training values",
                feature_set
                    .features()
                    .get(col.0)
                    .map(|f| f.name())
                    .unwrap_or("?")
            ),
        })?;

        let x_train = preprocessor.transform_matrix(&x);

        let regressor: Box<dyn Regressor> = match self.model.regressor {
            RegressorKind::Ridge => {
                Box::new(RidgeRegressor::fit(&x_train, &y, self.model.ridge_alpha)?)
            }
            RegressorKind::GradientBoosting => Box::new(GradientBoostingRegressor::fit(
                &x_train,
                &y,
                &self.model.boosting,
            )?),
        };

        let labels: Vec<bool> = y.iter().map(|v| *v > 0.0).collect();
        let classifier: Box<dyn Classifier> = if labels.iter().all(|l| *l == labels[0]) {
            let probability = if labels[0] { 1.0 } else { 0.0 };
            tracing::debug!("{}: single-class direction labels, constant P(up)={}", ticker, probability);
            Box::new(ConstantClassifier { probability })
        } else {
            Box::new(LogisticClassifier::fit(
                &x_train,
                &labels,
                self.model.logistic_c,
                self.model.logistic_max_iter,
            )?)
        };

        let mut model = TickerModel {
            ticker: ticker.to_string(),
            feature_set: feature_set.clone(),
            preprocessor,
            regressor,
            classifier,
            garch_median: median(rows.iter().filter_map(|r| r.garch_vol)),
            report: ValidationReport {
                ticker: ticker.to_string(),
                n_train,
                n_validation: n_val,
                mae: None,
                rmse: None,
                error_pct: None,
                quality: Quality::Unknown,
            },
        };
        model.report = self.validate(&model, &trainable[n_train..]);
        Ok(model)
    }

    /// Price-space error of the capped, blended prediction on held-out rows
    fn validate(&self, model: &TickerModel, rows: &[&FeatureRow]) -> ValidationReport {
        let mut abs_err = Vec::with_capacity(rows.len());
        let mut anchors = Vec::with_capacity(rows.len());
        for row in rows {
            let (Some(anchor), Some(actual_ret)) = (row.p_early, row.ret_intraday) else {
                continue;
            };
            let forecast = model.forecast(row, &self.prediction);
            let actual = anchor * (1.0 + actual_ret);
            let predicted = anchor * (1.0 + forecast.capped_return);
            abs_err.push((actual - predicted).abs());
            anchors.push(anchor);
        }

        let (mae, rmse, error_pct) = if abs_err.is_empty() {
            (None, None, None)
        } else {
            let n = abs_err.len() as f64;
            let mae = abs_err.iter().sum::<f64>() / n;
            let rmse = (abs_err.iter().map(|e| e * e).sum::<f64>() / n).sqrt();
            let mean_anchor = anchors.iter().sum::<f64>() / n;
            let pct = (mean_anchor != 0.0).then(|| rmse / mean_anchor * 100.0);
            (Some(mae), Some(rmse), pct)
        };

        ValidationReport {
            ticker: model.ticker.clone(),
            n_train: model.report.n_train,
            n_validation: rows.len(),
            mae,
            rmse,
            error_pct,
            quality: Quality::from_error_pct(error_pct),
        }
    }
}

/// Trainable rows in date order
fn trainable_rows<'a>(rows: &[&'a FeatureRow]) -> Vec<&'a FeatureRow> {
    let mut trainable: Vec<&FeatureRow> = rows.iter().copied().filter(|r| r.is_trainable()).collect();
    trainable.sort_by_key(|r| r.date);
    trainable
}

fn median(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut v: Vec<f64> = values.filter(|x| x.is_finite()).collect();
    if v.is_empty() {
        return None;
    }
    v.sort_by(f64::total_cmp);
    Some(quantile_sorted(&v, 0.5))
}
