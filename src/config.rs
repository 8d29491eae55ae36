//! Configuration management
//!
//! One `Config` is loaded per run from a TOML file, with `INTRADAY__<SECTION>__<KEY>`
//! environment variables layered on top.

use crate::error::Result;
use crate::types::{Feature, FeatureSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub prediction: PredictionConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Input file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Daily close table, first existing candidate wins
    #[serde(default = "default_close_candidates")]
    pub close_candidates: Vec<String>,
    #[serde(default = "default_early_file")]
    pub early_file: String,
    #[serde(default = "default_mid_file")]
    pub mid_file: String,
    #[serde(default = "default_vix_candidates")]
    pub vix_candidates: Vec<String>,
    #[serde(default = "default_ta_file")]
    pub ta_file: String,
    #[serde(default = "default_name_map_candidates")]
    pub name_map_candidates: Vec<String>,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_close_candidates() -> Vec<String> {
    vec![
        "stock_prices_close_wide_format.csv".to_string(),
        "historical_closing_prices_wide_format.csv".to_string(),
        "historical_closing_prices_old.csv".to_string(),
    ]
}

fn default_early_file() -> String {
    "stock_prices_0900_wide_format.csv".to_string()
}

fn default_mid_file() -> String {
    "stock_prices_1030_wide_format.csv".to_string()
}

fn default_vix_candidates() -> Vec<String> {
    vec!["vix_prices.csv".to_string(), "vix_open_clean.csv".to_string()]
}

fn default_ta_file() -> String {
    "final_lstm_features.csv".to_string()
}

fn default_name_map_candidates() -> Vec<String> {
    vec![
        "ticker_to_name.csv".to_string(),
        "sp500_constituents.csv".to_string(),
    ]
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            close_candidates: default_close_candidates(),
            early_file: default_early_file(),
            mid_file: default_mid_file(),
            vix_candidates: default_vix_candidates(),
            ta_file: default_ta_file(),
            name_map_candidates: default_name_map_candidates(),
        }
    }
}

impl DataConfig {
    /// Data directory with `~` and `$VAR` expanded
    pub fn dir(&self) -> PathBuf {
        expand_path(&self.data_dir)
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir().join(file)
    }

    /// First candidate that exists on disk
    pub fn first_existing(&self, candidates: &[String]) -> Option<PathBuf> {
        candidates
            .iter()
            .map(|c| self.path(c))
            .find(|p| p.exists())
    }
}

/// Feature engineering switches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Fit GARCH(1,1) when history allows, else always use the EWMA proxy
    pub use_garch: bool,
    pub garch_min_obs: usize,
    pub ewma_alpha: f64,
    pub ewma_min_periods: usize,
    pub include_vix: bool,
    pub include_ta: bool,
    /// Max rows a TA value may be carried forward within a ticker
    pub ta_ffill_limit: usize,
    /// Multiplier applied to ret1, vol5, ma5 and ma20
    pub rolling_scale: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            use_garch: true,
            garch_min_obs: 60,
            ewma_alpha: 0.06,
            ewma_min_periods: 10,
            include_vix: true,
            include_ta: true,
            ta_ffill_limit: 3,
            rolling_scale: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressorKind {
    Ridge,
    GradientBoosting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.05,
            max_depth: 2,
            min_samples_leaf: 5,
        }
    }
}

/// Model training parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub regressor: RegressorKind,
    pub ridge_alpha: f64,
    /// Inverse L2 strength for the direction classifier
    pub logistic_c: f64,
    pub logistic_max_iter: usize,
    pub boosting: BoostingConfig,
    /// Tickers with fewer usable rows are skipped
    pub min_rows: usize,
    pub max_validation: usize,
    /// Validation size is n / validation_divisor, capped by max_validation
    pub validation_divisor: usize,
    /// Scaled values are clipped to +/- clip_z
    pub clip_z: f64,
    /// Overrides of the model-input importance weights, by feature name
    pub importance: BTreeMap<String, f64>,
    /// Fit tickers on the rayon pool
    pub parallel: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            regressor: RegressorKind::Ridge,
            ridge_alpha: 0.1,
            logistic_c: 1.0,
            logistic_max_iter: 500,
            boosting: BoostingConfig::default(),
            min_rows: 10,
            max_validation: 48,
            validation_divisor: 5,
            clip_z: 5.0,
            importance: BTreeMap::new(),
            parallel: false,
        }
    }
}

impl ModelConfig {
    /// Model-input weights in `set` order
    pub fn importance_vector(&self, set: &FeatureSet) -> Vec<f64> {
        weights_for(set, &self.importance)
    }
}

/// Blending and regime-aware capping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub cap_base: f64,
    pub cap_red: f64,
    pub vix_red_threshold: f64,
    pub garch_red_factor: f64,
    /// beta in blended = signed * ((1 - beta) + beta * margin)
    pub margin_blend: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            cap_base: 0.02,
            cap_red: 0.08,
            vix_red_threshold: 5.0,
            garch_red_factor: 2.0,
            margin_blend: 0.6,
        }
    }
}

/// Confidence curve: c = min(1, |z| / saturation) ^ exponent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    pub saturation: f64,
    pub exponent: f64,
    /// Overrides of the confidence weights, by feature name
    pub weights: BTreeMap<String, f64>,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            saturation: 1.2,
            exponent: 0.7,
            weights: BTreeMap::new(),
        }
    }
}

impl ConfidenceConfig {
    pub fn weight_vector(&self, set: &FeatureSet) -> Vec<f64> {
        weights_for(set, &self.weights)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub output_dir: String,
    pub history_file: String,
    /// Also write predictions_newswire_<date>.csv per predicted date
    pub write_newswire: bool,
    /// Hold <history>.lock for the duration of a run
    pub use_lock: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: "./output".to_string(),
            history_file: "predictions_history.csv".to_string(),
            write_newswire: true,
            use_lock: true,
        }
    }
}

impl OutputConfig {
    pub fn dir(&self) -> PathBuf {
        expand_path(&self.output_dir)
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir().join(&self.history_file)
    }
}

impl Config {
    /// Load from a TOML file (optional) plus environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = path.as_ref();
        if !path.exists() {
            tracing::warn!("Config file {} not found, using defaults", path.display());
        }

        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path).required(false))
            .add_source(
                ::config::Environment::with_prefix("INTRADAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

fn weights_for(set: &FeatureSet, overrides: &BTreeMap<String, f64>) -> Vec<f64> {
    set.iter()
        .map(|f| {
            overrides
                .get(f.name())
                .copied()
                .unwrap_or_else(|| f.default_importance())
        })
        .collect()
}

fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(e) => {
            tracing::warn!("Could not expand path {}: {}", raw, e);
            PathBuf::from(raw)
        }
    }
}

/// Feature set a config enables before looking at which inputs exist
pub fn requested_features(cfg: &FeatureConfig) -> FeatureSet {
    let mut set = FeatureSet::all();
    if !cfg.include_vix {
        set = set.without(Feature::DeltaVix);
    }
    if !cfg.include_ta {
        for f in Feature::TECHNICAL {
            set = set.without(f);
        }
    }
    set
}
