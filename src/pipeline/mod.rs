//! Run orchestration
//!
//! A [`PipelineContext`] owns the configuration for one run and wires the
//! stages together: load inputs, engineer features, train per-ticker models,
//! predict the requested dates and upsert the results.


use crate::config::{requested_features, Config};
use crate::data::InputBundle;
use crate::error::{PipelineError, Result};
use crate::features::FeatureEngineer;
use crate::output::{write_newswire, HistoryWriter, OutputRow, RunLock};
use crate::predictor::Predictor;
use crate::trainer::{ModelTrainer, TrainingOutcome};
use crate::types::{DatePredictions, FeatureTable};
use chrono::NaiveDate;
use csv::WriterBuilder;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Inputs, features and models for one run, before anything is written
pub struct PreparedRun {
    pub inputs: InputBundle,
    pub table: FeatureTable,
    pub training: TrainingOutcome,
}

#[derive(Debug)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub predictions: Vec<DatePredictions>,
    /// Rows upserted by this run
    pub rows_written: usize,
    /// History size after the upsert
    pub history_rows: usize,
    pub history_path: PathBuf,
    pub newswire: Vec<PathBuf>,
    pub skipped: BTreeMap<String, String>,
}

pub struct PipelineContext {
    config: Config,
    run_id: Uuid,
}

impl PipelineContext {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn load_inputs(&self) -> Result<InputBundle> {
        InputBundle::load(&self.config.data, &self.config.features)
    }

    pub fn build_features(&self, inputs: &InputBundle) -> FeatureTable {
        let engineer = FeatureEngineer::new(self.config.features.clone());
        engineer.build(inputs, &requested_features(&self.config.features))
    }

    /// Load, engineer and train
    pub fn prepare(&self) -> Result<PreparedRun> {
        let inputs = self.load_inputs()?;
        let table = self.build_features(&inputs);
        let trainer = ModelTrainer::new(self.config.model.clone(), self.config.prediction.clone());
        let training = trainer.train(&table);
        Ok(PreparedRun {
            inputs,
            table,
            training,
        })
    }

    /// Train every ticker and return the outcome without writing anything
    pub fn train(&self) -> Result<TrainingOutcome> {
        let span = tracing::info_span!("train", run_id = %self.run_id);
        let _enter = span.enter();
        Ok(self.prepare()?.training)
    }

    /// Full run: predict `dates` (the latest feature date when empty) and
    /// upsert the rows into the history table
    pub fn predict(&self, dates: &[NaiveDate]) -> Result<RunSummary> {
        let span = tracing::info_span!("run", run_id = %self.run_id);
        let _enter = span.enter();

        let history_path = self.config.output.history_path();
        let _lock = if self.config.output.use_lock {
            Some(RunLock::acquire(&history_path)?)
        } else {
            None
        };

        let prepared = self.prepare()?;
        let dates = match dates {
            [] => match prepared.table.rows.iter().map(|r| r.date).max() {
                Some(latest) => {
                    tracing::info!("No date given, predicting latest available {}", latest);
                    vec![latest]
                }
                None => {
                    return Err(PipelineError::MissingInput(
                        "no usable feature rows to predict from".to_string(),
                    ))
                }
            },
            given => given.to_vec(),
        };

        let predictor = Predictor::new(
            &prepared.training.models,
            self.config.prediction.clone(),
            self.config.confidence.clone(),
        );

        let mut predictions = Vec::with_capacity(dates.len());
        let mut rows = Vec::new();
        let mut newswire = Vec::new();
        for date in dates {
            let result = predictor.predict_date(&prepared.table, date);
            let date_rows: Vec<OutputRow> = result
                .records()
                .iter()
                .filter_map(|r| OutputRow::from_record(r, prepared.inputs.display_name(&r.ticker)))
                .collect();

            if self.config.output.write_newswire && !date_rows.is_empty() {
                newswire.push(write_newswire(&self.config.output.dir(), date, &date_rows)?);
            }
            rows.extend(date_rows);
            predictions.push(result);
        }

        let writer = HistoryWriter::new(&history_path);
        let history_rows = if rows.is_empty() {
            tracing::warn!("Nothing to write for the requested dates");
            writer.read()?.len()
        } else {
            writer.upsert(&rows)?
        };

        tracing::info!(
            rows = rows.len(),
            history_rows,
            skipped = prepared.training.skipped.len(),
            "Run complete"
        );

        Ok(RunSummary {
            run_id: self.run_id,
            predictions,
            rows_written: rows.len(),
            history_rows,
            history_path,
            newswire,
            skipped: prepared.training.skipped,
        })
    }

    /// Write the engineered feature table to `out` (default
    /// `<output_dir>/features.csv`); returns the path and row count
    pub fn export_features(&self, out: Option<&Path>) -> Result<(PathBuf, usize)> {
        let span = tracing::info_span!("features", run_id = %self.run_id);
        let _enter = span.enter();

        let inputs = self.load_inputs()?;
        let table = self.build_features(&inputs);

        let path = match out {
            Some(p) => p.to_path_buf(),
            None => self.config.output.dir().join("features.csv"),
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }

        let mut wtr = WriterBuilder::new()
            .from_path(&path)
            .map_err(|e| PipelineError::csv(&path, e))?;
        for row in &table.rows {
            wtr.serialize(row).map_err(|e| PipelineError::csv(&path, e))?;
        }
        wtr.flush().map_err(|e| PipelineError::io(&path, e))?;

        tracing::info!("Exported {} feature rows to {}", table.len(), path.display());
        Ok((path, table.len()))
    }
}
