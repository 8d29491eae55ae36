//! Input tables
//!
//! Loads the wide `Date × ticker` CSV tables produced by the data collectors:
//! daily closes, the 09:00 and 10:30 snapshots, the VIX series, the optional
//! technical-indicator table and the ticker name map.

mod technical;

pub use technical::{Indicator, TechnicalTable};
pub(crate) use technical::quantile_sorted;

use crate::config::{DataConfig, FeatureConfig};
use crate::error::{PipelineError, Result};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

const DATE_ALIASES: [&str; 4] = ["date", "dt", "time", "timestamp"];

/// Raw CSV contents: header plus string records
#[derive(Debug, Clone)]
pub struct RawTable {
    pub name: String,
    pub headers: Vec<String>,
    pub records: Vec<StringRecord>,
}

impl RawTable {
    pub fn from_reader<R: Read>(name: &str, reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| PipelineError::csv(name, e))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut records = Vec::new();
        for record in rdr.records() {
            records.push(record.map_err(|e| PipelineError::csv(name, e))?);
        }

        Ok(Self {
            name: name.to_string(),
            headers,
            records,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_reader(&name, file)
    }

    /// Index of the date column: a date-like header, else the first unnamed column
    pub fn date_column(&self) -> Result<usize> {
        let by_alias = self
            .headers
            .iter()
            .position(|h| DATE_ALIASES.contains(&h.trim().to_lowercase().as_str()));
        by_alias
            .or_else(|| self.headers.iter().position(|h| is_unnamed(h)))
            .ok_or_else(|| PipelineError::MalformedTable {
                name: self.name.clone(),
                reason: "no date-like column".to_string(),
            })
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    }
}

/// Numeric wide table indexed by date, one column per ticker
#[derive(Debug, Clone, Default)]
pub struct WideTable {
    pub name: String,
    /// Ascending, unique
    pub dates: Vec<NaiveDate>,
    pub columns: Vec<String>,
    /// Column-major: `values[col][row]`
    pub values: Vec<Vec<Option<f64>>>,
}

impl WideTable {
    pub fn from_raw(raw: &RawTable) -> Result<Self> {
        let date_idx = raw.date_column()?;
        let value_cols: Vec<(usize, String)> = raw
            .headers
            .iter()
            .enumerate()
            .filter(|(i, h)| *i != date_idx && !is_unnamed(h) && !h.trim().is_empty())
            .map(|(i, h)| (i, h.trim().to_string()))
            .collect();

        // Later duplicates of a date replace earlier ones
        let mut by_date: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();
        let mut dropped = 0usize;
        for record in &raw.records {
            let Some(date) = record.get(date_idx).and_then(parse_date) else {
                dropped += 1;
                continue;
            };
            let row = value_cols
                .iter()
                .map(|(i, _)| record.get(*i).and_then(parse_cell))
                .collect();
            by_date.insert(date, row);
        }
        if dropped > 0 {
            tracing::debug!("{}: dropped {} rows with unparsable dates", raw.name, dropped);
        }

        let dates: Vec<NaiveDate> = by_date.keys().copied().collect();
        let mut values = vec![Vec::with_capacity(dates.len()); value_cols.len()];
        for row in by_date.into_values() {
            for (col, v) in row.into_iter().enumerate() {
                values[col].push(v);
            }
        }

        Ok(Self {
            name: raw.name.clone(),
            dates,
            columns: value_cols.into_iter().map(|(_, h)| h).collect(),
            values,
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::from_raw(&RawTable::load(path)?)
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| self.values[i].as_slice())
    }

    /// Defined values of one column keyed by date
    pub fn series(&self, name: &str) -> BTreeMap<NaiveDate, f64> {
        self.column(name)
            .map(|col| {
                self.dates
                    .iter()
                    .zip(col)
                    .filter_map(|(d, v)| v.map(|v| (*d, v)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn tickers(&self) -> &[String] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// Day-over-day change of a volatility index, keyed by date
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VixSeries {
    pub deltas: BTreeMap<NaiveDate, f64>,
}

impl VixSeries {
    /// Build from a single-value table; prefers `VIX`, then `Open`, `VIX_open`,
    /// then the first value column
    pub fn from_table(table: &WideTable) -> Option<Self> {
        let col = ["VIX", "Open", "VIX_open"]
            .iter()
            .find_map(|alias| {
                table
                    .columns
                    .iter()
                    .find(|c| c.eq_ignore_ascii_case(alias))
            })
            .or_else(|| table.columns.first())?;

        let levels = table.series(col);
        Some(Self::from_levels(&levels))
    }

    /// Differences between consecutive defined levels
    pub fn from_levels(levels: &BTreeMap<NaiveDate, f64>) -> Self {
        let mut deltas = BTreeMap::new();
        let mut prev: Option<f64> = None;
        for (date, level) in levels {
            if let Some(p) = prev {
                deltas.insert(*date, level - p);
            }
            prev = Some(*level);
        }
        Self { deltas }
    }

    pub fn delta(&self, date: NaiveDate) -> Option<f64> {
        self.deltas.get(&date).copied()
    }
}

/// Everything the feature engineer reads, fully materialised
#[derive(Debug, Clone, Default)]
pub struct InputBundle {
    pub closes: WideTable,
    /// 09:00 snapshot; absent means every early price is imputed
    pub early: Option<WideTable>,
    /// 10:30 snapshot
    pub mid: WideTable,
    pub vix: Option<VixSeries>,
    pub technical: Option<TechnicalTable>,
    pub names: HashMap<String, String>,
}

impl InputBundle {
    /// Read all inputs; only the close and 10:30 tables are required
    pub fn load(data: &DataConfig, features: &FeatureConfig) -> Result<Self> {
        let mid_path = data.path(&data.mid_file);
        let close_path = match (data.first_existing(&data.close_candidates), mid_path.exists()) {
            (Some(path), true) => path,
            (close, mid_found) => {
                let mut missing = Vec::new();
                if close.is_none() {
                    missing.push(format!(
                        "close prices (one of: {})",
                        data.close_candidates.join(", ")
                    ));
                }
                if !mid_found {
                    missing.push(data.mid_file.clone());
                }
                return Err(PipelineError::MissingInput(format!(
                    "{} in {}",
                    missing.join("; "),
                    data.dir().display()
                )));
            }
        };

        tracing::info!("Using close prices: {}", close_path.display());
        let closes = WideTable::load(&close_path)?;
        tracing::info!("Using 10:30 prices: {}", mid_path.display());
        let mid = WideTable::load(&mid_path)?;

        let early_path = data.path(&data.early_file);
        let early = if early_path.exists() {
            tracing::info!("Using 09:00 prices: {}", early_path.display());
            Some(WideTable::load(&early_path)?)
        } else {
            tracing::warn!("No 09:00 file found; early prices will be imputed from the prior close");
            None
        };

        let vix = if features.include_vix {
            match data.first_existing(&data.vix_candidates) {
                Some(path) => {
                    let series = VixSeries::from_table(&WideTable::load(&path)?);
                    if series.is_none() {
                        tracing::warn!("{} has no value column; ΔVIX disabled", path.display());
                    }
                    series
                }
                None => {
                    tracing::warn!("No VIX file found; ΔVIX feature disabled");
                    None
                }
            }
        } else {
            None
        };

        let technical = if features.include_ta {
            let path = data.path(&data.ta_file);
            if path.exists() {
                let table = TechnicalTable::from_raw(&RawTable::load(&path)?)?;
                if table.is_empty() {
                    tracing::info!("{} has no recognised indicator columns; skipping TA", data.ta_file);
                    None
                } else {
                    Some(table)
                }
            } else {
                tracing::info!("{} not found; continuing without RSI/MACD/BB extras", data.ta_file);
                None
            }
        } else {
            None
        };

        let names = match data.first_existing(&data.name_map_candidates) {
            Some(path) => load_name_map(&RawTable::load(&path)?),
            None => HashMap::new(),
        };

        Ok(Self {
            closes,
            early,
            mid,
            vix,
            technical,
            names,
        })
    }

    /// Display name for a ticker, falling back to the symbol
    pub fn display_name<'a>(&'a self, ticker: &'a str) -> &'a str {
        self.names.get(ticker).map(String::as_str).unwrap_or(ticker)
    }
}

/// Ticker → company name from `ticker,name` or `Symbol,Security` tables
pub fn load_name_map(raw: &RawTable) -> HashMap<String, String> {
    let pair = [("ticker", "name"), ("symbol", "security")]
        .iter()
        .find_map(|(k, v)| Some((raw.column(k)?, raw.column(v)?)));

    let Some((k, v)) = pair else {
        tracing::warn!("{}: no ticker/name columns; names fall back to symbols", raw.name);
        return HashMap::new();
    };

    raw.records
        .iter()
        .filter_map(|r| {
            let key = r.get(k)?.trim();
            let val = r.get(v)?.trim();
            (!key.is_empty()).then(|| (key.to_string(), val.to_string()))
        })
        .collect()
}

pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    let head = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

pub(crate) fn parse_cell(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn is_unnamed(header: &str) -> bool {
    header.to_lowercase().contains("unnamed")
}
