//! Intraday return forecasting
//!
//! Predicts each ticker's 09:00 → 10:30 return from daily close history and
//! the early-session snapshot, then reports a capped price, a 0-10 confidence
//! and the top four drivers.
//!
//! ## Architecture
//!
//! ```text
//! data → features → trainer → predictor → output
//!                                 ↑
//!                    confidence, attribution
//! ```

pub mod attribution;
pub mod confidence;
pub mod config;
pub mod data;
pub mod error;
pub mod features;
pub mod ml;
pub mod output;
pub mod pipeline;
pub mod predictor;
pub mod trainer;
pub mod types;

#[cfg(test)]
mod types_tests;
#[cfg(test)]
mod config_tests;
