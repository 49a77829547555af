// src/error.rs

use polars::error::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontierError {
    #[error("Insufficient history: {rows} aligned return rows across {columns} tickers")]
    InsufficientHistory { rows: usize, columns: usize },
    #[error("Ticker {0} has no price series")]
    UnknownTicker(String),
    #[error("Portfolio volatility {volatility:e} is indistinguishable from zero")]
    DegenerateCovariance { volatility: f64 },
    #[error("Sample count {requested} outside 1..={max}")]
    SampleBudget { requested: usize, max: usize },
    #[error("Shape mismatch: {0}")]
    Shape(String),
    #[error("Failed to build return table: {0}")]
    Polars(#[from] PolarsError),
}
