// src/returns.rs

use crate::error::FrontierError;
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use screener::table::{column_values, date_labels, DATE_COLUMN};
use tracing::{debug, info};

/// Fewest aligned return rows the optimizer and sampler accept.
pub const MIN_RETURN_ROWS: usize = 2;

/// Gap-free simple daily returns, one row per retained trading day and one
/// column per ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnsMatrix {
    tickers: Vec<String>,
    dates: Option<Vec<String>>,
    values: Array2<f64>,
}

impl ReturnsMatrix {
    pub fn new(
        tickers: Vec<String>,
        dates: Option<Vec<String>>,
        values: Array2<f64>,
    ) -> Result<Self, FrontierError> {
        let (rows, columns) = values.dim();
        if columns != tickers.len() {
            return Err(FrontierError::Shape(format!(
                "{} return columns for {} tickers",
                columns,
                tickers.len()
            )));
        }
        if let Some(dates) = &dates {
            if dates.len() != rows {
                return Err(FrontierError::Shape(format!(
                    "{} dates for {} return rows",
                    dates.len(),
                    rows
                )));
            }
        }
        if rows < MIN_RETURN_ROWS || columns == 0 {
            return Err(FrontierError::InsufficientHistory { rows, columns });
        }
        if values.iter().any(|r| !r.is_finite()) {
            return Err(FrontierError::Shape("return matrix has non-finite cells".to_string()));
        }

        Ok(ReturnsMatrix {
            tickers,
            dates,
            values,
        })
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn dates(&self) -> Option<&[String]> {
        self.dates.as_deref()
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn n_days(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_assets(&self) -> usize {
        self.values.ncols()
    }

    /// Compounded return per ticker over the retained days.
    pub fn cumulative_returns(&self) -> Array1<f64> {
        self.values
            .map_axis(Axis(0), |column| column.iter().map(|r| 1.0 + r).product::<f64>() - 1.0)
    }
}

/// Day-over-day simple returns. The first day, and any day where either price
/// is missing or the previous price is zero, has no return.
pub fn simple_returns(prices: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut returns = Vec::with_capacity(prices.len());
    returns.extend(prices.first().map(|_| None));

    for pair in prices.windows(2) {
        let r = match (pair[0], pair[1]) {
            (Some(prev), Some(curr)) if prev != 0.0 => Some(curr / prev - 1.0),
            _ => None,
        };
        returns.push(r);
    }

    returns
}

/// Builds the return matrix for `tickers`, dropping every date on which any
/// of them lacks a return.
pub fn build(prices: &DataFrame, tickers: &[String]) -> Result<ReturnsMatrix, FrontierError> {
    if tickers.is_empty() {
        return Err(FrontierError::InsufficientHistory {
            rows: prices.height().saturating_sub(1),
            columns: 0,
        });
    }

    let available = prices.get_column_names();
    let mut columns = Vec::with_capacity(tickers.len() + 1);
    if let Some(dates) = date_labels(prices)? {
        columns.push(Series::new(DATE_COLUMN, dates));
    }
    for ticker in tickers {
        if !available.contains(&ticker.as_str()) {
            return Err(FrontierError::UnknownTicker(ticker.clone()));
        }
        let values = column_values(prices, ticker)?;
        columns.push(Series::new(ticker, simple_returns(&values)));
    }

    let frame = DataFrame::new(columns)?;
    let aligned = frame.drop_nulls(Some(tickers))?;
    debug!(
        raw_rows = frame.height(),
        aligned_rows = aligned.height(),
        "Aligned daily returns"
    );

    if aligned.height() < MIN_RETURN_ROWS {
        return Err(FrontierError::InsufficientHistory {
            rows: aligned.height(),
            columns: tickers.len(),
        });
    }

    let values = aligned
        .select(tickers.iter().map(String::as_str))?
        .to_ndarray::<Float64Type>(IndexOrder::C)?;
    let dates = date_labels(&aligned)?;

    info!(
        tickers = tickers.len(),
        trading_days = values.nrows(),
        "Built returns matrix"
    );

    ReturnsMatrix::new(tickers.to_vec(), dates, values)
}
