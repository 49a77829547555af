// src/table.rs
//
// Price and volume tables are polars frames with one nullable Float64 column
// per ticker on a shared ascending date grid, plus an optional "date" column.

use chrono::NaiveDate;
use polars::prelude::*;

pub const DATE_COLUMN: &str = "date";

/// Ticker columns in table order, skipping the date column.
pub fn ticker_columns(frame: &DataFrame) -> Vec<String> {
    frame
        .get_column_names()
        .into_iter()
        .filter(|name| *name != DATE_COLUMN)
        .map(|name| name.to_string())
        .collect()
}

/// Cells of one ticker column as f64. Nulls and non-finite cells are `None`.
pub fn column_values(frame: &DataFrame, ticker: &str) -> PolarsResult<Vec<Option<f64>>> {
    let series = frame.column(ticker)?.cast(&DataType::Float64)?;
    let values = series.f64()?;

    Ok(values
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

/// Date labels of the table, if it carries a date column.
pub fn date_labels(frame: &DataFrame) -> PolarsResult<Option<Vec<String>>> {
    if !frame.get_column_names().contains(&DATE_COLUMN) {
        return Ok(None);
    }

    // Date and Datetime columns render as ISO text
    let labels = frame
        .column(DATE_COLUMN)?
        .cast(&DataType::String)?
        .str()?
        .into_iter()
        .map(|d| d.unwrap_or_default().to_string())
        .collect();

    Ok(Some(labels))
}

/// Assembles a market table from per-ticker columns. All columns, and the
/// dates when given, must share one length.
pub fn market_frame(
    dates: Option<&[NaiveDate]>,
    columns: &[(String, Vec<Option<f64>>)],
) -> PolarsResult<DataFrame> {
    let mut series = Vec::with_capacity(columns.len() + 1);

    if let Some(dates) = dates {
        let labels: Vec<String> = dates
            .iter()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .collect();
        series.push(Series::new(DATE_COLUMN, labels));
    }

    for (ticker, values) in columns {
        series.push(Series::new(ticker, values.as_slice()));
    }

    DataFrame::new(series)
}
