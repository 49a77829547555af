// src/models.rs

use crate::pipeline::{Construction, ConstructionConfig, MarketData};
use chrono::NaiveDate;
use polars::error::PolarsResult;
use screener::table::{market_frame, DATE_COLUMN};
use screener::FundamentalsRecord;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use validator::{Validate, ValidationError};

/// Daily closes and volumes of one ticker; `null` marks a missing day.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct TickerSeries {
    pub ticker: String,
    pub prices: Vec<Option<f64>>,
    pub volumes: Vec<Option<f64>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Validate)]
#[validate(schema(function = "validate_request"))]
pub struct ConstructionRequest {
    #[serde(default)]
    pub dates: Option<Vec<NaiveDate>>,
    #[validate(length(min = 1))]
    pub universe: Vec<TickerSeries>,
    #[serde(default)]
    pub fundamentals: HashMap<String, FundamentalsRecord>,
    #[serde(default)]
    #[validate(nested)]
    pub config: ConstructionConfig,
}

fn validate_request(request: &ConstructionRequest) -> Result<(), ValidationError> {
    let days = request
        .dates
        .as_ref()
        .map(Vec::len)
        .or_else(|| request.universe.first().map(|s| s.prices.len()))
        .unwrap_or(0);

    if let Some(dates) = &request.dates {
        if dates.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ValidationError::new("dates_not_ascending"));
        }
    }

    let mut seen = HashSet::new();
    for series in &request.universe {
        if series.ticker.is_empty() || series.ticker == DATE_COLUMN {
            let mut err = ValidationError::new("invalid_ticker");
            err.add_param("ticker".into(), &series.ticker);
            return Err(err);
        }
        if !seen.insert(series.ticker.as_str()) {
            let mut err = ValidationError::new("duplicate_ticker");
            err.add_param("ticker".into(), &series.ticker);
            return Err(err);
        }
        if series.prices.len() != days || series.volumes.len() != days {
            let mut err = ValidationError::new("series_length_mismatch");
            err.add_param("ticker".into(), &series.ticker);
            err.add_param("expected".into(), &days);
            return Err(err);
        }
    }

    Ok(())
}

impl ConstructionRequest {
    /// Price and volume tables in universe order.
    pub fn market(&self) -> PolarsResult<MarketData> {
        let prices: Vec<(String, Vec<Option<f64>>)> = self
            .universe
            .iter()
            .map(|s| (s.ticker.clone(), s.prices.clone()))
            .collect();
        let volumes: Vec<(String, Vec<Option<f64>>)> = self
            .universe
            .iter()
            .map(|s| (s.ticker.clone(), s.volumes.clone()))
            .collect();

        Ok(MarketData {
            prices: market_frame(self.dates.as_deref(), &prices)?,
            volumes: market_frame(self.dates.as_deref(), &volumes)?,
        })
    }
}

#[derive(Serialize, Debug)]
pub struct ConstructionResponse {
    pub success: bool,
    pub status: String,
    pub message: String,
    pub report: Option<Construction>,
}

impl ConstructionResponse {
    pub fn failure(status: &str, message: String) -> Self {
        ConstructionResponse {
            success: false,
            status: status.to_string(),
            message,
            report: None,
        }
    }
}
