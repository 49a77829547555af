// src/models.rs

use lazy_static::lazy_static;
use polars::error::PolarsError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

#[derive(Debug, Error)]
pub enum ScreenerError {
    #[error("Failed to read market table: {0}")]
    Table(#[from] PolarsError),
    #[error("Invalid filter criteria: {0}")]
    InvalidCriteria(#[from] ValidationErrors),
    #[error("No sector policy configured for regime {0}")]
    UnknownRegime(Regime),
}

/// Market regime selecting which sectors the quality screen favors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    #[default]
    RiskOn,
    RiskOff,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::RiskOn => write!(f, "risk_on"),
            Regime::RiskOff => write!(f, "risk_off"),
        }
    }
}

/// Priority and excluded sector sets for one regime. Matching ignores ASCII case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorPolicy {
    pub priority: BTreeSet<String>,
    pub excluded: BTreeSet<String>,
}

impl SectorPolicy {
    pub fn new<I, J, S>(priority: I, excluded: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SectorPolicy {
            priority: priority.into_iter().map(Into::into).collect(),
            excluded: excluded.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_priority(&self, sector: &str) -> bool {
        self.priority.iter().any(|s| s.eq_ignore_ascii_case(sector))
    }

    pub fn is_excluded(&self, sector: &str) -> bool {
        self.excluded.iter().any(|s| s.eq_ignore_ascii_case(sector))
    }

    /// First sector listed both as priority and as excluded, if any.
    pub fn overlap(&self) -> Option<&str> {
        self.priority
            .iter()
            .find(|sector| self.is_excluded(sector))
            .map(String::as_str)
    }
}

lazy_static! {
    pub static ref DEFAULT_SECTOR_TABLE: BTreeMap<Regime, SectorPolicy> = {
        let mut m = BTreeMap::new();
        m.insert(
            Regime::RiskOn,
            SectorPolicy::new(
                [
                    "Technology",
                    "Communication Services",
                    "Consumer Cyclical",
                    "Consumer Discretionary",
                    "Financial Services",
                    "Industrials",
                ],
                ["Consumer Staples", "Consumer Defensive", "Utilities", "Real Estate"],
            ),
        );
        m.insert(
            Regime::RiskOff,
            SectorPolicy::new(
                [
                    "Consumer Staples",
                    "Consumer Defensive",
                    "Utilities",
                    "Healthcare",
                    "Health Care",
                ],
                ["Technology", "Consumer Cyclical", "Consumer Discretionary", "Energy"],
            ),
        );
        m
    };
}

/// Thresholds for the base and quality screens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_criteria"))]
pub struct FilterCriteria {
    #[validate(range(min = 0.0))]
    pub min_volume: f64,
    pub min_return: f64,
    pub min_eps_growth: f64,
    pub min_operating_margin: f64,
    pub min_fcf_margin: f64,
    pub sectors: BTreeMap<Regime, SectorPolicy>,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        FilterCriteria {
            min_volume: 1_000_000.0,
            min_return: 0.50,
            min_eps_growth: 0.10,
            min_operating_margin: 0.0,
            min_fcf_margin: 0.10,
            sectors: DEFAULT_SECTOR_TABLE.clone(),
        }
    }
}

impl FilterCriteria {
    pub fn policy(&self, regime: Regime) -> Result<&SectorPolicy, ScreenerError> {
        self.sectors
            .get(&regime)
            .ok_or(ScreenerError::UnknownRegime(regime))
    }
}

fn validate_criteria(criteria: &FilterCriteria) -> Result<(), ValidationError> {
    let thresholds = [
        criteria.min_volume,
        criteria.min_return,
        criteria.min_eps_growth,
        criteria.min_operating_margin,
        criteria.min_fcf_margin,
    ];
    if thresholds.iter().any(|t| !t.is_finite()) {
        return Err(ValidationError::new("non_finite_threshold"));
    }

    for (regime, policy) in &criteria.sectors {
        if let Some(sector) = policy.overlap() {
            let mut err = ValidationError::new("overlapping_sector_policy");
            err.add_param("regime".into(), &regime.to_string());
            err.add_param("sector".into(), &sector);
            return Err(err);
        }
    }

    Ok(())
}

/// Per-ticker fundamentals. Every field may be absent; absence is never an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FundamentalsRecord {
    pub pe_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub sector: Option<String>,
    pub eps_growth: Option<f64>,
    pub operating_margin: Option<f64>,
    pub fcf_margin: Option<f64>,
}

impl FundamentalsRecord {
    /// The record substituted when fetching a ticker's fundamentals failed.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn is_unavailable(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExclusionReason {
    DataUnavailable { detail: String },
    LowVolume { avg_volume: f64 },
    LowReturn { total_return: f64 },
    MissingFundamentals,
    MissingField { field: String },
    WeakEpsGrowth { eps_growth: f64 },
    WeakOperatingMargin { operating_margin: f64 },
    WeakFcfMargin { fcf_margin: f64 },
    SectorExcluded { sector: String },
    SectorNotPrioritized { sector: String },
}

impl ExclusionReason {
    pub fn missing_field(field: &str) -> Self {
        ExclusionReason::MissingField {
            field: field.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub ticker: String,
    pub avg_volume: f64,
    pub total_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exclusion {
    pub ticker: String,
    pub avg_volume: Option<f64>,
    pub total_return: Option<f64>,
    pub reason: ExclusionReason,
}

/// Outcome of the universe filter, in universe order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub candidates: Vec<Candidate>,
    pub exclusions: Vec<Exclusion>,
}

impl Selection {
    pub fn tickers(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.ticker.clone()).collect()
    }

    pub fn avg_volume_by_ticker(&self) -> HashMap<String, f64> {
        self.candidates
            .iter()
            .map(|c| (c.ticker.clone(), c.avg_volume))
            .collect()
    }

    pub fn total_return_by_ticker(&self) -> HashMap<String, f64> {
        self.candidates
            .iter()
            .map(|c| (c.ticker.clone(), c.total_return))
            .collect()
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.candidates.iter().any(|c| c.ticker == ticker)
    }

    pub fn exclusion(&self, ticker: &str) -> Option<&ExclusionReason> {
        self.exclusions
            .iter()
            .find(|e| e.ticker == ticker)
            .map(|e| &e.reason)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
