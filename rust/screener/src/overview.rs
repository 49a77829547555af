// src/overview.rs
//
// Provider payloads for company fundamentals. Numbers arrive as strings and
// the provider writes "None" or "-" for values it does not have.

use crate::models::FundamentalsRecord;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use tracing::warn;

fn is_absent(raw: &str) -> bool {
    matches!(raw, "" | "None" | "none" | "-" | "NaN")
}

// Custom function to convert a JSON string to an optional f64
fn string_to_opt_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None => Ok(None),
        Some(s) if is_absent(s) => Ok(None),
        Some(s) => s.parse::<f64>().map(Some).map_err(serde::de::Error::custom),
    }
}

// Custom function to convert a JSON string to optional text
fn string_to_opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw
        .map(|s| s.trim().to_string())
        .filter(|s| !is_absent(s)))
}

// Custom function to convert a JSON string to an optional NaiveDate
fn string_to_opt_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None => Ok(None),
        Some(s) if is_absent(s) => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

// Company overview payload, reduced to the fields the screen uses
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "PascalCase", default)]
pub struct OverviewResponse {
    pub symbol: String,
    pub name: String,
    #[serde(deserialize_with = "string_to_opt_text")]
    pub sector: Option<String>,
    #[serde(deserialize_with = "string_to_opt_date")]
    pub latest_quarter: Option<NaiveDate>,
    #[serde(rename = "PERatio", deserialize_with = "string_to_opt_f64")]
    pub pe_ratio: Option<f64>,
    #[serde(deserialize_with = "string_to_opt_f64")]
    pub dividend_yield: Option<f64>,
    #[serde(rename = "OperatingMarginTTM", deserialize_with = "string_to_opt_f64")]
    pub operating_margin_ttm: Option<f64>,
    #[serde(rename = "QuarterlyEarningsGrowthYOY", deserialize_with = "string_to_opt_f64")]
    pub quarterly_earnings_growth_yoy: Option<f64>,
    #[serde(rename = "RevenueTTM", deserialize_with = "string_to_opt_f64")]
    pub revenue_ttm: Option<f64>,
}

// One fiscal year of the cash-flow statement
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CashFlowReport {
    #[serde(deserialize_with = "string_to_opt_date")]
    pub fiscal_date_ending: Option<NaiveDate>,
    #[serde(deserialize_with = "string_to_opt_f64")]
    pub operating_cashflow: Option<f64>,
    #[serde(deserialize_with = "string_to_opt_f64")]
    pub capital_expenditures: Option<f64>,
}

impl CashFlowReport {
    /// Operating cash flow less capital expenditures. Capex is reported as a
    /// positive outflow.
    pub fn free_cash_flow(&self) -> Option<f64> {
        match (self.operating_cashflow, self.capital_expenditures) {
            (Some(ocf), Some(capex)) => Some(ocf - capex.abs()),
            _ => None,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CashFlowResponse {
    pub symbol: String,
    pub annual_reports: Vec<CashFlowReport>,
}

impl CashFlowResponse {
    /// Most recent dated annual report.
    pub fn latest(&self) -> Option<&CashFlowReport> {
        self.annual_reports
            .iter()
            .filter(|r| r.fiscal_date_ending.is_some())
            .max_by_key(|r| r.fiscal_date_ending)
    }
}

impl FundamentalsRecord {
    pub fn from_overview(overview: &OverviewResponse, cash_flow: Option<&CashFlowReport>) -> Self {
        let fcf_margin = match (cash_flow.and_then(CashFlowReport::free_cash_flow), overview.revenue_ttm) {
            (Some(fcf), Some(revenue)) if revenue > 0.0 => Some(fcf / revenue),
            _ => None,
        };

        FundamentalsRecord {
            pe_ratio: overview.pe_ratio,
            dividend_yield: overview.dividend_yield,
            sector: overview.sector.clone(),
            eps_growth: overview.quarterly_earnings_growth_yoy,
            operating_margin: overview.operating_margin_ttm,
            fcf_margin,
        }
    }
}

/// Builds a ticker's record from raw provider bodies. A body that does not
/// parse degrades to absent fields so one bad ticker never aborts a batch.
pub fn fundamentals_from_payloads(
    ticker: &str,
    overview_body: &str,
    cash_flow_body: Option<&str>,
) -> FundamentalsRecord {
    let overview: OverviewResponse = match serde_json::from_str(overview_body) {
        Ok(overview) => overview,
        Err(e) => {
            warn!(ticker, error = %e, "Unreadable overview payload, fundamentals unavailable");
            return FundamentalsRecord::unavailable();
        }
    };

    let cash_flow = cash_flow_body.and_then(|body| {
        match serde_json::from_str::<CashFlowResponse>(body) {
            Ok(response) => Some(response),
            Err(e) => {
                warn!(ticker, error = %e, "Unreadable cash-flow payload, FCF margin unavailable");
                None
            }
        }
    });

    FundamentalsRecord::from_overview(&overview, cash_flow.as_ref().and_then(CashFlowResponse::latest))
}
