// src/filter.rs

use crate::models::{
    Candidate, Exclusion, ExclusionReason, FilterCriteria, FundamentalsRecord, Regime,
    ScreenerError, SectorPolicy, Selection,
};
use crate::table::{column_values, ticker_columns};
use polars::frame::DataFrame;
use std::collections::HashMap;
use tracing::{debug, info};
use validator::Validate;

enum Verdict {
    Qualified(Candidate),
    Excluded(Exclusion),
}

/// Runs the base (liquidity, momentum) and quality (fundamentals, sector)
/// screens over every ticker column of `prices`, keeping universe order.
///
/// Missing series or fundamentals exclude the ticker; they never fail the batch.
pub fn select(
    prices: &DataFrame,
    volumes: &DataFrame,
    fundamentals: &HashMap<String, FundamentalsRecord>,
    criteria: &FilterCriteria,
    regime: Regime,
) -> Result<Selection, ScreenerError> {
    criteria.validate()?;
    let policy = criteria.policy(regime)?;

    let mut selection = Selection::default();
    for ticker in ticker_columns(prices) {
        match screen_ticker(&ticker, prices, volumes, fundamentals.get(&ticker), criteria, policy) {
            Verdict::Qualified(candidate) => selection.candidates.push(candidate),
            Verdict::Excluded(exclusion) => {
                debug!(ticker = %exclusion.ticker, reason = ?exclusion.reason, "Excluded from universe");
                selection.exclusions.push(exclusion);
            }
        }
    }

    info!(
        regime = %regime,
        qualified = selection.candidates.len(),
        excluded = selection.exclusions.len(),
        "Universe filter finished"
    );

    Ok(selection)
}

fn screen_ticker(
    ticker: &str,
    prices: &DataFrame,
    volumes: &DataFrame,
    record: Option<&FundamentalsRecord>,
    criteria: &FilterCriteria,
    policy: &SectorPolicy,
) -> Verdict {
    let excluded = |avg_volume: Option<f64>, total_return: Option<f64>, reason: ExclusionReason| {
        Verdict::Excluded(Exclusion {
            ticker: ticker.to_string(),
            avg_volume,
            total_return,
            reason,
        })
    };

    let avg_volume = match column_values(volumes, ticker) {
        Ok(values) => average(&values),
        Err(e) => {
            return excluded(
                None,
                None,
                ExclusionReason::DataUnavailable {
                    detail: format!("volume series: {}", e),
                },
            )
        }
    };
    let total_return = match column_values(prices, ticker) {
        Ok(values) => window_return(&values),
        Err(e) => {
            return excluded(
                avg_volume,
                None,
                ExclusionReason::DataUnavailable {
                    detail: format!("price series: {}", e),
                },
            )
        }
    };

    let (avg_volume, total_return) = match (avg_volume, total_return) {
        (Some(v), Some(r)) => (v, r),
        (None, _) => {
            return excluded(
                None,
                total_return,
                ExclusionReason::DataUnavailable {
                    detail: "no valid volume observations".to_string(),
                },
            )
        }
        (_, None) => {
            return excluded(
                avg_volume,
                None,
                ExclusionReason::DataUnavailable {
                    detail: "fewer than two valid prices".to_string(),
                },
            )
        }
    };

    // Base filter
    if avg_volume <= criteria.min_volume {
        return excluded(Some(avg_volume), Some(total_return), ExclusionReason::LowVolume { avg_volume });
    }
    if total_return <= criteria.min_return {
        return excluded(Some(avg_volume), Some(total_return), ExclusionReason::LowReturn { total_return });
    }

    // Quality filter
    if let Some(reason) = quality_reason(record, criteria, policy) {
        return excluded(Some(avg_volume), Some(total_return), reason);
    }

    Verdict::Qualified(Candidate {
        ticker: ticker.to_string(),
        avg_volume,
        total_return,
    })
}

/// Why a base-filter survivor fails the quality screen, or `None` if it passes.
pub fn quality_reason(
    record: Option<&FundamentalsRecord>,
    criteria: &FilterCriteria,
    policy: &SectorPolicy,
) -> Option<ExclusionReason> {
    let record = match record {
        Some(record) => record,
        None => return Some(ExclusionReason::MissingFundamentals),
    };

    match record.eps_growth {
        None => return Some(ExclusionReason::missing_field("eps_growth")),
        Some(eps_growth) if eps_growth < criteria.min_eps_growth => {
            return Some(ExclusionReason::WeakEpsGrowth { eps_growth })
        }
        _ => {}
    }

    match record.operating_margin {
        None => return Some(ExclusionReason::missing_field("operating_margin")),
        Some(operating_margin) if operating_margin <= criteria.min_operating_margin => {
            return Some(ExclusionReason::WeakOperatingMargin { operating_margin })
        }
        _ => {}
    }

    match record.fcf_margin {
        None => return Some(ExclusionReason::missing_field("fcf_margin")),
        Some(fcf_margin) if fcf_margin <= criteria.min_fcf_margin => {
            return Some(ExclusionReason::WeakFcfMargin { fcf_margin })
        }
        _ => {}
    }

    let sector = match record.sector.as_deref() {
        Some(sector) => sector,
        None => return Some(ExclusionReason::missing_field("sector")),
    };
    if policy.is_excluded(sector) {
        return Some(ExclusionReason::SectorExcluded {
            sector: sector.to_string(),
        });
    }
    if !policy.is_priority(sector) {
        return Some(ExclusionReason::SectorNotPrioritized {
            sector: sector.to_string(),
        });
    }

    None
}

/// Mean of the valid observations.
pub fn average(values: &[Option<f64>]) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Last valid price over first valid price, minus one.
pub fn window_return(prices: &[Option<f64>]) -> Option<f64> {
    let first = prices.iter().position(Option::is_some)?;
    let last = prices.iter().rposition(Option::is_some)?;
    if first == last {
        return None;
    }

    match (prices[first], prices[last]) {
        (Some(start), Some(end)) if start > 0.0 => Some(end / start - 1.0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_SECTOR_TABLE;

    fn quality_record(sector: &str) -> FundamentalsRecord {
        FundamentalsRecord {
            pe_ratio: Some(25.0),
            dividend_yield: Some(0.01),
            sector: Some(sector.to_string()),
            eps_growth: Some(0.20),
            operating_margin: Some(0.15),
            fcf_margin: Some(0.12),
        }
    }

    fn risk_on() -> &'static SectorPolicy {
        DEFAULT_SECTOR_TABLE.get(&Regime::RiskOn).unwrap()
    }

    #[test]
    fn test_average_skips_missing() {
        assert_eq!(average(&[Some(1.0), None, Some(3.0)]), Some(2.0));
        assert_eq!(average(&[None, None]), None);
        assert_eq!(average(&[]), None);
    }

    #[test]
    fn test_window_return_uses_first_and_last_valid() {
        let prices = [None, Some(100.0), Some(90.0), Some(160.0), None];
        let result = window_return(&prices).unwrap();
        assert!((result - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_window_return_needs_two_prices() {
        assert_eq!(window_return(&[None, Some(100.0), None]), None);
        assert_eq!(window_return(&[Some(0.0), Some(10.0)]), None);
    }

    #[test]
    fn test_quality_passes_priority_sector() {
        let criteria = FilterCriteria::default();
        let record = quality_record("Technology");
        assert_eq!(quality_reason(Some(&record), &criteria, risk_on()), None);
    }

    #[test]
    fn test_quality_rejects_excluded_sector() {
        let criteria = FilterCriteria::default();
        let record = quality_record("Consumer Staples");
        assert_eq!(
            quality_reason(Some(&record), &criteria, risk_on()),
            Some(ExclusionReason::SectorExcluded {
                sector: "Consumer Staples".to_string()
            })
        );
    }

    #[test]
    fn test_quality_rejects_unlisted_sector() {
        let criteria = FilterCriteria::default();
        let record = quality_record("Energy");
        assert!(matches!(
            quality_reason(Some(&record), &criteria, risk_on()),
            Some(ExclusionReason::SectorNotPrioritized { .. })
        ));
    }

    #[test]
    fn test_quality_rejects_missing_fields() {
        let criteria = FilterCriteria::default();

        assert_eq!(
            quality_reason(None, &criteria, risk_on()),
            Some(ExclusionReason::MissingFundamentals)
        );

        let record = FundamentalsRecord {
            fcf_margin: None,
            ..quality_record("Technology")
        };
        assert_eq!(
            quality_reason(Some(&record), &criteria, risk_on()),
            Some(ExclusionReason::missing_field("fcf_margin"))
        );

        let unavailable = FundamentalsRecord::unavailable();
        assert_eq!(
            quality_reason(Some(&unavailable), &criteria, risk_on()),
            Some(ExclusionReason::missing_field("eps_growth"))
        );
    }

    #[test]
    fn test_quality_threshold_edges() {
        let criteria = FilterCriteria::default();

        // EPS growth is inclusive
        let at_eps = FundamentalsRecord {
            eps_growth: Some(criteria.min_eps_growth),
            ..quality_record("Technology")
        };
        assert_eq!(quality_reason(Some(&at_eps), &criteria, risk_on()), None);

        // Operating margin must be strictly positive
        let zero_margin = FundamentalsRecord {
            operating_margin: Some(0.0),
            ..quality_record("Technology")
        };
        assert!(matches!(
            quality_reason(Some(&zero_margin), &criteria, risk_on()),
            Some(ExclusionReason::WeakOperatingMargin { .. })
        ));

        // FCF margin is strict
        let at_fcf = FundamentalsRecord {
            fcf_margin: Some(criteria.min_fcf_margin),
            ..quality_record("Technology")
        };
        assert!(matches!(
            quality_reason(Some(&at_fcf), &criteria, risk_on()),
            Some(ExclusionReason::WeakFcfMargin { .. })
        ));
    }
}
