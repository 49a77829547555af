// tests/integration_tests.rs

use polars::frame::DataFrame;
use screener::table::market_frame;
use screener::{
    select, ExclusionReason, FilterCriteria, FundamentalsRecord, Regime, Selection,
};
use std::collections::HashMap;

struct Listing {
    ticker: &'static str,
    avg_volume: f64,
    total_return: f64,
    record: Option<FundamentalsRecord>,
}

fn record(sector: &str) -> FundamentalsRecord {
    FundamentalsRecord {
        pe_ratio: Some(28.0),
        dividend_yield: Some(0.006),
        sector: Some(sector.to_string()),
        eps_growth: Some(0.20),
        operating_margin: Some(0.15),
        fcf_margin: Some(0.12),
    }
}

fn listing(ticker: &'static str, sector: &str) -> Listing {
    Listing {
        ticker,
        avg_volume: 2_000_000.0,
        total_return: 0.60,
        record: Some(record(sector)),
    }
}

// Prices move linearly from 100 to 100 * (1 + total_return) over the window.
fn tables(listings: &[Listing]) -> (DataFrame, DataFrame, HashMap<String, FundamentalsRecord>) {
    let days = 6;
    let mut prices = Vec::new();
    let mut volumes = Vec::new();
    let mut fundamentals = HashMap::new();

    for l in listings {
        let end = 100.0 * (1.0 + l.total_return);
        let series: Vec<Option<f64>> = (0..days)
            .map(|d| Some(100.0 + (end - 100.0) * d as f64 / (days - 1) as f64))
            .collect();
        prices.push((l.ticker.to_string(), series));
        volumes.push((l.ticker.to_string(), vec![Some(l.avg_volume); days]));
        if let Some(record) = &l.record {
            fundamentals.insert(l.ticker.to_string(), record.clone());
        }
    }

    (
        market_frame(None, &prices).unwrap(),
        market_frame(None, &volumes).unwrap(),
        fundamentals,
    )
}

fn run(listings: &[Listing], criteria: &FilterCriteria, regime: Regime) -> Selection {
    let (prices, volumes, fundamentals) = tables(listings);
    select(&prices, &volumes, &fundamentals, criteria, regime).unwrap()
}

#[test]
fn test_technology_name_qualifies_in_risk_on() {
    let selection = run(&[listing("TECH", "Technology")], &FilterCriteria::default(), Regime::RiskOn);

    assert_eq!(selection.tickers(), vec!["TECH"]);
    let candidate = &selection.candidates[0];
    assert!((candidate.avg_volume - 2_000_000.0).abs() < 1e-6);
    assert!((candidate.total_return - 0.60).abs() < 1e-9);
}

#[test]
fn test_consumer_staples_excluded_in_risk_on() {
    let selection = run(
        &[listing("STPL", "Consumer Staples")],
        &FilterCriteria::default(),
        Regime::RiskOn,
    );

    assert!(selection.is_empty());
    assert!(matches!(
        selection.exclusion("STPL"),
        Some(ExclusionReason::SectorExcluded { .. })
    ));
}

#[test]
fn test_missing_fundamentals_excluded_without_error() {
    let mut orphan = listing("ORPH", "Technology");
    orphan.record = None;

    let (prices, volumes, fundamentals) = tables(&[orphan, listing("TECH", "Technology")]);
    let selection = select(
        &prices,
        &volumes,
        &fundamentals,
        &FilterCriteria::default(),
        Regime::RiskOn,
    )
    .expect("A missing record must not fail the batch");

    assert_eq!(selection.tickers(), vec!["TECH"]);
    assert_eq!(selection.exclusion("ORPH"), Some(&ExclusionReason::MissingFundamentals));
}

#[test]
fn test_unavailable_record_is_excluded() {
    let mut failed = listing("FAIL", "Technology");
    failed.record = Some(FundamentalsRecord::unavailable());

    let selection = run(&[failed], &FilterCriteria::default(), Regime::RiskOn);
    assert!(selection.is_empty());
    assert!(matches!(
        selection.exclusion("FAIL"),
        Some(ExclusionReason::MissingField { .. })
    ));
}

#[test]
fn test_missing_volume_series_is_data_unavailable() {
    let (prices, _, fundamentals) = tables(&[listing("TECH", "Technology")]);
    let volumes = market_frame(None, &[("OTHER".to_string(), vec![Some(1.0); 6])]).unwrap();

    let selection = select(
        &prices,
        &volumes,
        &fundamentals,
        &FilterCriteria::default(),
        Regime::RiskOn,
    )
    .unwrap();

    assert!(matches!(
        selection.exclusion("TECH"),
        Some(ExclusionReason::DataUnavailable { .. })
    ));
}

#[test]
fn test_regime_flips_sector_preference() {
    let listings = [listing("TECH", "Technology"), listing("UTIL", "Utilities")];
    let criteria = FilterCriteria::default();

    assert_eq!(run(&listings, &criteria, Regime::RiskOn).tickers(), vec!["TECH"]);
    assert_eq!(run(&listings, &criteria, Regime::RiskOff).tickers(), vec!["UTIL"]);
}

#[test]
fn test_selection_preserves_universe_order() {
    let listings = [
        listing("ZETA", "Technology"),
        listing("STPL", "Consumer Staples"),
        listing("ALFA", "Industrials"),
        listing("MIDL", "Financial Services"),
    ];
    let selection = run(&listings, &FilterCriteria::default(), Regime::RiskOn);

    assert_eq!(selection.tickers(), vec!["ZETA", "ALFA", "MIDL"]);
    assert_eq!(selection.exclusions.len(), 1);
}

#[test]
fn test_base_filter_thresholds() {
    let mut thin = listing("THIN", "Technology");
    thin.avg_volume = 500_000.0;
    let mut flat = listing("FLAT", "Technology");
    flat.total_return = 0.10;

    let selection = run(&[thin, flat], &FilterCriteria::default(), Regime::RiskOn);

    assert!(matches!(selection.exclusion("THIN"), Some(ExclusionReason::LowVolume { .. })));
    assert!(matches!(selection.exclusion("FLAT"), Some(ExclusionReason::LowReturn { .. })));
}

#[test]
fn test_filter_is_monotonic_in_base_thresholds() {
    let listings: Vec<Listing> = (0..12)
        .map(|i| Listing {
            ticker: ["A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K", "L"][i],
            avg_volume: 400_000.0 + 300_000.0 * i as f64,
            total_return: 0.05 * (12 - i) as f64,
            record: Some(record("Technology")),
        })
        .collect();

    let mut previous = usize::MAX;
    for min_volume in [0.0, 500_000.0, 1_000_000.0, 2_000_000.0, 3_000_000.0, 10_000_000.0] {
        let criteria = FilterCriteria {
            min_volume,
            min_return: 0.0,
            ..FilterCriteria::default()
        };
        let size = run(&listings, &criteria, Regime::RiskOn).len();
        assert!(size <= previous, "Raising min_volume grew the selection");
        previous = size;
    }

    let mut previous = usize::MAX;
    for min_return in [-1.0, 0.0, 0.1, 0.25, 0.4, 0.55, 1.0] {
        let criteria = FilterCriteria {
            min_volume: 0.0,
            min_return,
            ..FilterCriteria::default()
        };
        let size = run(&listings, &criteria, Regime::RiskOn).len();
        assert!(size <= previous, "Raising min_return grew the selection");
        previous = size;
    }
}

#[test]
fn test_invalid_criteria_rejected() {
    let (prices, volumes, fundamentals) = tables(&[listing("TECH", "Technology")]);
    let criteria = FilterCriteria {
        min_return: f64::NAN,
        ..FilterCriteria::default()
    };

    assert!(select(&prices, &volumes, &fundamentals, &criteria, Regime::RiskOn).is_err());
}
