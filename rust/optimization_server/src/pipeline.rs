// src/pipeline.rs

use crate::optimizer::{OptimizeError, OptimizedPortfolio, SharpeOptimizer, SolverSettings};
use frontier::{Frontier, FrontierError, FrontierSampler, DEFAULT_SAMPLE_COUNT, MAX_SAMPLES};
use polars::frame::DataFrame;
use rand::rngs::StdRng;
use rand::SeedableRng;
use screener::{FilterCriteria, FundamentalsRecord, Regime, ScreenerError, Selection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::info;
use validator::{Validate, ValidationError, ValidationErrors};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ValidationErrors),
    #[error(transparent)]
    Screener(#[from] ScreenerError),
    #[error(transparent)]
    Frontier(#[from] FrontierError),
    #[error(transparent)]
    Optimize(#[from] OptimizeError),
}

impl PipelineError {
    /// Stable snake_case name of the failure, used in API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidConfig(_) | PipelineError::Screener(_) => "invalid_input",
            PipelineError::Frontier(FrontierError::InsufficientHistory { .. })
            | PipelineError::Optimize(OptimizeError::Frontier(FrontierError::InsufficientHistory { .. })) => {
                "insufficient_history"
            }
            PipelineError::Frontier(FrontierError::DegenerateCovariance { .. })
            | PipelineError::Optimize(OptimizeError::DegenerateCovariance { .. }) => "degenerate_covariance",
            PipelineError::Optimize(OptimizeError::OptimizationFailure { .. }) => "optimization_failure",
            _ => "internal_error",
        }
    }
}

/// Everything one construction run needs besides the market data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
#[validate(schema(function = "validate_config"))]
pub struct ConstructionConfig {
    #[validate(nested)]
    pub criteria: FilterCriteria,
    pub regime: Regime,
    pub risk_free_rate: f64,
    #[validate(range(min = 1.0, max = 366.0))]
    pub annualization_factor: f64,
    #[validate(range(min = 0.0, exclusive_max = 1.0))]
    pub materiality_threshold: f64,
    pub sample_count: usize,
    pub seed: u64,
    #[validate(nested)]
    pub solver: SolverSettings,
}

impl Default for ConstructionConfig {
    fn default() -> Self {
        ConstructionConfig {
            criteria: FilterCriteria::default(),
            regime: Regime::default(),
            risk_free_rate: 0.04,
            annualization_factor: frontier::stats::TRADING_DAYS_PER_YEAR,
            materiality_threshold: 0.01,
            sample_count: DEFAULT_SAMPLE_COUNT,
            seed: 42,
            solver: SolverSettings::default(),
        }
    }
}

fn validate_config(config: &ConstructionConfig) -> Result<(), ValidationError> {
    let rates = [
        config.risk_free_rate,
        config.annualization_factor,
        config.materiality_threshold,
        config.solver.xtol_rel,
        config.solver.constraint_tolerance,
    ];
    if rates.iter().any(|r| !r.is_finite()) {
        return Err(ValidationError::new("non_finite_parameter"));
    }

    if config.sample_count == 0 || config.sample_count > MAX_SAMPLES {
        let mut err = ValidationError::new("sample_count_out_of_range");
        err.add_param("max".into(), &MAX_SAMPLES);
        return Err(err);
    }

    Ok(())
}

/// Aligned price and volume tables on one date grid.
#[derive(Debug, Clone)]
pub struct MarketData {
    pub prices: DataFrame,
    pub volumes: DataFrame,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub ticker: String,
    pub weight: f64,
}

/// Material holdings of a portfolio. Weights below the threshold are reported
/// as zero and left out of `positions`; the portfolio itself is untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    pub threshold: f64,
    pub positions: Vec<Position>,
    pub immaterial: Vec<String>,
}

impl Allocation {
    pub fn from_portfolio(portfolio: &OptimizedPortfolio, threshold: f64) -> Self {
        let mut positions = Vec::new();
        let mut immaterial = Vec::new();

        for (ticker, &weight) in portfolio.tickers.iter().zip(&portfolio.weights) {
            if weight >= threshold {
                positions.push(Position {
                    ticker: ticker.clone(),
                    weight,
                });
            } else {
                immaterial.push(ticker.clone());
            }
        }

        Allocation {
            threshold,
            positions,
            immaterial,
        }
    }

    /// Reported weight of `ticker`: its raw weight when material, zero otherwise.
    pub fn weight(&self, ticker: &str) -> f64 {
        self.positions
            .iter()
            .find(|p| p.ticker == ticker)
            .map_or(0.0, |p| p.weight)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioReport {
    pub selection: Selection,
    pub trading_days: usize,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub portfolio: OptimizedPortfolio,
    pub allocation: Allocation,
    pub frontier: Frontier,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Construction {
    /// No ticker survived the filter; nothing was optimized or sampled.
    EmptySelection { selection: Selection },
    Constructed(Box<PortfolioReport>),
}

pub fn construct(
    market: &MarketData,
    fundamentals: &HashMap<String, FundamentalsRecord>,
    config: &ConstructionConfig,
) -> Result<Construction, PipelineError> {
    config.validate()?;

    let selection = screener::select(
        &market.prices,
        &market.volumes,
        fundamentals,
        &config.criteria,
        config.regime,
    )?;
    if selection.is_empty() {
        info!(regime = %config.regime, "No ticker qualified, skipping optimization");
        return Ok(Construction::EmptySelection { selection });
    }

    let returns = frontier::build(&market.prices, &selection.tickers())?;

    let portfolio = SharpeOptimizer::new(config.risk_free_rate, config.annualization_factor)
        .with_settings(config.solver)
        .optimize(&returns)?;

    let sampler = FrontierSampler::new(config.risk_free_rate, config.annualization_factor, config.sample_count)?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let frontier = sampler.sample_par(&returns, &mut rng)?;

    let allocation = Allocation::from_portfolio(&portfolio, config.materiality_threshold);
    let dates = returns.dates();

    info!(
        candidates = selection.len(),
        trading_days = returns.n_days(),
        material_positions = allocation.positions.len(),
        sharpe = portfolio.metrics.sharpe,
        sampled_best_sharpe = frontier.best.point.sharpe,
        "Constructed portfolio"
    );

    Ok(Construction::Constructed(Box::new(PortfolioReport {
        trading_days: returns.n_days(),
        start_date: dates.and_then(|d| d.first().cloned()),
        end_date: dates.and_then(|d| d.last().cloned()),
        selection,
        portfolio,
        allocation,
        frontier,
    })))
}
