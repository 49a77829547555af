// src/stats.rs

use crate::error::FrontierError;
use crate::returns::ReturnsMatrix;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::Serialize;

/// Portfolio volatility at or below this is treated as zero.
pub const VOLATILITY_FLOOR: f64 = 1e-10;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Annualized return, volatility and Sharpe ratio of one weight vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PortfolioMetrics {
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe: f64,
}

/// Annualized mean vector and sample covariance of daily returns.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnualizedMoments {
    mean: Array1<f64>,
    cov: Array2<f64>,
}

impl AnnualizedMoments {
    pub fn from_returns(returns: &ReturnsMatrix, annualization_factor: f64) -> Self {
        let values = returns.values();
        let days = values.nrows() as f64;

        // ReturnsMatrix guarantees at least two rows
        let daily_mean = values.sum_axis(Axis(0)) / days;
        let centered = values - &daily_mean;
        let daily_cov = centered.t().dot(&centered) / (days - 1.0);

        AnnualizedMoments {
            mean: daily_mean * annualization_factor,
            cov: daily_cov * annualization_factor,
        }
    }

    /// Moments given directly, already annualized.
    pub fn from_parts(mean: Array1<f64>, cov: Array2<f64>) -> Result<Self, FrontierError> {
        let n = mean.len();
        if cov.dim() != (n, n) {
            return Err(FrontierError::Shape(format!(
                "covariance is {:?} for {} assets",
                cov.dim(),
                n
            )));
        }
        if n == 0 {
            return Err(FrontierError::InsufficientHistory { rows: 0, columns: 0 });
        }
        Ok(AnnualizedMoments { mean, cov })
    }

    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    pub fn cov(&self) -> &Array2<f64> {
        &self.cov
    }

    pub fn n_assets(&self) -> usize {
        self.mean.len()
    }

    pub fn expected_return(&self, weights: ArrayView1<f64>) -> f64 {
        weights.dot(&self.mean)
    }

    /// Σw, shared by the variance and its gradient.
    pub fn cov_times(&self, weights: ArrayView1<f64>) -> Array1<f64> {
        self.cov.dot(&weights)
    }

    pub fn variance(&self, weights: ArrayView1<f64>) -> f64 {
        weights.dot(&self.cov_times(weights))
    }

    pub fn evaluate(&self, weights: &[f64], risk_free_rate: f64) -> Result<PortfolioMetrics, FrontierError> {
        if weights.len() != self.n_assets() {
            return Err(FrontierError::Shape(format!(
                "{} weights for {} assets",
                weights.len(),
                self.n_assets()
            )));
        }

        let w = ArrayView1::from(weights);
        let expected_return = self.expected_return(w);
        let volatility = self.variance(w).max(0.0).sqrt();
        if !(volatility > VOLATILITY_FLOOR) {
            return Err(FrontierError::DegenerateCovariance { volatility });
        }

        Ok(PortfolioMetrics {
            expected_return,
            volatility,
            sharpe: (expected_return - risk_free_rate) / volatility,
        })
    }
}

pub fn equal_weights(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}
