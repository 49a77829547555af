// src/optimizer.rs

use crate::objective::{budget_constraint, SharpeObjective};
use frontier::{AnnualizedMoments, FrontierError, PortfolioMetrics, ReturnsMatrix};
use nlopt::{Algorithm, FailState, Nlopt, SuccessState, Target};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use validator::Validate;

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("Optimization failed with status {status} (objective {objective})")]
    OptimizationFailure {
        status: String,
        objective: f64,
        last_iterate: Vec<f64>,
    },
    #[error("Portfolio volatility {volatility:e} is indistinguishable from zero")]
    DegenerateCovariance { volatility: f64 },
    #[error("Solver rejected configuration: {0}")]
    Setup(String),
    #[error(transparent)]
    Frontier(FrontierError),
}

impl From<FrontierError> for OptimizeError {
    fn from(err: FrontierError) -> Self {
        match err {
            FrontierError::DegenerateCovariance { volatility } => OptimizeError::DegenerateCovariance { volatility },
            other => OptimizeError::Frontier(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize, Validate)]
#[serde(default)]
pub struct SolverSettings {
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub xtol_rel: f64,
    #[validate(range(exclusive_min = 0.0, max = 1e-4))]
    pub constraint_tolerance: f64,
    #[validate(range(min = 1))]
    pub max_evaluations: u32,
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings {
            xtol_rel: 1e-8,
            constraint_tolerance: 1e-10,
            max_evaluations: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizedPortfolio {
    pub tickers: Vec<String>,
    pub weights: Vec<f64>,
    pub metrics: PortfolioMetrics,
    pub status: String,
    pub evaluations: usize,
}

impl OptimizedPortfolio {
    pub fn weight(&self, ticker: &str) -> Option<f64> {
        self.tickers
            .iter()
            .position(|t| t == ticker)
            .map(|i| self.weights[i])
    }
}

/// Long-only, fully invested maximum-Sharpe solve with SLSQP from the
/// equal-weight start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SharpeOptimizer {
    pub risk_free_rate: f64,
    pub annualization_factor: f64,
    pub settings: SolverSettings,
}

impl SharpeOptimizer {
    pub fn new(risk_free_rate: f64, annualization_factor: f64) -> Self {
        SharpeOptimizer {
            risk_free_rate,
            annualization_factor,
            settings: SolverSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: SolverSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn optimize(&self, returns: &ReturnsMatrix) -> Result<OptimizedPortfolio, OptimizeError> {
        let moments = AnnualizedMoments::from_returns(returns, self.annualization_factor);
        self.optimize_moments(returns.tickers(), &moments)
    }

    pub fn optimize_moments(
        &self,
        tickers: &[String],
        moments: &AnnualizedMoments,
    ) -> Result<OptimizedPortfolio, OptimizeError> {
        let n = moments.n_assets();
        if tickers.len() != n {
            return Err(OptimizeError::Setup(format!("{} tickers for {} assets", tickers.len(), n)));
        }

        if n == 1 {
            let weights = vec![1.0];
            let metrics = moments.evaluate(&weights, self.risk_free_rate)?;
            debug!(ticker = %tickers[0], "Single candidate, allocating fully");
            return Ok(OptimizedPortfolio {
                tickers: tickers.to_vec(),
                weights,
                metrics,
                status: "SingleAsset".to_string(),
                evaluations: 0,
            });
        }

        // Degenerate at the equal-weight start
        moments.evaluate(&frontier::equal_weights(n), self.risk_free_rate)?;

        let objective = SharpeObjective::new(moments, self.risk_free_rate);
        let mut weights = vec![1.0 / n as f64; n];
        let outcome = self.solve(&objective, &mut weights)?;

        if let Some(volatility) = objective.degenerate_volatility() {
            warn!(volatility, "Solver visited a zero-volatility portfolio");
            return Err(OptimizeError::DegenerateCovariance { volatility });
        }

        let (status, objective_value) = match outcome {
            Ok((state @ (SuccessState::MaxEvalReached | SuccessState::MaxTimeReached), objective_value)) => {
                debug!(status = ?state, objective_value, "Solver exhausted its budget");
                return Err(OptimizeError::OptimizationFailure {
                    status: format!("{:?}", state),
                    objective: objective_value,
                    last_iterate: weights,
                });
            }
            Ok((state, objective_value)) => {
                debug!(status = ?state, objective_value, "Solver converged");
                (format!("{:?}", state), objective_value)
            }
            Err((state, objective_value)) => {
                debug!(status = ?state, objective_value, "Solver failed");
                return Err(OptimizeError::OptimizationFailure {
                    status: format!("{:?}", state),
                    objective: objective_value,
                    last_iterate: weights,
                });
            }
        };

        let metrics = moments.evaluate(&weights, self.risk_free_rate)?;
        if (metrics.sharpe + objective_value).abs() > 1e-6 * metrics.sharpe.abs().max(1.0) {
            warn!(
                solver_sharpe = -objective_value,
                sharpe = metrics.sharpe,
                "Recomputed Sharpe disagrees with the solver's objective"
            );
        }

        info!(
            assets = n,
            status = %status,
            evaluations = objective.evaluations(),
            sharpe = metrics.sharpe,
            "Optimized maximum-Sharpe portfolio"
        );

        Ok(OptimizedPortfolio {
            tickers: tickers.to_vec(),
            weights,
            metrics,
            status,
            evaluations: objective.evaluations(),
        })
    }

    // Runs SLSQP from the point in `x`, leaving the last iterate there.
    fn solve(
        &self,
        objective: &SharpeObjective,
        x: &mut [f64],
    ) -> Result<Result<(SuccessState, f64), (FailState, f64)>, OptimizeError> {
        let n = x.len();
        let obj_func = |x: &[f64], grad: Option<&mut [f64]>, _user_data: &mut ()| objective.objective_function(x, grad);

        let mut opt = Nlopt::new(Algorithm::Slsqp, n, obj_func, Target::Minimize, ());

        opt.set_lower_bounds(&vec![0.0; n])
            .map_err(|e| OptimizeError::Setup(format!("Failed to set lower bounds: {:?}", e)))?;
        opt.set_upper_bounds(&vec![1.0; n])
            .map_err(|e| OptimizeError::Setup(format!("Failed to set upper bounds: {:?}", e)))?;

        let sum_constraint =
            |x: &[f64], grad: Option<&mut [f64]>, _user_data: &mut ()| budget_constraint(x, grad);
        opt.add_equality_constraint(sum_constraint, (), self.settings.constraint_tolerance)
            .map_err(|e| OptimizeError::Setup(format!("Failed to add equality constraint: {:?}", e)))?;

        opt.set_xtol_rel(self.settings.xtol_rel)
            .map_err(|e| OptimizeError::Setup(format!("Failed to set xtol_rel: {:?}", e)))?;
        opt.set_maxeval(self.settings.max_evaluations)
            .map_err(|e| OptimizeError::Setup(format!("Failed to set maxeval: {:?}", e)))?;

        Ok(opt.optimize(x))
    }
}

/// One-off solve with default solver settings.
pub fn optimize(
    returns: &ReturnsMatrix,
    risk_free_rate: f64,
    annualization_factor: f64,
) -> Result<OptimizedPortfolio, OptimizeError> {
    SharpeOptimizer::new(risk_free_rate, annualization_factor).optimize(returns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use frontier::equal_weights;
    use ndarray::{array, Array1, Array2};

    fn tickers(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("T{}", i)).collect()
    }

    // Unconstrained tangency weights Σ⁻¹(μ - rf) / 1ᵀΣ⁻¹(μ - rf) for a
    // diagonal covariance.
    fn diagonal_tangency(mean: &Array1<f64>, variances: &[f64], rf: f64) -> Vec<f64> {
        let raw: Vec<f64> = mean
            .iter()
            .zip(variances)
            .map(|(m, v)| (m - rf) / v)
            .collect();
        let total: f64 = raw.iter().sum();
        raw.iter().map(|r| r / total).collect()
    }

    #[test]
    fn test_matches_closed_form_tangency() {
        let mean = array![0.10, 0.14, 0.18];
        let variances = [0.04, 0.09, 0.16];
        let cov = Array2::from_diag(&Array1::from(variances.to_vec()));
        let moments = AnnualizedMoments::from_parts(mean.clone(), cov).unwrap();

        let portfolio = SharpeOptimizer::new(0.04, 252.0)
            .optimize_moments(&tickers(3), &moments)
            .unwrap();
        let expected = diagonal_tangency(&mean, &variances, 0.04);

        for (w, e) in portfolio.weights.iter().zip(&expected) {
            assert!((w - e).abs() < 1e-4, "{:?} vs {:?}", portfolio.weights, expected);
        }
        assert!((expected[0] - 0.4303).abs() < 1e-4);
    }

    #[test]
    fn test_matches_closed_form_with_correlation() {
        // Two assets: w1 ∝ e1 σ2² - e2 σ12, w2 ∝ e2 σ1² - e1 σ12
        let mean = array![0.12, 0.20];
        let cov = array![[0.04, 0.018], [0.018, 0.09]];
        let moments = AnnualizedMoments::from_parts(mean, cov).unwrap();

        let (e1, e2) = (0.12 - 0.04, 0.20 - 0.04);
        let a = e1 * 0.09 - e2 * 0.018;
        let b = e2 * 0.04 - e1 * 0.018;
        let expected = [a / (a + b), b / (a + b)];

        let portfolio = SharpeOptimizer::new(0.04, 252.0)
            .optimize_moments(&tickers(2), &moments)
            .unwrap();

        assert!((portfolio.weights[0] - expected[0]).abs() < 1e-4);
        assert!((portfolio.weights[1] - expected[1]).abs() < 1e-4);
    }

    #[test]
    fn test_optimize_returns_matrix_matches_tangency() {
        let returns = ReturnsMatrix::new(
            vec!["AAA".to_string(), "BBB".to_string()],
            None,
            array![[0.02, 0.02], [-0.01, 0.04], [0.03, -0.01], [0.00, 0.03]],
        )
        .unwrap();

        // Daily means 0.01 and 0.02; ddof-1 variances 10e-4/3 and 14e-4/3,
        // covariance -11e-4/3. Annualized by 252.
        let mean = [0.01 * 252.0, 0.02 * 252.0];
        let (s11, s22, s12) = (252.0 * 10e-4 / 3.0, 252.0 * 14e-4 / 3.0, -252.0 * 11e-4 / 3.0);

        let moments = AnnualizedMoments::from_returns(&returns, 252.0);
        assert!((moments.mean()[1] - mean[1]).abs() < 1e-12);
        assert!((moments.cov()[[0, 1]] - s12).abs() < 1e-12);

        // Σ⁻¹(μ - rf), normalized
        let (e1, e2) = (mean[0] - 0.04, mean[1] - 0.04);
        let a = e1 * s22 - e2 * s12;
        let b = e2 * s11 - e1 * s12;
        let expected = [a / (a + b), b / (a + b)];

        let portfolio = optimize(&returns, 0.04, 252.0).unwrap();

        assert_eq!(portfolio.tickers, vec!["AAA", "BBB"]);
        assert!((portfolio.weights[0] - expected[0]).abs() < 1e-4, "{:?} vs {:?}", portfolio.weights, expected);
        assert!((portfolio.weights[1] - expected[1]).abs() < 1e-4);
    }

    #[test]
    fn test_long_only_corner() {
        // The low-return asset would be shorted without the bound.
        let mean = array![0.02, 0.15, 0.12];
        let cov = array![[0.04, 0.0, 0.0], [0.0, 0.09, 0.0], [0.0, 0.0, 0.06]];
        let moments = AnnualizedMoments::from_parts(mean, cov).unwrap();

        let portfolio = SharpeOptimizer::new(0.04, 252.0)
            .optimize_moments(&tickers(3), &moments)
            .unwrap();

        assert!(portfolio.weights[0] < 1e-6);
        assert!((portfolio.weights.iter().sum::<f64>() - 1.0).abs() < 1e-6);
        assert!(portfolio.weights.iter().all(|w| (-1e-9..=1.0 + 1e-9).contains(w)));

        let equal = moments.evaluate(&equal_weights(3), 0.04).unwrap();
        assert!(portfolio.metrics.sharpe >= equal.sharpe - 1e-9);
    }

    #[test]
    fn test_single_asset_short_circuits() {
        let moments = AnnualizedMoments::from_parts(array![0.1], array![[0.04]]).unwrap();
        let portfolio = SharpeOptimizer::new(0.04, 252.0)
            .optimize_moments(&tickers(1), &moments)
            .unwrap();

        assert_eq!(portfolio.weights, vec![1.0]);
        assert!((portfolio.metrics.sharpe - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_covariance() {
        let flat = AnnualizedMoments::from_parts(array![0.1, 0.1], Array2::zeros((2, 2))).unwrap();
        let single = AnnualizedMoments::from_parts(array![0.1], array![[0.0]]).unwrap();
        let optimizer = SharpeOptimizer::new(0.04, 252.0);

        assert!(matches!(
            optimizer.optimize_moments(&tickers(2), &flat),
            Err(OptimizeError::DegenerateCovariance { .. })
        ));
        assert!(matches!(
            optimizer.optimize_moments(&tickers(1), &single),
            Err(OptimizeError::DegenerateCovariance { .. })
        ));
    }

    #[test]
    fn test_exhausted_budget_is_a_failure() {
        let mean = array![0.10, 0.14, 0.18];
        let cov = array![[0.04, 0.01, 0.0], [0.01, 0.09, 0.02], [0.0, 0.02, 0.16]];
        let moments = AnnualizedMoments::from_parts(mean, cov).unwrap();
        let optimizer = SharpeOptimizer::new(0.04, 252.0).with_settings(SolverSettings {
            max_evaluations: 1,
            ..SolverSettings::default()
        });

        match optimizer.optimize_moments(&tickers(3), &moments) {
            Err(OptimizeError::OptimizationFailure { last_iterate, .. }) => assert_eq!(last_iterate.len(), 3),
            other => panic!("Expected OptimizationFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_ticker_count_mismatch() {
        let moments = AnnualizedMoments::from_parts(array![0.1, 0.2], array![[0.04, 0.0], [0.0, 0.09]]).unwrap();
        assert!(matches!(
            SharpeOptimizer::new(0.04, 252.0).optimize_moments(&tickers(3), &moments),
            Err(OptimizeError::Setup(_))
        ));
    }
}
