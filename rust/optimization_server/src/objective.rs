// src/objective.rs

use frontier::{AnnualizedMoments, VOLATILITY_FLOOR};
use ndarray::ArrayView1;
use std::cell::Cell;

/// Negated annualized Sharpe ratio of a weight vector, the quantity the
/// solver minimizes.
pub struct SharpeObjective<'a> {
    moments: &'a AnnualizedMoments,
    risk_free_rate: f64,
    evaluations: Cell<usize>,
    degenerate: Cell<Option<f64>>,
}

impl<'a> SharpeObjective<'a> {
    pub fn new(moments: &'a AnnualizedMoments, risk_free_rate: f64) -> Self {
        SharpeObjective {
            moments,
            risk_free_rate,
            evaluations: Cell::new(0),
            degenerate: Cell::new(None),
        }
    }

    /// Objective value at `x`, filling `grad` with the analytic gradient
    /// when the solver asks for it:
    ///
    /// d/dw [-(w·μ - rf) / σ] = -(μ / σ - (w·μ - rf) Σw / σ³)
    pub fn objective_function(&self, x: &[f64], grad: Option<&mut [f64]>) -> f64 {
        self.evaluations.set(self.evaluations.get() + 1);

        let w = ArrayView1::from(x);
        let excess = self.moments.expected_return(w) - self.risk_free_rate;
        let cov_w = self.moments.cov_times(w);
        let volatility = w.dot(&cov_w).max(0.0).sqrt();

        if !(volatility > VOLATILITY_FLOOR) {
            // First degenerate point wins; the optimizer reports it after the solve
            if self.degenerate.get().is_none() {
                self.degenerate.set(Some(volatility));
            }
            if let Some(grad) = grad {
                grad.iter_mut().for_each(|g| *g = 0.0);
            }
            return 0.0;
        }

        if let Some(grad) = grad {
            let vol3 = volatility.powi(3);
            for (i, g) in grad.iter_mut().enumerate() {
                *g = -(self.moments.mean()[i] / volatility - excess * cov_w[i] / vol3);
            }
        }

        -excess / volatility
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations.get()
    }

    /// Volatility at the first evaluation that hit the floor, if any did.
    pub fn degenerate_volatility(&self) -> Option<f64> {
        self.degenerate.get()
    }
}

/// Equality constraint sum(x) - 1 with its gradient.
pub fn budget_constraint(x: &[f64], grad: Option<&mut [f64]>) -> f64 {
    if let Some(grad) = grad {
        for g in grad.iter_mut() {
            *g = 1.0;
        }
    }
    x.iter().sum::<f64>() - 1.0
}
