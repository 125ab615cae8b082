//! Damped Newton minimisation of chi-squared.
//!
//! The gradient is `2 J^T r` from the problem's Jacobian and the Hessian is
//! taken by central differences of the chi-squared value. Indefinite Hessians
//! are shifted along the diagonal until their Cholesky factor exists, and
//! every step is followed by an Armijo backtracking line search.

use ndarray::{Array1, Array2};

use super::Minimum;
use crate::error::Result;
use crate::problem::Problem;
use crate::utils::finite_difference;
use crate::utils::linalg::{cholesky, cholesky_solve};

/// Gradient tolerance used when none is given.
pub const DEFAULT_GRAD_TOL: f64 = 1e-12;

/// Sufficient decrease constant of the line search.
const ARMIJO: f64 = 1e-4;

/// Smallest line search step before giving up.
const MIN_STEP: f64 = 1e-12;

/// Damped Newton minimiser.
#[derive(Debug, Clone)]
pub struct Newton {
    pub max_iterations: usize,
    pub func_tol: f64,
    pub grad_tol: f64,
}

impl Default for Newton {
    fn default() -> Self {
        Self {
            max_iterations: 10000,
            func_tol: 1e-25,
            grad_tol: DEFAULT_GRAD_TOL,
        }
    }
}

/// Solve `(H + mu I) d = -g` for the smallest shift `mu` giving a positive definite matrix.
fn newton_direction(hess: &Array2<f64>, grad: &Array1<f64>) -> Array1<f64> {
    let n = hess.nrows();
    let scale = (0..n).map(|i| hess[[i, i]].abs()).fold(0.0, f64::max).max(1.0);
    let mut mu = 0.0;

    for _ in 0..40 {
        let mut shifted = hess.clone();
        for i in 0..n {
            shifted[[i, i]] += mu;
        }
        if let Some(l) = cholesky(&shifted) {
            return -cholesky_solve(&l, grad);
        }
        mu = if mu == 0.0 { 1e-8 * scale } else { mu * 10.0 };
    }

    // Steepest descent.
    -grad.clone()
}

impl Newton {
    /// Minimise the chi-squared value of a problem from `x0`.
    ///
    /// # Arguments
    ///
    /// * `problem` - The least squares problem
    /// * `x0` - The starting point
    ///
    /// # Returns
    ///
    /// * The minimum found and the evaluation counts
    pub fn minimize<P: Problem>(&self, problem: &P, x0: Array1<f64>) -> Result<Minimum> {
        let mut x = x0;
        let mut residuals = problem.eval(&x)?;
        let mut f: f64 = residuals.iter().map(|r| r * r).sum();
        let mut result = Minimum {
            params: Array1::zeros(0),
            chi2: f,
            iterations: 0,
            f_count: 1,
            g_count: 0,
            h_count: 0,
            converged: false,
            message: String::new(),
        };

        if !f.is_finite() {
            result.params = x;
            result.message = "Non-finite initial chi-squared".to_string();
            return Ok(result);
        }

        loop {
            let grad = problem.jacobian(&x)?.t().dot(&residuals) * 2.0;
            result.g_count += 1;

            let grad_norm = grad.iter().map(|g| g * g).sum::<f64>().sqrt();
            if grad_norm < self.grad_tol {
                result.converged = true;
                result.message = format!("Gradient convergence: ||g|| = {:.2e}", grad_norm);
                break;
            }
            if result.iterations >= self.max_iterations {
                result.message = format!("Maximum number of iterations ({}) reached", self.max_iterations);
                break;
            }

            let hess = finite_difference::hessian(|p| problem.eval_cost(p), &x, None)?;
            result.h_count += 1;

            let direction = newton_direction(&hess, &grad);
            let slope = grad.dot(&direction);

            // Backtracking line search
            let mut t = 1.0;
            let accepted = loop {
                let trial = &x + &(&direction * t);
                let trial_residuals = problem.eval(&trial)?;
                result.f_count += 1;
                let f_trial: f64 = trial_residuals.iter().map(|r| r * r).sum();
                if f_trial.is_finite() && f_trial <= f + ARMIJO * t * slope {
                    break Some((trial, trial_residuals, f_trial));
                }
                t *= 0.5;
                if t < MIN_STEP {
                    break None;
                }
            };

            let Some((x_new, residuals_new, f_new)) = accepted else {
                result.converged = true;
                result.message = "No further reduction of chi-squared along the Newton direction".to_string();
                break;
            };

            result.iterations += 1;
            let change = (f - f_new).abs();
            x = x_new;
            residuals = residuals_new;
            f = f_new;

            if change <= self.func_tol {
                result.converged = true;
                result.message = format!("Function convergence: |df| = {:.2e}", change);
                break;
            }
        }

        log::debug!("Newton: {}", result.message);
        result.params = x;
        result.chi2 = f;
        Ok(result)
    }
}
