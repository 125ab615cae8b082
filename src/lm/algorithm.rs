//! Implementation of the Levenberg-Marquardt algorithm.
//!
//! This module contains the core implementation of the Levenberg-Marquardt algorithm
//! for nonlinear least-squares optimization.

use ndarray::{Array1, Array2};
use std::fmt;

use crate::error::{NStateError, Result};
use crate::problem::Problem;
use crate::utils::linalg::solve_symmetric;

use super::config::LmConfig;

/// Result of the Levenberg-Marquardt optimization.
#[derive(Debug, Clone)]
pub struct LmResult {
    /// Optimized parameter values
    pub params: Array1<f64>,

    /// Residuals at the solution
    pub residuals: Array1<f64>,

    /// Sum of squared residuals
    pub cost: f64,

    /// Number of iterations performed
    pub iterations: usize,

    /// Number of function evaluations
    pub func_evals: usize,

    /// Number of Jacobian evaluations
    pub jac_evals: usize,

    /// Whether the optimization met one of its tolerances
    pub success: bool,

    /// A message describing the result
    pub message: String,
}

impl fmt::Display for LmResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Optimization Result:")?;
        writeln!(f, "  Success: {}", self.success)?;
        writeln!(f, "  Message: {}", self.message)?;
        writeln!(f, "  Cost: {:.6e}", self.cost)?;
        writeln!(f, "  Iterations: {}", self.iterations)?;
        writeln!(f, "  Function evaluations: {}", self.func_evals)?;
        writeln!(f, "  Parameters: {:?}", self.params)?;
        Ok(())
    }
}

/// Status of the iteration.
enum IterationStatus {
    /// Continue iteration
    Continue,

    /// Converged successfully
    Converged(String),

    /// Stopped without meeting a tolerance
    Failed(String),
}

/// The Levenberg-Marquardt optimizer.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    /// Configuration options
    config: LmConfig,
}

impl LevenbergMarquardt {
    /// Create a new Levenberg-Marquardt optimizer with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Levenberg-Marquardt optimizer with the given configuration.
    pub fn with_config(config: LmConfig) -> Self {
        Self { config }
    }

    /// The configuration in use.
    pub fn config(&self) -> &LmConfig {
        &self.config
    }

    /// Set the maximum number of iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Set the tolerance for change in chi-squared.
    pub fn with_ftol(mut self, ftol: f64) -> Self {
        self.config.ftol = ftol;
        self
    }

    /// Set the tolerance for change in parameter values.
    pub fn with_xtol(mut self, xtol: f64) -> Self {
        self.config.xtol = xtol;
        self
    }

    /// Set the tolerance for gradient norm.
    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.config.gtol = gtol;
        self
    }

    /// Set the initial damping parameter.
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.config.initial_lambda = lambda;
        self
    }

    /// Minimize the sum of squared residuals of a problem.
    ///
    /// # Arguments
    ///
    /// * `problem` - The problem to solve
    /// * `initial_params` - Initial guess for the parameter values
    ///
    /// # Returns
    ///
    /// * `Result<LmResult>` - The result of the optimization
    pub fn minimize<P: Problem>(&self, problem: &P, initial_params: Array1<f64>) -> Result<LmResult> {
        let n_params = problem.parameter_count();
        if initial_params.len() != n_params {
            return Err(NStateError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                n_params,
                initial_params.len()
            )));
        }

        let mut params = initial_params;
        let mut lambda = self.config.initial_lambda;

        let mut residuals = problem.eval(&params)?;
        let mut cost: f64 = residuals.iter().map(|r| r.powi(2)).sum();
        let mut func_evals = 1;
        let mut jac_evals = 0;
        let mut iterations = 0;

        let finish = |params: Array1<f64>,
                      residuals: Array1<f64>,
                      cost: f64,
                      iterations: usize,
                      func_evals: usize,
                      jac_evals: usize,
                      success: bool,
                      message: String|
         -> Result<LmResult> {
            log::debug!("Levenberg-Marquardt: {}", message);
            Ok(LmResult {
                params,
                residuals,
                cost,
                iterations,
                func_evals,
                jac_evals,
                success,
                message,
            })
        };

        if !cost.is_finite() {
            return finish(params, residuals, cost, 0, func_evals, 0, false, "Non-finite initial cost".to_string());
        }

        // Outer loop: one Jacobian per accepted step.
        loop {
            if cost == 0.0 {
                return finish(params, residuals, cost, iterations, func_evals, jac_evals, true, "Exact fit".to_string());
            }

            let jacobian = problem.jacobian(&params)?;
            jac_evals += 1;

            // Gradient of half the cost, J^T r
            let g = jacobian.t().dot(&residuals);
            let gradient_norm = g.iter().map(|v| v * v).sum::<f64>().sqrt();
            if gradient_norm < self.config.gtol {
                return finish(
                    params,
                    residuals,
                    cost,
                    iterations,
                    func_evals,
                    jac_evals,
                    true,
                    format!(
                        "Gradient convergence: ||g|| = {:.2e} < {:.2e}",
                        gradient_norm, self.config.gtol
                    ),
                );
            }

            let jtj = jacobian.t().dot(&jacobian);

            // Inner loop: adjust the damping until the cost decreases.
            loop {
                let step = match self.calculate_step(&jtj, &g, lambda) {
                    Ok(step) => step,
                    Err(_) => {
                        lambda = (lambda * self.config.lambda_up_factor).min(self.config.max_lambda);
                        if lambda >= self.config.max_lambda {
                            return Err(NStateError::ConvergenceFailure(
                                "Failed to calculate step, and lambda reached maximum".to_string(),
                            ));
                        }
                        continue;
                    }
                };

                let new_params = &params + &step;
                let new_residuals = problem.eval(&new_params)?;
                func_evals += 1;
                let new_cost: f64 = new_residuals.iter().map(|r| r.powi(2)).sum();

                if new_cost.is_finite() && new_cost < cost {
                    iterations += 1;

                    let param_change = step
                        .iter()
                        .zip(params.iter())
                        .map(|(d, x)| d.abs() / (x.abs() + self.config.xtol))
                        .fold(0.0, f64::max);
                    let cost_change = (cost - new_cost) / cost;

                    let status = if param_change < self.config.xtol {
                        IterationStatus::Converged(format!(
                            "Parameter convergence: |dx|/|x| = {:.2e} < {:.2e}",
                            param_change, self.config.xtol
                        ))
                    } else if cost_change < self.config.ftol {
                        IterationStatus::Converged(format!(
                            "Cost convergence: |df|/|f| = {:.2e} < {:.2e}",
                            cost_change, self.config.ftol
                        ))
                    } else if iterations >= self.config.max_iterations {
                        IterationStatus::Failed(format!(
                            "Maximum number of iterations ({}) reached",
                            self.config.max_iterations
                        ))
                    } else {
                        IterationStatus::Continue
                    };

                    params = new_params;
                    residuals = new_residuals;
                    cost = new_cost;
                    lambda = (lambda * self.config.lambda_down_factor).max(self.config.min_lambda);

                    match status {
                        IterationStatus::Continue => break,
                        IterationStatus::Converged(message) => {
                            return finish(params, residuals, cost, iterations, func_evals, jac_evals, true, message);
                        }
                        IterationStatus::Failed(message) => {
                            return finish(params, residuals, cost, iterations, func_evals, jac_evals, false, message);
                        }
                    }
                }

                // Step rejected
                lambda = (lambda * self.config.lambda_up_factor).min(self.config.max_lambda);
                if lambda >= self.config.max_lambda {
                    // No descent direction left at machine precision: a minimum.
                    return finish(
                        params,
                        residuals,
                        cost,
                        iterations,
                        func_evals,
                        jac_evals,
                        true,
                        "No further reduction of the cost is possible".to_string(),
                    );
                }
            }
        }
    }

    /// Calculate the Levenberg-Marquardt step.
    ///
    /// This method solves the equation (J^T J + λI) δ = -J^T r.
    fn calculate_step(&self, jtj: &Array2<f64>, g: &Array1<f64>, lambda: f64) -> Result<Array1<f64>> {
        let mut a = jtj.clone();
        for i in 0..a.nrows() {
            a[[i, i]] += lambda;
        }
        let delta = solve_symmetric(&a, g)?;
        if delta.iter().any(|v| !v.is_finite()) {
            return Err(NStateError::NotANumber("Levenberg-Marquardt step".to_string()));
        }
        Ok(-delta)
    }
}
