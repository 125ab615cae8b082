//! The method of multipliers for the population constraints.
//!
//! The constraints `A.x >= b` enter an augmented Lagrangian of the
//! Powell-Hestenes-Rockafellar form. Its penalty term is written as extra
//! residuals, `max(0, lambda_i - rho c_i) / sqrt(2 rho)` with `c = A.x - b`,
//! so the unconstrained subproblems remain least squares problems that either
//! optimiser can solve.

use ndarray::{concatenate, Array1, Array2, Axis};

use super::options::MultiplierConfig;
use super::Minimum;
use crate::error::{NStateError, Result};
use crate::parameters::LinearConstraints;
use crate::problem::Problem;

/// A least squares problem extended by the augmented Lagrangian penalty residuals.
pub struct AugmentedProblem<'a, P> {
    inner: &'a P,
    constraints: &'a LinearConstraints,
    lambda: Array1<f64>,
    penalty: f64,
}

impl<'a, P: Problem> AugmentedProblem<'a, P> {
    pub fn new(inner: &'a P, constraints: &'a LinearConstraints, lambda: Array1<f64>, penalty: f64) -> Self {
        Self {
            inner,
            constraints,
            lambda,
            penalty,
        }
    }

    fn shifted(&self, params: &Array1<f64>) -> Array1<f64> {
        let c = self.constraints.values(params);
        (&self.lambda - &(c * self.penalty)).mapv(|v| v.max(0.0))
    }
}

impl<P: Problem> Problem for AugmentedProblem<'_, P> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        let residuals = self.inner.eval(params)?;
        let penalty = self.shifted(params) / (2.0 * self.penalty).sqrt();
        Ok(concatenate![Axis(0), residuals, penalty])
    }

    fn parameter_count(&self) -> usize {
        self.inner.parameter_count()
    }

    fn residual_count(&self) -> usize {
        self.inner.residual_count() + self.constraints.num_constraints()
    }

    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>> {
        let jac = self.inner.jacobian(params)?;
        let shifted = self.shifted(params);
        let factor = -(self.penalty / 2.0).sqrt();

        let mut rows = Array2::zeros((self.constraints.num_constraints(), params.len()));
        for (i, mut row) in rows.outer_iter_mut().enumerate() {
            if shifted[i] > 0.0 {
                row.assign(&(&self.constraints.a.row(i) * factor));
            }
        }
        concatenate(Axis(0), &[jac.view(), rows.view()])
            .map_err(|e| NStateError::DimensionMismatch(e.to_string()))
    }

    fn has_custom_jacobian(&self) -> bool {
        true
    }
}

/// Minimise a problem subject to `A.x >= b`.
///
/// # Arguments
///
/// * `problem` - The unconstrained least squares problem
/// * `constraints` - The linear constraints
/// * `x0` - The starting point
/// * `config` - The outer loop settings
/// * `solve` - Minimiser of each augmented subproblem
///
/// # Returns
///
/// * The constrained minimum with the evaluation counts summed over all subproblems
pub fn minimize<P, S>(
    problem: &P,
    constraints: &LinearConstraints,
    x0: Array1<f64>,
    config: &MultiplierConfig,
    solve: S,
) -> Result<Minimum>
where
    P: Problem,
    S: Fn(&AugmentedProblem<'_, P>, Array1<f64>) -> Result<Minimum>,
{
    let mut lambda = Array1::zeros(constraints.num_constraints());
    let mut penalty = config.initial_penalty;
    let mut x = x0;
    let mut total = Minimum {
        params: Array1::zeros(0),
        chi2: f64::NAN,
        iterations: 0,
        f_count: 0,
        g_count: 0,
        h_count: 0,
        converged: false,
        message: String::new(),
    };

    for outer in 0..config.max_outer_iterations {
        let augmented = AugmentedProblem::new(problem, constraints, lambda.clone(), penalty);
        let sub = solve(&augmented, x)?;
        total.iterations += sub.iterations;
        total.f_count += sub.f_count;
        total.g_count += sub.g_count;
        total.h_count += sub.h_count;
        x = sub.params;

        let c = constraints.values(&x);
        lambda = (&lambda - &(&c * penalty)).mapv(|v| v.max(0.0));
        let violation = constraints.max_violation(&x);
        log::debug!(
            "Multipliers outer iteration {}: penalty {:.1e}, violation {:.3e}",
            outer,
            penalty,
            violation
        );

        if !sub.converged {
            total.message = sub.message;
        } else if violation <= config.constraint_tol {
            total.converged = true;
            total.message = sub.message;
            break;
        }
        penalty = (penalty * config.penalty_factor).min(config.max_penalty);
    }

    if !total.converged && total.message.is_empty() {
        total.message = format!(
            "Constraints not satisfied after {} outer iterations",
            config.max_outer_iterations
        );
    }

    total.chi2 = problem.eval_cost(&x)?;
    total.f_count += 1;
    total.params = x;
    Ok(total)
}
