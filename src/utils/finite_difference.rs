//! Finite difference methods for numerical differentiation.
//!
//! Used where analytic derivatives are not available: the Euler angle and
//! paramagnetic centre columns of the Jacobian, and the chi-squared Hessian.

use ndarray::{Array1, Array2};

use crate::error::{NStateError, Result};
use crate::problem::Problem;

/// Default relative step size for first derivatives.
pub const DEFAULT_EPSILON: f64 = 1e-7;

/// Default relative step size for second derivatives.
pub const DEFAULT_HESSIAN_EPSILON: f64 = 1e-4;

/// Step size adapted to the parameter scale.
fn step(value: f64, eps: f64) -> f64 {
    if value.abs() > 1.0 {
        value.abs() * eps
    } else {
        eps
    }
}

/// Compute the Jacobian matrix using forward finite differences.
///
/// # Arguments
///
/// * `problem` - The problem to evaluate
/// * `params` - The parameter values at which to evaluate the Jacobian
/// * `epsilon` - The step size for finite differences (optional)
///
/// # Returns
///
/// * `Result<Array2<f64>>` - The Jacobian matrix
pub fn jacobian(
    problem: &dyn Problem,
    params: &Array1<f64>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>> {
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON);
    let n_residuals = problem.residual_count();

    let residuals = problem.eval(params)?;
    if residuals.len() != n_residuals {
        return Err(NStateError::DimensionMismatch(format!(
            "Expected {} residuals, got {}",
            n_residuals,
            residuals.len()
        )));
    }

    let mut jac = Array2::zeros((n_residuals, params.len()));
    for j in 0..params.len() {
        let h = step(params[j], eps);
        let mut perturbed = params.clone();
        perturbed[j] += h;

        let forward = problem.eval(&perturbed)?;
        jac.column_mut(j).assign(&((&forward - &residuals) / h));
    }

    Ok(jac)
}

/// Fill selected columns of a Jacobian using central differences.
///
/// # Arguments
///
/// * `f` - The residual function
/// * `params` - The parameter values
/// * `columns` - The parameter indices to differentiate
/// * `jac` - The Jacobian, whose other columns are left untouched
/// * `epsilon` - The step size (optional)
pub fn jacobian_columns<F>(
    f: F,
    params: &Array1<f64>,
    columns: &[usize],
    jac: &mut Array2<f64>,
    epsilon: Option<f64>,
) -> Result<()>
where
    F: Fn(&Array1<f64>) -> Result<Array1<f64>>,
{
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON);

    for &j in columns {
        let h = step(params[j], eps);
        let mut forward = params.clone();
        let mut backward = params.clone();
        forward[j] += h;
        backward[j] -= h;

        let diff = (f(&forward)? - f(&backward)?) / (2.0 * h);
        jac.column_mut(j).assign(&diff);
    }
    Ok(())
}

/// Compute the gradient of a scalar function using central finite differences.
pub fn gradient<F>(f: F, params: &Array1<f64>, epsilon: Option<f64>) -> Result<Array1<f64>>
where
    F: Fn(&Array1<f64>) -> Result<f64>,
{
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON);
    let mut grad = Array1::zeros(params.len());

    for j in 0..params.len() {
        let h = step(params[j], eps);
        let mut forward = params.clone();
        let mut backward = params.clone();
        forward[j] += h;
        backward[j] -= h;

        grad[j] = (f(&forward)? - f(&backward)?) / (2.0 * h);
    }

    Ok(grad)
}

/// Compute the Hessian matrix using central finite differences.
///
/// # Arguments
///
/// * `f` - The function to differentiate
/// * `params` - The parameter values at which to evaluate the Hessian
/// * `epsilon` - The step size for finite differences (optional)
///
/// # Returns
///
/// * `Result<Array2<f64>>` - The symmetric Hessian matrix
pub fn hessian<F>(f: F, params: &Array1<f64>, epsilon: Option<f64>) -> Result<Array2<f64>>
where
    F: Fn(&Array1<f64>) -> Result<f64>,
{
    let eps = epsilon.unwrap_or(DEFAULT_HESSIAN_EPSILON);
    let n = params.len();
    let mut hess = Array2::zeros((n, n));
    let f0 = f(params)?;

    let shifted = |moves: &[(usize, f64)]| -> Result<f64> {
        let mut p = params.clone();
        for &(i, h) in moves {
            p[i] += h;
        }
        f(&p)
    };

    for i in 0..n {
        let hi = step(params[i], eps);

        let f_pp = shifted(&[(i, hi)])?;
        let f_mm = shifted(&[(i, -hi)])?;
        hess[[i, i]] = (f_pp - 2.0 * f0 + f_mm) / (hi * hi);

        for j in 0..i {
            let hj = step(params[j], eps);
            let f_pp = shifted(&[(i, hi), (j, hj)])?;
            let f_pm = shifted(&[(i, hi), (j, -hj)])?;
            let f_mp = shifted(&[(i, -hi), (j, hj)])?;
            let f_mm = shifted(&[(i, -hi), (j, -hj)])?;

            hess[[i, j]] = (f_pp - f_pm - f_mp + f_mm) / (4.0 * hi * hj);
            hess[[j, i]] = hess[[i, j]];
        }
    }

    Ok(hess)
}
