//! Dense linear solves for the optimiser steps.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};

use crate::error::{NStateError, Result};

/// Singular values below this fraction of the largest are discarded.
const SVD_RCOND: f64 = 1e-12;

/// Cholesky factorisation `A = L L^T` of a symmetric matrix.
///
/// # Returns
///
/// * The lower triangular factor, or `None` if `a` is not positive definite
pub fn cholesky(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::zeros((n, n));

    for k in 0..n {
        let mut diag = a[[k, k]];
        for j in 0..k {
            diag -= l[[k, j]] * l[[k, j]];
        }
        if diag <= 0.0 || !diag.is_finite() {
            return None;
        }
        let lkk = diag.sqrt();
        l[[k, k]] = lkk;

        for i in k + 1..n {
            let mut value = a[[i, k]];
            for j in 0..k {
                value -= l[[i, j]] * l[[k, j]];
            }
            l[[i, k]] = value / lkk;
        }
    }
    Some(l)
}

/// Solve `L L^T x = b` by forward and backward substitution.
pub fn cholesky_solve(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();
    let mut y = b.clone();
    for i in 0..n {
        for j in 0..i {
            y[i] -= l[[i, j]] * y[j];
        }
        y[i] /= l[[i, i]];
    }

    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        x[i] = y[i];
        for j in (i + 1)..n {
            x[i] -= l[[j, i]] * x[j];
        }
        x[i] /= l[[i, i]];
    }
    x
}

/// Least squares solution of `A x = b` via the SVD pseudo-inverse.
pub fn svd_solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let (m, n) = a.dim();
    let matrix = DMatrix::from_fn(m, n, |i, j| a[[i, j]]);
    let rhs = DVector::from_iterator(b.len(), b.iter().copied());

    let svd = matrix.svd(true, true);
    let max_sv = svd.singular_values.max();
    let solution = svd
        .solve(&rhs, (max_sv * SVD_RCOND).max(f64::MIN_POSITIVE))
        .map_err(|e| NStateError::Other(format!("SVD solve failed: {}", e)))?;

    Ok(solution.iter().copied().collect())
}

/// Solve the symmetric system `A x = b`.
///
/// Cholesky is tried first; indefinite or singular matrices fall back to the
/// SVD least squares solution.
pub fn solve_symmetric(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    match cholesky(a) {
        Some(l) => Ok(cholesky_solve(&l, b)),
        None => svd_solve(a, b),
    }
}
