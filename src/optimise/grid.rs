//! Exhaustive lattice search.

use ndarray::Array1;

use crate::error::{NStateError, Result};
use crate::parameters::Bounds;

/// The best lattice point found.
#[derive(Debug, Clone, PartialEq)]
pub struct GridPoint {
    pub params: Array1<f64>,
    pub chi2: f64,
    /// Number of target function evaluations.
    pub evaluations: usize,
}

/// Search a rectangular lattice over some dimensions of a parameter vector.
///
/// The remaining dimensions keep their values from `base`. Points rejected by
/// `feasible` are not evaluated.
///
/// # Arguments
///
/// * `f` - The target function
/// * `base` - The starting vector, also providing the values of unsearched dimensions
/// * `dims` - The searched dimensions
/// * `bounds` - The bounds of each searched dimension
/// * `inc` - Number of points per dimension
/// * `feasible` - Filter on lattice points
///
/// # Returns
///
/// * The lowest chi-squared point, or `ConvergenceFailure` when no point was feasible
pub fn search<F, C>(
    f: F,
    base: &Array1<f64>,
    dims: &[usize],
    bounds: &[Bounds],
    inc: usize,
    feasible: C,
) -> Result<GridPoint>
where
    F: Fn(&Array1<f64>) -> Result<f64>,
    C: Fn(&Array1<f64>) -> bool,
{
    if dims.len() != bounds.len() {
        return Err(NStateError::DimensionMismatch(format!(
            "{} grid dimensions but {} bounds",
            dims.len(),
            bounds.len()
        )));
    }
    if inc == 0 {
        return Err(NStateError::InvalidInput(
            "The number of grid increments must be positive".to_string(),
        ));
    }

    let axes: Vec<Vec<f64>> = bounds.iter().map(|b| b.points(inc)).collect();
    let mut counter = vec![0usize; dims.len()];
    let mut point = base.clone();
    let mut best: Option<(Array1<f64>, f64)> = None;
    let mut evaluations = 0;

    loop {
        for (k, &d) in dims.iter().enumerate() {
            point[d] = axes[k][counter[k]];
        }

        if feasible(&point) {
            let chi2 = f(&point)?;
            evaluations += 1;
            let better = match &best {
                Some((_, current)) => chi2 < *current,
                None => !chi2.is_nan(),
            };
            if better {
                best = Some((point.clone(), chi2));
            }
        }

        // Odometer increment, first dimension fastest.
        let mut k = 0;
        loop {
            if k == dims.len() {
                return best
                    .map(|(params, chi2)| GridPoint {
                        params,
                        chi2,
                        evaluations,
                    })
                    .ok_or_else(|| {
                        NStateError::ConvergenceFailure("No feasible grid point was found".to_string())
                    });
            }
            counter[k] += 1;
            if counter[k] < inc {
                break;
            }
            counter[k] = 0;
            k += 1;
        }
    }
}
