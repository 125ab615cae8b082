//! Linear inequality constraints on the population parameters.
//!
//! Constraints are written as `A.x >= b` in the scaled parameter space:
//!
//! ```text
//!   p_i >= 0
//!  -p_i >= -1
//!  -sum(p_i) >= -1
//!   sum(p_i) >= 0
//! ```

use ndarray::{s, Array1, Array2};

use super::layout::{ParamKind, ParamLayout};
use super::scaling::Scaling;

/// The constraint matrix and right hand side of `A.x >= b`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraints {
    pub a: Array2<f64>,
    pub b: Array1<f64>,
}

impl LinearConstraints {
    /// Build the population constraints for a layout.
    ///
    /// # Returns
    ///
    /// * `None` when the layout has no population parameters
    pub fn populations(layout: &ParamLayout, scaling: &Scaling) -> Option<Self> {
        let start = layout.offset(ParamKind::Populations)?;
        let count = layout.n_states - 1;
        let n = layout.param_num();
        let factors = scaling.factors().slice(s![start..start + count]);

        let rows = 2 * count + 2;
        let mut a = Array2::zeros((rows, n));
        let mut b = Array1::zeros(rows);

        for i in 0..count {
            // p_i >= 0
            a[[2 * i, start + i]] = 1.0;

            // -p_i >= -1
            a[[2 * i + 1, start + i]] = -1.0;
            b[2 * i + 1] = -1.0 / factors[i];
        }

        // The sum of the free populations, in model space.
        for i in 0..count {
            a[[2 * count, start + i]] = -factors[i];
            a[[2 * count + 1, start + i]] = factors[i];
        }
        b[2 * count] = -1.0;

        Some(Self { a, b })
    }

    pub fn num_constraints(&self) -> usize {
        self.b.len()
    }

    /// The constraint values `A.x - b`, non-negative when satisfied.
    pub fn values(&self, x: &Array1<f64>) -> Array1<f64> {
        self.a.dot(x) - &self.b
    }

    /// Whether every constraint holds within `tol`.
    pub fn is_satisfied(&self, x: &Array1<f64>, tol: f64) -> bool {
        self.values(x).iter().all(|&c| c >= -tol)
    }

    /// The largest violation, zero for a feasible point.
    pub fn max_violation(&self, x: &Array1<f64>) -> f64 {
        self.values(x).iter().fold(0.0, |acc, &c| acc.max(-c))
    }
}

/// Project the populations of a model space vector onto the feasible set.
///
/// Each population is clipped to `[0, 1]` and when the sum exceeds one the
/// vector is projected onto the simplex `sum(p) = 1`.
pub fn project_populations(x: &mut Array1<f64>, layout: &ParamLayout) {
    let Some(start) = layout.offset(ParamKind::Populations) else {
        return;
    };
    let count = layout.n_states - 1;
    let mut pops = x.slice_mut(s![start..start + count]);

    pops.mapv_inplace(|p| p.clamp(0.0, 1.0));
    if pops.sum() <= 1.0 {
        return;
    }

    let mut sorted: Vec<f64> = pops.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    let mut cumulative = 0.0;
    let mut theta = 0.0;
    for (k, &u) in sorted.iter().enumerate() {
        cumulative += u;
        let t = (cumulative - 1.0) / (k + 1) as f64;
        if u - t > 0.0 {
            theta = t;
        }
    }
    pops.mapv_inplace(|p| (p - theta).max(0.0));
}
