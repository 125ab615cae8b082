//! Diagonal parameter scaling.

use ndarray::Array1;

use super::bounds::Bounds;
use super::layout::ParamLayout;

/// A diagonal scaling matrix stored as its diagonal.
///
/// The optimiser works on `x_scaled = x / s` so that all parameters are of
/// similar magnitude.
#[derive(Debug, Clone, PartialEq)]
pub struct Scaling {
    factors: Array1<f64>,
}

impl Scaling {
    /// The scaling of a layout, or the identity when scaling is disabled.
    pub fn new(layout: &ParamLayout, enabled: bool) -> Self {
        if enabled {
            Self {
                factors: layout.scaling_factors(),
            }
        } else {
            Self::identity(layout.param_num())
        }
    }

    pub fn identity(n: usize) -> Self {
        Self {
            factors: Array1::ones(n),
        }
    }

    pub fn factors(&self) -> &Array1<f64> {
        &self.factors
    }

    /// Model space to scaled space.
    pub fn scale(&self, x: &Array1<f64>) -> Array1<f64> {
        x / &self.factors
    }

    /// Scaled space to model space.
    pub fn unscale(&self, x: &Array1<f64>) -> Array1<f64> {
        x * &self.factors
    }

    /// Grid bounds in scaled space.
    pub fn scale_bounds(&self, bounds: &[Bounds]) -> Vec<Bounds> {
        bounds
            .iter()
            .zip(self.factors.iter())
            .map(|(b, s)| b.scaled(*s))
            .collect()
    }
}
