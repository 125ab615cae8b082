//! The 5-component alignment tensor.

use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{NStateError, Result};

/// Names of the five independent tensor components, in vector order.
pub const TENSOR_COMPONENT_NAMES: [&str; 5] = ["Axx", "Ayy", "Axy", "Axz", "Ayz"];

/// The five independent elements of a symmetric, traceless 3x3 alignment tensor.
///
/// The remaining elements follow from symmetry and `Azz = -Axx - Ayy`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TensorComponents {
    pub axx: f64,
    pub ayy: f64,
    pub axy: f64,
    pub axz: f64,
    pub ayz: f64,
}

impl TensorComponents {
    pub fn new(axx: f64, ayy: f64, axy: f64, axz: f64, ayz: f64) -> Self {
        Self {
            axx,
            ayy,
            axy,
            axz,
            ayz,
        }
    }

    /// Build the components from a slice of exactly five values.
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        if values.len() != 5 {
            return Err(NStateError::DimensionMismatch(format!(
                "An alignment tensor has 5 components, got {}",
                values.len()
            )));
        }
        Ok(Self::new(values[0], values[1], values[2], values[3], values[4]))
    }

    /// The components in the order Axx, Ayy, Axy, Axz, Ayz.
    pub fn to_array(&self) -> [f64; 5] {
        [self.axx, self.ayy, self.axy, self.axz, self.ayz]
    }

    /// The full symmetric traceless matrix.
    pub fn to_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.axx,
            self.axy,
            self.axz,
            self.axy,
            self.ayy,
            self.ayz,
            self.axz,
            self.ayz,
            -self.axx - self.ayy,
        )
    }

    /// Extract the five independent elements of a matrix.
    ///
    /// Only the upper triangle and the two leading diagonal elements are read.
    pub fn from_matrix(matrix: &Matrix3<f64>) -> Self {
        Self::new(
            matrix[(0, 0)],
            matrix[(1, 1)],
            matrix[(0, 1)],
            matrix[(0, 2)],
            matrix[(1, 2)],
        )
    }

    /// The projection `v^T A v` of the tensor onto a unit vector.
    pub fn projection(&self, v: &Vector3<f64>) -> f64 {
        let g = Self::projection_gradient(v);
        self.to_array().iter().zip(g.iter()).map(|(a, b)| a * b).sum()
    }

    /// The partial derivatives of `v^T A v` with respect to the five components.
    ///
    /// The projection is linear in the components, so these are the
    /// coefficients `[x^2 - z^2, y^2 - z^2, 2xy, 2xz, 2yz]`.
    pub fn projection_gradient(v: &Vector3<f64>) -> [f64; 5] {
        let (x, y, z) = (v.x, v.y, v.z);
        [
            x * x - z * z,
            y * y - z * z,
            2.0 * x * y,
            2.0 * x * z,
            2.0 * y * z,
        ]
    }

    /// The principal values ordered so that `|Axx| <= |Ayy| <= |Azz|`.
    pub fn principal_values(&self) -> [f64; 3] {
        let eigen = SymmetricEigen::new(self.to_matrix());
        let mut values = [
            eigen.eigenvalues[0],
            eigen.eigenvalues[1],
            eigen.eigenvalues[2],
        ];
        values.sort_by(|a, b| {
            a.abs()
                .partial_cmp(&b.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        values
    }
}

/// Metadata of an alignment tensor held in the data pipe.
///
/// The component values themselves live in the model state so that the
/// primary values and each Monte Carlo slot can be packed and unpacked in the
/// same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignTensor {
    /// The alignment identifier this tensor belongs to.
    pub id: String,

    /// Optional domain label (used by the 2-domain model).
    pub domain: Option<String>,

    /// Fixed tensors are excluded from the parameter vector.
    pub fixed: bool,

    /// Reduced tensors are linear reductions of a full tensor.
    pub reduced: bool,

    /// Component errors, if known.
    pub errors: Option<TensorComponents>,
}

impl AlignTensor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            domain: None,
            fixed: false,
            reduced: false,
            errors: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_fixed(mut self, fixed: bool) -> Self {
        self.fixed = fixed;
        self
    }

    pub fn with_reduced(mut self, reduced: bool) -> Self {
        self.reduced = reduced;
        self
    }

    pub fn with_errors(mut self, errors: TensorComponents) -> Self {
        self.errors = Some(errors);
        self
    }
}
