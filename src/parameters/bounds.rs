//! Grid search bounds.

use serde::{Deserialize, Serialize};

use crate::error::{NStateError, Result};

/// Lower and upper bound of one parameter dimension of the grid search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    /// Create bounds, checking that `min <= max` and both are finite.
    ///
    /// # Arguments
    ///
    /// * `min` - Lower bound
    /// * `max` - Upper bound
    ///
    /// # Returns
    ///
    /// * The bounds, or `InvalidInput` for an empty or infinite interval
    pub fn new(min: f64, max: f64) -> Result<Self> {
        if !min.is_finite() || !max.is_finite() {
            return Err(NStateError::InvalidInput(format!(
                "Grid bounds must be finite, got [{}, {}]",
                min, max
            )));
        }
        if min > max {
            return Err(NStateError::InvalidInput(format!(
                "Invalid bounds: min ({}) must be less than max ({})",
                min, max
            )));
        }
        Ok(Self { min, max })
    }

    pub(crate) fn unchecked(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Bounds of `[-half_width, half_width]`.
    pub fn symmetric(half_width: f64) -> Self {
        Self {
            min: -half_width,
            max: half_width,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// The bounds divided by a scaling factor.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            min: self.min / factor,
            max: self.max / factor,
        }
    }

    /// `points` evenly spaced values from `min` to `max`.
    ///
    /// A single point sits at the lower bound.
    pub fn points(&self, points: usize) -> Vec<f64> {
        match points {
            0 => Vec::new(),
            1 => vec![self.min],
            n => {
                let step = (self.max - self.min) / (n - 1) as f64;
                (0..n).map(|i| self.min + step * i as f64).collect()
            }
        }
    }
}
