//! Options of the optimisation driver.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::lm::LmConfig;

/// The minimisation algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Algorithm {
    /// Levenberg-Marquardt on the residual vector.
    #[default]
    LevenbergMarquardt,
    /// Damped Newton on chi-squared with a backtracking line search.
    Newton,
}

/// Settings of the method of multipliers used for the population constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiplierConfig {
    /// Initial penalty parameter. Default: 1.0
    pub initial_penalty: f64,

    /// Factor applied to the penalty after each outer iteration. Default: 10.0
    pub penalty_factor: f64,

    /// Largest penalty parameter. Default: 1e12
    pub max_penalty: f64,

    /// Maximum number of outer iterations. Default: 20
    pub max_outer_iterations: usize,

    /// Largest tolerated constraint violation. Default: 1e-10
    pub constraint_tol: f64,
}

impl Default for MultiplierConfig {
    fn default() -> Self {
        Self {
            initial_penalty: 1.0,
            penalty_factor: 10.0,
            max_penalty: 1e12,
            max_outer_iterations: 20,
            constraint_tol: 1e-10,
        }
    }
}

/// Options of [`crate::optimise::minimise`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinimiseOptions {
    pub algorithm: Algorithm,

    /// Apply the population constraints. Forced on for the population model
    /// and off for the fixed model.
    pub constraints: bool,

    /// Apply the diagonal parameter scaling.
    pub scaling: bool,

    /// Function tolerance. Default: 1e-25
    pub func_tol: f64,

    /// Gradient tolerance, the optimiser's own default when `None`.
    pub grad_tol: Option<f64>,

    /// Maximum number of iterations. Default: 10000
    pub max_iterations: usize,

    pub lm: LmConfig,

    pub multipliers: MultiplierConfig,
}

impl Default for MinimiseOptions {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::default(),
            constraints: true,
            scaling: true,
            func_tol: 1e-25,
            grad_tol: None,
            max_iterations: 10000,
            lm: LmConfig::default(),
            multipliers: MultiplierConfig::default(),
        }
    }
}

impl MinimiseOptions {
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_constraints(mut self, constraints: bool) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_scaling(mut self, scaling: bool) -> Self {
        self.scaling = scaling;
        self
    }

    pub fn with_func_tol(mut self, func_tol: f64) -> Self {
        self.func_tol = func_tol;
        self
    }

    pub fn with_grad_tol(mut self, grad_tol: f64) -> Self {
        self.grad_tol = Some(grad_tol);
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_lm_config(mut self, lm: LmConfig) -> Self {
        self.lm = lm;
        self
    }

    /// The Levenberg-Marquardt configuration with the driver tolerances applied.
    pub(crate) fn lm_config(&self) -> LmConfig {
        let mut config = self.lm.clone();
        config.max_iterations = self.max_iterations;
        config.ftol = self.func_tol;
        if let Some(gtol) = self.grad_tol {
            config.gtol = gtol;
        }
        config
    }

    /// Load options from a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Options of [`crate::optimise::grid_search`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridOptions {
    /// Number of lattice points per dimension. Default: 11
    pub inc: usize,

    /// Lower bounds in model space, the layout defaults when `None`.
    pub lower: Option<Vec<f64>>,

    /// Upper bounds in model space, the layout defaults when `None`.
    pub upper: Option<Vec<f64>>,

    /// Skip lattice points violating the population constraints.
    pub constraints: bool,
}

impl Default for GridOptions {
    fn default() -> Self {
        Self {
            inc: 11,
            lower: None,
            upper: None,
            constraints: true,
        }
    }
}

impl GridOptions {
    pub fn with_inc(mut self, inc: usize) -> Self {
        self.inc = inc;
        self
    }

    pub fn with_bounds(mut self, lower: Vec<f64>, upper: Vec<f64>) -> Self {
        self.lower = Some(lower);
        self.upper = Some(upper);
        self
    }

    pub fn with_constraints(mut self, constraints: bool) -> Self {
        self.constraints = constraints;
        self
    }
}
