//! Levenberg-Marquardt algorithm implementation.
//!
//! This module provides the Levenberg-Marquardt algorithm for nonlinear
//! least-squares optimization. The N-state target is a sum of squared
//! residuals, so this is the default optimiser of the crate.

pub mod algorithm;
pub mod config;

pub use algorithm::{LevenbergMarquardt, LmResult};
pub use config::LmConfig;
