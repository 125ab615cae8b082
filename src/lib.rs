//! # nstate-rs
//!
//! `nstate-rs` optimises N-state models of molecular ensembles against NMR
//! data: residual dipolar couplings (RDCs), pseudo-contact shifts (PCSs) and
//! alignment tensors.
//!
//! The library provides:
//! - A data pipe holding spins, alignment tensors and the model state
//! - The population, fixed and 2-domain N-state models and their parameter vector layouts
//! - The chi-squared target function with back-calculation of the data
//! - Levenberg-Marquardt and Newton minimisation, linear population
//!   constraints by the method of multipliers, and grid searches
//! - Monte Carlo simulations for parameter errors
//!
//! ## Basic Usage
//!
//! ```no_run
//! use nstate_rs::{minimise, DataPipe, MinimiseOptions, Warnings};
//!
//! # fn main() -> nstate_rs::Result<()> {
//! let mut pipe = DataPipe::new();
//! let mut warnings = Warnings::new();
//! pipe.select_model("population", &mut warnings)?;
//! // ... load spins, bond vectors and RDCs ...
//! let outcome = minimise(&mut pipe, &MinimiseOptions::default(), None)?;
//! if let Some(stats) = outcome.stats {
//!     println!("chi2 = {}", stats.chi2);
//! }
//! # Ok(())
//! # }
//! ```

pub mod alignment;
pub mod constants;
pub mod data;
pub mod error;
pub mod lm;
pub mod optimise;
pub mod parameters;
pub mod pipe;
pub mod problem;
pub mod target;
pub mod uncertainty;
pub mod utils;
pub mod warnings;

// Re-exports for convenience
pub use error::{NStateError, Result};
pub use lm::LevenbergMarquardt;
pub use optimise::{calculate, grid_search, minimise, GridOptions, MinimiseOptions};
pub use pipe::DataPipe;
pub use problem::Problem;
pub use target::NStateTarget;
pub use uncertainty::{monte_carlo, MonteCarloConfig};
pub use warnings::{Warning, Warnings};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
