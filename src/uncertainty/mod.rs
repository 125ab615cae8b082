//! # Uncertainty Calculation
//!
//! Parameter errors of the N-state model are estimated by Monte Carlo
//! simulation. A full run is:
//!
//! 1. [`setup`] the simulation slots
//! 2. [`create_data`] to randomise the back-calculated data
//! 3. [`sim_init_values`] to start every simulation from the primary fit
//! 4. [`run`] to optimise each simulation
//! 5. [`error_analysis`] to turn the spread of the simulations into errors
//!
//! [`monte_carlo`] is a shorthand for all five steps.

mod monte_carlo;

pub use monte_carlo::{
    create_data, error_analysis, run, run_simulation, setup, sim_init_values, sim_return_chi2,
    sim_return_param, sim_rng, turn_off, FailurePolicy, MonteCarloConfig, MonteCarloSummary,
};

use crate::error::Result;
use crate::pipe::DataPipe;

/// Run a complete Monte Carlo error analysis.
///
/// # Arguments
///
/// * `pipe` - The data pipe holding an optimised primary fit
/// * `config` - The Monte Carlo configuration
///
/// # Returns
///
/// * The run summary, the errors are stored in `pipe.errors`
pub fn monte_carlo(pipe: &mut DataPipe, config: &MonteCarloConfig) -> Result<MonteCarloSummary> {
    setup(pipe, config.number)?;
    let warnings = create_data(pipe, config.seed)?;
    sim_init_values(pipe)?;
    let mut summary = run(pipe, config)?;
    summary.warnings.extend(warnings);
    error_analysis(pipe)?;
    Ok(summary)
}
