//! # Monte Carlo Simulations
//!
//! Parameter errors are estimated by re-optimising the model against
//! synthetic data sets: the back-calculated data of the primary fit randomised
//! by Gaussian noise with the measured errors as standard deviation.
//!
//! Each simulation is an independent unit of work. [`run_simulation`] only
//! reads the data pipe and returns the contents of its own slot, and every
//! simulation draws its noise from a generator seeded by its index, so the
//! results do not depend on the order (or the threads) in which simulations
//! run.

use nalgebra::Vector3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::alignment::TensorComponents;
use crate::data::{base_data_types, tensor::DEFAULT_TENSOR_ERROR, uses_align_data, DataType};
use crate::error::{NStateError, Result};
use crate::optimise::{self, GridOptions, MinimiseOptions};
use crate::parameters::ParamLayout;
use crate::pipe::{DataClass, DataPipe, ModelState, SimSlot, SimStore};
use crate::target::NStateTarget;
use crate::warnings::Warnings;

/// What happens when one simulation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Stop at the first failed simulation and return its error.
    #[default]
    Abort,
    /// Record the error in the simulation's slot and continue.
    Record,
}

/// Configuration of a Monte Carlo run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    /// Number of simulations. Default: 500
    pub number: usize,

    /// Base seed, simulation `i` uses `seed + i`. Default: 0
    pub seed: u64,

    /// Run the simulations on the rayon thread pool. Default: true
    pub parallel: bool,

    /// Grid search each simulation with this many increments before minimising.
    pub grid_inc: Option<usize>,

    pub failure: FailurePolicy,

    pub minimise: MinimiseOptions,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            number: 500,
            seed: 0,
            parallel: true,
            grid_inc: None,
            failure: FailurePolicy::Abort,
            minimise: MinimiseOptions::default(),
        }
    }
}

impl MonteCarloConfig {
    pub fn with_number(mut self, number: usize) -> Self {
        self.number = number;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_grid_inc(mut self, inc: usize) -> Self {
        self.grid_inc = Some(inc);
        self
    }

    pub fn with_failure_policy(mut self, failure: FailurePolicy) -> Self {
        self.failure = failure;
        self
    }

    pub fn with_minimise_options(mut self, options: MinimiseOptions) -> Self {
        self.minimise = options;
        self
    }
}

/// Summary of a Monte Carlo run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonteCarloSummary {
    /// Simulations optimised successfully.
    pub completed: usize,
    /// Simulations skipped because the model has no parameters.
    pub skipped: usize,
    /// Failed simulations and their errors, when failures are recorded.
    pub failed: Vec<(usize, String)>,
    pub warnings: Warnings,
}

fn sim_store(pipe: &DataPipe) -> Result<&SimStore> {
    pipe.sim
        .as_ref()
        .ok_or_else(|| NStateError::Config("Monte Carlo simulations have not been set up".to_string()))
}

/// The generator of one simulation.
pub fn sim_rng(seed: u64, index: usize) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed.wrapping_add(index as u64))
}

/// Allocate `number` simulation slots, each starting from the current model state.
///
/// Any previous simulation data is discarded.
pub fn setup(pipe: &mut DataPipe, number: usize) -> Result<()> {
    if number == 0 {
        return Err(NStateError::InvalidInput(
            "The number of Monte Carlo simulations must be positive".to_string(),
        ));
    }
    for spin in &mut pipe.spins {
        spin.rdc_sim.clear();
        spin.pcs_sim.clear();
    }
    pipe.sim = Some(SimStore::new(number, &pipe.state));
    log::info!("Set up {} Monte Carlo simulations", number);
    Ok(())
}

/// One randomised data source: the back-calculated value and its noise.
struct NoiseSource {
    spin: usize,
    class: DataClass,
    align_id: String,
    value: f64,
    noise: Normal<f64>,
}

fn normal(error: f64, what: &str) -> Result<Normal<f64>> {
    Normal::new(0.0, error)
        .map_err(|e| NStateError::InvalidInput(format!("Invalid error {} of {}: {}", error, what, e)))
}

/// Create the simulated data sets.
///
/// RDCs and PCSs are back-calculated first if needed, reduced alignment
/// tensors are back-calculated from the current model.
///
/// # Arguments
///
/// * `pipe` - The data pipe with simulations set up
/// * `seed` - The base seed of the per-simulation generators
///
/// # Returns
///
/// * The warnings of the back-calculation, or `MissingAttribute` when a datum has no error
pub fn create_data(pipe: &mut DataPipe, seed: u64) -> Result<Warnings> {
    let number = sim_store(pipe)?.number;
    let types = base_data_types(pipe)?;
    let mut warnings = Warnings::new();

    let missing_bc = pipe.spins.iter().filter(|s| s.select).any(|s| {
        s.rdc.keys().any(|id| !s.rdc_bc.contains_key(id)) || s.pcs.keys().any(|id| !s.pcs_bc.contains_key(id))
    });
    if uses_align_data(&types) && missing_bc {
        warnings.extend(optimise::calculate(pipe, None)?.warnings);
    }

    let mut sources = Vec::new();
    for (k, spin) in pipe.spins.iter().enumerate().filter(|(_, s)| s.select) {
        for class in spin.data_classes() {
            let (values, errors, bc) = match class {
                DataClass::Rdc => (&spin.rdc, &spin.rdc_err, &spin.rdc_bc),
                DataClass::Pcs => (&spin.pcs, &spin.pcs_err, &spin.pcs_bc),
            };
            for id in values.keys() {
                // Spins skipped during assembly have nothing to randomise.
                let Some(&value) = bc.get(id) else {
                    continue;
                };
                let error = errors.get(id).copied().ok_or_else(|| {
                    NStateError::MissingAttribute(format!(
                        "The {:?} error of spin '{}' for the alignment '{}' is not set",
                        class, spin.id, id
                    ))
                })?;
                sources.push(NoiseSource {
                    spin: k,
                    class,
                    align_id: id.clone(),
                    value,
                    noise: normal(error, &spin.id)?,
                });
            }
        }
    }

    let mut tensor_sources = Vec::new();
    if types.contains(&DataType::Tensor) {
        let target = NStateTarget::new(pipe, None, true, &mut warnings)?;
        let x = target.scaling().scale(&target.layout().pack(&pipe.state));
        for (index, components) in target.back_calculate(&x)?.tensors {
            let errors = pipe.align_tensors[index]
                .errors
                .map(|e| e.to_array())
                .unwrap_or([DEFAULT_TENSOR_ERROR; 5]);
            let noise = errors
                .iter()
                .map(|&e| normal(e, &pipe.align_tensors[index].id))
                .collect::<Result<Vec<_>>>()?;
            tensor_sources.push((index, components.to_array(), noise));
        }
    }

    let mut simulated = vec![Vec::with_capacity(number); sources.len()];
    let mut simulated_tensors = vec![Vec::with_capacity(number); tensor_sources.len()];
    for i in 0..number {
        let mut rng = sim_rng(seed, i);
        for (source, sims) in sources.iter().zip(simulated.iter_mut()) {
            sims.push(source.value + source.noise.sample(&mut rng));
        }
        for ((_, values, noise), sims) in tensor_sources.iter().zip(simulated_tensors.iter_mut()) {
            let sample: Vec<f64> = values
                .iter()
                .zip(noise)
                .map(|(v, n)| v + n.sample(&mut rng))
                .collect();
            sims.push(TensorComponents::from_slice(&sample)?);
        }
    }

    for (source, sims) in sources.into_iter().zip(simulated) {
        let spin = &mut pipe.spins[source.spin];
        let target = match source.class {
            DataClass::Rdc => &mut spin.rdc_sim,
            DataClass::Pcs => &mut spin.pcs_sim,
        };
        target.insert(source.align_id, sims);
    }
    for ((index, _, _), sims) in tensor_sources.into_iter().zip(simulated_tensors) {
        for (i, tensor) in sims.into_iter().enumerate() {
            pipe.sim_slot_mut(i)?.state.tensors[index] = tensor;
        }
    }

    log::info!("Created {} simulated data sets", number);
    Ok(warnings)
}

/// Reset every simulation's parameters to the values of the primary fit.
///
/// Reduced tensors are data rather than parameters and keep their simulated values.
pub fn sim_init_values(pipe: &mut DataPipe) -> Result<()> {
    let reduced: Vec<usize> = pipe
        .align_tensors
        .iter()
        .enumerate()
        .filter(|(_, t)| t.reduced)
        .map(|(i, _)| i)
        .collect();
    let primary = pipe.state.clone();

    let store = pipe
        .sim
        .as_mut()
        .ok_or_else(|| NStateError::Config("Monte Carlo simulations have not been set up".to_string()))?;
    for slot in &mut store.slots {
        let mut state = primary.clone();
        for &i in &reduced {
            if let (Some(target), Some(sim)) = (state.tensors.get_mut(i), slot.state.tensors.get(i)) {
                *target = *sim;
            }
        }
        *slot = SimSlot::new(state);
    }
    Ok(())
}

/// Optimise one simulation.
///
/// The pipe is only read. The returned slot holds the optimised state and its
/// statistics, ready to be written to the simulation's position.
///
/// # Arguments
///
/// * `pipe` - The data pipe with simulated data
/// * `index` - The simulation index
/// * `config` - The Monte Carlo configuration
pub fn run_simulation(pipe: &DataPipe, index: usize, config: &MonteCarloConfig) -> Result<(SimSlot, Warnings)> {
    log::debug!("Monte Carlo simulation {}", index);
    let mut warnings = Warnings::new();
    let mut start = pipe.state(Some(index))?.clone();

    if let Some(inc) = config.grid_inc {
        let grid = GridOptions::default()
            .with_inc(inc)
            .with_constraints(config.minimise.constraints);
        let (fit, grid_warnings) = optimise::grid_search_state(pipe, Some(index), &grid)?;
        warnings.extend(grid_warnings);
        if let Some(fit) = fit {
            start = fit.state;
        }
    }

    let (fit, fit_warnings) = optimise::optimise_from(pipe, Some(index), &start, &config.minimise)?;
    warnings.extend(fit_warnings);

    let slot = match fit {
        Some(fit) => SimSlot {
            state: fit.state,
            stats: Some(fit.stats),
            failure: None,
        },
        None => SimSlot::new(start),
    };
    Ok((slot, warnings))
}

/// Optimise all selected simulations and store the results in their slots.
///
/// # Arguments
///
/// * `pipe` - The data pipe with simulated data and initialised values
/// * `config` - The Monte Carlo configuration
///
/// # Returns
///
/// * The run summary, or the error of the first failed simulation under [`FailurePolicy::Abort`]
pub fn run(pipe: &mut DataPipe, config: &MonteCarloConfig) -> Result<MonteCarloSummary> {
    let indices: Vec<usize> = sim_store(pipe)?.selected().collect();
    log::info!("Running {} Monte Carlo simulations", indices.len());

    let shared: &DataPipe = pipe;
    let results: Vec<(usize, Result<(SimSlot, Warnings)>)> = if config.parallel {
        run_indices_parallel(shared, &indices, config)
    } else {
        indices
            .iter()
            .map(|&i| (i, run_simulation(shared, i, config)))
            .collect()
    };

    let mut summary = MonteCarloSummary::default();
    for (i, result) in results {
        match result {
            Ok((slot, warnings)) => {
                if slot.stats.is_some() {
                    summary.completed += 1;
                } else {
                    summary.skipped += 1;
                }
                summary.warnings.extend(warnings);
                *pipe.sim_slot_mut(i)? = slot;
            }
            Err(e) => match config.failure {
                FailurePolicy::Abort => return Err(e),
                FailurePolicy::Record => {
                    log::warn!("Monte Carlo simulation {} failed: {}", i, e);
                    let slot = pipe.sim_slot_mut(i)?;
                    slot.stats = None;
                    slot.failure = Some(e.to_string());
                    summary.failed.push((i, e.to_string()));
                }
            },
        }
    }

    Ok(summary)
}

#[cfg(feature = "parallel")]
fn run_indices_parallel(
    pipe: &DataPipe,
    indices: &[usize],
    config: &MonteCarloConfig,
) -> Vec<(usize, Result<(SimSlot, Warnings)>)> {
    indices
        .par_iter()
        .map(|&i| (i, run_simulation(pipe, i, config)))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn run_indices_parallel(
    pipe: &DataPipe,
    indices: &[usize],
    config: &MonteCarloConfig,
) -> Vec<(usize, Result<(SimSlot, Warnings)>)> {
    indices
        .iter()
        .map(|&i| (i, run_simulation(pipe, i, config)))
        .collect()
}

/// Sample standard deviation, `None` for fewer than two values.
fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}

/// Standard deviation of optional per-state values over the simulations.
fn std_dev_optional(slots: &[&ModelState], get: impl Fn(&ModelState) -> &Vec<Option<f64>>) -> Vec<Option<f64>> {
    let len = slots.first().map(|s| get(s).len()).unwrap_or(0);
    (0..len)
        .map(|c| {
            let values: Option<Vec<f64>> = slots.iter().map(|s| get(s).get(c).copied().flatten()).collect();
            values.and_then(|v| std_dev(&v))
        })
        .collect()
}

/// Estimate the parameter errors from the selected simulations.
///
/// The errors are stored in the pipe as a model state holding the sample
/// standard deviations.
pub fn error_analysis(pipe: &mut DataPipe) -> Result<()> {
    let store = sim_store(pipe)?;
    let slots: Vec<&ModelState> = store
        .selected()
        .filter(|&i| store.slots[i].failure.is_none())
        .map(|i| &store.slots[i].state)
        .collect();
    if slots.len() < 2 {
        return Err(NStateError::InvalidInput(format!(
            "At least 2 successful simulations are needed for the error analysis, got {}",
            slots.len()
        )));
    }

    let n_tensors = slots[0].tensors.len();
    let tensors = (0..n_tensors)
        .map(|t| {
            let mut errors = [0.0; 5];
            for (m, error) in errors.iter_mut().enumerate() {
                let values: Vec<f64> = slots.iter().map(|s| s.tensors[t].to_array()[m]).collect();
                *error = std_dev(&values).unwrap_or(0.0);
            }
            TensorComponents::from_slice(&errors)
        })
        .collect::<Result<Vec<_>>>()?;

    let centres: Option<Vec<Vector3<f64>>> = slots.iter().map(|s| s.paramagnetic_centre).collect();
    let paramagnetic_centre = centres.and_then(|c| {
        let axis = |k: usize| std_dev(&c.iter().map(|v| v[k]).collect::<Vec<_>>());
        Some(Vector3::new(axis(0)?, axis(1)?, axis(2)?))
    });

    let errors = ModelState {
        probs: std_dev_optional(&slots, |s| &s.probs),
        alpha: std_dev_optional(&slots, |s| &s.alpha),
        beta: std_dev_optional(&slots, |s| &s.beta),
        gamma: std_dev_optional(&slots, |s| &s.gamma),
        tensors,
        paramagnetic_centre,
    };
    pipe.errors = Some(errors);
    Ok(())
}

/// The values of one parameter of the layout across all simulations.
///
/// # Arguments
///
/// * `pipe` - The data pipe
/// * `index` - The position of the parameter in the parameter vector
pub fn sim_return_param(pipe: &DataPipe, index: usize) -> Result<Vec<f64>> {
    let types = base_data_types(pipe)?;
    let layout = ParamLayout::new(pipe, &types)?;
    if index >= layout.param_num() {
        return Err(NStateError::InvalidInput(format!(
            "The parameter index {} is out of range, the model has {} parameters",
            index,
            layout.param_num()
        )));
    }
    Ok(sim_store(pipe)?
        .slots
        .iter()
        .map(|slot| layout.pack(&slot.state)[index])
        .collect())
}

/// The chi-squared values of all simulations, `None` where no optimisation has run.
pub fn sim_return_chi2(pipe: &DataPipe) -> Result<Vec<Option<f64>>> {
    Ok(sim_store(pipe)?
        .slots
        .iter()
        .map(|slot| slot.stats.as_ref().map(|s| s.chi2))
        .collect())
}

/// Destroy all simulation storage.
pub fn turn_off(pipe: &mut DataPipe) {
    pipe.sim = None;
    for spin in &mut pipe.spins {
        spin.rdc_sim.clear();
        spin.pcs_sim.clear();
    }
}
