//! The optimisation driver.
//!
//! Every driver operation follows the same strictly ordered cycle: assemble
//! the data into an [`NStateTarget`], scale, constrain, optimise and finally
//! unpack the scaled parameter vector into the model state of the primary fit
//! or of one Monte Carlo simulation. The pure part of the cycle is
//! [`optimise_state`], which only reads the pipe so that simulations can run
//! it concurrently.

pub mod grid;
pub mod multipliers;
pub mod newton;
pub mod options;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::data::{self, base_data_types, num_data_points, DataType};
use crate::error::{NStateError, Result};
use crate::lm::{LevenbergMarquardt, LmResult};
use crate::parameters::{project_populations, Bounds, LinearConstraints, ParamKind, ParamLayout};
use crate::pipe::{DataPipe, MinimiseStats, ModelState, ModelVariant};
use crate::problem::Problem;
use crate::target::{BackCalculated, NStateTarget};
use crate::warnings::{Warning, Warnings};

pub use grid::GridPoint;
pub use newton::Newton;
pub use options::{Algorithm, GridOptions, MinimiseOptions, MultiplierConfig};

/// Tolerance of the constraint check on grid points.
const GRID_CONSTRAINT_TOL: f64 = 1e-12;

/// The result of one minimiser run in the scaled parameter space.
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub params: Array1<f64>,
    pub chi2: f64,
    pub iterations: usize,
    pub f_count: usize,
    pub g_count: usize,
    pub h_count: usize,
    /// Whether a tolerance was met.
    pub converged: bool,
    pub message: String,
}

impl From<LmResult> for Minimum {
    fn from(result: LmResult) -> Self {
        Self {
            params: result.params,
            chi2: result.cost,
            iterations: result.iterations,
            f_count: result.func_evals,
            g_count: result.jac_evals,
            h_count: 0,
            converged: result.success,
            message: result.message,
        }
    }
}

/// What a driver call did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    /// The statistics of the optimisation, `None` when it was skipped.
    pub stats: Option<MinimiseStats>,
    pub warnings: Warnings,
}

impl Outcome {
    fn skipped(warnings: Warnings) -> Self {
        Self { stats: None, warnings }
    }

    /// Whether the optimisation was skipped.
    pub fn is_skipped(&self) -> bool {
        self.stats.is_none()
    }
}

/// The optimised model state of the primary fit or one simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct StateFit {
    pub state: ModelState,
    pub stats: MinimiseStats,
    /// Back-calculated data, only for the primary fit.
    pub back_calculated: Option<BackCalculated>,
}

/// The statistics needed for model selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelStatistics {
    /// Number of parameters.
    pub k: usize,
    /// Number of data points.
    pub n: usize,
    /// Chi-squared of the last optimisation, if any.
    pub chi2: Option<f64>,
}

/// The target and starting point of one optimisation.
struct Setup {
    target: NStateTarget,
    constraints: Option<LinearConstraints>,
    x0: Array1<f64>,
}

/// Assemble the target, returning `None` when there is nothing to optimise.
fn prepare(
    pipe: &DataPipe,
    sim_index: Option<usize>,
    start: &ModelState,
    scaling: bool,
    constraints: bool,
    operation: &str,
    warnings: &mut Warnings,
) -> Result<Option<Setup>> {
    let types = base_data_types(pipe)?;
    if types.contains(&DataType::Noesy) {
        warnings.push(Warning::NoeReportingOnly);
        if types.len() == 1 {
            return Ok(None);
        }
    }

    let target = NStateTarget::new(pipe, sim_index, scaling, warnings)?;
    if target.param_num() == 0 {
        warnings.push(Warning::NoParameters {
            operation: operation.to_string(),
        });
        return Ok(None);
    }

    let x0 = target.scaling().scale(&target.layout().pack(start));
    let constraints = if constraints {
        LinearConstraints::populations(target.layout(), target.scaling())
    } else {
        None
    };

    Ok(Some(Setup {
        target,
        constraints,
        x0,
    }))
}

/// Run the selected unconstrained algorithm.
fn run_algorithm<P: Problem>(problem: &P, x0: Array1<f64>, options: &MinimiseOptions) -> Result<Minimum> {
    match options.algorithm {
        Algorithm::LevenbergMarquardt => Ok(LevenbergMarquardt::with_config(options.lm_config())
            .minimize(problem, x0)?
            .into()),
        Algorithm::Newton => Newton {
            max_iterations: options.max_iterations,
            func_tol: options.func_tol,
            grad_tol: options.grad_tol.unwrap_or(newton::DEFAULT_GRAD_TOL),
        }
        .minimize(problem, x0),
    }
}

/// The constraint flag actually used for a model.
fn effective_constraints(model: ModelVariant, requested: bool, warnings: &mut Warnings) -> bool {
    match model {
        ModelVariant::Fixed if requested => {
            warnings.push(Warning::ConstraintsDisabled);
            false
        }
        ModelVariant::Population if !requested => {
            warnings.push(Warning::ConstraintsEnabled);
            true
        }
        _ => requested,
    }
}

/// Optimise the model of the primary fit or of one simulation without touching the pipe.
///
/// # Arguments
///
/// * `pipe` - The data pipe
/// * `sim_index` - The Monte Carlo simulation, `None` for the primary fit
/// * `options` - The minimisation options
///
/// # Returns
///
/// * The optimised state (`None` when the optimisation was skipped) and the warnings
pub fn optimise_state(
    pipe: &DataPipe,
    sim_index: Option<usize>,
    options: &MinimiseOptions,
) -> Result<(Option<StateFit>, Warnings)> {
    optimise_from(pipe, sim_index, pipe.state(sim_index)?, options)
}

/// Optimise starting from the given state rather than the stored one.
pub(crate) fn optimise_from(
    pipe: &DataPipe,
    sim_index: Option<usize>,
    start: &ModelState,
    options: &MinimiseOptions,
) -> Result<(Option<StateFit>, Warnings)> {
    let mut warnings = Warnings::new();
    let constraints = effective_constraints(pipe.model()?, options.constraints, &mut warnings);

    let Some(setup) = prepare(
        pipe,
        sim_index,
        start,
        options.scaling,
        constraints,
        "minimisation",
        &mut warnings,
    )?
    else {
        return Ok((None, warnings));
    };
    let Setup {
        target,
        constraints,
        mut x0,
    } = setup;

    if options.algorithm == Algorithm::Newton && target.layout().offset(ParamKind::ParamagneticCentre).is_some() {
        return Err(NStateError::Config(
            "The Newton algorithm cannot be used when optimising the paramagnetic centre".to_string(),
        ));
    }

    log::info!(
        "Minimising the '{}' model with {} parameters and {} residuals",
        target.model(),
        target.param_num(),
        target.num_residuals()
    );

    let min = match &constraints {
        Some(c) => {
            let mut x = target.scaling().unscale(&x0);
            project_populations(&mut x, target.layout());
            x0 = target.scaling().scale(&x);
            multipliers::minimize(&target, c, x0, &options.multipliers, |p, x| {
                run_algorithm(p, x, options)
            })?
        }
        None => run_algorithm(&target, x0, options)?,
    };

    if min.chi2.is_nan() {
        return Err(NStateError::NotANumber("chi-squared".to_string()));
    }
    if min.chi2.is_infinite() {
        return Err(NStateError::InfiniteValue("chi-squared".to_string()));
    }

    let warning = if min.converged {
        None
    } else {
        warnings.push(Warning::Optimiser {
            message: min.message.clone(),
        });
        Some(min.message.clone())
    };

    let x = target.scaling().unscale(&min.params);
    let mut state = start.clone();
    target.layout().unpack(&mut state, &x.to_vec())?;

    let back_calculated = match sim_index {
        None => Some(target.back_calculate(&min.params)?),
        Some(_) => None,
    };

    log::info!("Minimisation finished: chi2 = {:.6e}, {} iterations", min.chi2, min.iterations);
    Ok((
        Some(StateFit {
            state,
            stats: MinimiseStats {
                chi2: min.chi2,
                iterations: min.iterations,
                f_count: min.f_count,
                g_count: min.g_count,
                h_count: min.h_count,
                warning,
            },
            back_calculated,
        }),
        warnings,
    ))
}

/// Store a fit in the pipe, with back-calculated data and Q factors for the primary fit.
fn store_fit(pipe: &mut DataPipe, sim_index: Option<usize>, fit: StateFit, warnings: &mut Warnings) -> Result<()> {
    match sim_index {
        None => {
            pipe.state = fit.state;
            pipe.stats = Some(fit.stats);
            if let Some(bc) = fit.back_calculated {
                bc.store(pipe);
                pipe.q_factors = Some(data::q_factors(pipe, warnings)?);
            }
        }
        Some(i) => {
            let slot = pipe.sim_slot_mut(i)?;
            slot.state = fit.state;
            slot.stats = Some(fit.stats);
        }
    }
    Ok(())
}

/// Minimise the N-state model.
///
/// On success the parameters are stored in the pipe (or in the simulation
/// slot). For the primary fit the back-calculated RDCs and PCSs and the Q
/// factors are updated as well.
///
/// # Arguments
///
/// * `pipe` - The data pipe
/// * `options` - The minimisation options
/// * `sim_index` - The Monte Carlo simulation, `None` for the primary fit
pub fn minimise(pipe: &mut DataPipe, options: &MinimiseOptions, sim_index: Option<usize>) -> Result<Outcome> {
    let (fit, mut warnings) = optimise_state(pipe, sim_index, options)?;
    let Some(fit) = fit else {
        return Ok(Outcome::skipped(warnings));
    };

    let stats = fit.stats.clone();
    store_fit(pipe, sim_index, fit, &mut warnings)?;
    Ok(Outcome {
        stats: Some(stats),
        warnings,
    })
}

/// The grid bounds in model space, from the options or the layout defaults.
fn grid_bounds(layout: &ParamLayout, options: &GridOptions) -> Result<Vec<Bounds>> {
    let defaults = layout.grid_bounds();
    let k = defaults.len();
    let lower = options.lower.clone().unwrap_or_else(|| defaults.iter().map(|b| b.min).collect());
    let upper = options.upper.clone().unwrap_or_else(|| defaults.iter().map(|b| b.max).collect());

    if lower.len() != k || upper.len() != k {
        return Err(NStateError::DimensionMismatch(format!(
            "The grid bounds have {} lower and {} upper values, the model has {} parameters",
            lower.len(),
            upper.len(),
            k
        )));
    }
    lower.iter().zip(&upper).map(|(&l, &u)| Bounds::new(l, u)).collect()
}

/// Grid search the pure part: returns the best state without touching the pipe.
pub fn grid_search_state(
    pipe: &DataPipe,
    sim_index: Option<usize>,
    options: &GridOptions,
) -> Result<(Option<StateFit>, Warnings)> {
    let mut warnings = Warnings::new();
    let Some(Setup {
        target,
        constraints,
        x0,
    }) = prepare(
        pipe,
        sim_index,
        pipe.state(sim_index)?,
        true,
        options.constraints,
        "grid search",
        &mut warnings,
    )?
    else {
        return Ok((None, warnings));
    };

    let layout = target.layout();
    let bounds = target.scaling().scale_bounds(&grid_bounds(layout, options)?);
    let feasible = |x: &Array1<f64>| {
        constraints
            .as_ref()
            .map(|c| c.is_satisfied(x, GRID_CONSTRAINT_TOL))
            .unwrap_or(true)
    };
    let chi2 = |x: &Array1<f64>| target.chi2(x);

    // Independent tensors of the fixed model are searched one at a time.
    let tensor_blocks: Vec<usize> = layout
        .iter_fields()
        .filter(|(_, f)| matches!(f.kind, ParamKind::Tensor(_)))
        .map(|(start, _)| start)
        .collect();
    let sub_grids = target.model() == ModelVariant::Fixed
        && tensor_blocks.len() > 1
        && layout.offset(ParamKind::ParamagneticCentre).is_none();

    let best = if sub_grids {
        let mut point = x0;
        let mut evaluations = 0;
        let mut best_chi2 = f64::NAN;
        for start in tensor_blocks {
            let dims: Vec<usize> = (start..start + 5).collect();
            log::info!("Grid search over the tensor parameters {}..{}", start, start + 5);
            let found = grid::search(chi2, &point, &dims, &bounds[start..start + 5], options.inc, feasible)?;
            evaluations += found.evaluations;
            best_chi2 = found.chi2;
            point = found.params;
        }
        GridPoint {
            params: point,
            chi2: best_chi2,
            evaluations,
        }
    } else {
        let dims: Vec<usize> = (0..layout.param_num()).collect();
        log::info!(
            "Grid search over {} parameters with {} increments",
            dims.len(),
            options.inc
        );
        grid::search(chi2, &x0, &dims, &bounds, options.inc, feasible)?
    };

    let x = target.scaling().unscale(&best.params);
    let mut state = pipe.state(sim_index)?.clone();
    layout.unpack(&mut state, &x.to_vec())?;

    let back_calculated = match sim_index {
        None => Some(target.back_calculate(&best.params)?),
        Some(_) => None,
    };

    Ok((
        Some(StateFit {
            state,
            stats: MinimiseStats {
                chi2: best.chi2,
                iterations: 0,
                f_count: best.evaluations,
                g_count: 0,
                h_count: 0,
                warning: None,
            },
            back_calculated,
        }),
        warnings,
    ))
}

/// Grid search the N-state model, storing the best lattice point as the new parameter values.
///
/// # Arguments
///
/// * `pipe` - The data pipe
/// * `options` - The lattice increments and bounds
/// * `sim_index` - The Monte Carlo simulation, `None` for the primary fit
pub fn grid_search(pipe: &mut DataPipe, options: &GridOptions, sim_index: Option<usize>) -> Result<Outcome> {
    let (fit, mut warnings) = grid_search_state(pipe, sim_index, options)?;
    let Some(fit) = fit else {
        return Ok(Outcome::skipped(warnings));
    };

    let stats = fit.stats.clone();
    store_fit(pipe, sim_index, fit, &mut warnings)?;
    Ok(Outcome {
        stats: Some(stats),
        warnings,
    })
}

/// Evaluate chi-squared at the current parameter values.
///
/// For the primary fit the back-calculated data, the Q factors and the NOE
/// distance report are stored as well.
pub fn calculate(pipe: &mut DataPipe, sim_index: Option<usize>) -> Result<Outcome> {
    let mut warnings = Warnings::new();
    let types = base_data_types(pipe)?;

    if sim_index.is_none() && types.contains(&DataType::Noesy) {
        pipe.noe_report = data::noe::evaluate(pipe)?;
    }
    if types == [DataType::Noesy] {
        return Ok(Outcome::skipped(warnings));
    }

    let target = NStateTarget::new(pipe, sim_index, true, &mut warnings)?;
    let x = target.scaling().scale(&target.layout().pack(pipe.state(sim_index)?));
    let chi2 = target.chi2(&x)?;
    let stats = MinimiseStats {
        chi2,
        iterations: 0,
        f_count: 1,
        g_count: 0,
        h_count: 0,
        warning: None,
    };

    match sim_index {
        None => {
            target.back_calculate(&x)?.store(pipe);
            pipe.q_factors = Some(data::q_factors(pipe, &mut warnings)?);
            pipe.stats = Some(stats.clone());
        }
        Some(i) => pipe.sim_slot_mut(i)?.stats = Some(stats.clone()),
    }

    Ok(Outcome {
        stats: Some(stats),
        warnings,
    })
}

/// The number of parameters, the number of data points and chi-squared.
pub fn model_statistics(pipe: &DataPipe, sim_index: Option<usize>) -> Result<ModelStatistics> {
    let types = base_data_types(pipe)?;
    let k = ParamLayout::new(pipe, &types)?.param_num();
    let n = num_data_points(pipe)?;
    let stats = match sim_index {
        None => pipe.stats.as_ref(),
        Some(i) => pipe.sim_slot(i)?.stats.as_ref(),
    };

    Ok(ModelStatistics {
        k,
        n,
        chi2: stats.map(|s| s.chi2),
    })
}
