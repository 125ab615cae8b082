//! The N-state chi-squared target function.
//!
//! An [`NStateTarget`] is built once per optimisation (or Monte Carlo
//! simulation) from the assembled data. After construction it is immutable:
//! evaluating it has no side effects, so one target can be shared by any
//! number of optimiser threads.
//!
//! The optimiser works in the scaled parameter space. All residuals are of the
//! form `sqrt(w) (y - y_bc) / sigma` so the chi-squared value is the sum of
//! their squares.

pub mod back_calc;

use nalgebra::{Matrix3, Vector3};
use ndarray::{Array1, Array2};

use crate::alignment::{euler_to_rotation, rotate_tensor, TensorComponents};
use crate::constants::{pcs_constant, ANGSTROM, PPM};
use crate::data::{
    self, base_data_types, data_alignments, data_tensor_indices, uses_align_data, AtomicPositions,
    DataType, PcsData, RdcData, TensorData,
};
use crate::error::{NStateError, Result};
use crate::parameters::{ParamKind, ParamLayout, Scaling};
use crate::pipe::{DataPipe, ModelVariant};
use crate::problem::Problem;
use crate::utils::finite_difference;
use crate::warnings::Warnings;

pub use back_calc::BackCalculated;

/// Where the components of an alignment's tensor come from.
#[derive(Debug, Clone, Copy, PartialEq)]
enum TensorSource {
    /// Optimised, starting at this parameter offset.
    Param(usize),
    /// A constant.
    Fixed(TensorComponents),
}

/// One RDC or PCS measurement entering the chi-squared sum.
#[derive(Debug, Clone, Copy, PartialEq)]
struct DataPoint {
    align: usize,
    col: usize,
    value: f64,
    sigma: f64,
    sqrt_w: f64,
    absolute: bool,
}

/// The model quantities at one trial parameter vector.
struct Trial {
    tensors: Vec<TensorComponents>,
    probs: Vec<f64>,
    rotations: Vec<Matrix3<f64>>,
    centre: Vector3<f64>,
}

/// The chi-squared target function of the N-state model.
#[derive(Debug, Clone)]
pub struct NStateTarget {
    model: ModelVariant,
    n_states: usize,
    layout: ParamLayout,
    scaling: Scaling,

    tensor_sources: Vec<TensorSource>,
    fixed_probs: Vec<f64>,

    rdc: Option<RdcData>,
    /// Projection coefficients per RDC column and state.
    rdc_coeffs: Vec<Vec<Option<[f64; 5]>>>,
    rdc_points: Vec<DataPoint>,

    pcs: Option<PcsData>,
    positions: Option<AtomicPositions>,
    pcs_points: Vec<DataPoint>,

    tensors: Option<TensorData>,

    /// Parameter indices differentiated numerically.
    numeric_columns: Vec<usize>,
}

fn data_points(
    values: &Array2<Option<f64>>,
    errors: &Array2<Option<f64>>,
    weights: &Array2<f64>,
    absolute: Option<&Array2<bool>>,
    usable: impl Fn(usize) -> bool,
) -> Vec<DataPoint> {
    let mut points = Vec::new();
    for ((i, j), value) in values.indexed_iter() {
        let Some(value) = *value else {
            continue;
        };
        if !usable(j) {
            continue;
        }
        let absolute = absolute.map(|a| a[[i, j]]).unwrap_or(false);
        points.push(DataPoint {
            align: i,
            col: j,
            value: if absolute { value.abs() } else { value },
            sigma: errors[[i, j]].unwrap_or(1.0),
            sqrt_w: weights[[i, j]].sqrt(),
            absolute,
        });
    }
    points
}

impl NStateTarget {
    /// Assemble the data of the pipe and build the target function.
    ///
    /// # Arguments
    ///
    /// * `pipe` - The data pipe
    /// * `sim_index` - Build the target for this Monte Carlo simulation
    /// * `scaling` - Whether diagonal parameter scaling is applied
    /// * `warnings` - Collects the non-fatal data assembly warnings
    pub fn new(
        pipe: &DataPipe,
        sim_index: Option<usize>,
        scaling: bool,
        warnings: &mut Warnings,
    ) -> Result<Self> {
        let types = base_data_types(pipe)?;
        let model = pipe.model()?;
        let n_states = pipe.n_states()?;
        let layout = ParamLayout::new(pipe, &types)?;
        let scaling = Scaling::new(&layout, scaling);
        let state = pipe.state(sim_index)?;

        let fixed_probs = if state.probs.len() == n_states && state.probs.iter().all(|p| p.is_some()) {
            state.probs_or_zero()
        } else {
            vec![1.0 / n_states as f64; n_states]
        };

        let mut target = Self {
            model,
            n_states,
            layout,
            scaling,
            tensor_sources: Vec::new(),
            fixed_probs,
            rdc: None,
            rdc_coeffs: Vec::new(),
            rdc_points: Vec::new(),
            pcs: None,
            positions: None,
            pcs_points: Vec::new(),
            tensors: None,
            numeric_columns: Vec::new(),
        };

        if model == ModelVariant::TwoDomain {
            if !types.contains(&DataType::Tensor) {
                return Err(NStateError::Config(
                    "The 2-domain N-state model requires alignment tensors as base data".to_string(),
                ));
            }
            target.tensors = Some(data::tensor::assemble(pipe, sim_index)?);
        } else {
            if !uses_align_data(&types) {
                return Err(NStateError::Config(format!(
                    "The '{}' N-state model requires RDC or PCS data",
                    model
                )));
            }

            let align_ids = data_alignments(pipe);
            let tensor_indices = data_tensor_indices(pipe)?;
            let fixed = data::tensor::assemble_fixed(pipe, &tensor_indices, sim_index)?;
            target.tensor_sources = tensor_indices
                .iter()
                .zip(&fixed.components)
                .map(|(&t, components)| match target.layout.offset(ParamKind::Tensor(t)) {
                    Some(offset) => TensorSource::Param(offset),
                    None => TensorSource::Fixed(*components),
                })
                .collect();

            if types.contains(&DataType::Rdc) {
                let rdc = data::rdc::assemble(pipe, &align_ids, n_states, sim_index, warnings)?;
                target.rdc_coeffs = rdc
                    .vectors
                    .iter()
                    .map(|per_state| {
                        per_state
                            .iter()
                            .map(|v| v.as_ref().map(TensorComponents::projection_gradient))
                            .collect()
                    })
                    .collect();
                target.rdc_points = data_points(
                    &rdc.values,
                    &rdc.errors,
                    &rdc.weights,
                    Some(&rdc.absolute),
                    |j| rdc.dj[j].is_some(),
                );
                target.rdc = Some(rdc);
            }

            if types.contains(&DataType::Pcs) {
                let pcs = data::pcs::assemble(pipe, &align_ids, sim_index)?;
                let positions = data::positions::assemble(pipe, &pcs, n_states, sim_index)?;
                target.pcs_points = data_points(&pcs.values, &pcs.errors, &pcs.weights, None, |_| true);
                target.pcs = Some(pcs);
                target.positions = Some(positions);
            }
        }

        target.numeric_columns = target
            .layout
            .iter_fields()
            .filter(|(_, f)| matches!(f.kind, ParamKind::EulerAngles | ParamKind::ParamagneticCentre))
            .flat_map(|(start, f)| start..start + f.len)
            .collect();

        Ok(target)
    }

    pub fn model(&self) -> ModelVariant {
        self.model
    }

    pub fn layout(&self) -> &ParamLayout {
        &self.layout
    }

    pub fn scaling(&self) -> &Scaling {
        &self.scaling
    }

    /// The number of parameters k.
    pub fn param_num(&self) -> usize {
        self.layout.param_num()
    }

    /// The number of residuals entering the chi-squared sum.
    pub fn num_residuals(&self) -> usize {
        self.rdc_points.len()
            + self.pcs_points.len()
            + self.tensors.as_ref().map(|t| 5 * t.num_pairs()).unwrap_or(0)
    }

    /// The chi-squared value at a scaled parameter vector.
    pub fn chi2(&self, x: &Array1<f64>) -> Result<f64> {
        self.eval_cost(x)
    }

    /// The chi-squared gradient `2 J^T r` at a scaled parameter vector.
    pub fn dchi2(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        let residuals = self.eval(x)?;
        let jac = self.jacobian(x)?;
        Ok(jac.t().dot(&residuals) * 2.0)
    }

    /// The chi-squared Hessian at a scaled parameter vector, by central differences.
    pub fn d2chi2(&self, x: &Array1<f64>) -> Result<Array2<f64>> {
        finite_difference::hessian(|p| self.chi2(p), x, None)
    }

    /// Checks the length of a scaled vector and maps it back to model space.
    fn unscale(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        if x.len() != self.param_num() {
            return Err(NStateError::DimensionMismatch(format!(
                "Expected {} parameters, got {}",
                self.param_num(),
                x.len()
            )));
        }
        Ok(self.scaling.unscale(x))
    }

    fn trial(&self, x: &Array1<f64>) -> Result<Trial> {

        let tensors = self
            .tensor_sources
            .iter()
            .map(|source| match *source {
                TensorSource::Param(o) => TensorComponents::new(x[o], x[o + 1], x[o + 2], x[o + 3], x[o + 4]),
                TensorSource::Fixed(components) => components,
            })
            .collect();

        let probs = match self.layout.offset(ParamKind::Populations) {
            Some(o) => {
                let free: Vec<f64> = (0..self.n_states - 1).map(|c| x[o + c]).collect();
                let last = 1.0 - free.iter().sum::<f64>();
                free.into_iter().chain(std::iter::once(last)).collect()
            }
            None => self.fixed_probs.clone(),
        };

        let rotations = match self.layout.offset(ParamKind::EulerAngles) {
            Some(o) => (0..self.n_states)
                .map(|c| euler_to_rotation(x[o + 3 * c], x[o + 3 * c + 1], x[o + 3 * c + 2]))
                .collect(),
            None => Vec::new(),
        };

        let centre = match self.layout.offset(ParamKind::ParamagneticCentre) {
            Some(o) => Vector3::new(x[o], x[o + 1], x[o + 2]),
            None => self
                .positions
                .as_ref()
                .map(|p| p.centre)
                .unwrap_or_else(Vector3::zeros),
        };

        Ok(Trial {
            tensors,
            probs,
            rotations,
            centre,
        })
    }

    /// Per-state projections `mu^T A mu` of an RDC column.
    fn rdc_projections(&self, tensor: &TensorComponents, col: usize) -> Vec<f64> {
        let a = tensor.to_array();
        self.rdc_coeffs[col]
            .iter()
            .map(|g| g.map(|g| (0..5).map(|m| a[m] * g[m]).sum::<f64>()).unwrap_or(0.0))
            .collect()
    }

    /// Per-state PCS constants times the unit vectors' projection coefficients.
    fn pcs_terms(&self, trial: &Trial, align: usize, col: usize) -> Result<Vec<(f64, [f64; 5])>> {
        let (pcs, positions) = match (&self.pcs, &self.positions) {
            (Some(pcs), Some(positions)) => (pcs, positions),
            _ => return Err(NStateError::Other("No PCS data has been assembled".to_string())),
        };

        Ok(positions.positions[col]
            .iter()
            .map(|pos| {
                let v = pos - trial.centre;
                let r = v.norm();
                let constant = pcs_constant(pcs.temperature[align], pcs.field[align], r * ANGSTROM);
                (constant, TensorComponents::projection_gradient(&(v / r)))
            })
            .collect())
    }

    /// The rotated full tensors of a reduction pair, one per state.
    fn rotated_tensors(&self, data: &TensorData, trial: &Trial, pair: usize) -> Vec<[f64; 5]> {
        trial
            .rotations
            .iter()
            .map(|r| {
                let m = rotate_tensor(r, &data.full_tensors[pair], data.full_in_ref_frame[pair]);
                TensorComponents::from_matrix(&m).to_array()
            })
            .collect()
    }

    /// Residuals, with the analytic Jacobian columns (in model space) when `jac` is given.
    fn residuals(&self, x: &Array1<f64>, mut jac: Option<&mut Array2<f64>>) -> Result<Array1<f64>> {
        let trial = self.trial(x)?;
        let n = self.n_states;
        let pop_offset = self.layout.offset(ParamKind::Populations);
        let mut residuals = Array1::zeros(self.num_residuals());
        let mut row = 0;

        if let Some(rdc) = &self.rdc {
            for p in &self.rdc_points {
                let dj = rdc.dj[p.col].unwrap_or(0.0);
                let projs = self.rdc_projections(&trial.tensors[p.align], p.col);
                let mut bc = dj * projs.iter().zip(&trial.probs).map(|(a, b)| a * b).sum::<f64>();
                let sign = if p.absolute && bc < 0.0 { -1.0 } else { 1.0 };
                bc *= sign;
                residuals[row] = p.sqrt_w * (p.value - bc) / p.sigma;

                if let Some(jac) = jac.as_deref_mut() {
                    let factor = -p.sqrt_w / p.sigma * dj * sign;
                    if let TensorSource::Param(o) = self.tensor_sources[p.align] {
                        for m in 0..5 {
                            let d: f64 = self.rdc_coeffs[p.col]
                                .iter()
                                .zip(&trial.probs)
                                .map(|(g, pc)| g.map(|g| g[m] * pc).unwrap_or(0.0))
                                .sum();
                            jac[[row, o + m]] = factor * d;
                        }
                    }
                    if let Some(po) = pop_offset {
                        for c in 0..n - 1 {
                            jac[[row, po + c]] = factor * (projs[c] - projs[n - 1]);
                        }
                    }
                }
                row += 1;
            }
        }

        for p in &self.pcs_points {
            let terms = self.pcs_terms(&trial, p.align, p.col)?;
            let tensor = trial.tensors[p.align].to_array();
            let projs: Vec<f64> = terms
                .iter()
                .map(|(k, g)| k * (0..5).map(|m| tensor[m] * g[m]).sum::<f64>())
                .collect();
            let bc: f64 = projs.iter().zip(&trial.probs).map(|(a, b)| a * b).sum();
            residuals[row] = p.sqrt_w * (p.value - bc) / p.sigma;

            if let Some(jac) = jac.as_deref_mut() {
                let factor = -p.sqrt_w / p.sigma;
                if let TensorSource::Param(o) = self.tensor_sources[p.align] {
                    for m in 0..5 {
                        let d: f64 = terms
                            .iter()
                            .zip(&trial.probs)
                            .map(|((k, g), pc)| k * g[m] * pc)
                            .sum();
                        jac[[row, o + m]] = factor * d;
                    }
                }
                if let Some(po) = pop_offset {
                    for c in 0..n - 1 {
                        jac[[row, po + c]] = factor * (projs[c] - projs[n - 1]);
                    }
                }
            }
            row += 1;
        }

        if let Some(data) = &self.tensors {
            for pair in 0..data.num_pairs() {
                let rotated = self.rotated_tensors(data, &trial, pair);
                for m in 0..5 {
                    let bc: f64 = rotated.iter().zip(&trial.probs).map(|(t, pc)| t[m] * pc).sum();
                    let sigma = data.red_errors[5 * pair + m];
                    residuals[row] = (data.red_elements[5 * pair + m] - bc) / sigma;

                    if let (Some(jac), Some(po)) = (jac.as_deref_mut(), pop_offset) {
                        for c in 0..n - 1 {
                            jac[[row, po + c]] = -(rotated[c][m] - rotated[n - 1][m]) / sigma;
                        }
                    }
                    row += 1;
                }
            }
        }

        Ok(residuals)
    }

    /// Back-calculate every RDC, PCS and reduced tensor at a scaled parameter vector.
    pub fn back_calculate(&self, x: &Array1<f64>) -> Result<BackCalculated> {
        let x = self.unscale(x)?;
        let trial = self.trial(&x)?;
        let mut result = BackCalculated::default();

        if let Some(rdc) = &self.rdc {
            for (i, id) in rdc.align_ids.iter().enumerate() {
                for j in 0..rdc.num_pairs() {
                    let Some(dj) = rdc.dj[j] else {
                        continue;
                    };
                    let projs = self.rdc_projections(&trial.tensors[i], j);
                    let mut bc = dj * projs.iter().zip(&trial.probs).map(|(a, b)| a * b).sum::<f64>();
                    if rdc.absolute[[i, j]] {
                        bc = bc.abs();
                    }
                    result.rdc.push((rdc.spin_indices[j], id.clone(), bc / rdc.factors[j]));
                }
            }
        }

        if let Some(pcs) = &self.pcs {
            for (i, id) in pcs.align_ids.iter().enumerate() {
                if pcs.field[i] == 0.0 {
                    continue;
                }
                let tensor = trial.tensors[i].to_array();
                for j in 0..pcs.num_spins() {
                    let bc: f64 = self
                        .pcs_terms(&trial, i, j)?
                        .iter()
                        .zip(&trial.probs)
                        .map(|((k, g), pc)| pc * k * (0..5).map(|m| tensor[m] * g[m]).sum::<f64>())
                        .sum();
                    result.pcs.push((pcs.spin_indices[j], id.clone(), bc / PPM));
                }
            }
        }

        if let Some(data) = &self.tensors {
            for (pair, &index) in data.reduced_indices.iter().enumerate() {
                let rotated = self.rotated_tensors(data, &trial, pair);
                let mut values = [0.0; 5];
                for (t, pc) in rotated.iter().zip(&trial.probs) {
                    for m in 0..5 {
                        values[m] += pc * t[m];
                    }
                }
                result.tensors.push((index, TensorComponents::from_slice(&values)?));
            }
        }

        Ok(result)
    }
}

impl Problem for NStateTarget {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        self.residuals(&self.unscale(params)?, None)
    }

    fn parameter_count(&self) -> usize {
        self.param_num()
    }

    fn residual_count(&self) -> usize {
        self.num_residuals()
    }

    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>> {
        let x = self.unscale(params)?;
        let mut jac = Array2::zeros((self.num_residuals(), self.param_num()));
        self.residuals(&x, Some(&mut jac))?;

        // Chain rule of the scaling for the analytic columns.
        for (j, s) in self.scaling.factors().iter().enumerate() {
            if !self.numeric_columns.contains(&j) {
                jac.column_mut(j).mapv_inplace(|v| v * s);
            }
        }

        if !self.numeric_columns.is_empty() {
            finite_difference::jacobian_columns(|p| self.eval(p), params, &self.numeric_columns, &mut jac, None)?;
        }
        Ok(jac)
    }

    fn has_custom_jacobian(&self) -> bool {
        true
    }
}
