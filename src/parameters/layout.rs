//! The declarative parameter vector layout.
//!
//! The layout is an ordered list of fields built once from the model variant
//! and the base data types. Packing, unpacking, naming, grid bounds and
//! scaling factors are all derived from it, so they cannot disagree about the
//! position of a parameter.

use std::f64::consts::PI;

use nalgebra::Vector3;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::bounds::Bounds;
use crate::alignment::{TensorComponents, TENSOR_COMPONENT_NAMES};
use crate::data::{data_tensor_indices, uses_align_data, DataType};
use crate::error::{NStateError, Result};
use crate::pipe::{DataPipe, ModelState};

/// Grid search half-width of the tensor components.
pub const TENSOR_GRID_BOUND: f64 = 1e-3;

/// Grid search half-width of the paramagnetic centre coordinates in Angstrom.
pub const CENTRE_GRID_BOUND: f64 = 100.0;

/// Scaling factor of the population parameters.
pub const POPULATION_SCALING: f64 = 0.1;

/// Scaling factor of the paramagnetic centre coordinates.
pub const CENTRE_SCALING: f64 = 100.0;

/// The kind of a contiguous block of parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamKind {
    /// The 5 components of the tensor at this index of the tensor list.
    Tensor(usize),
    /// The first N-1 population weights.
    Populations,
    /// alpha, beta, gamma for each state.
    EulerAngles,
    /// The x, y, z coordinates of the paramagnetic centre.
    ParamagneticCentre,
}

/// A contiguous block of the parameter vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamField {
    pub kind: ParamKind,
    pub len: usize,
}

/// The ordered parameter vector layout.
///
/// The order is: non-fixed tensors (only with RDC or PCS data), the N-1
/// populations, the per-state Euler angles and finally the paramagnetic centre
/// when it is optimised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamLayout {
    pub fields: Vec<ParamField>,
    pub n_states: usize,
}

impl ParamLayout {
    /// Build the layout for the pipe's model and base data types.
    ///
    /// # Arguments
    ///
    /// * `pipe` - The data pipe with a selected model and number of states
    /// * `types` - The base data types of the analysis
    ///
    /// # Returns
    ///
    /// * The layout, or an error if the model or N are not set
    pub fn new(pipe: &DataPipe, types: &[DataType]) -> Result<Self> {
        let model = pipe.model()?;
        let n_states = pipe.n_states()?;
        let mut fields = Vec::new();

        if uses_align_data(types) {
            for index in data_tensor_indices(pipe)? {
                if !pipe.align_tensors[index].fixed {
                    fields.push(ParamField {
                        kind: ParamKind::Tensor(index),
                        len: 5,
                    });
                }
            }
        }

        if model.has_populations() && n_states > 1 {
            fields.push(ParamField {
                kind: ParamKind::Populations,
                len: n_states - 1,
            });
        }

        if model.has_angles() {
            fields.push(ParamField {
                kind: ParamKind::EulerAngles,
                len: 3 * n_states,
            });
        }

        if types.contains(&DataType::Pcs) && !pipe.paramag_centre_fixed {
            fields.push(ParamField {
                kind: ParamKind::ParamagneticCentre,
                len: 3,
            });
        }

        Ok(Self { fields, n_states })
    }

    /// The number of parameters, the length of every packed vector.
    pub fn param_num(&self) -> usize {
        self.fields.iter().map(|f| f.len).sum()
    }

    /// The start index of the first field of the given kind.
    pub fn offset(&self, kind: ParamKind) -> Option<usize> {
        let mut offset = 0;
        for field in &self.fields {
            if field.kind == kind {
                return Some(offset);
            }
            offset += field.len;
        }
        None
    }

    /// Fields paired with their start index.
    pub fn iter_fields(&self) -> impl Iterator<Item = (usize, &ParamField)> + '_ {
        self.fields.iter().scan(0, |offset, field| {
            let start = *offset;
            *offset += field.len;
            Some((start, field))
        })
    }

    /// Tensor list indices of the optimised tensors, in vector order.
    pub fn tensor_indices(&self) -> Vec<usize> {
        self.fields
            .iter()
            .filter_map(|f| match f.kind {
                ParamKind::Tensor(i) => Some(i),
                _ => None,
            })
            .collect()
    }

    /// Parameter names, matching the pipe's parameter naming.
    pub fn names(&self, pipe: &DataPipe) -> Vec<String> {
        let mut names = Vec::with_capacity(self.param_num());
        for field in &self.fields {
            match field.kind {
                ParamKind::Tensor(i) => {
                    let id = &pipe.align_tensors[i].id;
                    names.extend(TENSOR_COMPONENT_NAMES.iter().map(|c| format!("{}_{}", c, id)));
                }
                ParamKind::Populations => {
                    names.extend((0..field.len).map(|i| format!("p{}", i)));
                }
                ParamKind::EulerAngles => {
                    for c in 0..self.n_states {
                        names.push(format!("alpha{}", c));
                        names.push(format!("beta{}", c));
                        names.push(format!("gamma{}", c));
                    }
                }
                ParamKind::ParamagneticCentre => {
                    names.extend(["paramag_x", "paramag_y", "paramag_z"].iter().map(|s| s.to_string()));
                }
            }
        }
        names
    }

    /// Pack a model state into a parameter vector.
    ///
    /// Unset populations, angles and centre coordinates are read as zero.
    pub fn pack(&self, state: &ModelState) -> Array1<f64> {
        let mut params = Vec::with_capacity(self.param_num());
        let or_zero = |v: Option<&Option<f64>>| v.copied().flatten().unwrap_or(0.0);

        for field in &self.fields {
            match field.kind {
                ParamKind::Tensor(i) => {
                    let tensor = state.tensors.get(i).copied().unwrap_or_default();
                    params.extend(tensor.to_array());
                }
                ParamKind::Populations => {
                    params.extend((0..field.len).map(|c| or_zero(state.probs.get(c))));
                }
                ParamKind::EulerAngles => {
                    for c in 0..self.n_states {
                        params.push(or_zero(state.alpha.get(c)));
                        params.push(or_zero(state.beta.get(c)));
                        params.push(or_zero(state.gamma.get(c)));
                    }
                }
                ParamKind::ParamagneticCentre => {
                    let centre = state.paramagnetic_centre.unwrap_or_else(Vector3::zeros);
                    params.extend(centre.iter());
                }
            }
        }
        Array1::from(params)
    }

    /// Write a parameter vector back into a model state.
    ///
    /// The last population is derived as `1 - sum(p_0..p_{N-2})`.
    pub fn unpack(&self, state: &mut ModelState, params: &[f64]) -> Result<()> {
        if params.len() != self.param_num() {
            return Err(NStateError::DimensionMismatch(format!(
                "The parameter vector has {} elements, the model has {} parameters",
                params.len(),
                self.param_num()
            )));
        }

        for (start, field) in self.iter_fields() {
            let values = &params[start..start + field.len];
            match field.kind {
                ParamKind::Tensor(i) => {
                    let components = TensorComponents::from_slice(values)?;
                    match state.tensors.get_mut(i) {
                        Some(t) => *t = components,
                        None => {
                            return Err(NStateError::DimensionMismatch(format!(
                                "The model state has no tensor at index {}",
                                i
                            )))
                        }
                    }
                }
                ParamKind::Populations => {
                    let last = 1.0 - values.iter().sum::<f64>();
                    state.probs = values.iter().copied().chain(std::iter::once(last)).map(Some).collect();
                }
                ParamKind::EulerAngles => {
                    state.alpha = values.iter().step_by(3).copied().map(Some).collect();
                    state.beta = values.iter().skip(1).step_by(3).copied().map(Some).collect();
                    state.gamma = values.iter().skip(2).step_by(3).copied().map(Some).collect();
                }
                ParamKind::ParamagneticCentre => {
                    state.paramagnetic_centre = Some(Vector3::new(values[0], values[1], values[2]));
                }
            }
        }
        Ok(())
    }

    /// Default grid search bounds of every parameter.
    pub fn grid_bounds(&self) -> Vec<Bounds> {
        let mut bounds = Vec::with_capacity(self.param_num());
        for field in &self.fields {
            match field.kind {
                ParamKind::Tensor(_) => {
                    bounds.extend(std::iter::repeat(Bounds::symmetric(TENSOR_GRID_BOUND)).take(5));
                }
                ParamKind::Populations => {
                    bounds.extend(std::iter::repeat(Bounds::unchecked(0.0, 1.0)).take(field.len));
                }
                ParamKind::EulerAngles => {
                    for _ in 0..self.n_states {
                        bounds.push(Bounds::unchecked(0.0, 2.0 * PI));
                        bounds.push(Bounds::unchecked(0.0, PI));
                        bounds.push(Bounds::unchecked(0.0, 2.0 * PI));
                    }
                }
                ParamKind::ParamagneticCentre => {
                    bounds.extend(std::iter::repeat(Bounds::symmetric(CENTRE_GRID_BOUND)).take(3));
                }
            }
        }
        bounds
    }

    /// Diagonal scaling factors of every parameter.
    pub fn scaling_factors(&self) -> Array1<f64> {
        let mut factors = Vec::with_capacity(self.param_num());
        for field in &self.fields {
            let factor = match field.kind {
                ParamKind::Populations => POPULATION_SCALING,
                ParamKind::ParamagneticCentre => CENTRE_SCALING,
                ParamKind::Tensor(_) | ParamKind::EulerAngles => 1.0,
            };
            factors.extend(std::iter::repeat(factor).take(field.len));
        }
        Array1::from(factors)
    }
}
