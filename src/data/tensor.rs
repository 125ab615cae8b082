//! Alignment tensor data assembly.

use nalgebra::Matrix3;
use ndarray::Array1;

use crate::alignment::TensorComponents;
use crate::error::{NStateError, Result};
use crate::pipe::DataPipe;

/// Error assumed for reduced tensor components without one.
pub const DEFAULT_TENSOR_ERROR: f64 = 1e-5;

/// Full/reduced tensor pairs used as data by the 2-domain model.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorData {
    /// Full tensor matrices, one per pair.
    pub full_tensors: Vec<Matrix3<f64>>,
    /// Whether the full tensor is defined in the reference domain frame.
    pub full_in_ref_frame: Vec<bool>,
    /// Reduced tensor components, 5 per pair.
    pub red_elements: Array1<f64>,
    pub red_errors: Array1<f64>,
    /// Tensor list index of each reduced tensor.
    pub reduced_indices: Vec<usize>,
}

impl TensorData {
    pub fn num_pairs(&self) -> usize {
        self.reduced_indices.len()
    }
}

/// The (full, reduced) tensor index pairs.
///
/// Explicit reductions take precedence. Without them the full and the reduced
/// tensors are paired in the order they were loaded.
pub fn reduction_pairs(pipe: &DataPipe) -> Result<Vec<(usize, usize)>> {
    if !pipe.reductions.is_empty() {
        return Ok(pipe.reductions.clone());
    }

    let full: Vec<usize> = (0..pipe.align_tensors.len())
        .filter(|&i| !pipe.align_tensors[i].reduced)
        .collect();
    let reduced: Vec<usize> = (0..pipe.align_tensors.len())
        .filter(|&i| pipe.align_tensors[i].reduced)
        .collect();

    if full.len() != reduced.len() {
        return Err(NStateError::Data(format!(
            "{} full tensors cannot be paired with {} reduced tensors",
            full.len(),
            reduced.len()
        )));
    }
    Ok(full.into_iter().zip(reduced).collect())
}

/// Assemble the full and reduced tensors.
///
/// The full tensors are always the primary values while the reduced tensors
/// come from the Monte Carlo slot when `sim_index` is given.
pub fn assemble(pipe: &DataPipe, sim_index: Option<usize>) -> Result<TensorData> {
    let ref_domain = pipe.ref_domain.as_deref().ok_or_else(|| {
        NStateError::Config("The reference domain has not been set".to_string())
    })?;
    let pairs = reduction_pairs(pipe)?;
    let state = pipe.state(sim_index)?;

    let mut full_tensors = Vec::with_capacity(pairs.len());
    let mut full_in_ref_frame = Vec::with_capacity(pairs.len());
    let mut red_elements = Array1::zeros(5 * pairs.len());
    let mut red_errors = Array1::zeros(5 * pairs.len());
    let mut reduced_indices = Vec::with_capacity(pairs.len());

    for (k, &(full, red)) in pairs.iter().enumerate() {
        full_tensors.push(pipe.state.tensors[full].to_matrix());
        full_in_ref_frame.push(pipe.align_tensors[full].domain.as_deref() == Some(ref_domain));

        let values = state.tensors[red].to_array();
        let errors = pipe.align_tensors[red]
            .errors
            .map(|e| e.to_array())
            .unwrap_or([DEFAULT_TENSOR_ERROR; 5]);
        for m in 0..5 {
            red_elements[5 * k + m] = values[m];
            red_errors[5 * k + m] = errors[m];
        }
        reduced_indices.push(red);
    }

    Ok(TensorData {
        full_tensors,
        full_in_ref_frame,
        red_elements,
        red_errors,
        reduced_indices,
    })
}

/// Tensors of the data alignments, with their fixed flags.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedTensors {
    pub fixed: Vec<bool>,
    pub components: Vec<TensorComponents>,
}

impl FixedTensors {
    /// Flat array of the components of the fixed tensors only.
    pub fn fixed_elements(&self) -> Array1<f64> {
        self.components
            .iter()
            .zip(&self.fixed)
            .filter(|(_, f)| **f)
            .flat_map(|(c, _)| c.to_array())
            .collect()
    }
}

/// Assemble the tensors for the given tensor indices.
pub fn assemble_fixed(pipe: &DataPipe, tensor_indices: &[usize], sim_index: Option<usize>) -> Result<FixedTensors> {
    let state = pipe.state(sim_index)?;
    Ok(FixedTensors {
        fixed: tensor_indices.iter().map(|&i| pipe.align_tensors[i].fixed).collect(),
        components: tensor_indices.iter().map(|&i| state.tensors[i]).collect(),
    })
}
