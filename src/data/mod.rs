//! Base data aggregation and the dense data structures used by the target function.
//!
//! Each assembler is a pure function of the data pipe (and an optional Monte
//! Carlo simulation index) returning dense arrays. Missing entries are kept as
//! explicit `None` placeholders so that every array stays rectangular.

pub mod noe;
pub mod pcs;
pub mod positions;
pub mod qfactor;
pub mod rdc;
pub mod tensor;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{NStateError, Result};
use crate::pipe::DataPipe;

pub use noe::{ave_dist, quad_pot, quad_pot_array};
pub use pcs::PcsData;
pub use positions::AtomicPositions;
pub use qfactor::q_factors;
pub use rdc::RdcData;
pub use tensor::{FixedTensors, TensorData};

/// The base data classes contributing to an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Rdc,
    Pcs,
    Tensor,
    Noesy,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Rdc => "rdc",
            DataType::Pcs => "pcs",
            DataType::Tensor => "tensor",
            DataType::Noesy => "noesy",
        };
        write!(f, "{}", name)
    }
}

/// Whether alignment tensors are optimised against RDC or PCS data.
pub fn uses_align_data(types: &[DataType]) -> bool {
    types.contains(&DataType::Rdc) || types.contains(&DataType::Pcs)
}

/// Scan the data pipe for the base data types of the analysis.
///
/// Alignment tensors are only reported as base data when neither RDCs nor
/// PCSs are present, as those data otherwise imply the tensors.
///
/// # Returns
///
/// * A non-empty list in the order rdc, pcs, tensor, noesy, or `NoData`
pub fn base_data_types(pipe: &DataPipe) -> Result<Vec<DataType>> {
    let mut has_rdc = false;
    let mut has_pcs = false;

    for spin in pipe.spins.iter().filter(|s| s.select) {
        for id in spin.rdc.keys().chain(spin.pcs.keys()) {
            if !pipe.align_ids.contains(id) {
                return Err(NStateError::Data(format!(
                    "The alignment ID '{}' of spin '{}' has not been declared",
                    id, spin.id
                )));
            }
        }
        has_rdc |= spin.has_rdc();
        has_pcs |= spin.has_pcs();
    }

    let mut types = Vec::new();
    if has_rdc {
        types.push(DataType::Rdc);
    }
    if has_pcs {
        types.push(DataType::Pcs);
    }
    if !has_rdc && !has_pcs && pipe.align_tensors.iter().any(|t| t.reduced) {
        types.push(DataType::Tensor);
    }
    if !pipe.noe_restraints.is_empty() {
        types.push(DataType::Noesy);
    }

    if types.is_empty() {
        return Err(NStateError::NoData(
            "Neither RDC, PCS, NOE nor alignment tensor data is present".to_string(),
        ));
    }
    Ok(types)
}

/// The alignments carrying RDC or PCS data of selected spins, in declaration order.
pub fn data_alignments(pipe: &DataPipe) -> Vec<String> {
    pipe.align_ids
        .iter()
        .filter(|id| {
            pipe.spins.iter().filter(|s| s.select).any(|s| {
                s.rdc.contains_key(id.as_str()) || s.pcs.contains_key(id.as_str())
            })
        })
        .cloned()
        .collect()
}

/// Indices into the tensor list of the tensors belonging to the data alignments.
pub fn data_tensor_indices(pipe: &DataPipe) -> Result<Vec<usize>> {
    data_alignments(pipe)
        .iter()
        .map(|id| {
            pipe.tensor_index(id).ok_or_else(|| {
                NStateError::Config(format!("No alignment tensor exists for the alignment '{}'", id))
            })
        })
        .collect()
}

/// The number of data points n used in the model.
pub fn num_data_points(pipe: &DataPipe) -> Result<usize> {
    let types = base_data_types(pipe)?;
    let mut n = 0;

    for spin in pipe.spins.iter().filter(|s| s.select) {
        if types.contains(&DataType::Rdc) {
            n += spin.rdc.len();
        }
        if types.contains(&DataType::Pcs) {
            n += spin.pcs.len();
        }
    }

    if types.contains(&DataType::Tensor) {
        n += 5 * pipe.align_tensors.iter().filter(|t| t.reduced).count();
    }
    Ok(n)
}
