//! PCS data assembly.

use ndarray::{Array1, Array2};

use crate::constants::{frequency_to_field, PPM};
use crate::error::{NStateError, Result};
use crate::pipe::{DataClass, DataPipe};

/// Dense PCS data for the target function.
///
/// Values and errors are converted from ppm to unitless shifts.
#[derive(Debug, Clone, PartialEq)]
pub struct PcsData {
    pub align_ids: Vec<String>,
    /// Index into the pipe's spin list for each column.
    pub spin_indices: Vec<usize>,
    pub values: Array2<Option<f64>>,
    pub errors: Array2<Option<f64>>,
    pub weights: Array2<f64>,
    /// Temperature in K per alignment (zero for alignments without PCS data).
    pub temperature: Array1<f64>,
    /// Field strength in Tesla per alignment (zero for alignments without PCS data).
    pub field: Array1<f64>,
}

impl PcsData {
    pub fn num_spins(&self) -> usize {
        self.spin_indices.len()
    }
}

/// Assemble the PCS data of all selected spins.
///
/// The paramagnetic centre must either be set or be optimised, and every
/// alignment carrying PCS data needs a temperature and a spectrometer frequency.
pub fn assemble(pipe: &DataPipe, align_ids: &[String], sim_index: Option<usize>) -> Result<PcsData> {
    if pipe.paramag_centre_fixed && pipe.state(sim_index)?.paramagnetic_centre.is_none() {
        return Err(NStateError::Config(
            "The paramagnetic centre has not yet been specified".to_string(),
        ));
    }

    let spin_indices: Vec<usize> = pipe
        .spins
        .iter()
        .enumerate()
        .filter(|(_, s)| s.select && s.has_pcs())
        .map(|(k, _)| k)
        .collect();

    let mut temperature = Array1::zeros(align_ids.len());
    let mut field = Array1::zeros(align_ids.len());
    for (i, id) in align_ids.iter().enumerate() {
        let has_data = spin_indices
            .iter()
            .any(|&k| pipe.spins[k].pcs.contains_key(id));
        if !has_data {
            continue;
        }

        temperature[i] = *pipe.temperature.get(id).ok_or_else(|| {
            NStateError::Config(format!(
                "The temperature for the alignment '{}' has not been set",
                id
            ))
        })?;
        let frq = pipe.frequency.get(id).ok_or_else(|| {
            NStateError::Config(format!(
                "The spectrometer frequency for the alignment '{}' has not been set",
                id
            ))
        })?;
        field[i] = frequency_to_field(*frq);
    }

    let shape = (align_ids.len(), spin_indices.len());
    let mut values = Array2::from_elem(shape, None);
    let mut errors = Array2::from_elem(shape, None);
    let mut weights = Array2::from_elem(shape, 1.0);

    for (j, &k) in spin_indices.iter().enumerate() {
        let spin = &pipe.spins[k];
        for (i, id) in align_ids.iter().enumerate() {
            values[[i, j]] = spin
                .data_value(DataClass::Pcs, id, sim_index)
                .map(|v| v * PPM);
            errors[[i, j]] = spin.pcs_err.get(id).map(|e| e * PPM);
            if let Some(w) = spin.pcs_weight.get(id) {
                weights[[i, j]] = *w;
            }
        }
    }

    Ok(PcsData {
        align_ids: align_ids.to_vec(),
        spin_indices,
        values,
        errors,
        weights,
        temperature,
        field,
    })
}
