//! RDC data assembly.

use nalgebra::Vector3;
use ndarray::Array2;

use crate::constants::{gyromagnetic_ratio, rdc_constant, ANGSTROM};
use crate::error::{NStateError, Result};
use crate::pipe::{DataClass, DataPipe, SpinContainer};
use crate::warnings::{Warning, Warnings};

/// Dense RDC data for the target function.
///
/// Rows are alignments and columns are interatomic pairs. A pair without bond
/// vectors keeps its column with `None` placeholders for its values and vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct RdcData {
    pub align_ids: Vec<String>,
    /// Index into the pipe's spin list for each column.
    pub spin_indices: Vec<usize>,
    /// RDC values in Hz, already multiplied by the column factor.
    pub values: Array2<Option<f64>>,
    /// RDC errors in Hz, scaled by the magnitude of the column factor.
    pub errors: Array2<Option<f64>>,
    pub weights: Array2<f64>,
    /// Alignments for which only the RDC magnitude is compared.
    pub absolute: Array2<bool>,
    /// Unit bond vectors per column and state.
    pub vectors: Vec<Vec<Option<Vector3<f64>>>>,
    /// Dipolar constants in Hz per column.
    pub dj: Vec<Option<f64>>,
    /// Value factor per column: 1 for normal atoms, -3 for 3-member pseudo-atoms.
    pub factors: Vec<f64>,
}

impl RdcData {
    pub fn num_pairs(&self) -> usize {
        self.spin_indices.len()
    }

    /// Whether column `j` is a pseudo-atom.
    pub fn is_pseudo(&self, j: usize) -> bool {
        self.factors[j] != 1.0
    }
}

/// Resolve the per-state bond vectors of a spin.
///
/// Pseudo-atoms with three members use the normalised sum of the member
/// vectors, the direction of the methyl C3 axis.
fn resolve_vectors(spin: &SpinContainer) -> Option<Vec<Vector3<f64>>> {
    if !spin.is_pseudo_atom() {
        return spin.bond_vectors.clone().filter(|v| !v.is_empty());
    }

    let count = spin.members[0].bond_vectors.len();
    if count == 0 || spin.members.iter().any(|m| m.bond_vectors.len() != count) {
        return None;
    }

    let vectors = (0..count)
        .map(|c| {
            let sum: Vector3<f64> = spin.members.iter().map(|m| m.bond_vectors[c]).sum();
            let norm = sum.norm();
            if norm > 0.0 {
                sum / norm
            } else {
                sum
            }
        })
        .collect();
    Some(vectors)
}

pub(crate) fn dipolar_constant_of(spin: &SpinContainer) -> Result<f64> {
    let heteronuc = spin.heteronuc_type.as_deref().ok_or_else(|| {
        NStateError::MissingAttribute(format!("The heteronucleus type of spin '{}' is not set", spin.id))
    })?;
    let proton = spin.proton_type.as_deref().ok_or_else(|| {
        NStateError::MissingAttribute(format!("The proton type of spin '{}' is not set", spin.id))
    })?;
    let r = spin.bond_length.ok_or_else(|| {
        NStateError::MissingAttribute(format!("The bond length of spin '{}' is not set", spin.id))
    })?;

    Ok(rdc_constant(
        gyromagnetic_ratio(heteronuc)?,
        gyromagnetic_ratio(proton)?,
        r * ANGSTROM,
    ))
}

/// Assemble the RDC data of all selected spins.
///
/// # Arguments
///
/// * `pipe` - The data pipe
/// * `align_ids` - The alignments forming the rows
/// * `n_states` - The number of states N
/// * `sim_index` - Use the simulated values of this Monte Carlo index
/// * `warnings` - Collects missing bond vector and pseudo-atom warnings
pub fn assemble(
    pipe: &DataPipe,
    align_ids: &[String],
    n_states: usize,
    sim_index: Option<usize>,
    warnings: &mut Warnings,
) -> Result<RdcData> {
    let mut spin_indices = Vec::new();
    let mut vectors = Vec::new();
    let mut dj = Vec::new();
    let mut factors = Vec::new();
    let mut num_vectors: Option<usize> = None;

    for (k, spin) in pipe.spins.iter().enumerate() {
        if !spin.select || !spin.has_rdc() {
            continue;
        }

        if spin.is_pseudo_atom() && spin.members.len() != 3 {
            warnings.push(Warning::UnsupportedPseudoAtom {
                spin: spin.id.clone(),
                members: spin.members.len(),
            });
            continue;
        }

        let resolved = match resolve_vectors(spin) {
            Some(v) => v,
            None => {
                warnings.push(Warning::MissingBondVector {
                    spin: spin.id.clone(),
                });
                spin_indices.push(k);
                vectors.push(vec![None; n_states]);
                dj.push(None);
                factors.push(1.0);
                continue;
            }
        };

        match num_vectors {
            None => num_vectors = Some(resolved.len()),
            Some(n) if n != resolved.len() => {
                return Err(NStateError::Data(format!(
                    "The spin '{}' has {} bond vectors while other spins have {}",
                    spin.id,
                    resolved.len(),
                    n
                )));
            }
            Some(_) => {}
        }

        let per_state: Vec<Option<Vector3<f64>>> = if resolved.len() == n_states {
            resolved.into_iter().map(Some).collect()
        } else if resolved.len() == 1 {
            vec![Some(resolved[0]); n_states]
        } else {
            return Err(NStateError::Config(format!(
                "The number of bond vectors ({}) of spin '{}' does not match the number of states ({})",
                resolved.len(),
                spin.id,
                n_states
            )));
        };

        spin_indices.push(k);
        vectors.push(per_state);
        dj.push(Some(dipolar_constant_of(spin)?));
        factors.push(if spin.is_pseudo_atom() { -3.0 } else { 1.0 });
    }

    if num_vectors.is_none() {
        return Err(NStateError::Data("No bond vectors could be found".to_string()));
    }

    let shape = (align_ids.len(), spin_indices.len());
    let mut values = Array2::from_elem(shape, None);
    let mut errors = Array2::from_elem(shape, None);
    let mut weights = Array2::from_elem(shape, 1.0);
    let mut absolute = Array2::from_elem(shape, false);

    for (j, &k) in spin_indices.iter().enumerate() {
        let spin = &pipe.spins[k];
        let has_vectors = dj[j].is_some();

        for (i, id) in align_ids.iter().enumerate() {
            if has_vectors {
                values[[i, j]] = spin
                    .data_value(DataClass::Rdc, id, sim_index)
                    .map(|v| v * factors[j]);
            }
            errors[[i, j]] = spin.rdc_err.get(id).map(|e| e * factors[j].abs());
            if let Some(w) = spin.rdc_weight.get(id) {
                weights[[i, j]] = *w;
            }
            absolute[[i, j]] = spin.absolute_rdc.get(id).copied().unwrap_or(false);
        }
    }

    Ok(RdcData {
        align_ids: align_ids.to_vec(),
        spin_indices,
        values,
        errors,
        weights,
        absolute,
        vectors,
        dj,
        factors,
    })
}
