//! Atomic position assembly for the PCS.

use nalgebra::Vector3;

use super::pcs::PcsData;
use crate::error::{NStateError, Result};
use crate::pipe::DataPipe;

/// Per-state positions of the PCS spins and the paramagnetic centre, in Angstrom.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomicPositions {
    /// Positions per PCS column and state.
    pub positions: Vec<Vec<Vector3<f64>>>,
    pub centre: Vector3<f64>,
}

/// Broadcast a single position to all states, or check that there is one per state.
pub(crate) fn per_state(pos: &[Vector3<f64>], n_states: usize, owner: &str) -> Result<Vec<Vector3<f64>>> {
    match pos.len() {
        0 => Err(NStateError::MissingAttribute(format!(
            "Positional information is missing for '{}'",
            owner
        ))),
        1 => Ok(vec![pos[0]; n_states]),
        len if len == n_states => Ok(pos.to_vec()),
        len => Err(NStateError::Config(format!(
            "The number of positions ({}) of '{}' does not match the number of states ({})",
            len, owner, n_states
        ))),
    }
}

/// Assemble the positions of the PCS spins.
pub fn assemble(
    pipe: &DataPipe,
    pcs: &PcsData,
    n_states: usize,
    sim_index: Option<usize>,
) -> Result<AtomicPositions> {
    let positions = pcs
        .spin_indices
        .iter()
        .map(|&k| {
            let spin = &pipe.spins[k];
            per_state(&spin.pos, n_states, &spin.id)
        })
        .collect::<Result<Vec<_>>>()?;

    let centre = pipe
        .state(sim_index)?
        .paramagnetic_centre
        .unwrap_or_else(Vector3::zeros);

    Ok(AtomicPositions { positions, centre })
}
