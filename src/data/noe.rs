//! NOE distance restraints: ensemble averaged distances and the flat-bottom potential.

use nalgebra::Vector3;

use super::positions::per_state;
use crate::error::{NStateError, Result};
use crate::pipe::{DataPipe, NoeReport};

/// Exponent of the ensemble distance average.
pub const NOE_EXPONENT: i32 = -6;

/// The flat-bottom quadratic potential.
///
/// Zero inside `[lower, upper]` (boundaries included), `(x - upper)^2` above the
/// upper bound and `(x - lower)^2` below the lower bound.
pub fn quad_pot(x: f64, lower: f64, upper: f64) -> f64 {
    if x > upper {
        (x - upper).powi(2)
    } else if x < lower {
        (x - lower).powi(2)
    } else {
        0.0
    }
}

/// The flat-bottom potential of each distance against the matching bounds.
pub fn quad_pot_array(distances: &[f64], lower: &[f64], upper: &[f64]) -> Vec<f64> {
    distances
        .iter()
        .zip(lower.iter().zip(upper))
        .map(|(&x, (&l, &u))| quad_pot(x, l, u))
        .collect()
}

/// Per-state positions of all atoms matching an identifier.
///
/// A pseudo-atom resolves to its members.
fn atom_positions(pipe: &DataPipe, atom: &str, n_states: usize) -> Result<Vec<Vec<Vector3<f64>>>> {
    if let Some(spin) = pipe.spins.iter().find(|s| s.id == atom) {
        if spin.is_pseudo_atom() {
            return spin
                .members
                .iter()
                .map(|m| per_state(&m.pos, n_states, &m.id))
                .collect();
        }
        return Ok(vec![per_state(&spin.pos, n_states, &spin.id)?]);
    }

    for spin in &pipe.spins {
        if let Some(member) = spin.members.iter().find(|m| m.id == atom) {
            return Ok(vec![per_state(&member.pos, n_states, &member.id)?]);
        }
    }

    Err(NStateError::Data(format!("The atom '{}' cannot be found", atom)))
}

/// The r^-6 averaged distance between two atoms (or pseudo-atoms) over all states.
pub fn ave_dist(pipe: &DataPipe, atom1: &str, atom2: &str) -> Result<f64> {
    let n_states = pipe.n_states()?;
    let first = atom_positions(pipe, atom1, n_states)?;
    let second = atom_positions(pipe, atom2, n_states)?;

    let mut sum = 0.0;
    let mut count = 0usize;
    for c in 0..n_states {
        for a in &first {
            for b in &second {
                sum += (a[c] - b[c]).norm().powi(NOE_EXPONENT);
                count += 1;
            }
        }
    }

    Ok((sum / count as f64).powf(1.0 / NOE_EXPONENT as f64))
}

/// Evaluate every NOE restraint of the pipe.
pub fn evaluate(pipe: &DataPipe) -> Result<Vec<NoeReport>> {
    pipe.noe_restraints
        .iter()
        .map(|r| {
            let dist = ave_dist(pipe, &r.atom1, &r.atom2)?;
            Ok(NoeReport {
                atom1: r.atom1.clone(),
                atom2: r.atom2.clone(),
                ave_dist: dist,
                potential: quad_pot(dist, r.lower, r.upper),
            })
        })
        .collect()
}
