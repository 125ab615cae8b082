//! Monte Carlo simulation storage.

use serde::{Deserialize, Serialize};

use super::model::ModelState;

/// Statistics of one optimisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinimiseStats {
    pub chi2: f64,
    pub iterations: usize,
    pub f_count: usize,
    pub g_count: usize,
    pub h_count: usize,
    pub warning: Option<String>,
}

/// The storage of one simulation index.
///
/// Slots are allocated before any simulation runs and each simulation writes
/// only its own slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimSlot {
    pub state: ModelState,
    pub stats: Option<MinimiseStats>,
    /// Message of a failed optimisation, when failures are recorded rather than raised.
    pub failure: Option<String>,
}

impl SimSlot {
    pub fn new(state: ModelState) -> Self {
        Self {
            state,
            stats: None,
            failure: None,
        }
    }
}

/// The simulation namespace, parallel to the primary model state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimStore {
    /// Number of simulations.
    pub number: usize,

    /// Selection flags of the simulations.
    pub select: Vec<bool>,

    pub slots: Vec<SimSlot>,
}

impl SimStore {
    /// Allocate `number` selected simulations, each starting from `state`.
    pub fn new(number: usize, state: &ModelState) -> Self {
        Self {
            number,
            select: vec![true; number],
            slots: (0..number).map(|_| SimSlot::new(state.clone())).collect(),
        }
    }

    /// Indices of the selected simulations.
    pub fn selected(&self) -> impl Iterator<Item = usize> + '_ {
        self.select
            .iter()
            .enumerate()
            .filter(|(_, s)| **s)
            .map(|(i, _)| i)
    }
}
