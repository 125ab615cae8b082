//! The data pipe: the explicit context holding all state of one N-state analysis.
//!
//! Every operation of the crate takes the pipe as an argument. Mutating
//! operations require `&mut DataPipe`, which gives the exclusive access one
//! assemble, optimise and disassemble cycle needs. Monte Carlo simulations only
//! read the pipe and return the contents of their own slot.

pub mod model;
pub mod sim;
pub mod spin;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::alignment::{AlignTensor, TensorComponents};
use crate::error::{NStateError, Result};

pub use model::{ModelState, ModelVariant};
pub use sim::{MinimiseStats, SimSlot, SimStore};
pub use spin::{DataClass, PseudoMember, SpinContainer};

/// An NOE distance restraint between two atoms (bounds in Angstrom).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoeRestraint {
    pub atom1: String,
    pub atom2: String,
    pub lower: f64,
    pub upper: f64,
}

/// The reported ensemble distance and flat-bottom potential of one restraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoeReport {
    pub atom1: String,
    pub atom2: String,
    pub ave_dist: f64,
    pub potential: f64,
}

/// Q factors of the last fit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QFactors {
    /// RDC Q factors normalised by the sum of squared RDCs, per alignment.
    pub rdc: BTreeMap<String, f64>,
    /// RDC Q factors normalised by `2Da^2(4 + 3R^2)/5`, per alignment.
    pub rdc_da: BTreeMap<String, f64>,
    pub q_rdc: Option<f64>,
    pub q_rdc_da: Option<f64>,
    /// PCS Q factors per alignment.
    pub pcs: BTreeMap<String, f64>,
    pub q_pcs: Option<f64>,
}

/// All per-analysis state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPipe {
    pub model: Option<ModelVariant>,

    /// The number of states N.
    pub n_states: Option<usize>,

    /// Number of loaded structural models, the default for N.
    pub structure_models: usize,

    /// Declared parameter names.
    pub params: Vec<String>,

    /// The primary values of all optimisable quantities.
    pub state: ModelState,

    pub align_ids: Vec<String>,
    pub align_tensors: Vec<AlignTensor>,

    /// (full, reduced) tensor index pairs.
    pub reductions: Vec<(usize, usize)>,

    pub ref_domain: Option<String>,

    /// When false the paramagnetic centre is optimised.
    pub paramag_centre_fixed: bool,

    /// Temperature (K) per alignment.
    pub temperature: BTreeMap<String, f64>,

    /// Proton frequency (Hz) per alignment.
    pub frequency: BTreeMap<String, f64>,

    pub spins: Vec<SpinContainer>,
    pub noe_restraints: Vec<NoeRestraint>,

    pub stats: Option<MinimiseStats>,
    pub q_factors: Option<QFactors>,
    pub noe_report: Vec<NoeReport>,

    /// Model parameter errors from the Monte Carlo error analysis.
    pub errors: Option<ModelState>,

    pub sim: Option<SimStore>,
}

impl Default for DataPipe {
    fn default() -> Self {
        Self::new()
    }
}

impl DataPipe {
    pub fn new() -> Self {
        Self {
            model: None,
            n_states: None,
            structure_models: 0,
            params: Vec::new(),
            state: ModelState::default(),
            align_ids: Vec::new(),
            align_tensors: Vec::new(),
            reductions: Vec::new(),
            ref_domain: None,
            paramag_centre_fixed: true,
            temperature: BTreeMap::new(),
            frequency: BTreeMap::new(),
            spins: Vec::new(),
            noe_restraints: Vec::new(),
            stats: None,
            q_factors: None,
            noe_report: Vec::new(),
            errors: None,
            sim: None,
        }
    }

    /// The selected model.
    pub fn model(&self) -> Result<ModelVariant> {
        self.model.ok_or(NStateError::NoModel)
    }

    /// The number of states.
    pub fn n_states(&self) -> Result<usize> {
        self.n_states
            .ok_or_else(|| NStateError::Config("The number of states has not been set".to_string()))
    }

    /// Declare an alignment, creating a zero tensor for it if none exists.
    pub fn add_alignment(&mut self, id: &str) {
        if !self.align_ids.iter().any(|a| a == id) {
            self.align_ids.push(id.to_string());
        }
        if self.tensor_index(id).is_none() {
            self.push_tensor(AlignTensor::new(id), TensorComponents::default());
        }
    }

    /// Add a tensor with its initial component values.
    ///
    /// The values are also copied into every existing Monte Carlo slot. Tensor
    /// IDs are unique: use [`DataPipe::set_tensor_values`] to change the
    /// values of an existing tensor.
    pub fn add_tensor(&mut self, tensor: AlignTensor, values: TensorComponents) -> Result<()> {
        if self.tensor_index(&tensor.id).is_some() {
            return Err(NStateError::Config(format!(
                "The alignment tensor '{}' already exists",
                tensor.id
            )));
        }
        self.push_tensor(tensor, values);
        Ok(())
    }

    pub(crate) fn push_tensor(&mut self, tensor: AlignTensor, values: TensorComponents) {
        self.align_tensors.push(tensor);
        self.state.tensors.push(values);
        if let Some(sim) = self.sim.as_mut() {
            for slot in &mut sim.slots {
                slot.state.tensors.push(values);
            }
        }
    }

    /// Set the primary component values of a tensor.
    pub fn set_tensor_values(&mut self, id: &str, values: TensorComponents) -> Result<()> {
        let index = self.tensor_index(id).ok_or_else(|| {
            NStateError::Config(format!("The alignment tensor '{}' does not exist", id))
        })?;
        self.state.tensors[index] = values;
        Ok(())
    }

    pub fn tensor_index(&self, id: &str) -> Option<usize> {
        self.align_tensors.iter().position(|t| t.id == id)
    }

    pub fn add_spin(&mut self, spin: SpinContainer) {
        self.spins.push(spin);
    }

    pub fn add_noe_restraint(&mut self, atom1: &str, atom2: &str, lower: f64, upper: f64) {
        self.noe_restraints.push(NoeRestraint {
            atom1: atom1.to_string(),
            atom2: atom2.to_string(),
            lower,
            upper,
        });
    }

    /// True when every tensor is fixed (including when there are none).
    pub fn all_tensors_fixed(&self) -> bool {
        self.align_tensors.iter().all(|t| t.fixed)
    }

    /// The model state for the primary fit or a simulation.
    pub fn state(&self, sim_index: Option<usize>) -> Result<&ModelState> {
        match sim_index {
            None => Ok(&self.state),
            Some(i) => Ok(&self.sim_slot(i)?.state),
        }
    }

    /// The mutable model state for the primary fit or a simulation.
    pub fn state_mut(&mut self, sim_index: Option<usize>) -> Result<&mut ModelState> {
        match sim_index {
            None => Ok(&mut self.state),
            Some(i) => Ok(&mut self.sim_slot_mut(i)?.state),
        }
    }

    pub fn sim_slot(&self, index: usize) -> Result<&SimSlot> {
        self.sim
            .as_ref()
            .and_then(|s| s.slots.get(index))
            .ok_or_else(|| NStateError::Config(format!("The simulation {} does not exist", index)))
    }

    pub fn sim_slot_mut(&mut self, index: usize) -> Result<&mut SimSlot> {
        self.sim
            .as_mut()
            .and_then(|s| s.slots.get_mut(index))
            .ok_or_else(|| NStateError::Config(format!("The simulation {} does not exist", index)))
    }

    /// Serialise the whole pipe to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Restore a pipe from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
