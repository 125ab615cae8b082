//! Per-spin data records.

use std::collections::BTreeMap;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// The experimental data classes a spin can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataClass {
    Rdc,
    Pcs,
}

/// One member of a pseudo-atom, such as a methyl proton.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PseudoMember {
    pub id: String,

    /// Unit bond vectors to the bonded partner, one per state (or a single one).
    pub bond_vectors: Vec<Vector3<f64>>,

    /// Positions in Angstrom, one per state (or a single one).
    pub pos: Vec<Vector3<f64>>,
}

/// A spin container holding the measured and derived data of one atom (pair).
///
/// Measured quantities are keyed by alignment identifier. A missing key means
/// "no data" for that alignment, never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpinContainer {
    pub id: String,
    pub select: bool,

    pub rdc: BTreeMap<String, f64>,
    pub rdc_err: BTreeMap<String, f64>,
    pub rdc_weight: BTreeMap<String, f64>,
    /// Alignments for which only the magnitude of the RDC is known.
    pub absolute_rdc: BTreeMap<String, bool>,

    /// PCS values in ppm.
    pub pcs: BTreeMap<String, f64>,
    pub pcs_err: BTreeMap<String, f64>,
    pub pcs_weight: BTreeMap<String, f64>,

    /// Unit bond vectors to the bonded partner, one per state (or a single one).
    pub bond_vectors: Option<Vec<Vector3<f64>>>,
    /// Pseudo-atom members. Empty for normal atoms.
    pub members: Vec<PseudoMember>,
    pub heteronuc_type: Option<String>,
    pub proton_type: Option<String>,
    /// Bond length in Angstrom.
    pub bond_length: Option<f64>,
    /// Atomic positions in Angstrom, one per state (or a single one).
    pub pos: Vec<Vector3<f64>>,

    pub rdc_bc: BTreeMap<String, f64>,
    pub pcs_bc: BTreeMap<String, f64>,
    pub rdc_sim: BTreeMap<String, Vec<f64>>,
    pub pcs_sim: BTreeMap<String, Vec<f64>>,
}

impl SpinContainer {
    /// Create an empty, selected spin container.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            select: true,
            rdc: BTreeMap::new(),
            rdc_err: BTreeMap::new(),
            rdc_weight: BTreeMap::new(),
            absolute_rdc: BTreeMap::new(),
            pcs: BTreeMap::new(),
            pcs_err: BTreeMap::new(),
            pcs_weight: BTreeMap::new(),
            bond_vectors: None,
            members: Vec::new(),
            heteronuc_type: None,
            proton_type: None,
            bond_length: None,
            pos: Vec::new(),
            rdc_bc: BTreeMap::new(),
            pcs_bc: BTreeMap::new(),
            rdc_sim: BTreeMap::new(),
            pcs_sim: BTreeMap::new(),
        }
    }

    /// Add an RDC value (Hz) and optional error for an alignment.
    pub fn with_rdc(mut self, align_id: &str, value: f64, error: Option<f64>) -> Self {
        self.rdc.insert(align_id.to_string(), value);
        if let Some(err) = error {
            self.rdc_err.insert(align_id.to_string(), err);
        }
        self
    }

    /// Add a PCS value (ppm) and optional error for an alignment.
    pub fn with_pcs(mut self, align_id: &str, value: f64, error: Option<f64>) -> Self {
        self.pcs.insert(align_id.to_string(), value);
        if let Some(err) = error {
            self.pcs_err.insert(align_id.to_string(), err);
        }
        self
    }

    /// Declare the dipole pair: isotopes of the heteronucleus and proton, and the bond length in Angstrom.
    pub fn with_dipole(mut self, heteronuc: &str, proton: &str, bond_length: f64) -> Self {
        self.heteronuc_type = Some(heteronuc.to_string());
        self.proton_type = Some(proton.to_string());
        self.bond_length = Some(bond_length);
        self
    }

    pub fn with_bond_vectors(mut self, vectors: Vec<Vector3<f64>>) -> Self {
        self.bond_vectors = Some(vectors);
        self
    }

    pub fn with_positions(mut self, pos: Vec<Vector3<f64>>) -> Self {
        self.pos = pos;
        self
    }

    pub fn with_members(mut self, members: Vec<PseudoMember>) -> Self {
        self.members = members;
        self
    }

    pub fn with_select(mut self, select: bool) -> Self {
        self.select = select;
        self
    }

    pub fn has_rdc(&self) -> bool {
        !self.rdc.is_empty()
    }

    pub fn has_pcs(&self) -> bool {
        !self.pcs.is_empty()
    }

    pub fn is_pseudo_atom(&self) -> bool {
        !self.members.is_empty()
    }

    /// The data classes present in this container.
    pub fn data_classes(&self) -> Vec<DataClass> {
        match (self.has_rdc(), self.has_pcs()) {
            (true, true) => vec![DataClass::Rdc, DataClass::Pcs],
            (true, false) => vec![DataClass::Rdc],
            (false, true) => vec![DataClass::Pcs],
            (false, false) => Vec::new(),
        }
    }

    /// The measured value of a data class for an alignment.
    pub fn value(&self, class: DataClass, align_id: &str) -> Option<f64> {
        match class {
            DataClass::Rdc => self.rdc.get(align_id).copied(),
            DataClass::Pcs => self.pcs.get(align_id).copied(),
        }
    }

    /// The measurement error of a data class for an alignment.
    pub fn error(&self, class: DataClass, align_id: &str) -> Option<f64> {
        match class {
            DataClass::Rdc => self.rdc_err.get(align_id).copied(),
            DataClass::Pcs => self.pcs_err.get(align_id).copied(),
        }
    }

    /// The back-calculated value of a data class for an alignment.
    pub fn back_calculated(&self, class: DataClass, align_id: &str) -> Option<f64> {
        match class {
            DataClass::Rdc => self.rdc_bc.get(align_id).copied(),
            DataClass::Pcs => self.pcs_bc.get(align_id).copied(),
        }
    }

    /// The value used as data: the simulated one for a Monte Carlo index, otherwise the measured one.
    pub fn data_value(&self, class: DataClass, align_id: &str, sim_index: Option<usize>) -> Option<f64> {
        match sim_index {
            None => self.value(class, align_id),
            Some(i) => {
                let sims = match class {
                    DataClass::Rdc => &self.rdc_sim,
                    DataClass::Pcs => &self.pcs_sim,
                };
                sims.get(align_id).and_then(|values| values.get(i)).copied()
            }
        }
    }
}
