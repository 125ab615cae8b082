//! Back-calculated data and its storage in the data pipe.

use crate::alignment::TensorComponents;
use crate::pipe::DataPipe;

/// Values back-calculated from a parameter vector.
///
/// RDCs are in Hz and PCSs in ppm, directly comparable with the measured values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackCalculated {
    /// (spin index, alignment id, RDC)
    pub rdc: Vec<(usize, String, f64)>,
    /// (spin index, alignment id, PCS)
    pub pcs: Vec<(usize, String, f64)>,
    /// (tensor index, reduced tensor)
    pub tensors: Vec<(usize, TensorComponents)>,
}

impl BackCalculated {
    /// Replace the back-calculated RDCs and PCSs of all spins.
    ///
    /// Back-calculated reduced tensors are not stored, as the reduced tensor
    /// values are the data themselves.
    pub fn store(&self, pipe: &mut DataPipe) {
        for spin in &mut pipe.spins {
            spin.rdc_bc.clear();
            spin.pcs_bc.clear();
        }
        for (k, id, value) in &self.rdc {
            pipe.spins[*k].rdc_bc.insert(id.clone(), *value);
        }
        for (k, id, value) in &self.pcs {
            pipe.spins[*k].pcs_bc.insert(id.clone(), *value);
        }
    }
}
