//! Q factors of the back-calculated RDCs and PCSs.

use std::collections::BTreeMap;

use super::rdc::dipolar_constant_of;
use crate::error::Result;
use crate::pipe::{DataClass, DataPipe, QFactors};
use crate::warnings::{Warning, Warnings};

/// Normalisation used when the axial component of the dipolar tensor vanishes.
const ZERO_DA_NORM: f64 = 1e-15;

/// Sum of squared deviations, sum of squared values and the point count of one alignment.
fn deviations(pipe: &DataPipe, class: DataClass, align_id: &str) -> (f64, f64, usize) {
    let mut sse = 0.0;
    let mut d2 = 0.0;
    let mut n = 0;

    for spin in pipe.spins.iter().filter(|s| s.select) {
        let (Some(value), Some(bc)) = (spin.value(class, align_id), spin.back_calculated(class, align_id)) else {
            continue;
        };
        let absolute = class == DataClass::Rdc
            && spin.absolute_rdc.get(align_id).copied().unwrap_or(false);
        let (value, bc) = if absolute {
            (value.abs(), bc.abs())
        } else {
            (value, bc)
        };

        sse += (value - bc).powi(2);
        d2 += value.powi(2);
        n += 1;
    }
    (sse, d2, n)
}

/// Total Q factor from the per-alignment values, `sqrt(mean(Q^2))`.
fn total(q: &BTreeMap<String, f64>) -> Option<f64> {
    if q.is_empty() {
        return None;
    }
    Some((q.values().map(|v| v * v).sum::<f64>() / q.len() as f64).sqrt())
}

/// The common dipolar constant of all RDC spins, or the reason it does not exist.
fn common_dipolar_constant(pipe: &DataPipe) -> std::result::Result<f64, String> {
    let mut dj: Option<f64> = None;
    for spin in pipe.spins.iter().filter(|s| s.select && s.has_rdc()) {
        if spin.is_pseudo_atom() {
            return Err("pseudo-atoms are present".to_string());
        }
        let value = dipolar_constant_of(spin).map_err(|e| e.to_string())?;
        match dj {
            None => dj = Some(value),
            Some(d) if (d - value).abs() > 1e-10 * d.abs() => {
                return Err("the dipolar constants differ between interatomic pairs".to_string());
            }
            Some(_) => {}
        }
    }
    dj.ok_or_else(|| "no RDC data is present".to_string())
}

/// Calculate the RDC and PCS Q factors from the measured and back-calculated values.
///
/// The Da-normalised RDC Q factor is skipped with a warning when it is not
/// defined, which is the case for pseudo-atoms or mixed dipolar constants.
pub fn q_factors(pipe: &DataPipe, warnings: &mut Warnings) -> Result<QFactors> {
    let mut q = QFactors::default();

    for id in &pipe.align_ids {
        let (sse, d2, _) = deviations(pipe, DataClass::Rdc, id);
        if d2 > 0.0 {
            q.rdc.insert(id.clone(), (sse / d2).sqrt());
        }

        let (sse, d2, _) = deviations(pipe, DataClass::Pcs, id);
        if d2 > 0.0 {
            q.pcs.insert(id.clone(), (sse / d2).sqrt());
        }
    }

    if !q.rdc.is_empty() {
        match common_dipolar_constant(pipe) {
            Ok(dj) => {
                for id in q.rdc.keys() {
                    let Some(index) = pipe.tensor_index(id) else {
                        continue;
                    };
                    let (sse, _, n) = deviations(pipe, DataClass::Rdc, id);
                    let pv = pipe.state.tensors[index].principal_values();
                    let (dxx, dyy, dzz) = (dj * pv[0], dj * pv[1], dj * pv[2]);

                    let da = (dzz - (dxx + dyy) / 2.0) / 3.0;
                    let norm = if da == 0.0 {
                        ZERO_DA_NORM
                    } else {
                        let dr = (dxx - dyy) / 3.0;
                        let r = dr / da;
                        2.0 * da * da * (4.0 + 3.0 * r * r) / 5.0
                    };
                    q.rdc_da.insert(id.clone(), (sse / n as f64 / norm).sqrt());
                }
            }
            Err(reason) => warnings.push(Warning::QFactorSkipped { reason }),
        }
    }

    q.q_rdc = total(&q.rdc);
    q.q_rdc_da = total(&q.rdc_da);
    q.q_pcs = total(&q.pcs);
    Ok(q)
}
