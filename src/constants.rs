//! Physical constants and the interaction constants built from them.
//!
//! All values are SI. Distances handed to the constant functions are in
//! metres, the data model stores them in Angstrom.

use std::f64::consts::PI;

use crate::error::{NStateError, Result};

/// Planck's constant (J.s).
pub const H: f64 = 6.62606876e-34;

/// Dirac's constant, h / 2pi (J.s).
pub const H_BAR: f64 = H / (2.0 * PI);

/// The magnetic constant, the permeability of vacuum (T.m/A).
pub const MU0: f64 = 4.0 * PI * 1e-7;

/// Boltzmann's constant (J/K).
pub const KB: f64 = 1.3806504e-23;

/// The proton gyromagnetic ratio (rad/s/T).
pub const G1H: f64 = 26.7522212e7;

/// Angstrom to metre conversion.
pub const ANGSTROM: f64 = 1e-10;

/// Parts per million to unitless conversion.
pub const PPM: f64 = 1e-6;

/// Gyromagnetic ratios of the supported isotopes (rad/s/T).
const GYROMAGNETIC_RATIOS: [(&str, f64); 7] = [
    ("1H", G1H),
    ("2H", 4.1066e7),
    ("13C", 6.728e7),
    ("14N", 1.9338e7),
    ("15N", -2.7126e7),
    ("19F", 25.18148e7),
    ("31P", 10.8394e7),
];

/// Return the gyromagnetic ratio of an isotope such as `"15N"` or `"1H"`.
pub fn gyromagnetic_ratio(isotope: &str) -> Result<f64> {
    GYROMAGNETIC_RATIOS
        .iter()
        .find(|(name, _)| *name == isotope)
        .map(|(_, g)| *g)
        .ok_or_else(|| {
            NStateError::InvalidInput(format!("The isotope '{}' is unknown", isotope))
        })
}

/// The dipolar constant `-mu0/(4pi) * gi * gj * h_bar / r^3`.
///
/// # Arguments
///
/// * `gi` - Gyromagnetic ratio of the first spin
/// * `gj` - Gyromagnetic ratio of the second spin
/// * `r` - Internuclear distance in metres
pub fn dipolar_constant(gi: f64, gj: f64, r: f64) -> f64 {
    -MU0 / (4.0 * PI) * gi * gj * H_BAR / r.powi(3)
}

/// The RDC dipolar constant in Hertz, `3/(2pi) * dipolar_constant`.
///
/// The factor of 3 comes from the alignment tensor definition.
pub fn rdc_constant(gi: f64, gj: f64, r: f64) -> f64 {
    3.0 / (2.0 * PI) * dipolar_constant(gi, gj, r)
}

/// The pseudo-contact shift constant `mu0/(4pi) * 15 kB T / (B0^2 r^3)`.
///
/// # Arguments
///
/// * `temp` - Temperature in Kelvin
/// * `field` - Magnetic field strength in Tesla
/// * `r` - Distance between the paramagnetic centre and the spin in metres
pub fn pcs_constant(temp: f64, field: f64, r: f64) -> f64 {
    MU0 / (4.0 * PI) * 15.0 * KB * temp / (field.powi(2) * r.powi(3))
}

/// Convert a proton spectrometer frequency in Hz into a field strength in Tesla.
pub fn frequency_to_field(frq: f64) -> f64 {
    frq * 2.0 * PI / G1H
}
