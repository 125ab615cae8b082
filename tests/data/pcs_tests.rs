//! Tests for the PCS channel and the optimisation of the paramagnetic centre.

use crate::test_helpers::{true_tensor, unit_vectors};
use approx::assert_relative_eq;
use nalgebra::Vector3;
use nstate_rs::data::{base_data_types, DataType};
use nstate_rs::optimise::Algorithm;
use nstate_rs::pipe::{DataPipe, SpinContainer};
use nstate_rs::{calculate, minimise, MinimiseOptions, NStateError, NStateTarget, Warnings};

fn true_centre() -> Vector3<f64> {
    Vector3::new(1.5, -2.0, 3.0)
}

/// A single-state fixed model with `n_spins` PCS spins placed 6 to 12 Angstrom
/// around the paramagnetic centre, carrying the PCSs of the true tensor.
fn pcs_pipe(n_spins: usize) -> DataPipe {
    let mut pipe = DataPipe::new();
    pipe.add_alignment("a");
    let directions = unit_vectors(n_spins, 21);
    for (k, dir) in directions.iter().enumerate() {
        let distance = 6.0 + (k % 7) as f64;
        pipe.add_spin(
            SpinContainer::new(format!("{}", k + 1))
                .with_pcs("a", 0.0, Some(0.1))
                .with_positions(vec![true_centre() + dir * distance]),
        );
    }
    pipe.set_temperature("a", 298.0);
    pipe.set_frequency("a", 600e6);
    pipe.number_of_states(1).unwrap();
    pipe.select_model("fixed", &mut Warnings::new()).unwrap();

    pipe.set_tensor_values("a", true_tensor()).unwrap();
    pipe.set_paramagnetic_centre(Some(true_centre()), true);
    calculate(&mut pipe, None).unwrap();
    for spin in &mut pipe.spins {
        spin.pcs = spin.pcs_bc.clone();
        spin.pcs_bc.clear();
    }
    pipe.stats = None;
    pipe.q_factors = None;
    pipe
}

#[test]
fn test_pcs_back_calculation() {
    let mut pipe = pcs_pipe(15);
    assert_eq!(base_data_types(&pipe).unwrap(), vec![DataType::Pcs]);
    assert!(pipe.spins.iter().any(|s| s.pcs["a"].abs() > 1.0));

    // Measured values are the back-calculation at the same parameters.
    let outcome = calculate(&mut pipe, None).unwrap();
    assert!(outcome.stats.unwrap().chi2 < 1e-20);
    assert_relative_eq!(pipe.q_factors.as_ref().unwrap().pcs["a"], 0.0, epsilon = 1e-10);
    for spin in &pipe.spins {
        assert_relative_eq!(spin.pcs_bc["a"], spin.pcs["a"], max_relative = 1e-12);
    }
}

#[test]
fn test_pcs_depends_on_distance() {
    let mut pipe = pcs_pipe(2);
    let before: Vec<f64> = pipe.spins.iter().map(|s| s.pcs["a"]).collect();

    // Moving every spin twice as far away scales the shifts by 1/8.
    for spin in &mut pipe.spins {
        spin.pos = spin.pos.iter().map(|p| true_centre() + (p - true_centre()) * 2.0).collect();
    }
    calculate(&mut pipe, None).unwrap();
    for (spin, value) in pipe.spins.iter().zip(before) {
        assert_relative_eq!(spin.pcs_bc["a"], value / 8.0, max_relative = 1e-12);
    }
}

#[test]
fn test_pcs_fit_recovers_tensor() {
    let mut pipe = pcs_pipe(15);
    pipe.set_tensor_values("a", Default::default()).unwrap();

    let outcome = minimise(&mut pipe, &MinimiseOptions::default(), None).unwrap();
    let stats = outcome.stats.unwrap();
    assert!(stats.chi2 < 1e-10, "chi2 = {}", stats.chi2);

    let fitted = pipe.state.tensors[0].to_array();
    for (a, b) in fitted.iter().zip(true_tensor().to_array().iter()) {
        assert_relative_eq!(a, b, max_relative = 1e-6);
    }
}

#[test]
fn test_floated_centre_is_recovered() {
    let mut pipe = pcs_pipe(15);
    pipe.fix_all_tensors(true);
    pipe.set_paramagnetic_centre(Some(true_centre() + Vector3::new(0.4, -0.3, 0.5)), false);

    let target = NStateTarget::new(&pipe, None, true, &mut Warnings::new()).unwrap();
    assert_eq!(target.param_num(), 3);

    let outcome = minimise(&mut pipe, &MinimiseOptions::default(), None).unwrap();
    let stats = outcome.stats.unwrap();
    assert!(stats.chi2 < 1e-10, "chi2 = {}", stats.chi2);

    let centre = pipe.state.paramagnetic_centre.unwrap();
    for (a, b) in centre.iter().zip(true_centre().iter()) {
        assert_relative_eq!(a, b, epsilon = 1e-6);
    }
}

#[test]
fn test_newton_rejects_floated_centre() {
    let mut pipe = pcs_pipe(5);
    pipe.set_paramagnetic_centre(None, false);
    let before = pipe.state.clone();

    let options = MinimiseOptions::default().with_algorithm(Algorithm::Newton);
    assert!(matches!(minimise(&mut pipe, &options, None), Err(NStateError::Config(_))));
    assert_eq!(pipe.state, before);

    // A fixed centre is fine.
    pipe.set_paramagnetic_centre(None, true);
    assert!(minimise(&mut pipe, &options, None).is_ok());
}

#[test]
fn test_missing_temperature() {
    let mut pipe = pcs_pipe(3);
    pipe.temperature.clear();
    assert!(matches!(calculate(&mut pipe, None), Err(NStateError::Config(_))));
}
