//! Tests for Monte Carlo simulations.
//!
//! Simulations are independent units of work, so their results must not
//! depend on the order or the threads they run on.

use crate::test_helpers::fixed_tensor_population_pipe;
use nstate_rs::pipe::DataPipe;
use nstate_rs::uncertainty::{
    create_data, error_analysis, monte_carlo, run, run_simulation, setup, sim_init_values,
    sim_return_chi2, sim_return_param, turn_off, MonteCarloConfig,
};
use nstate_rs::{minimise, MinimiseOptions, NStateError};

/// A fitted two-state problem with simulated data for `number` simulations.
fn simulated_pipe(number: usize, seed: u64) -> DataPipe {
    let mut pipe = fixed_tensor_population_pipe();
    for spin in &mut pipe.spins {
        spin.rdc_err.insert("a".to_string(), 0.5);
    }
    minimise(&mut pipe, &MinimiseOptions::default(), None).unwrap();

    setup(&mut pipe, number).unwrap();
    create_data(&mut pipe, seed).unwrap();
    sim_init_values(&mut pipe).unwrap();
    pipe
}

fn serial_config() -> MonteCarloConfig {
    MonteCarloConfig::default().with_parallel(false)
}

#[test]
fn test_simulated_data_is_reproducible() {
    let first = simulated_pipe(4, 7);
    let second = simulated_pipe(4, 7);
    let other_seed = simulated_pipe(4, 8);

    for ((a, b), c) in first.spins.iter().zip(&second.spins).zip(&other_seed.spins) {
        assert_eq!(a.rdc_sim["a"].len(), 4);
        assert_eq!(a.rdc_sim, b.rdc_sim);
        assert_ne!(a.rdc_sim, c.rdc_sim);
        // Randomised around the back-calculated value.
        assert!(a.rdc_sim["a"].iter().all(|v| (v - a.rdc_bc["a"]).abs() < 5.0));
    }
}

#[test]
fn test_simulations_independent_of_order() {
    let mut forward = simulated_pipe(6, 3);
    let reverse = forward.clone();
    let mut parallel = forward.clone();

    run(&mut forward, &serial_config()).unwrap();
    run(&mut parallel, &serial_config().with_parallel(true)).unwrap();

    let mut reverse_slots = Vec::new();
    for i in (0..6).rev() {
        let (slot, _) = run_simulation(&reverse, i, &serial_config()).unwrap();
        reverse_slots.push((i, slot));
    }

    let store = forward.sim.as_ref().unwrap();
    for (i, slot) in reverse_slots {
        assert_eq!(&store.slots[i], &slot, "simulation {}", i);
    }
    assert_eq!(forward.sim, parallel.sim);
}

#[test]
fn test_simulations_differ() {
    let mut pipe = simulated_pipe(5, 11);
    let summary = run(&mut pipe, &serial_config()).unwrap();
    assert_eq!(summary.completed, 5);
    assert!(summary.failed.is_empty());

    let p0 = sim_return_param(&pipe, 0).unwrap();
    assert_eq!(p0.len(), 5);
    assert!(p0.windows(2).any(|w| w[0] != w[1]));
    assert!(p0.iter().all(|p| (0.0..=1.0 + 1e-9).contains(p)));

    let chi2 = sim_return_chi2(&pipe).unwrap();
    assert!(chi2.iter().all(|c| c.is_some()));
    assert!(matches!(sim_return_param(&pipe, 1), Err(NStateError::InvalidInput(_))));
}

#[test]
fn test_error_analysis() {
    let mut pipe = simulated_pipe(20, 5);
    run(&mut pipe, &serial_config()).unwrap();
    error_analysis(&mut pipe).unwrap();

    let errors = pipe.errors.as_ref().unwrap();
    let sd = errors.probs[0].unwrap();
    assert!(sd > 0.0 && sd < 0.5, "sd = {}", sd);
    // Both populations move together.
    assert!((errors.probs[1].unwrap() - sd).abs() < 1e-9);
    // The fixed tensor is not randomised.
    assert!(errors.tensors[0].to_array().iter().all(|e| e.abs() < 1e-15));
}

#[test]
fn test_primary_fit_untouched() {
    let mut pipe = simulated_pipe(3, 9);
    let state = pipe.state.clone();
    let stats = pipe.stats.clone();

    run(&mut pipe, &serial_config()).unwrap();
    assert_eq!(pipe.state, state);
    assert_eq!(pipe.stats, stats);
}

#[test]
fn test_full_run_and_turn_off() {
    let mut pipe = fixed_tensor_population_pipe();
    minimise(&mut pipe, &MinimiseOptions::default(), None).unwrap();

    let config = MonteCarloConfig::default().with_number(4).with_seed(1).with_grid_inc(5);
    let summary = monte_carlo(&mut pipe, &config).unwrap();
    assert_eq!(summary.completed, 4);
    assert!(pipe.errors.is_some());

    turn_off(&mut pipe);
    assert!(pipe.sim.is_none());
    assert!(pipe.spins.iter().all(|s| s.rdc_sim.is_empty()));
}

#[test]
fn test_missing_error_is_fatal() {
    let mut pipe = fixed_tensor_population_pipe();
    minimise(&mut pipe, &MinimiseOptions::default(), None).unwrap();
    pipe.spins[0].rdc_err.clear();

    setup(&mut pipe, 2).unwrap();
    assert!(matches!(
        create_data(&mut pipe, 0),
        Err(NStateError::MissingAttribute(_))
    ));
}

#[test]
fn test_error_analysis_needs_two_simulations() {
    let mut pipe = simulated_pipe(1, 0);
    run(&mut pipe, &serial_config()).unwrap();
    assert!(matches!(error_analysis(&mut pipe), Err(NStateError::InvalidInput(_))));
}

#[test]
fn test_zero_simulations_rejected() {
    let mut pipe = fixed_tensor_population_pipe();
    assert!(matches!(setup(&mut pipe, 0), Err(NStateError::InvalidInput(_))));
    assert!(matches!(run(&mut pipe, &serial_config()), Err(NStateError::Config(_))));
}
