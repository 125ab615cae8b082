//! Tests for saving and restoring pipes and options as JSON.

use crate::test_helpers::{fixed_tensor_population_pipe, rdc_pipe, synthesise_rdcs, true_tensor};
use nstate_rs::alignment::TensorComponents;
use nstate_rs::optimise::Algorithm;
use nstate_rs::{minimise, DataPipe, MinimiseOptions};

#[test]
fn test_pipe_round_trip_is_exact() {
    let mut pipe = rdc_pipe("population", 3, 6, 5);
    synthesise_rdcs(&mut pipe, true_tensor(), &[0.2, 0.5, 0.3]);
    pipe.set_tensor_values("a", TensorComponents::new(1.1e-4, -0.7e-4, 3.3e-5, -1e-4, 2.9e-4))
        .unwrap();
    pipe.state.probs = vec![Some(0.1), Some(1.0 / 3.0), Some(1.0 - 0.1 - 1.0 / 3.0)];

    let json = pipe.to_json().unwrap();
    let restored = DataPipe::from_json(&json).unwrap();
    assert_eq!(restored, pipe);
    assert_eq!(restored.state.tensors[0].axx, 1.1e-4);
    assert_eq!(restored.state.probs[1], Some(1.0 / 3.0));
}

#[test]
fn test_pipe_round_trip_after_fit() {
    let mut pipe = fixed_tensor_population_pipe();
    minimise(&mut pipe, &MinimiseOptions::default(), None).unwrap();
    assert!(pipe.stats.is_some());

    let restored = DataPipe::from_json(&pipe.to_json().unwrap()).unwrap();
    assert_eq!(restored, pipe);
}

#[test]
fn test_options_round_trip_keeps_tiny_tolerances() {
    let options = MinimiseOptions::default()
        .with_algorithm(Algorithm::Newton)
        .with_func_tol(1e-25)
        .with_grad_tol(3.7e-27);

    let restored = MinimiseOptions::from_json(&options.to_json().unwrap()).unwrap();
    assert_eq!(restored, options);
    assert_eq!(restored.func_tol, 1e-25);
    assert_eq!(restored.grad_tol, Some(3.7e-27));
}
