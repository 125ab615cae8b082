//! Tests for minimisation of the N-state model against synthetic RDCs.

use crate::test_helpers::{fixed_tensor_population_pipe, rdc_pipe, synthesise_rdcs, true_tensor};
use approx::{assert_abs_diff_eq, assert_relative_eq};
use nstate_rs::alignment::TensorComponents;
use nstate_rs::optimise::{model_statistics, Algorithm};
use nstate_rs::{minimise, MinimiseOptions, NStateError, Warning};

#[test]
fn test_fixed_model_recovers_tensor() {
    let mut pipe = rdc_pipe("fixed", 1, 8, 31);
    synthesise_rdcs(&mut pipe, true_tensor(), &[]);
    pipe.set_tensor_values("a", TensorComponents::default()).unwrap();

    let outcome = minimise(&mut pipe, &MinimiseOptions::default(), None).unwrap();
    let stats = outcome.stats.clone().unwrap();
    assert!(stats.warning.is_none(), "{:?}", stats.warning);
    assert!(stats.chi2 < 1e-12, "chi2 = {}", stats.chi2);
    // Constraints are meaningless without populations.
    assert!(outcome.warnings.iter().any(|w| *w == Warning::ConstraintsDisabled));

    let fitted = pipe.state.tensors[0].to_array();
    let expected = true_tensor().to_array();
    for (a, b) in fitted.iter().zip(expected.iter()) {
        assert_relative_eq!(a, b, max_relative = 1e-6);
    }

    let statistics = model_statistics(&pipe, None).unwrap();
    assert_eq!(statistics.k, 5);
    assert_eq!(statistics.n, 8);
    assert_eq!(statistics.chi2, Some(stats.chi2));
    assert!(pipe.q_factors.is_some());
    assert!(pipe.spins.iter().all(|s| s.rdc_bc.contains_key("a")));
}

#[test]
fn test_population_model_recovers_populations() {
    let mut pipe = rdc_pipe("population", 2, 10, 32);
    synthesise_rdcs(&mut pipe, true_tensor(), &[0.3, 0.7]);

    let start = TensorComponents::from_slice(&true_tensor().to_array().map(|v| 0.9 * v)).unwrap();
    pipe.set_tensor_values("a", start).unwrap();
    pipe.state.probs = vec![Some(0.5), Some(0.5)];

    let outcome = minimise(&mut pipe, &MinimiseOptions::default(), None).unwrap();
    let stats = outcome.stats.unwrap();
    assert!(stats.chi2 < 1e-8, "chi2 = {}", stats.chi2);

    let probs = pipe.state.probs_or_zero();
    assert_abs_diff_eq!(probs[0], 0.3, epsilon = 1e-4);
    assert_abs_diff_eq!(probs[0] + probs[1], 1.0, epsilon = 1e-12);
}

#[test]
fn test_active_population_constraint() {
    // The unconstrained optimum lies at p0 = 1.2.
    let mut pipe = rdc_pipe("population", 2, 10, 33);
    synthesise_rdcs(&mut pipe, true_tensor(), &[1.2, -0.2]);
    pipe.fix_all_tensors(true);
    pipe.state.probs = vec![Some(0.5), Some(0.5)];

    let outcome = minimise(&mut pipe, &MinimiseOptions::default(), None).unwrap();
    assert!(!outcome.is_skipped());

    let probs = pipe.state.probs_or_zero();
    assert_abs_diff_eq!(probs[0], 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(probs[1], 0.0, epsilon = 1e-6);
    assert!(outcome.stats.unwrap().chi2 > 0.0);
}

#[test]
fn test_newton_algorithm() {
    let mut pipe = fixed_tensor_population_pipe();
    let options = MinimiseOptions::default().with_algorithm(Algorithm::Newton);

    let outcome = minimise(&mut pipe, &options, None).unwrap();
    let stats = outcome.stats.unwrap();
    assert!(stats.h_count > 0);
    assert!(stats.chi2 < 1e-10, "chi2 = {}", stats.chi2);
    assert_abs_diff_eq!(pipe.state.probs[0].unwrap(), 0.3, epsilon = 1e-6);
}

#[test]
fn test_population_model_forces_constraints() {
    let mut pipe = fixed_tensor_population_pipe();
    let options = MinimiseOptions::default().with_constraints(false);

    let outcome = minimise(&mut pipe, &options, None).unwrap();
    assert!(outcome.warnings.iter().any(|w| *w == Warning::ConstraintsEnabled));
    assert_abs_diff_eq!(pipe.state.probs[0].unwrap(), 0.3, epsilon = 1e-6);
}

#[test]
fn test_fixed_model_without_parameters_is_skipped() {
    let mut pipe = rdc_pipe("fixed", 2, 4, 34);
    pipe.fix_all_tensors(true);
    let before = pipe.clone();

    let outcome = minimise(&mut pipe, &MinimiseOptions::default(), None).unwrap();
    assert!(outcome.is_skipped());
    assert!(outcome
        .warnings
        .iter()
        .any(|w| matches!(w, Warning::NoParameters { .. })));
    assert_eq!(pipe, before);
    assert_eq!(model_statistics(&pipe, None).unwrap().k, 0);
}

#[test]
fn test_options_from_json() {
    let options = MinimiseOptions::from_json(r#"{"algorithm": "Newton", "max_iterations": 50}"#).unwrap();
    assert_eq!(options.algorithm, Algorithm::Newton);
    assert_eq!(options.max_iterations, 50);
    assert!(options.constraints);

    let round_trip = MinimiseOptions::from_json(&options.to_json().unwrap()).unwrap();
    assert_eq!(round_trip, options);
}

#[test]
fn test_non_finite_chi2_is_rejected() {
    let mut pipe = rdc_pipe("fixed", 1, 4, 34);
    synthesise_rdcs(&mut pipe, true_tensor(), &[]);
    let before = pipe.clone();

    for algorithm in [Algorithm::LevenbergMarquardt, Algorithm::Newton] {
        let options = MinimiseOptions::default().with_algorithm(algorithm);

        pipe.spins[0].rdc.insert("a".to_string(), f64::NAN);
        assert!(matches!(
            minimise(&mut pipe, &options, None),
            Err(NStateError::NotANumber(_))
        ));

        pipe.spins[0].rdc.insert("a".to_string(), f64::INFINITY);
        assert!(matches!(
            minimise(&mut pipe, &options, None),
            Err(NStateError::InfiniteValue(_))
        ));

        // Nothing is stored from a rejected optimisation.
        assert_eq!(pipe.state, before.state);
        assert!(pipe.stats.is_none());
        assert!(pipe.q_factors.is_none());
    }
}
