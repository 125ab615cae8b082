//! Tests for model selection, the number of states and default values.

use approx::assert_relative_eq;
use nstate_rs::alignment::{AlignTensor, TensorComponents};
use nstate_rs::pipe::{DataPipe, ModelVariant};
use nstate_rs::{NStateError, Warning, Warnings};
use std::f64::consts::PI;

#[test]
fn test_model_variant_names_round_trip() {
    for variant in [ModelVariant::Population, ModelVariant::Fixed, ModelVariant::TwoDomain] {
        let parsed: ModelVariant = variant.to_string().parse().unwrap();
        assert_eq!(parsed, variant);
    }
    assert!(matches!(
        "ensemble".parse::<ModelVariant>(),
        Err(NStateError::InvalidInput(_))
    ));
}

#[test]
fn test_model_switch_warns() {
    let mut pipe = DataPipe::new();
    pipe.number_of_states(3).unwrap();
    let mut warnings = Warnings::new();

    pipe.select_model("population", &mut warnings).unwrap();
    assert!(warnings.is_empty());
    assert_eq!(pipe.params, vec!["p0", "p1"]);

    pipe.select_model("fixed", &mut warnings).unwrap();
    assert_eq!(
        warnings.into_vec(),
        vec![Warning::ModelSwitch {
            from: "population".to_string(),
            to: "fixed".to_string()
        }]
    );
    assert!(pipe.params.is_empty());
}

#[test]
fn test_two_domain_parameters() {
    let mut pipe = DataPipe::new();
    pipe.number_of_states(2).unwrap();
    pipe.select_model("2-domain", &mut Warnings::new()).unwrap();

    assert_eq!(
        pipe.params,
        vec!["p0", "alpha0", "beta0", "gamma0", "alpha1", "beta1", "gamma1"]
    );
    assert_eq!(pipe.state.probs.len(), 2);
    assert_eq!(pipe.state.alpha.len(), 2);
}

#[test]
fn test_number_of_states_must_be_positive() {
    let mut pipe = DataPipe::new();
    assert!(matches!(pipe.number_of_states(0), Err(NStateError::InvalidInput(_))));
    assert!(pipe.n_states.is_none());
}

#[test]
fn test_number_of_states_from_structures() {
    let mut pipe = DataPipe::new();
    pipe.structure_models = 4;
    pipe.select_model("population", &mut Warnings::new()).unwrap();
    assert_eq!(pipe.n_states, Some(4));
    assert_eq!(pipe.state.probs.len(), 4);
}

#[test]
fn test_default_values() {
    let mut pipe = DataPipe::new();
    pipe.number_of_states(3).unwrap();
    pipe.select_model("2-domain", &mut Warnings::new()).unwrap();

    assert_relative_eq!(pipe.default_value("p0").unwrap(), 1.0 / 3.0);
    assert_relative_eq!(pipe.default_value("beta1").unwrap(), 2.0 * PI / 4.0);
    assert!(pipe.default_value("p").is_err());
    assert!(pipe.default_value("tau0").is_err());

    pipe.state.probs[1] = Some(0.5);
    pipe.set_default_values().unwrap();
    assert_eq!(pipe.state.probs[1], Some(0.5));
    assert_relative_eq!(pipe.state.probs[2].unwrap(), 1.0 / 3.0);
    assert_relative_eq!(pipe.state.gamma[0].unwrap(), PI / 4.0);
}

#[test]
fn test_ref_domain_checks() {
    let mut pipe = DataPipe::new();
    pipe.number_of_states(2).unwrap();
    pipe.select_model("population", &mut Warnings::new()).unwrap();
    assert!(matches!(pipe.set_ref_domain("N"), Err(NStateError::Config(_))));

    pipe.select_model("2-domain", &mut Warnings::new()).unwrap();
    pipe.add_tensor(AlignTensor::new("dy N").with_domain("N"), TensorComponents::default())
        .unwrap();
    assert!(matches!(pipe.set_ref_domain("C"), Err(NStateError::Config(_))));
    pipe.set_ref_domain("N").unwrap();
    assert_eq!(pipe.ref_domain.as_deref(), Some("N"));
}

#[test]
fn test_reductions_flag_tensors() {
    let mut pipe = DataPipe::new();
    pipe.add_tensor(AlignTensor::new("full"), TensorComponents::default()).unwrap();
    pipe.add_tensor(AlignTensor::new("red"), TensorComponents::default()).unwrap();

    pipe.set_reduction("full", "red").unwrap();
    assert_eq!(pipe.reductions, vec![(0, 1)]);
    assert!(pipe.align_tensors[1].reduced);
    assert!(!pipe.align_tensors[0].reduced);
    assert!(matches!(pipe.set_reduction("full", "missing"), Err(NStateError::Config(_))));
}
