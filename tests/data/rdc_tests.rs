//! Tests for the RDC data assembly.

use crate::test_helpers::{rdc_pipe, synthesise_rdcs, true_tensor};
use approx::assert_relative_eq;
use nalgebra::Vector3;
use nstate_rs::data::{base_data_types, data_alignments, num_data_points, rdc, DataType};
use nstate_rs::pipe::{DataPipe, PseudoMember, SpinContainer};
use nstate_rs::{calculate, NStateError, NStateTarget, Warning, Warnings};

#[test]
fn test_missing_bond_vector_keeps_row() {
    let mut pipe = rdc_pipe("population", 3, 5, 21);
    pipe.spins[2].bond_vectors = None;

    let mut warnings = Warnings::new();
    let data = rdc::assemble(&pipe, &["a".to_string()], 3, None, &mut warnings).unwrap();

    assert_eq!(
        warnings.into_vec(),
        vec![Warning::MissingBondVector {
            spin: "3".to_string()
        }]
    );
    assert_eq!(data.num_pairs(), 5);
    assert_eq!(data.vectors[2], vec![None, None, None]);
    assert_eq!(data.values[[0, 2]], None);
    assert_eq!(data.dj[2], None);
    assert!(data.vectors[1].iter().all(|v| v.is_some()));
    assert_eq!(data.values.dim(), (1, 5));
}

#[test]
fn test_missing_bond_vector_excluded_from_target() {
    let mut pipe = rdc_pipe("population", 3, 5, 22);
    pipe.spins[0].bond_vectors = None;

    let mut warnings = Warnings::new();
    let target = NStateTarget::new(&pipe, None, true, &mut warnings).unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(target.num_residuals(), 4);
}

#[test]
fn test_no_bond_vectors_at_all() {
    let mut pipe = rdc_pipe("population", 2, 2, 23);
    for spin in &mut pipe.spins {
        spin.bond_vectors = None;
    }
    let result = rdc::assemble(&pipe, &["a".to_string()], 2, None, &mut Warnings::new());
    assert!(matches!(result, Err(NStateError::Data(_))));
}

#[test]
fn test_single_vector_broadcast() {
    let mut pipe = rdc_pipe("population", 3, 2, 24);
    pipe.spins[0].bond_vectors = Some(vec![Vector3::new(0.0, 0.0, 1.0)]);
    pipe.spins[1].bond_vectors = Some(vec![Vector3::new(1.0, 0.0, 0.0)]);

    let data = rdc::assemble(&pipe, &["a".to_string()], 3, None, &mut Warnings::new()).unwrap();
    assert_eq!(data.vectors[0], vec![Some(Vector3::new(0.0, 0.0, 1.0)); 3]);

    // Two vectors for three states is neither per-state nor broadcast.
    pipe.spins[0].bond_vectors = Some(vec![Vector3::z(), Vector3::x()]);
    pipe.spins[1].bond_vectors = Some(vec![Vector3::z(), Vector3::x()]);
    let result = rdc::assemble(&pipe, &["a".to_string()], 3, None, &mut Warnings::new());
    assert!(matches!(result, Err(NStateError::Config(_))));
}

#[test]
fn test_methyl_pseudo_atom() {
    let mut pipe = rdc_pipe("population", 1, 1, 25);
    let member = |id: &str, v: Vector3<f64>| PseudoMember {
        id: id.to_string(),
        bond_vectors: vec![v],
        pos: Vec::new(),
    };
    let c = 1.0 / 3.0f64.sqrt();
    pipe.add_spin(
        SpinContainer::new("Q1")
            .with_rdc("a", 2.0, Some(0.5))
            .with_dipole("13C", "1H", 1.09)
            .with_members(vec![
                member("H1", Vector3::new(1.0, 0.0, c)),
                member("H2", Vector3::new(-0.5, 0.75f64.sqrt(), c)),
                member("H3", Vector3::new(-0.5, -(0.75f64.sqrt()), c)),
            ]),
    );

    let data = rdc::assemble(&pipe, &["a".to_string()], 1, None, &mut Warnings::new()).unwrap();
    assert!(data.is_pseudo(1));
    // The methyl C3 axis.
    let axis = data.vectors[1][0].unwrap();
    assert_relative_eq!(axis.z, 1.0, epsilon = 1e-12);
    assert_relative_eq!(data.values[[0, 1]].unwrap(), -6.0);
    assert_relative_eq!(data.errors[[0, 1]].unwrap(), 1.5);
}

#[test]
fn test_two_member_pseudo_atom_skipped() {
    let mut pipe = rdc_pipe("population", 1, 1, 26);
    let member = |id: &str| PseudoMember {
        id: id.to_string(),
        bond_vectors: vec![Vector3::z()],
        pos: Vec::new(),
    };
    pipe.add_spin(
        SpinContainer::new("Q2")
            .with_rdc("a", 2.0, None)
            .with_dipole("13C", "1H", 1.09)
            .with_members(vec![member("H1"), member("H2")]),
    );

    let mut warnings = Warnings::new();
    let data = rdc::assemble(&pipe, &["a".to_string()], 1, None, &mut warnings).unwrap();
    assert_eq!(data.num_pairs(), 1);
    assert_eq!(
        warnings.into_vec(),
        vec![Warning::UnsupportedPseudoAtom {
            spin: "Q2".to_string(),
            members: 2
        }]
    );
}

#[test]
fn test_base_data_types() {
    let empty = DataPipe::new();
    assert!(matches!(base_data_types(&empty), Err(NStateError::NoData(_))));

    let mut pipe = rdc_pipe("population", 2, 3, 27);
    assert_eq!(base_data_types(&pipe).unwrap(), vec![DataType::Rdc]);
    assert_eq!(num_data_points(&pipe).unwrap(), 3);

    pipe.add_spin(SpinContainer::new("x").with_rdc("undeclared", 1.0, None));
    assert!(matches!(base_data_types(&pipe), Err(NStateError::Data(_))));

    pipe.spins.pop();
    pipe.add_alignment("b");
    assert_eq!(data_alignments(&pipe), vec!["a"]);
}

#[test]
fn test_back_calculation_and_q_factor() {
    let mut pipe = rdc_pipe("population", 2, 6, 28);
    synthesise_rdcs(&mut pipe, true_tensor(), &[0.3, 0.7]);

    let outcome = calculate(&mut pipe, None).unwrap();
    assert_relative_eq!(outcome.stats.unwrap().chi2, 0.0, epsilon = 1e-18);
    for spin in &pipe.spins {
        assert_relative_eq!(spin.rdc_bc["a"], spin.rdc["a"], epsilon = 1e-12);
    }

    let q = pipe.q_factors.unwrap();
    assert_relative_eq!(q.rdc["a"], 0.0, epsilon = 1e-12);
    assert_relative_eq!(q.q_rdc.unwrap(), 0.0, epsilon = 1e-12);
}
