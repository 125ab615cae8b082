//! Tests for the NOE distance restraint report.

use approx::assert_relative_eq;
use nalgebra::Vector3;
use nstate_rs::data::{base_data_types, quad_pot, DataType};
use nstate_rs::pipe::{DataPipe, SpinContainer};
use nstate_rs::{calculate, minimise, MinimiseOptions, Warning, Warnings};

/// Atoms A and B at distance 6, C at distance 4 and D at distance 2 from A.
fn noe_pipe() -> DataPipe {
    let mut pipe = DataPipe::new();
    for (id, z) in [("A", 0.0), ("B", 6.0), ("C", 4.0), ("D", 2.0)] {
        pipe.add_spin(SpinContainer::new(id).with_positions(vec![Vector3::new(0.0, 0.0, z)]));
    }
    pipe.add_noe_restraint("A", "B", 3.0, 5.0);
    pipe.add_noe_restraint("A", "C", 3.0, 5.0);
    pipe.add_noe_restraint("A", "D", 3.0, 5.0);
    pipe.number_of_states(1).unwrap();
    pipe.select_model("population", &mut Warnings::new()).unwrap();
    pipe
}

#[test]
fn test_flat_bottom_potential() {
    assert_eq!(quad_pot(6.0, 3.0, 5.0), 1.0);
    assert_eq!(quad_pot(4.0, 3.0, 5.0), 0.0);
    assert_eq!(quad_pot(2.0, 3.0, 5.0), 1.0);
    assert_eq!(quad_pot(3.0, 3.0, 5.0), 0.0);
    assert_eq!(quad_pot(5.0, 3.0, 5.0), 0.0);
}

#[test]
fn test_calculate_reports_noe_potential() {
    let mut pipe = noe_pipe();
    assert_eq!(base_data_types(&pipe).unwrap(), vec![DataType::Noesy]);

    let outcome = calculate(&mut pipe, None).unwrap();
    assert!(outcome.is_skipped());

    let potentials: Vec<f64> = pipe.noe_report.iter().map(|r| r.potential).collect();
    let distances: Vec<f64> = pipe.noe_report.iter().map(|r| r.ave_dist).collect();
    assert_relative_eq!(distances[0], 6.0, epsilon = 1e-10);
    assert_relative_eq!(distances[1], 4.0, epsilon = 1e-10);
    assert_relative_eq!(distances[2], 2.0, epsilon = 1e-10);
    assert_relative_eq!(potentials[0], 1.0, epsilon = 1e-9);
    assert_relative_eq!(potentials[1], 0.0);
    assert_relative_eq!(potentials[2], 1.0, epsilon = 1e-9);
}

#[test]
fn test_noe_only_minimisation_is_skipped() {
    let mut pipe = noe_pipe();
    let outcome = minimise(&mut pipe, &MinimiseOptions::default(), None).unwrap();
    assert!(outcome.is_skipped());
    assert!(outcome.warnings.iter().any(|w| *w == Warning::NoeReportingOnly));
    assert!(pipe.stats.is_none());
}
