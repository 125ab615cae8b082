//! Tests for the grid search.

use crate::test_helpers::{fixed_tensor_population_pipe, rdc_pipe, synthesise_rdcs, true_tensor, unit_vectors};
use approx::assert_abs_diff_eq;
use nstate_rs::pipe::SpinContainer;
use nstate_rs::{grid_search, minimise, GridOptions, MinimiseOptions, NStateError};

#[test]
fn test_grid_finds_population() {
    let mut pipe = fixed_tensor_population_pipe();
    let outcome = grid_search(&mut pipe, &GridOptions::default(), None).unwrap();
    let stats = outcome.stats.unwrap();

    assert_eq!(stats.f_count, 11);
    assert!(stats.chi2 < 1e-12, "chi2 = {}", stats.chi2);
    assert_abs_diff_eq!(pipe.state.probs[0].unwrap(), 0.3, epsilon = 1e-12);
    assert_abs_diff_eq!(pipe.state.probs[1].unwrap(), 0.7, epsilon = 1e-12);
    assert_eq!(pipe.stats, Some(stats));
}

#[test]
fn test_grid_skips_infeasible_populations() {
    let mut pipe = rdc_pipe("population", 3, 6, 41);
    synthesise_rdcs(&mut pipe, true_tensor(), &[0.2, 0.5, 0.3]);
    pipe.fix_all_tensors(true);
    pipe.state.probs = vec![None; 3];

    let mut unconstrained = pipe.clone();
    let outcome = grid_search(&mut pipe, &GridOptions::default(), None).unwrap();
    // Lattice points with p0 + p1 <= 1.
    assert_eq!(outcome.stats.unwrap().f_count, 66);
    let probs = pipe.state.probs_or_zero();
    assert_abs_diff_eq!(probs[0], 0.2, epsilon = 1e-12);
    assert_abs_diff_eq!(probs[1], 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(probs[2], 0.3, epsilon = 1e-12);

    let options = GridOptions::default().with_constraints(false);
    let outcome = grid_search(&mut unconstrained, &options, None).unwrap();
    assert_eq!(outcome.stats.unwrap().f_count, 121);
}

#[test]
fn test_grid_custom_bounds() {
    let mut pipe = fixed_tensor_population_pipe();
    let options = GridOptions::default().with_inc(3).with_bounds(vec![0.25], vec![0.35]);
    let outcome = grid_search(&mut pipe, &options, None).unwrap();

    assert_eq!(outcome.stats.unwrap().f_count, 3);
    assert_abs_diff_eq!(pipe.state.probs[0].unwrap(), 0.3, epsilon = 1e-12);

    let reversed = GridOptions::default().with_bounds(vec![0.35], vec![0.25]);
    assert!(matches!(
        grid_search(&mut pipe, &reversed, None),
        Err(NStateError::InvalidInput(_))
    ));
}

#[test]
fn test_fixed_model_searches_tensors_separately() {
    let mut pipe = rdc_pipe("fixed", 1, 4, 42);
    pipe.add_alignment("b");
    for (k, v) in unit_vectors(4, 43).into_iter().enumerate() {
        pipe.add_spin(
            SpinContainer::new(format!("b{}", k))
                .with_rdc("b", 0.0, Some(1.0))
                .with_dipole("15N", "1H", 1.02)
                .with_bond_vectors(vec![v]),
        );
    }

    let outcome = grid_search(&mut pipe, &GridOptions::default().with_inc(3), None).unwrap();
    // One 3^5 lattice per tensor rather than a 3^10 lattice.
    assert_eq!(outcome.stats.unwrap().f_count, 2 * 243);
}

#[test]
fn test_grid_then_minimise() {
    let mut pipe = fixed_tensor_population_pipe();
    grid_search(&mut pipe, &GridOptions::default().with_inc(4), None).unwrap();
    let after_grid = pipe.stats.clone().unwrap().chi2;

    let outcome = minimise(&mut pipe, &MinimiseOptions::default(), None).unwrap();
    assert!(outcome.stats.unwrap().chi2 <= after_grid);
    assert_abs_diff_eq!(pipe.state.probs[0].unwrap(), 0.3, epsilon = 1e-6);
}
