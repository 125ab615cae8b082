//! End-to-end fits of the 2-domain model against reduced alignment tensors.

use approx::assert_relative_eq;
use nstate_rs::alignment::{euler_to_rotation, AlignTensor, TensorComponents};
use nstate_rs::pipe::DataPipe;
use nstate_rs::{minimise, MinimiseOptions, NStateTarget, Warnings};

/// Two alignment media, each with a full tensor in the N domain and a reduced
/// tensor in the C domain.
fn two_domain_pipe(n_states: usize) -> DataPipe {
    let mut pipe = DataPipe::new();
    let full = [
        TensorComponents::new(3.0e-4, -1.2e-4, 0.8e-4, -0.5e-4, 1.5e-4),
        TensorComponents::new(-2.0e-4, 0.5e-4, 1.1e-4, 0.9e-4, -0.4e-4),
    ];
    for (medium, values) in ["dy", "tb"].iter().zip(full) {
        pipe.add_tensor(AlignTensor::new(format!("{} N", medium)).with_domain("N"), values)
            .unwrap();
        pipe.add_tensor(
            AlignTensor::new(format!("{} C", medium)).with_domain("C").with_reduced(true),
            TensorComponents::default(),
        )
        .unwrap();
    }
    pipe.number_of_states(n_states).unwrap();
    pipe.select_model("2-domain", &mut Warnings::new()).unwrap();
    pipe.set_ref_domain("N").unwrap();
    pipe
}

/// Replace the reduced tensors by the ones back-calculated from the current state.
fn synthesise_reduced_tensors(pipe: &mut DataPipe) {
    let target = NStateTarget::new(pipe, None, true, &mut Warnings::new()).unwrap();
    let x = target.scaling().scale(&target.layout().pack(&pipe.state));
    let bc = target.back_calculate(&x).unwrap();
    assert_eq!(bc.tensors.len(), 2);
    for (index, values) in bc.tensors {
        pipe.state.tensors[index] = values;
    }
}

fn set_angles(pipe: &mut DataPipe, angles: &[[f64; 3]]) {
    pipe.state.alpha = angles.iter().map(|a| Some(a[0])).collect();
    pipe.state.beta = angles.iter().map(|a| Some(a[1])).collect();
    pipe.state.gamma = angles.iter().map(|a| Some(a[2])).collect();
}

#[test]
fn test_single_state_recovers_rotation() {
    let truth = [[0.4, 1.1, 2.3]];
    let mut pipe = two_domain_pipe(1);
    set_angles(&mut pipe, &truth);
    synthesise_reduced_tensors(&mut pipe);
    assert_ne!(pipe.state.tensors[1], TensorComponents::default());
    assert_ne!(pipe.state.tensors[1], pipe.state.tensors[0]);

    set_angles(&mut pipe, &[[0.45, 1.05, 2.36]]);
    let outcome = minimise(&mut pipe, &MinimiseOptions::default(), None).unwrap();
    let stats = outcome.stats.unwrap();
    assert!(stats.chi2 < 1e-12, "chi2 = {}", stats.chi2);

    // Compare rotations rather than angles, which are not unique.
    let fitted = euler_to_rotation(
        pipe.state.alpha[0].unwrap(),
        pipe.state.beta[0].unwrap(),
        pipe.state.gamma[0].unwrap(),
    );
    let expected = euler_to_rotation(truth[0][0], truth[0][1], truth[0][2]);
    for (a, b) in fitted.iter().zip(expected.iter()) {
        assert_relative_eq!(a, b, epsilon = 1e-6);
    }
}

#[test]
fn test_two_state_fit_keeps_populations_feasible() {
    let mut pipe = two_domain_pipe(2);
    set_angles(&mut pipe, &[[0.4, 1.1, 2.3], [1.9, 0.7, 0.2]]);
    pipe.state.probs = vec![Some(0.3), Some(0.7)];
    synthesise_reduced_tensors(&mut pipe);

    set_angles(&mut pipe, &[[0.43, 1.08, 2.33], [1.86, 0.73, 0.18]]);
    pipe.state.probs = vec![Some(0.4), Some(0.6)];
    let start_chi2 = {
        let target = NStateTarget::new(&pipe, None, true, &mut Warnings::new()).unwrap();
        target.chi2(&target.scaling().scale(&target.layout().pack(&pipe.state))).unwrap()
    };

    let outcome = minimise(&mut pipe, &MinimiseOptions::default(), None).unwrap();
    let stats = outcome.stats.unwrap();
    assert!(stats.chi2 < 1e-6 * start_chi2, "chi2 = {} from {}", stats.chi2, start_chi2);

    let probs = pipe.state.probs_or_zero();
    assert!(probs.iter().all(|p| (-1e-8..=1.0 + 1e-8).contains(p)), "{:?}", probs);
    assert_relative_eq!(probs[0] + probs[1], 1.0, epsilon = 1e-12);
}
