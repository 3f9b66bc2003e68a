//! Tests for forward pass numerical correctness.
//!
//! These tests verify:
//! - Hand-computed outputs of small real and complex networks
//! - Bit-identical results for repeated trials
//! - The linear output option and classification targets

use approx::assert_abs_diff_eq;
use mlfn::{Domain, Network, NetworkTopology, TrainingSet, SQUASH_GAIN};
use num_complex::Complex64;

/// Tolerance for comparisons against hand-computed values.
const TOLERANCE: f64 = 1e-12;

fn squash(x: f64) -> f64 {
    (SQUASH_GAIN * x).tanh()
}

fn complex_squash(z: Complex64) -> Complex64 {
    let r = z.norm();
    if r == 0.0 {
        return Complex64::new(0.0, 0.0);
    }
    z * ((SQUASH_GAIN * r).tanh() / r)
}

// =============================================================================
// Real Domain
// =============================================================================

/// 2-3-1 network computed neuron by neuron.
#[test]
fn test_real_2_3_1_by_hand() {
    let mut net = Network::new(NetworkTopology::new(2, 1).with_hidden(3, 0)).unwrap();
    let weights = [
        // hidden rows: w0, w1, bias
        0.5, -0.3, 0.1, //
        -0.2, 0.8, 0.0, //
        0.4, 0.4, -0.5, //
        // output row: v0, v1, v2, bias
        1.0, -0.7, 0.3, 0.05,
    ];
    net.weights_mut().as_mut_slice().copy_from_slice(&weights);

    let x = [0.6, -1.2];
    let h = [
        squash(0.5 * x[0] - 0.3 * x[1] + 0.1),
        squash(-0.2 * x[0] + 0.8 * x[1]),
        squash(0.4 * x[0] + 0.4 * x[1] - 0.5),
    ];
    let expected = squash(1.0 * h[0] - 0.7 * h[1] + 0.3 * h[2] + 0.05);

    let out = net.trial(&x);
    assert_eq!(out.len(), 1);
    assert!(
        (out[0] - expected).abs() < TOLERANCE,
        "got {}, expected {}",
        out[0],
        expected
    );

    let hidden = net.layer_activations(0);
    for (a, b) in hidden.iter().zip(&h) {
        assert_abs_diff_eq!(*a, *b, epsilon = TOLERANCE);
    }
}

/// Linear outputs skip the squashing function.
#[test]
fn test_linear_output() {
    let topology = NetworkTopology::new(2, 2).with_linear_output(true);
    let mut net = Network::new(topology).unwrap();
    net.weights_mut()
        .as_mut_slice()
        .copy_from_slice(&[2.0, 1.0, 0.5, -1.0, 3.0, 0.0]);

    let out = net.trial(&[1.0, 2.0]);
    assert_abs_diff_eq!(out[0], 4.5, epsilon = TOLERANCE);
    assert_abs_diff_eq!(out[1], 5.0, epsilon = TOLERANCE);
}

/// Two hidden layers chain correctly.
#[test]
fn test_two_hidden_layers() {
    let topology = NetworkTopology::new(1, 1).with_hidden(1, 1);
    let mut net = Network::new(topology).unwrap();
    net.weights_mut()
        .as_mut_slice()
        .copy_from_slice(&[0.7, 0.1, -1.1, 0.2, 0.9, -0.3]);

    let h1 = squash(0.7 * 0.4 + 0.1);
    let h2 = squash(-1.1 * h1 + 0.2);
    let expected = squash(0.9 * h2 - 0.3);

    let out = net.trial(&[0.4]);
    assert_abs_diff_eq!(out[0], expected, epsilon = TOLERANCE);
}

// =============================================================================
// Complex Domains
// =============================================================================

/// One complex neuron: f(w z + b).
#[test]
fn test_full_complex_single_neuron() {
    let topology = NetworkTopology::new(1, 1).with_domain(Domain::FullComplex);
    let mut net = Network::new(topology).unwrap();
    let w = Complex64::new(0.3, -0.6);
    let b = Complex64::new(0.1, 0.2);
    net.weights_mut()
        .as_mut_slice()
        .copy_from_slice(&[w.re, w.im, b.re, b.im]);

    let z = Complex64::new(0.8, 0.5);
    let expected = complex_squash(w * z + b);

    let out = net.trial(&[z.re, z.im]);
    assert_eq!(out.len(), 2);
    assert_abs_diff_eq!(out[0], expected.re, epsilon = TOLERANCE);
    assert_abs_diff_eq!(out[1], expected.im, epsilon = TOLERANCE);
}

/// Real neurons fed by complex inputs use the real part of the net input.
#[test]
fn test_complex_input_real_neuron() {
    let topology = NetworkTopology::new(2, 1).with_domain(Domain::ComplexInput);
    let mut net = Network::new(topology).unwrap();
    let w = [Complex64::new(0.5, 0.2), Complex64::new(-0.4, 0.9)];
    net.weights_mut()
        .as_mut_slice()
        .copy_from_slice(&[w[0].re, w[0].im, w[1].re, w[1].im, 0.25]);

    let z = [Complex64::new(1.0, -0.5), Complex64::new(0.3, 0.7)];
    let net_input = (w[0] * z[0] + w[1] * z[1]).re + 0.25;
    let expected = squash(net_input);

    let out = net.trial(&[z[0].re, z[0].im, z[1].re, z[1].im]);
    assert_abs_diff_eq!(out[0], expected, epsilon = TOLERANCE);
}

/// Complex hidden layer feeding a real output.
#[test]
fn test_complex_hidden() {
    let topology = NetworkTopology::new(1, 1)
        .with_hidden(1, 0)
        .with_domain(Domain::ComplexHidden);
    let mut net = Network::new(topology).unwrap();
    let w = Complex64::new(0.9, 0.4);
    let b = Complex64::new(-0.1, 0.05);
    let v = Complex64::new(0.6, -0.8);
    net.weights_mut()
        .as_mut_slice()
        .copy_from_slice(&[w.re, w.im, b.re, b.im, v.re, v.im, 0.1]);

    let z = Complex64::new(-0.4, 0.6);
    let h = complex_squash(w * z + b);
    let expected = squash((v * h).re + 0.1);

    let out = net.trial(&[z.re, z.im]);
    assert_abs_diff_eq!(out[0], expected, epsilon = TOLERANCE);
}

// =============================================================================
// Determinism
// =============================================================================

#[test]
fn test_repeated_trials_identical() {
    let topology = NetworkTopology::new(3, 2)
        .with_hidden(5, 4)
        .with_domain(Domain::FullComplex);
    let mut net = Network::new(topology).unwrap();
    for (i, w) in net.weights_mut().as_mut_slice().iter_mut().enumerate() {
        *w = ((i * 37 % 23) as f64 - 11.0) / 13.0;
    }

    let input: Vec<f64> = (0..6).map(|i| 0.2 * i as f64 - 0.5).collect();
    let first = net.trial(&input).to_vec();
    // Disturb the cache with another input in between
    net.trial(&[1.0; 6]);
    let second = net.trial(&input).to_vec();
    assert_eq!(first, second);
}

#[test]
fn test_classification_targets() {
    let mut set = TrainingSet::classification(2, 3);
    set.push_class(&[0.0, 1.0], 2).unwrap();

    let mut target = [0.0; 3];
    set.fill_target(0, &mut target);
    assert_eq!(target, [-0.9, -0.9, 0.9]);
    assert!(set.push_class(&[0.0, 1.0], 3).is_err());
}
