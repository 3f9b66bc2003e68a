//! Cancellation and failure behavior of a training request.
//!
//! - An immediate cancel leaves valid weights and reports their error
//! - Cancelling mid-run keeps the best weights seen so far
//! - Invalid inputs fail before any weight changes

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};

use mlfn::{
    ErrorKind, FnMonitor, HybridTrainer, LearnParams, MlfnError, Network, NetworkTopology,
    TrainingSet,
};

fn sine_set() -> TrainingSet {
    let mut set = TrainingSet::mapping(1, 1);
    for i in 0..12 {
        let x = -1.0 + i as f64 / 6.0;
        set.push_mapping(&[x], &[0.8 * (3.0 * x).sin()]).unwrap();
    }
    set
}

fn net() -> Network {
    Network::new(NetworkTopology::new(1, 1).with_hidden(4, 0)).unwrap()
}

fn params() -> LearnParams {
    LearnParams {
        seed: Some(21),
        ..Default::default()
    }
}

#[test]
fn test_cancel_before_start() {
    let set = sine_set();
    let mut net = net();
    let mut cancel = AtomicBool::new(true);

    let outcome = HybridTrainer::new(params())
        .unwrap()
        .train(&mut net, &set, &mut cancel)
        .unwrap();

    assert!(outcome.is_cancelled());
    assert!(!net.is_trained());
    let error = outcome.error().unwrap();
    assert!((net.epoch_error(&set) - error).abs() < 1e-12);
}

#[test]
fn test_cancel_mid_run_keeps_best() {
    let set = sine_set();
    let mut net = net();
    let polls = Cell::new(0usize);
    let mut monitor = FnMonitor::new(
        || {
            polls.set(polls.get() + 1);
            polls.get() > 300
        },
        |_: &str| {},
    );
    let params = LearnParams {
        use_regression: false,
        ..params()
    };

    let outcome = HybridTrainer::new(params)
        .unwrap()
        .train(&mut net, &set, &mut monitor)
        .unwrap();

    assert!(outcome.is_cancelled());
    let error = outcome.error().unwrap();
    // The initial anneal keeps the zero start unless it finds better
    let zero_error = net_fresh_error(&set);
    assert!(error <= zero_error);
    assert!((net.epoch_error(&set) - error).abs() < 1e-9);
    assert!(net.weights().as_slice().iter().all(|w| w.is_finite()));
}

fn net_fresh_error(set: &TrainingSet) -> f64 {
    net().epoch_error(set)
}

#[test]
fn test_cancel_from_flag_set_during_progress() {
    let set = sine_set();
    let mut net = net();
    let cancel = AtomicBool::new(false);
    let params = LearnParams {
        verbose: true,
        ..params()
    };

    // The first progress line arrives after the initial anneal
    let mut monitor = FnMonitor::new(
        || cancel.load(Ordering::Relaxed),
        |_: &str| cancel.store(true, Ordering::Relaxed),
    );
    let outcome = HybridTrainer::new(params)
        .unwrap()
        .train(&mut net, &set, &mut monitor)
        .unwrap();

    assert!(outcome.is_cancelled());
    assert!((net.epoch_error(&set) - outcome.error().unwrap()).abs() < 1e-9);
}

#[test]
fn test_mismatched_set_leaves_weights() {
    let mut set = TrainingSet::mapping(2, 1);
    set.push_mapping(&[0.0, 1.0], &[0.5]).unwrap();
    let mut net = net();
    net.weights_mut().as_mut_slice().fill(0.25);

    let err = HybridTrainer::new(params())
        .unwrap()
        .train(&mut net, &set, &mut ())
        .unwrap_err();
    assert!(matches!(err, MlfnError::ShapeMismatch { .. }));
    assert!(net.weights().as_slice().iter().all(|&w| w == 0.25));
}

#[test]
fn test_empty_set_rejected() {
    let set = TrainingSet::mapping(1, 1);
    let mut net = net();
    let err = HybridTrainer::new(params())
        .unwrap()
        .train(&mut net, &set, &mut ())
        .unwrap_err();
    assert!(matches!(err, MlfnError::TrainingSet(_)));
}

#[test]
fn test_non_squared_metric_still_trains() {
    let set = sine_set();
    let topology = NetworkTopology::new(1, 1)
        .with_hidden(4, 0)
        .with_linear_output(true)
        .with_error(ErrorKind::Max);
    let mut net = Network::new(topology).unwrap();

    let params = LearnParams {
        retries: 0,
        max_escapes: 3,
        ..params()
    };
    let outcome = HybridTrainer::new(params)
        .unwrap()
        .train(&mut net, &set, &mut ())
        .unwrap();
    assert!(outcome.is_trained());
    assert!(outcome.error().unwrap().is_finite());
}
