//! End-to-end training tests.
//!
//! - XOR with a 2-3-1 network from zero weights
//! - Resumed training never reports a worse error
//! - Fixed seeds give identical runs
//! - Direct descent, complex domains and classification sets

use mlfn::{
    Domain, ErrorKind, FnMonitor, HybridTrainer, LearnParams, Network, NetworkTopology,
    TargetRange, TrainMethod, TrainOutcome, TrainingSet,
};

/// Error considered a solved XOR (100 × mean squared error).
const XOR_QUIT: f64 = 1.0;

/// Logical XOR with false/true mapped onto the default target range.
fn xor_set() -> TrainingSet {
    let range = TargetRange::default();
    let mut set = TrainingSet::mapping(2, 1);
    for (input, truth) in [
        ([0.0, 0.0], false),
        ([0.0, 1.0], true),
        ([1.0, 0.0], true),
        ([1.0, 1.0], false),
    ] {
        let target = if truth { range.on } else { range.off };
        set.push_mapping(&input, &[target]).unwrap();
    }
    set
}

fn xor_net() -> Network {
    Network::new(NetworkTopology::new(2, 1).with_hidden(3, 0)).unwrap()
}

fn params(seed: u64) -> LearnParams {
    LearnParams {
        quit_error: XOR_QUIT,
        seed: Some(seed),
        ..Default::default()
    }
}

#[test]
fn test_xor_trains() {
    let set = xor_set();
    let mut net = xor_net();
    let trainer = HybridTrainer::new(params(42)).unwrap();

    let outcome = trainer.train(&mut net, &set, &mut ()).unwrap();
    let error = outcome.error().unwrap();
    assert!(outcome.is_trained());
    assert!(error < XOR_QUIT, "XOR error {error}");
    assert!(net.is_trained());

    // Reported error is the error of the weights left in the network
    assert!((net.epoch_error(&set) - error).abs() < 1e-9);

    for (input, sign) in [([0.0, 0.0], -1.0), ([1.0, 0.0], 1.0)] {
        let out = net.trial(&input)[0];
        assert!(out * sign > 0.5, "output {out} for {input:?}");
    }
}

#[test]
fn test_resumed_training_does_not_regress() {
    let set = xor_set();
    let mut net = xor_net();
    let first = HybridTrainer::new(params(1))
        .unwrap()
        .train(&mut net, &set, &mut ())
        .unwrap()
        .error()
        .unwrap();

    let tighter = LearnParams {
        quit_error: first / 10.0,
        retries: 1,
        ..params(2)
    };
    let second = HybridTrainer::new(tighter)
        .unwrap()
        .train(&mut net, &set, &mut ())
        .unwrap()
        .error()
        .unwrap();
    assert!(second <= first, "resumed {second} > first {first}");
}

#[test]
fn test_same_seed_same_result() {
    let set = xor_set();
    let run = || {
        let mut net = xor_net();
        let outcome = HybridTrainer::new(params(9))
            .unwrap()
            .train(&mut net, &set, &mut ())
            .unwrap();
        (outcome, net.weights().as_slice().to_vec())
    };

    let (a, wa) = run();
    let (b, wb) = run();
    assert_eq!(a, b);
    assert_eq!(wa, wb);
}

#[test]
fn test_direct_descent_method() {
    let set = xor_set();
    let mut net = xor_net();
    for (i, w) in net.weights_mut().as_mut_slice().iter_mut().enumerate() {
        *w = 0.3 * ((i % 5) as f64 - 2.0);
    }
    let start = net.epoch_error(&set);

    let params = LearnParams {
        method: TrainMethod::DirectDescent,
        use_regression: false,
        ..params(5)
    };
    let outcome = HybridTrainer::new(params)
        .unwrap()
        .train(&mut net, &set, &mut ())
        .unwrap();
    assert!(outcome.error().unwrap() <= start);
}

#[test]
fn test_verbose_progress_reported() {
    let set = xor_set();
    let mut net = xor_net();
    let params = LearnParams {
        verbose: true,
        ..params(3)
    };

    let mut messages = Vec::new();
    let mut monitor = FnMonitor::new(|| false, |m: &str| messages.push(m.to_string()));
    HybridTrainer::new(params)
        .unwrap()
        .train(&mut net, &set, &mut monitor)
        .unwrap();
    drop(monitor);

    assert!(!messages.is_empty());
    assert!(messages.last().unwrap().starts_with("Done"));
}

#[test]
fn test_full_complex_fit() {
    // Rotation by 90 degrees, scaled into the squashing range
    let mut set = TrainingSet::mapping(2, 2);
    for (re, im) in [(0.5, 0.0), (0.0, 0.5), (-0.3, 0.3), (0.2, -0.4)] {
        set.push_mapping(&[re, im], &[-im, re]).unwrap();
    }
    let topology = NetworkTopology::new(1, 1)
        .with_hidden(2, 0)
        .with_domain(Domain::FullComplex)
        .with_linear_output(true);
    let mut net = Network::new(topology).unwrap();

    let outcome = HybridTrainer::new(LearnParams {
        quit_error: 0.01,
        ..params(11)
    })
    .unwrap()
    .train(&mut net, &set, &mut ())
    .unwrap();
    assert!(outcome.error().unwrap() < 0.5);
}

#[test]
fn test_classification_with_cross_entropy() {
    let mut set = TrainingSet::classification(1, 2);
    for x in [-1.0, -0.6, -0.2] {
        set.push_class(&[x], 0).unwrap();
    }
    for x in [0.2, 0.6, 1.0] {
        set.push_class(&[x], 1).unwrap();
    }
    let topology = NetworkTopology::new(1, 2)
        .with_hidden(2, 0)
        .with_error(ErrorKind::CrossEntropy);
    let mut net = Network::new(topology).unwrap();

    let outcome = HybridTrainer::new(LearnParams {
        quit_error: 1.0,
        retries: 1,
        ..params(4)
    })
    .unwrap()
    .train(&mut net, &set, &mut ())
    .unwrap();
    assert!(matches!(outcome, TrainOutcome::Trained { .. }));

    let out = net.trial(&[0.8]).to_vec();
    assert!(out[1] > out[0]);
}
