//! Epoch gradient, epoch error and output regression benchmarks.
//!
//! Each benchmark evaluates one full epoch over a fixed random training
//! set; weights are not changed between iterations.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mlfn::{Domain, ErrorKind, Network, NetworkTopology, OutputRegression, TrainingSet};
use rand::{rngs::StdRng, Rng, SeedableRng};

const N_CASES: usize = 256;

fn setup(domain: Domain, linear: bool, error: ErrorKind) -> (Network, TrainingSet) {
    let topology = NetworkTopology::new(8, 2)
        .with_hidden(16, 0)
        .with_domain(domain)
        .with_linear_output(linear)
        .with_error(error);
    let mut net = Network::new(topology).expect("valid topology");
    let mut rng = StdRng::seed_from_u64(42);
    for w in net.weights_mut().as_mut_slice() {
        *w = rng.gen_range(-0.5..0.5);
    }

    let (n_in, n_out) = (topology.input_width(), topology.output_width());
    let mut set = TrainingSet::mapping(n_in, n_out);
    for _ in 0..N_CASES {
        let x: Vec<f64> = (0..n_in).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let t: Vec<f64> = (0..n_out).map(|_| rng.gen_range(-0.8..0.8)).collect();
        set.push_mapping(&x, &t).expect("widths match");
    }
    (net, set)
}

fn bench_epoch_gradient(c: &mut Criterion) {
    let mut group = c.benchmark_group("epoch_gradient");
    group.throughput(Throughput::Elements(N_CASES as u64));

    for domain in [Domain::Real, Domain::FullComplex] {
        let (mut net, set) = setup(domain, false, ErrorKind::MeanSquare);
        let mut grad = vec![0.0; net.param_count()];

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{domain:?}")),
            &domain,
            |b, _| {
                b.iter(|| black_box(net.epoch_gradient(&set, &mut grad)));
            },
        );
    }

    group.finish();
}

fn bench_epoch_error(c: &mut Criterion) {
    let mut group = c.benchmark_group("epoch_error");
    group.throughput(Throughput::Elements(N_CASES as u64));

    for error in [ErrorKind::MeanSquare, ErrorKind::Max, ErrorKind::MeanLog] {
        let (mut net, set) = setup(Domain::Real, false, error);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{error:?}")),
            &error,
            |b, _| {
                b.iter(|| black_box(net.epoch_error(&set)));
            },
        );
    }

    group.finish();
}

fn bench_regression(c: &mut Criterion) {
    let mut group = c.benchmark_group("output_regression");

    for domain in [Domain::Real, Domain::FullComplex] {
        let (mut net, set) = setup(domain, true, ErrorKind::MeanSquare);
        let mut regression = OutputRegression::new(&net, &set).expect("squared error");

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{domain:?}")),
            &domain,
            |b, _| {
                b.iter(|| black_box(regression.solve(&mut net, &set)));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_epoch_gradient, bench_epoch_error, bench_regression);
criterion_main!(benches);
