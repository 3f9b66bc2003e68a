//! Simulated annealing over the active weights.
//!
//! At temperature `T` each trial point is `center + T · ξ`, with one
//! independent `ξ` per active weight drawn from the schedule's density.
//! Temperatures cool geometrically from `start_temp` to `stop_temp`. An
//! improvement sets the iteration counter back by `setback` (bounded per
//! temperature), so a productive temperature is explored longer. At the
//! end of every temperature the center moves to the best point found.

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Cauchy, StandardNormal};

use crate::buffer::AlignedBuffer;
use crate::config::{AnnealSchedule, Density};
use crate::error::{MlfnError, MlfnResult, TrainOutcome};
use crate::gradient::Objective;
use crate::network::Network;
use crate::trainer::TrainMonitor;

/// Where an annealing run starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnealStart {
    /// The current weights compete with the perturbations; the run never
    /// ends worse than it started.
    KeepCurrent,
    /// Only perturbed points compete, so the run always leaves the
    /// current point.
    Leave,
}

/// Annealer with preallocated center and best-point snapshots.
#[derive(Debug)]
pub struct Annealer {
    center: AlignedBuffer,
    best: AlignedBuffer,
    cauchy: Cauchy<f64>,
}

impl Annealer {
    /// Allocates snapshots for a network of `n_weights` weights.
    pub fn new(n_weights: usize) -> MlfnResult<Self> {
        let cauchy = Cauchy::new(0.0, 1.0)
            .map_err(|e| MlfnError::config_mismatch(format!("cauchy density: {e:?}")))?;
        Ok(Self {
            center: AlignedBuffer::try_zeroed(n_weights)?,
            best: AlignedBuffer::try_zeroed(n_weights)?,
            cauchy,
        })
    }

    /// Anneals around the network's current weights.
    ///
    /// On return the network holds the best point found (its output layer
    /// solved by the objective's regression, if any).
    pub fn run<M>(
        &mut self,
        net: &mut Network,
        objective: &mut Objective<'_>,
        schedule: &AnnealSchedule,
        start: AnnealStart,
        quit_error: f64,
        rng: &mut StdRng,
        monitor: &M,
    ) -> TrainOutcome
    where
        M: TrainMonitor + ?Sized,
    {
        let n = objective.active_len(net);
        let start_error = objective.error(net);
        let mut best_error = match start {
            AnnealStart::Leave if n > 0 => f64::INFINITY,
            _ => start_error,
        };
        self.center.as_mut_slice().copy_from_slice(net.weights().as_slice());
        self.best.as_mut_slice().copy_from_slice(net.weights().as_slice());
        if n == 0 {
            return TrainOutcome::Trained { error: best_error };
        }

        let ratio = if schedule.n_temps > 1 {
            (schedule.stop_temp / schedule.start_temp).powf(1.0 / (schedule.n_temps - 1) as f64)
        } else {
            1.0
        };
        let mut temp = schedule.start_temp;

        'temps: for _ in 0..schedule.n_temps {
            let mut iter = 0usize;
            let mut setbacks = 0usize;

            while iter < schedule.iters_per_temp {
                if monitor.is_cancelled() {
                    let error = if best_error.is_finite() {
                        best_error
                    } else {
                        start_error
                    };
                    return self.finish(net, error, true);
                }

                let w = net.weights.as_mut_slice();
                for k in 0..n {
                    w[k] = self.center[k] + temp * self.draw(schedule.density, rng);
                }
                let error = objective.error(net);

                if error < best_error {
                    best_error = error;
                    self.best.as_mut_slice().copy_from_slice(net.weights().as_slice());
                    if best_error <= quit_error {
                        break 'temps;
                    }
                    if setbacks < schedule.iters_per_temp {
                        iter = iter.saturating_sub(schedule.setback);
                        setbacks += 1;
                    }
                }
                iter += 1;
            }

            self.center.as_mut_slice().copy_from_slice(self.best.as_slice());
            temp *= ratio;
        }

        self.finish(net, best_error, false)
    }

    fn draw(&self, density: Density, rng: &mut StdRng) -> f64 {
        match density {
            Density::Gaussian => rng.sample(StandardNormal),
            Density::Cauchy => rng.sample(&self.cauchy),
        }
    }

    /// Writes the best point back.
    fn finish(&self, net: &mut Network, best_error: f64, cancelled: bool) -> TrainOutcome {
        net.weights
            .as_mut_slice()
            .copy_from_slice(self.best.as_slice());
        if cancelled {
            TrainOutcome::Cancelled { error: best_error }
        } else {
            TrainOutcome::Trained { error: best_error }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkTopology;
    use crate::training_set::TrainingSet;
    use rand::SeedableRng;
    use std::sync::atomic::AtomicBool;

    fn set() -> TrainingSet {
        let mut set = TrainingSet::mapping(1, 1);
        set.push_mapping(&[-1.0], &[-0.5]).unwrap();
        set.push_mapping(&[1.0], &[0.5]).unwrap();
        set
    }

    #[test]
    fn test_anneal_improves_from_zero() {
        let set = set();
        let mut net = Network::new(NetworkTopology::new(1, 1).with_hidden(2, 0)).unwrap();
        let start = net.epoch_error(&set);

        let mut objective = Objective::plain(&set);
        let mut annealer = Annealer::new(net.param_count()).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let outcome = annealer.run(
            &mut net,
            &mut objective,
            &AnnealSchedule::initial(),
            AnnealStart::KeepCurrent,
            0.0,
            &mut rng,
            &(),
        );

        let error = outcome.error().unwrap();
        assert!(error < start);
        assert!((net.epoch_error(&set) - error).abs() < 1e-12);
    }

    #[test]
    fn test_cauchy_density() {
        let set = set();
        let mut net = Network::new(NetworkTopology::new(1, 1)).unwrap();
        let schedule = AnnealSchedule {
            density: Density::Cauchy,
            ..AnnealSchedule::escape()
        };

        let mut objective = Objective::plain(&set);
        let mut annealer = Annealer::new(net.param_count()).unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        let outcome = annealer.run(
            &mut net,
            &mut objective,
            &schedule,
            AnnealStart::Leave,
            0.0,
            &mut rng,
            &(),
        );
        assert!(outcome.error().unwrap().is_finite());
        assert!(net.weights().as_slice().iter().any(|&w| w != 0.0));
    }

    #[test]
    fn test_cancelled_keeps_start() {
        let set = set();
        let mut net = Network::new(NetworkTopology::new(1, 1)).unwrap();
        net.weights_mut().as_mut_slice().copy_from_slice(&[0.25, 0.0]);

        let mut objective = Objective::plain(&set);
        let mut annealer = Annealer::new(net.param_count()).unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        let cancel = AtomicBool::new(true);
        let outcome = annealer.run(
            &mut net,
            &mut objective,
            &AnnealSchedule::initial(),
            AnnealStart::KeepCurrent,
            0.0,
            &mut rng,
            &cancel,
        );

        assert!(outcome.is_cancelled());
        assert_eq!(net.weights().as_slice(), &[0.25, 0.0]);
    }
}
