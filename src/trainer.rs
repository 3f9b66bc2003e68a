//! Hybrid global training driver.
//!
//! # Phases
//!
//! ```text
//! InitialAnneal ──► DirectDescent ◄──── EscapeAnneal
//!       ▲             │       │               ▲
//!       │    new best │       │ no new best   │
//!       │             ▼       └───────────────┤
//!       │           Refine ───────────────────┘
//!       │             │ attempt ended
//!       └──── Reset ◄─┘
//! ```
//!
//! - **InitialAnneal** searches a starting basin around the current
//!   (usually zero) weights, scoring each trial with the output layer
//!   solved by regression when the metric allows it.
//! - **DirectDescent** runs conjugate gradient at moderate accuracy.
//! - **EscapeAnneal** jumps away from the current point to leave a
//!   stalled minimum; descent follows.
//! - **Refine** re-runs descent from the best point at tight accuracy,
//!   after every new best and before a reset.
//! - **Reset** zeroes the weights, reseeds and starts over, up to
//!   `retries` times.
//!
//! A round (escape + descent) stagnates when it improves on the error it
//! started from by at most `tolerance` (relative). `pretries` stagnant
//! rounds in a row, or `max_escapes` rounds in one attempt, end the
//! attempt.
//!
//! The best weights ever seen are kept in a snapshot and written back
//! when training ends, however it ends.

use std::sync::atomic::{AtomicBool, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::anneal::{AnnealStart, Annealer};
use crate::buffer::AlignedBuffer;
use crate::config::{LearnParams, TrainMethod};
use crate::error::{Cancelled, MlfnResult, TrainOutcome};
use crate::gradient::Objective;
use crate::network::Network;
use crate::optimizer::{relative_improvement, ConjugateGradient, DescentConfig};
use crate::training_set::TrainingSet;

/// Caller-side hooks of a training run.
///
/// `is_cancelled` is polled at safe points (between completed inner
/// iterations of every optimizer and between driver phases). `report`
/// receives free-text progress when [`LearnParams::verbose`] is set.
pub trait TrainMonitor {
    /// Should training stop now?
    fn is_cancelled(&self) -> bool {
        false
    }

    /// Progress text. Advisory only.
    fn report(&mut self, _message: &str) {}
}

/// Never cancels, discards progress.
impl TrainMonitor for () {}

/// Cancels once the flag is set, e.g. from another thread.
impl TrainMonitor for AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// Monitor built from two closures.
///
/// ```rust
/// use mlfn::FnMonitor;
///
/// let mut lines = Vec::new();
/// let monitor = FnMonitor::new(|| false, |msg: &str| lines.push(msg.to_string()));
/// # drop(monitor);
/// ```
pub struct FnMonitor<C, P> {
    cancel: C,
    progress: P,
}

impl<C, P> FnMonitor<C, P>
where
    C: Fn() -> bool,
    P: FnMut(&str),
{
    /// Wraps a cancellation predicate and a progress sink.
    pub fn new(cancel: C, progress: P) -> Self {
        Self { cancel, progress }
    }
}

impl<C, P> TrainMonitor for FnMonitor<C, P>
where
    C: Fn() -> bool,
    P: FnMut(&str),
{
    fn is_cancelled(&self) -> bool {
        (self.cancel)()
    }

    fn report(&mut self, message: &str) {
        (self.progress)(message)
    }
}

/// Driver phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    InitialAnneal,
    DirectDescent,
    EscapeAnneal,
    Refine,
    Reset,
    Done,
}

/// Bookkeeping of one training request.
struct OptimizerState {
    best: AlignedBuffer,
    best_error: f64,
    current_error: f64,
    running_avg: f64,
    descents: usize,
    escapes: usize,
    stagnations: usize,
    retries: usize,
    pre_escape_error: Option<f64>,
    refined_best: bool,
    reset_after_refine: bool,
}

impl OptimizerState {
    fn new(n_weights: usize) -> MlfnResult<Self> {
        Ok(Self {
            best: AlignedBuffer::try_zeroed(n_weights)?,
            best_error: f64::INFINITY,
            current_error: f64::INFINITY,
            running_avg: 0.0,
            descents: 0,
            escapes: 0,
            stagnations: 0,
            retries: 0,
            pre_escape_error: None,
            refined_best: false,
            reset_after_refine: false,
        })
    }

    fn has_best(&self) -> bool {
        self.best_error.is_finite()
    }

    /// Snapshots the network if `error` beats the best so far.
    fn record(&mut self, net: &Network, error: f64) -> bool {
        if error < self.best_error {
            self.best.as_mut_slice().copy_from_slice(net.weights().as_slice());
            self.best_error = error;
            self.refined_best = false;
            true
        } else {
            false
        }
    }

    fn restore(&self, net: &mut Network) {
        net.weights
            .as_mut_slice()
            .copy_from_slice(self.best.as_slice());
    }
}

/// Trains a network by annealing, conjugate-gradient descent and output
/// regression.
///
/// # Example
///
/// ```rust
/// use mlfn::{HybridTrainer, LearnParams, Network, NetworkTopology, TrainingSet};
///
/// let mut set = TrainingSet::mapping(1, 1);
/// set.push_mapping(&[-1.0], &[-0.5]).unwrap();
/// set.push_mapping(&[1.0], &[0.5]).unwrap();
///
/// let mut net = Network::new(NetworkTopology::new(1, 1)).unwrap();
/// let params = LearnParams { quit_error: 0.01, seed: Some(1), ..Default::default() };
/// let outcome = HybridTrainer::new(params).unwrap().train(&mut net, &set, &mut ()).unwrap();
///
/// assert!(outcome.is_trained());
/// assert!(net.is_trained());
/// ```
#[derive(Debug, Clone)]
pub struct HybridTrainer {
    params: LearnParams,
}

impl HybridTrainer {
    /// Creates a trainer.
    ///
    /// # Errors
    ///
    /// [`MlfnError::Config`](crate::MlfnError::Config) if the parameters
    /// are invalid.
    pub fn new(params: LearnParams) -> MlfnResult<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Learning parameters.
    pub fn params(&self) -> &LearnParams {
        &self.params
    }

    /// Trains `net` on `set`.
    ///
    /// All working memory is allocated before any weight changes; if that
    /// fails the result is [`TrainOutcome::OutOfResources`] and the
    /// network is untouched. A regression request under a metric other
    /// than squared error is downgraded to plain descent.
    ///
    /// # Errors
    ///
    /// [`MlfnError`](crate::MlfnError) if the training set does not fit
    /// the network.
    pub fn train<M>(
        &self,
        net: &mut Network,
        set: &TrainingSet,
        monitor: &mut M,
    ) -> MlfnResult<TrainOutcome>
    where
        M: TrainMonitor + ?Sized,
    {
        set.check_compatible(net.topology())?;
        let params = &self.params;

        let metric = net.topology().error;
        let mut use_regression = params.use_regression;
        if use_regression && !metric.allows_regression() {
            log::warn!("output regression needs squared error, {metric:?} trains without it");
            if params.verbose {
                monitor.report(&format!(
                    "Regression disabled: {metric:?} is not squared error"
                ));
            }
            use_regression = false;
        }

        let (objective, cg, annealer, state) = match allocate(net, set, use_regression) {
            Ok(parts) => parts,
            Err(e) if e.is_out_of_resources() => {
                log::warn!("training aborted: {e}");
                return Ok(TrainOutcome::OutOfResources);
            }
            Err(e) => return Err(e),
        };

        let rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut session = Session {
            params,
            net,
            objective,
            cg,
            annealer,
            state,
            rng,
            monitor,
        };
        Ok(session.run())
    }
}

type Parts<'s> = (Objective<'s>, ConjugateGradient, Annealer, OptimizerState);

fn allocate<'s>(net: &Network, set: &'s TrainingSet, use_regression: bool) -> MlfnResult<Parts<'s>> {
    let n = net.param_count();
    let objective = if use_regression {
        Objective::with_regression(net, set)?
    } else {
        Objective::plain(set)
    };
    Ok((
        objective,
        ConjugateGradient::new(n)?,
        Annealer::new(n)?,
        OptimizerState::new(n)?,
    ))
}

/// One training request in flight.
struct Session<'a, 's, M: ?Sized> {
    params: &'a LearnParams,
    net: &'a mut Network,
    objective: Objective<'s>,
    cg: ConjugateGradient,
    annealer: Annealer,
    state: OptimizerState,
    rng: StdRng,
    monitor: &'a mut M,
}

impl<M> Session<'_, '_, M>
where
    M: TrainMonitor + ?Sized,
{
    fn run(&mut self) -> TrainOutcome {
        self.descent_mode();

        if self.net.is_trained() {
            let error = self.objective.error(self.net);
            self.state.record(self.net, error);
            self.state.current_error = error;
            log::debug!("resuming from trained weights, error {error:.6}");
        }

        if self.objective.active_len(self.net) == 0 {
            // Nothing nonlinear to search: one regression solves it
            let error = self.objective.error(self.net);
            self.state.record(self.net, error);
            return self.finish();
        }

        match self.params.method {
            TrainMethod::DirectDescent => self.direct_only(),
            TrainMethod::Hybrid => self.hybrid(),
        }
    }

    fn direct_only(&mut self) -> TrainOutcome {
        if self.state.has_best() {
            self.state.restore(self.net);
        }
        let config = DescentConfig::coarse(self.params);
        match self.descend_with(&config) {
            Ok(_) => self.finish(),
            Err(Cancelled) => self.cancelled(),
        }
    }

    fn hybrid(&mut self) -> TrainOutcome {
        let mut phase = if self.state.has_best() {
            self.state.restore(self.net);
            Phase::DirectDescent
        } else {
            Phase::InitialAnneal
        };

        while phase != Phase::Done {
            if self.monitor.is_cancelled() {
                return self.cancelled();
            }
            if self.state.best_error <= self.params.quit_error {
                break;
            }

            log::debug!("phase {phase:?}");
            let next = match phase {
                Phase::InitialAnneal => self.initial_anneal(),
                Phase::DirectDescent => self.direct_descent(),
                Phase::EscapeAnneal => self.escape_anneal(),
                Phase::Refine => self.refine(),
                Phase::Reset => Ok(self.reset()),
                Phase::Done => Ok(Phase::Done),
            };
            phase = match next {
                Ok(next) => next,
                Err(Cancelled) => return self.cancelled(),
            };
        }

        self.finish()
    }

    fn initial_anneal(&mut self) -> Result<Phase, Cancelled> {
        // Cheap approximate regression is fine for ranking trial points
        let has_regression = self.objective.has_regression();
        self.objective.set_regressing(has_regression);

        let outcome = self.annealer.run(
            self.net,
            &mut self.objective,
            &self.params.init_anneal,
            AnnealStart::KeepCurrent,
            self.params.quit_error,
            &mut self.rng,
            &*self.monitor,
        );
        self.descent_mode();
        self.settle(outcome)?;

        let error = self.objective.error(self.net);
        self.state.current_error = error;
        if self.state.record(self.net, error) {
            self.progress(|| format!("Initial anneal: error {error:.6}"));
        }
        Ok(Phase::DirectDescent)
    }

    fn direct_descent(&mut self) -> Result<Phase, Cancelled> {
        let best_before = self.state.best_error;
        let config = DescentConfig::coarse(self.params);
        let error = self.descend_with(&config)?;

        let state = &mut self.state;
        state.descents += 1;
        state.running_avg += (error - state.running_avg) / state.descents as f64;

        let stagnant = match state.pre_escape_error.take() {
            Some(start) => {
                relative_improvement(start.min(best_before), error) <= self.params.tolerance
            }
            None => false,
        };
        if stagnant {
            state.stagnations += 1;
        } else {
            state.stagnations = 0;
        }
        let new_best = error < best_before;

        let (escapes, stagnations, avg, best) = (
            state.escapes,
            state.stagnations,
            state.running_avg,
            state.best_error,
        );
        log::debug!(
            "descent {}: error {error:.6}, best {best:.6}, avg {avg:.6}, escapes {escapes}",
            state.descents
        );
        self.progress(|| {
            format!("Descent: error {error:.6} best {best:.6} avg {avg:.6} escapes {escapes}")
        });

        if stagnations >= self.params.pretries || escapes >= self.params.max_escapes {
            self.state.stagnations = 0;
            if self.state.refined_best {
                return Ok(Phase::Reset);
            }
            self.state.reset_after_refine = true;
            return Ok(Phase::Refine);
        }
        if new_best {
            log::info!("new best error {error:.6}");
            return Ok(Phase::Refine);
        }
        Ok(Phase::EscapeAnneal)
    }

    fn escape_anneal(&mut self) -> Result<Phase, Cancelled> {
        self.state.pre_escape_error = Some(self.state.current_error);
        self.state.escapes += 1;

        let outcome = self.annealer.run(
            self.net,
            &mut self.objective,
            &self.params.escape_anneal,
            AnnealStart::Leave,
            self.params.quit_error,
            &mut self.rng,
            &*self.monitor,
        );
        let error = self.settle(outcome)?;
        self.state.current_error = error;
        self.state.record(self.net, error);
        Ok(Phase::DirectDescent)
    }

    fn refine(&mut self) -> Result<Phase, Cancelled> {
        self.state.restore(self.net);
        let config = DescentConfig::refine(self.params);
        let error = self.descend_with(&config)?;
        self.state.refined_best = true;

        let best = self.state.best_error;
        log::debug!("refined to {error:.6}, best {best:.6}");
        self.progress(|| format!("Refine: error {error:.6} best {best:.6}"));

        if std::mem::take(&mut self.state.reset_after_refine) {
            Ok(Phase::Reset)
        } else {
            Ok(Phase::EscapeAnneal)
        }
    }

    fn reset(&mut self) -> Phase {
        if self.state.retries >= self.params.retries {
            return Phase::Done;
        }
        self.state.retries += 1;
        log::info!(
            "restart {}/{} from zero weights, best {:.6}",
            self.state.retries,
            self.params.retries,
            self.state.best_error
        );
        let (retries, best) = (self.state.retries, self.state.best_error);
        self.progress(|| format!("Restart {retries}: best {best:.6}"));

        self.net.weights.zero();
        self.rng = StdRng::seed_from_u64(self.rng.gen());
        self.state.escapes = 0;
        self.state.stagnations = 0;
        self.state.pre_escape_error = None;
        self.state.reset_after_refine = false;
        Phase::InitialAnneal
    }

    /// One conjugate-gradient run; records the result.
    fn descend_with(&mut self, config: &DescentConfig) -> Result<f64, Cancelled> {
        self.descent_mode();
        let outcome = self.cg.minimize(
            self.net,
            &mut self.objective,
            config,
            &mut self.rng,
            &*self.monitor,
        );
        let error = self.settle(outcome)?;
        self.state.current_error = error;
        self.state.record(self.net, error);
        Ok(error)
    }

    /// Descent and escapes only use regression when it is exact.
    fn descent_mode(&mut self) {
        let exact = self.objective.has_exact_regression();
        self.objective.set_regressing(exact);
    }

    /// Unwraps an optimizer outcome. A cancelled run still leaves valid
    /// weights in the network, which are recorded before unwinding.
    fn settle(&mut self, outcome: TrainOutcome) -> Result<f64, Cancelled> {
        match outcome {
            TrainOutcome::Trained { error } => Ok(error),
            TrainOutcome::Cancelled { error } => {
                self.state.record(self.net, error);
                Err(Cancelled)
            }
            TrainOutcome::OutOfResources => Err(Cancelled),
        }
    }

    fn progress<F: FnOnce() -> String>(&mut self, message: F) {
        if self.params.verbose {
            self.monitor.report(&message());
        }
    }

    fn finish(&mut self) -> TrainOutcome {
        self.state.restore(self.net);
        self.net.set_trained(true);
        let error = self.state.best_error;
        log::info!("training finished, error {error:.6}");
        self.progress(|| format!("Done: error {error:.6}"));
        TrainOutcome::Trained { error }
    }

    fn cancelled(&mut self) -> TrainOutcome {
        let error = if self.state.has_best() {
            self.state.restore(self.net);
            self.state.best_error
        } else {
            self.net.epoch_error(self.objective.set())
        };
        log::info!("training cancelled, error {error:.6}");
        TrainOutcome::Cancelled { error }
    }
}
