//! Conjugate-gradient descent.
//!
//! # Algorithm
//!
//! With `g` the negative gradient and `h` the search direction:
//!
//! ```text
//! h = g
//! loop:
//!     t* = argmin_t E(w + t · h/|h|)        (bracket + Brent)
//!     w  = w + t* · h/|h|                   (only if strictly better)
//!     g' = -∇E(w)
//!     γ  = clamp(Σ (g' - g) · g' / Σ g², 0, cap)      (Polak-Ribière)
//!     h  = g' + γ h
//! ```
//!
//! Heuristics on top of the textbook loop:
//!
//! - An iteration whose relative improvement is at most `tolerance` is
//!   retried along `g` plus Gaussian noise; after `max_random_tries`
//!   consecutive failures the run has converged.
//! - An iteration improving by less than `10 · tolerance` is poor. After
//!   `poor_limit` poor iterations in a row `γ` is forced to zero (steepest
//!   descent); `max_resets` such resets without a good iteration in
//!   between also count as convergence.
//! - If `h` stops being a descent direction it is replaced by `g`.
//!
//! Weights are only ever replaced by a strictly better point, so the
//! error never increases during a run.

use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::buffer::AlignedBuffer;
use crate::config::{LearnParams, EPSILON};
use crate::error::{Cancelled, MlfnResult, TrainOutcome};
use crate::gradient::Objective;
use crate::line_search::{bracket_minimum, refine_minimum};
use crate::network::Network;
use crate::trainer::TrainMonitor;

/// Points scanned by the line-search bracketer.
const SCAN_POINTS: usize = 4;

/// Brent iterations per line search.
const LINE_ITERATIONS: usize = 50;

/// Step length tried first (the scan covers twice this).
const INITIAL_STEP: f64 = 0.5;

/// Tolerance ratio of refinement runs relative to ordinary descent.
const REFINE_TOLERANCE_RATIO: f64 = 0.01;

/// Knobs of one descent run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DescentConfig {
    /// Iteration cap.
    pub max_iterations: usize,
    /// Stop once the error reaches this value.
    pub quit_error: f64,
    /// Relative improvement below which an iteration failed.
    pub tolerance: f64,
    /// Relative tolerance of the line search.
    pub line_tolerance: f64,
    /// Consecutive failed iterations retried along random directions.
    pub max_random_tries: usize,
    /// Poor iterations in a row before γ is forced to zero.
    pub poor_limit: usize,
    /// Upper clamp of γ.
    pub gamma_cap: f64,
    /// Forced steepest-descent resets without a good iteration before
    /// the run counts as converged.
    pub max_resets: usize,
}

impl Default for DescentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            quit_error: f64::NEG_INFINITY,
            tolerance: 1e-6,
            line_tolerance: 1e-4,
            max_random_tries: 4,
            poor_limit: 3,
            gamma_cap: 5.0,
            max_resets: 5,
        }
    }
}

impl DescentConfig {
    /// Moderate-accuracy descent.
    pub fn coarse(params: &LearnParams) -> Self {
        Self {
            max_iterations: params.max_iterations,
            quit_error: params.quit_error,
            tolerance: params.tolerance,
            line_tolerance: params.line_tolerance(),
            ..Default::default()
        }
    }

    /// High-accuracy descent used to polish a best point.
    pub fn refine(params: &LearnParams) -> Self {
        Self {
            max_iterations: params.refine_iterations,
            quit_error: params.quit_error,
            tolerance: (params.tolerance * REFINE_TOLERANCE_RATIO).max(f64::EPSILON),
            line_tolerance: params.refine_line_tolerance(),
            ..Default::default()
        }
    }
}

/// Conjugate-gradient optimizer with preallocated working vectors.
#[derive(Debug)]
pub struct ConjugateGradient {
    grad: AlignedBuffer,
    g: AlignedBuffer,
    h: AlignedBuffer,
    dir: AlignedBuffer,
    base: AlignedBuffer,
    last_step: f64,
}

impl ConjugateGradient {
    /// Allocates working vectors for a network of `n_weights` weights.
    pub fn new(n_weights: usize) -> MlfnResult<Self> {
        Ok(Self {
            grad: AlignedBuffer::try_zeroed(n_weights)?,
            g: AlignedBuffer::try_zeroed(n_weights)?,
            h: AlignedBuffer::try_zeroed(n_weights)?,
            dir: AlignedBuffer::try_zeroed(n_weights)?,
            base: AlignedBuffer::try_zeroed(n_weights)?,
            last_step: INITIAL_STEP,
        })
    }

    /// Descends from the network's current weights.
    ///
    /// On return the network holds the best point of the run. Cancellation
    /// leaves it at the last accepted point.
    pub fn minimize<M>(
        &mut self,
        net: &mut Network,
        objective: &mut Objective<'_>,
        config: &DescentConfig,
        rng: &mut StdRng,
        monitor: &M,
    ) -> TrainOutcome
    where
        M: TrainMonitor + ?Sized,
    {
        let n = objective.active_len(net);
        debug_assert!(n <= self.grad.len());
        if n == 0 {
            let error = objective.error(net);
            return TrainOutcome::Trained { error };
        }

        self.last_step = INITIAL_STEP;
        let mut error = objective.gradient(net, &mut self.grad.as_mut_slice()[..n]);
        for k in 0..n {
            self.g[k] = -self.grad[k];
            self.h[k] = self.g[k];
        }

        let mut random_failures = 0usize;
        let mut poor = 0usize;
        let mut resets = 0usize;

        for iteration in 0..config.max_iterations {
            if error <= config.quit_error {
                break;
            }
            if monitor.is_cancelled() {
                return TrainOutcome::Cancelled { error };
            }

            let new_error = match self.line_minimize(net, objective, n, error, config, monitor) {
                Ok(e) => e,
                Err(Cancelled) => return TrainOutcome::Cancelled { error },
            };
            let improvement = relative_improvement(error, new_error);
            let moved = new_error < error;

            if moved {
                error = objective.gradient(net, &mut self.grad.as_mut_slice()[..n]);
            }

            if improvement <= config.tolerance {
                random_failures += 1;
                if random_failures > config.max_random_tries {
                    log::trace!("descent converged after {iteration} iterations");
                    break;
                }
                self.randomize_direction(n, rng);
                continue;
            }
            random_failures = 0;

            if improvement < 10.0 * config.tolerance {
                poor += 1;
            } else {
                poor = 0;
                resets = 0;
            }

            let mut gamma = self.polak_ribiere(n).clamp(0.0, config.gamma_cap);
            if poor >= config.poor_limit {
                gamma = 0.0;
                poor = 0;
                resets += 1;
                if resets >= config.max_resets {
                    log::trace!("descent stalled after {iteration} iterations");
                    break;
                }
            }

            let mut slope = 0.0;
            for k in 0..n {
                let g_new = -self.grad[k];
                self.h[k] = g_new + gamma * self.h[k];
                self.g[k] = g_new;
                slope += self.h[k] * g_new;
            }
            if slope <= 0.0 {
                self.h.as_mut_slice()[..n].copy_from_slice(&self.g.as_slice()[..n]);
            }
        }

        TrainOutcome::Trained { error }
    }

    /// γ from the old negative gradient `g` and the new gradient `grad`.
    fn polak_ribiere(&self, n: usize) -> f64 {
        let mut num = 0.0;
        let mut den = 0.0;
        for k in 0..n {
            let g_old = self.g[k];
            let g_new = -self.grad[k];
            num += (g_new - g_old) * g_new;
            den += g_old * g_old;
        }
        if den < EPSILON {
            0.0
        } else {
            num / den
        }
    }

    /// `h = g + noise` with per-component scale `|g| / sqrt(n)`.
    fn randomize_direction(&mut self, n: usize, rng: &mut StdRng) {
        let mut norm_sq = 0.0;
        for k in 0..n {
            self.g[k] = -self.grad[k];
            norm_sq += self.g[k] * self.g[k];
        }
        let scale = (norm_sq / n as f64).sqrt();
        for k in 0..n {
            let noise: f64 = rng.sample(StandardNormal);
            self.h[k] = self.g[k] + scale * noise;
        }
    }

    /// Minimizes along `h`. Returns the new error; the network holds the
    /// accepted point, or its starting weights if nothing was better.
    fn line_minimize<M>(
        &mut self,
        net: &mut Network,
        objective: &mut Objective<'_>,
        n: usize,
        error: f64,
        config: &DescentConfig,
        monitor: &M,
    ) -> Result<f64, Cancelled>
    where
        M: TrainMonitor + ?Sized,
    {
        let norm = self.h.as_slice()[..n]
            .iter()
            .map(|v| v * v)
            .sum::<f64>()
            .sqrt();
        if !(norm > 0.0) || !norm.is_finite() {
            return Ok(error);
        }
        for k in 0..n {
            self.dir[k] = self.h[k] / norm;
        }
        self.base
            .as_mut_slice()
            .copy_from_slice(net.weights().as_slice());

        let base = &self.base;
        let dir = &self.dir;
        let mut criterion = |t: f64| -> Result<f64, Cancelled> {
            if monitor.is_cancelled() {
                return Err(Cancelled);
            }
            step_weights(net, base, dir, n, t);
            Ok(objective.error(net))
        };

        let searched = bracket_minimum(
            &mut criterion,
            0.0,
            2.0 * self.last_step,
            SCAN_POINTS,
            false,
            config.quit_error,
            Some(error),
        )
        .and_then(|bracket| {
            refine_minimum(
                &mut criterion,
                &bracket,
                LINE_ITERATIONS,
                config.quit_error,
                config.line_tolerance,
            )
        });

        match searched {
            Ok((t, y)) if y < error && t > 0.0 => {
                step_weights(net, &self.base, &self.dir, n, t);
                self.last_step = t;
                Ok(objective.error(net))
            }
            Ok(_) => {
                net.weights.as_mut_slice().copy_from_slice(self.base.as_slice());
                Ok(error)
            }
            Err(Cancelled) => {
                net.weights.as_mut_slice().copy_from_slice(self.base.as_slice());
                Err(Cancelled)
            }
        }
    }
}

/// `(before - after) / |before|`, with the denominator floored.
#[inline]
pub(crate) fn relative_improvement(before: f64, after: f64) -> f64 {
    (before - after) / before.abs().max(EPSILON)
}

/// Sets the active weights to `base + t · dir`.
fn step_weights(net: &mut Network, base: &AlignedBuffer, dir: &AlignedBuffer, n: usize, t: f64) {
    let w = net.weights.as_mut_slice();
    for k in 0..n {
        w[k] = base[k] + t * dir[k];
    }
}
