//! Epoch error and gradient.
//!
//! # Backpropagation
//!
//! For every case the network runs forward, the metric turns outputs and
//! targets into dE/d(output), and the output layer's activation
//! derivatives turn that into `delta = dE/d(net)`. Each layer then
//!
//! 1. accumulates its weight gradient `delta ⊗ source` (+ bias),
//! 2. pulls `delta` back through its weights to dE/d(source), and
//! 3. hands it to the layer below, whose stored activation derivatives
//!    (a scalar per real neuron, a 2×2 Jacobian per complex neuron) turn
//!    it into that layer's `delta`.
//!
//! The accumulated gradient is finally multiplied by the metric's epoch
//! scale so it is the gradient of the reported (normalized) error.
//!
//! # Active Weights
//!
//! When output regression owns the output layer the gradient covers only
//! the weights below it, which form a prefix of the weight buffer.

use crate::error::MlfnResult;
use crate::network::Network;
use crate::regress::OutputRegression;
use crate::training_set::TrainingSet;

impl Network {
    /// Normalized error of the network over `set`.
    pub fn epoch_error(&mut self, set: &TrainingSet) -> f64 {
        let metric = self.topology.error.metric();
        let last = self.shapes.len() - 1;
        let mut total = 0.0;

        for i in 0..set.len() {
            self.trial(set.input(i));
            let cache = &mut self.cache;
            set.fill_target(i, cache.target.as_mut_slice());
            total += metric.case_error(
                cache.acts[last].as_slice(),
                cache.target.as_slice(),
                cache.case_deriv.as_mut_slice(),
            );
        }

        metric
            .finish_epoch(total, set.len(), self.output_width())
            .0
    }

    /// Normalized error and its gradient over `set`.
    ///
    /// `grad` is either as long as the whole weight buffer or as long as
    /// the weights below the output layer; in the latter case the output
    /// layer's own gradient is not computed.
    pub fn epoch_gradient(&mut self, set: &TrainingSet, grad: &mut [f64]) -> f64 {
        let include_output = grad.len() == self.weights.len();
        debug_assert!(include_output || grad.len() == self.weights.output_range().start);

        let metric = self.topology.error.metric();
        grad.fill(0.0);

        let mut total = 0.0;
        for i in 0..set.len() {
            let input = set.input(i);
            self.trial(input);
            set.fill_target(i, self.cache.target.as_mut_slice());
            total += self.backprop_case(input, grad, include_output);
        }

        let (error, scale) = metric.finish_epoch(total, set.len(), self.output_width());
        for g in grad.iter_mut() {
            *g *= scale;
        }
        error
    }

    /// Backpropagates the case held in the cache, accumulating into `grad`.
    fn backprop_case(&mut self, input: &[f64], grad: &mut [f64], include_output: bool) -> f64 {
        let metric = self.topology.error.metric();
        let Network {
            shapes,
            weights,
            cache,
            ..
        } = self;
        let last = shapes.len() - 1;

        let case_error = metric.case_error(
            cache.acts[last].as_slice(),
            cache.target.as_slice(),
            cache.case_deriv.as_mut_slice(),
        );
        shapes[last].delta_from(
            cache.derivs[last].as_slice(),
            cache.case_deriv.as_slice(),
            cache.delta.as_mut_slice(),
        );

        for l in (0..=last).rev() {
            let shape = &shapes[l];
            let layer_grad = if l == last && !include_output {
                None
            } else {
                Some(&mut grad[weights.layer_range(l)])
            };
            if l == 0 && layer_grad.is_none() {
                break;
            }

            let source = if l == 0 {
                input
            } else {
                cache.acts[l - 1].as_slice()
            };
            let grad_input = if l > 0 {
                Some(&mut cache.delta_prev.as_mut_slice()[..shape.in_width()])
            } else {
                None
            };
            shape.backward(
                weights.layer(l),
                source,
                &cache.delta.as_slice()[..shape.out_width()],
                layer_grad,
                grad_input,
            );

            if l > 0 {
                let below = &shapes[l - 1];
                below.delta_from(
                    cache.derivs[l - 1].as_slice(),
                    &cache.delta_prev.as_slice()[..below.out_width()],
                    cache.delta.as_mut_slice(),
                );
            }
        }

        case_error
    }
}

/// Error and gradient of a network over one training set, with the
/// output layer optionally solved by regression before every evaluation.
///
/// Optimizers see the network only through this type: whatever the
/// objective owns (the output layer, under regression) is invisible to
/// their search.
#[derive(Debug)]
pub struct Objective<'s> {
    set: &'s TrainingSet,
    regression: Option<OutputRegression>,
    regressing: bool,
}

impl<'s> Objective<'s> {
    /// Plain objective: every weight is searched.
    pub fn plain(set: &'s TrainingSet) -> Self {
        Self {
            set,
            regression: None,
            regressing: false,
        }
    }

    /// Objective whose output layer is solved by regression.
    ///
    /// # Errors
    ///
    /// See [`OutputRegression::new`].
    pub fn with_regression(net: &Network, set: &'s TrainingSet) -> MlfnResult<Self> {
        Ok(Self {
            set,
            regression: Some(OutputRegression::new(net, set)?),
            regressing: true,
        })
    }

    /// Training set.
    #[inline]
    pub fn set(&self) -> &'s TrainingSet {
        self.set
    }

    /// Regression available and exact (linear outputs)?
    #[inline]
    pub fn has_exact_regression(&self) -> bool {
        self.regression.as_ref().is_some_and(OutputRegression::is_exact)
    }

    /// Regression available at all?
    #[inline]
    pub fn has_regression(&self) -> bool {
        self.regression.is_some()
    }

    /// Turns regression on or off. No effect without a regression.
    pub fn set_regressing(&mut self, on: bool) {
        self.regressing = on && self.regression.is_some();
    }

    /// Does the objective own (solve) the output layer?
    #[inline]
    pub fn owns_output(&self) -> bool {
        self.regressing
    }

    /// Number of weights left to the optimizer (a prefix of the buffer).
    #[inline]
    pub fn active_len(&self, net: &Network) -> usize {
        if self.owns_output() {
            net.weights().output_range().start
        } else {
            net.param_count()
        }
    }

    /// Solves the output layer if owned, then evaluates the error.
    pub fn error(&mut self, net: &mut Network) -> f64 {
        self.regress(net);
        net.epoch_error(self.set)
    }

    /// Solves the output layer if owned, then evaluates error and the
    /// gradient of the active weights. `grad` must hold at least
    /// [`active_len`](Self::active_len) elements.
    pub fn gradient(&mut self, net: &mut Network, grad: &mut [f64]) -> f64 {
        self.regress(net);
        let n = self.active_len(net);
        net.epoch_gradient(self.set, &mut grad[..n])
    }

    fn regress(&mut self, net: &mut Network) {
        if !self.regressing {
            return;
        }
        if let Some(regression) = self.regression.as_mut() {
            regression.solve(net, self.set);
        }
    }
}
