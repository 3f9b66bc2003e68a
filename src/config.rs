//! Network topology and learning parameters.
//!
//! This module provides [`NetworkTopology`], the immutable shape of a
//! network, and [`LearnParams`], the knobs of the hybrid trainer.
//!
//! # Example
//!
//! ```rust
//! use mlfn::{Domain, ErrorKind, NetworkTopology};
//!
//! let topology = NetworkTopology::new(2, 1)
//!     .with_hidden(3, 0)
//!     .with_error(ErrorKind::MeanSquare);
//! assert!(topology.validate().is_ok());
//! assert_eq!(topology.layer_units(), vec![2, 3, 1]);
//!
//! // Complex-valued inputs occupy two reals each
//! let complex = NetworkTopology::new(4, 2)
//!     .with_hidden(5, 0)
//!     .with_domain(Domain::ComplexHidden);
//! assert_eq!(complex.input_width(), 8);
//! assert_eq!(complex.output_width(), 2);
//! ```
//!
//! # Domains
//!
//! | Domain | Inputs | Hidden | Outputs |
//! |--------|--------|--------|---------|
//! | `Real` | real | real | real |
//! | `ComplexInput` | complex | real | real |
//! | `ComplexHidden` | complex | complex | real |
//! | `FullComplex` | complex | complex | complex |

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Floor used instead of zero in every denominator and logarithm.
pub const EPSILON: f64 = 1e-10;

/// Gain of the squashing activation: `f(x) = tanh(SQUASH_GAIN * x)`.
pub const SQUASH_GAIN: f64 = 1.5;

/// Singular values below `SVD_THRESHOLD * max_singular_value` are treated
/// as zero when solving output weights.
pub const SVD_THRESHOLD: f64 = 1e-8;

/// Maximum number of hidden layers.
pub const MAX_HIDDEN_LAYERS: usize = 2;

/// Numeric domain of a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Domain {
    /// Everything real.
    #[default]
    Real,
    /// Complex inputs feeding real-valued neurons.
    ComplexInput,
    /// Complex inputs and hidden neurons, real outputs.
    ComplexHidden,
    /// Complex inputs, hidden neurons and outputs.
    FullComplex,
}

impl Domain {
    /// Whether input units are complex.
    #[inline]
    pub fn input_complex(self) -> bool {
        !matches!(self, Domain::Real)
    }

    /// Whether hidden neurons are complex.
    #[inline]
    pub fn hidden_complex(self) -> bool {
        matches!(self, Domain::ComplexHidden | Domain::FullComplex)
    }

    /// Whether output neurons are complex.
    #[inline]
    pub fn output_complex(self) -> bool {
        matches!(self, Domain::FullComplex)
    }
}

/// Error metric minimized by training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ErrorKind {
    /// Mean squared error.
    #[default]
    MeanSquare,
    /// Mean absolute error.
    Absolute,
    /// Kalman-Kwasny: squared error divided by the squashing slack `1 - a²`.
    KalmanKwasny,
    /// Cross entropy of outputs read as probabilities on `[-1, 1]`.
    CrossEntropy,
    /// Worst squared error of each case.
    Max,
    /// Eighth power of the error.
    EighthPower,
    /// Log of the mean squared error over the epoch.
    LogMean,
    /// Mean over cases of the log of each case's squared error.
    MeanLog,
}

/// Immutable shape of a network.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NetworkTopology {
    /// Input units (complex units counted once).
    pub n_inputs: usize,

    /// Neurons in the first hidden layer (0 = no hidden layer).
    pub n_hidden1: usize,

    /// Neurons in the second hidden layer. Ignored when `n_hidden1 == 0`.
    pub n_hidden2: usize,

    /// Output neurons (complex neurons counted once).
    pub n_outputs: usize,

    /// Numeric domain.
    pub domain: Domain,

    /// Identity activation on the output layer.
    pub linear_output: bool,

    /// Error metric.
    pub error: ErrorKind,
}

impl Default for NetworkTopology {
    fn default() -> Self {
        Self {
            n_inputs: 1,
            n_hidden1: 0,
            n_hidden2: 0,
            n_outputs: 1,
            domain: Domain::Real,
            linear_output: false,
            error: ErrorKind::MeanSquare,
        }
    }
}

impl NetworkTopology {
    /// Creates a real-domain topology without hidden layers.
    pub fn new(n_inputs: usize, n_outputs: usize) -> Self {
        Self {
            n_inputs,
            n_outputs,
            ..Default::default()
        }
    }

    /// Sets hidden layer sizes.
    pub fn with_hidden(mut self, n_hidden1: usize, n_hidden2: usize) -> Self {
        self.n_hidden1 = n_hidden1;
        self.n_hidden2 = n_hidden2;
        self
    }

    /// Sets the numeric domain.
    pub fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = domain;
        self
    }

    /// Sets the output-linearity flag.
    pub fn with_linear_output(mut self, linear: bool) -> Self {
        self.linear_output = linear;
        self
    }

    /// Sets the error metric.
    pub fn with_error(mut self, error: ErrorKind) -> Self {
        self.error = error;
        self
    }

    /// Effective hidden layer sizes (zero-sized layers dropped).
    pub fn hidden_units(&self) -> Vec<usize> {
        match (self.n_hidden1, self.n_hidden2) {
            (0, _) => vec![],
            (h1, 0) => vec![h1],
            (h1, h2) => vec![h1, h2],
        }
    }

    /// Number of weight layers (hidden + output).
    #[inline]
    pub fn num_layers(&self) -> usize {
        self.hidden_units().len() + 1
    }

    /// Unit counts: `[inputs, hidden..., outputs]`.
    pub fn layer_units(&self) -> Vec<usize> {
        let mut units = Vec::with_capacity(MAX_HIDDEN_LAYERS + 2);
        units.push(self.n_inputs);
        units.extend(self.hidden_units());
        units.push(self.n_outputs);
        units
    }

    /// Number of reals in an input vector.
    #[inline]
    pub fn input_width(&self) -> usize {
        if self.domain.input_complex() {
            2 * self.n_inputs
        } else {
            self.n_inputs
        }
    }

    /// Number of reals in an output vector.
    #[inline]
    pub fn output_width(&self) -> usize {
        if self.domain.output_complex() {
            2 * self.n_outputs
        } else {
            self.n_outputs
        }
    }

    /// Validates the topology.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if:
    /// - `n_inputs` or `n_outputs` is zero
    /// - the domain is `ComplexHidden` and there is no hidden layer
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_inputs == 0 {
            return Err(ConfigError::InvalidDimension("n_inputs must be > 0"));
        }
        if self.n_outputs == 0 {
            return Err(ConfigError::InvalidDimension("n_outputs must be > 0"));
        }
        if self.domain == Domain::ComplexHidden && self.n_hidden1 == 0 {
            return Err(ConfigError::DomainNeedsHidden(self.domain));
        }
        Ok(())
    }
}

/// Target values used for class membership.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TargetRange {
    /// Target of the output that matches the case's class.
    pub on: f64,
    /// Target of every other output.
    pub off: f64,
}

impl Default for TargetRange {
    fn default() -> Self {
        Self { on: 0.9, off: -0.9 }
    }
}

impl TargetRange {
    /// Maps `u` in `[0, 1]` linearly onto `[off, on]`.
    #[inline]
    pub fn map(&self, u: f64) -> f64 {
        self.off + u * (self.on - self.off)
    }
}

/// Distribution of annealing perturbations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Density {
    /// Standard normal.
    #[default]
    Gaussian,
    /// Standard Cauchy (heavy tails, occasional long jumps).
    Cauchy,
}

/// Cooling schedule of one annealing phase.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AnnealSchedule {
    /// Number of temperatures.
    pub n_temps: usize,
    /// Perturbations tried at each temperature.
    pub iters_per_temp: usize,
    /// Iterations given back after each improvement.
    pub setback: usize,
    /// First temperature (perturbation scale).
    pub start_temp: f64,
    /// Last temperature.
    pub stop_temp: f64,
    /// Perturbation distribution.
    pub density: Density,
}

impl AnnealSchedule {
    /// Schedule used to find a starting basin from zero weights.
    pub fn initial() -> Self {
        Self {
            n_temps: 4,
            iters_per_temp: 100,
            setback: 20,
            start_temp: 3.0,
            stop_temp: 0.2,
            density: Density::Gaussian,
        }
    }

    /// Schedule used to jump out of a stalled minimum.
    pub fn escape() -> Self {
        Self {
            n_temps: 4,
            iters_per_temp: 40,
            setback: 10,
            start_temp: 0.8,
            stop_temp: 0.05,
            density: Density::Gaussian,
        }
    }

    fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        if self.n_temps == 0 || self.iters_per_temp == 0 {
            return Err(ConfigError::InvalidSchedule(name));
        }
        if !(self.start_temp > 0.0 && self.stop_temp > 0.0 && self.stop_temp <= self.start_temp) {
            return Err(ConfigError::InvalidSchedule(name));
        }
        Ok(())
    }
}

/// Top-level training strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TrainMethod {
    /// Annealing, conjugate-gradient descent, escapes, refinement and
    /// restarts.
    #[default]
    Hybrid,
    /// A single conjugate-gradient run from the current weights.
    DirectDescent,
}

/// Learning parameters of the hybrid trainer.
///
/// ```rust
/// use mlfn::LearnParams;
///
/// let params = LearnParams {
///     quit_error: 0.5,
///     seed: Some(7),
///     ..Default::default()
/// };
/// assert!(params.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LearnParams {
    /// Training strategy.
    pub method: TrainMethod,

    /// Stop as soon as the error reaches this value. Compared on the
    /// metric's own scale (the log metrics go negative); the default never
    /// stops early.
    pub quit_error: f64,

    /// Relative improvement below which an iteration counts as failed.
    pub tolerance: f64,

    /// Iteration cap of a direct-descent run.
    pub max_iterations: usize,

    /// Iteration cap of a refinement run.
    pub refine_iterations: usize,

    /// Restarts from scratch before giving up.
    pub retries: usize,

    /// Consecutive stagnant escapes tolerated before refining/restarting.
    pub pretries: usize,

    /// Escapes allowed per attempt (between restarts).
    pub max_escapes: usize,

    /// Annealing schedule of the initial phase.
    pub init_anneal: AnnealSchedule,

    /// Annealing schedule of escape phases.
    pub escape_anneal: AnnealSchedule,

    /// Line-search tolerance exponent of ordinary descent (`10^-accuracy`).
    pub accuracy: i32,

    /// Line-search tolerance exponent of refinement.
    pub refine_accuracy: i32,

    /// Solve output weights by linear regression where the metric allows it.
    pub use_regression: bool,

    /// Send progress text to the monitor.
    pub verbose: bool,

    /// Seed for deterministic runs (None => random).
    pub seed: Option<u64>,
}

impl Default for LearnParams {
    fn default() -> Self {
        Self {
            method: TrainMethod::Hybrid,
            quit_error: f64::NEG_INFINITY,
            tolerance: 1e-6,
            max_iterations: 1000,
            refine_iterations: 3000,
            retries: 5,
            pretries: 3,
            max_escapes: 20,
            init_anneal: AnnealSchedule::initial(),
            escape_anneal: AnnealSchedule::escape(),
            accuracy: 4,
            refine_accuracy: 7,
            use_regression: true,
            verbose: false,
            seed: None,
        }
    }
}

impl LearnParams {
    /// Line-search tolerance of ordinary descent.
    #[inline]
    pub fn line_tolerance(&self) -> f64 {
        10f64.powi(-self.accuracy)
    }

    /// Line-search tolerance of refinement.
    #[inline]
    pub fn refine_line_tolerance(&self) -> f64 {
        10f64.powi(-self.refine_accuracy)
    }

    /// Validates the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a tolerance is not positive, an
    /// accuracy exponent is outside 1..=15, an iteration cap is zero or
    /// an annealing schedule is empty or not cooling.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tolerance > 0.0 && self.tolerance < 1.0) {
            return Err(ConfigError::InvalidTolerance(self.tolerance));
        }
        if !(1..=15).contains(&self.accuracy) {
            return Err(ConfigError::InvalidAccuracy(self.accuracy));
        }
        if !(1..=15).contains(&self.refine_accuracy) {
            return Err(ConfigError::InvalidAccuracy(self.refine_accuracy));
        }
        if self.max_iterations == 0 || self.refine_iterations == 0 {
            return Err(ConfigError::InvalidDimension("iteration caps must be > 0"));
        }
        if self.pretries == 0 {
            return Err(ConfigError::InvalidDimension("pretries must be > 0"));
        }
        self.init_anneal.validate("init_anneal")?;
        self.escape_anneal.validate("escape_anneal")?;
        Ok(())
    }
}

/// Errors returned by [`NetworkTopology::validate`] and
/// [`LearnParams::validate`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A dimension parameter is invalid.
    #[error("Invalid dimension: {0}")]
    InvalidDimension(&'static str),

    /// The domain needs at least one hidden layer.
    #[error("Domain {0:?} requires at least one hidden layer")]
    DomainNeedsHidden(Domain),

    /// Relative tolerance outside (0, 1).
    #[error("Tolerance must be in (0, 1), got {0}")]
    InvalidTolerance(f64),

    /// Accuracy exponent outside 1..=15.
    #[error("Accuracy exponent must be 1-15, got {0}")]
    InvalidAccuracy(i32),

    /// Annealing schedule is empty or not cooling.
    #[error("Invalid annealing schedule: {0}")]
    InvalidSchedule(&'static str),
}
