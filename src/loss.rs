//! Error metrics.
//!
//! Every metric implements [`ErrorMetric`], which the gradient engine,
//! the annealer and the optimizer consume the same way:
//!
//! - [`ErrorMetric::case_error`] - error of one case plus dE/d(output)
//! - [`ErrorMetric::finish_epoch`] - normalized epoch error and the factor
//!   applied to the accumulated gradient
//!
//! Most metrics are sums of independent per-output terms and only
//! implement [`ErrorMetric::term`]. [`Max`] and [`MeanLog`] need the whole
//! case before any derivative is known, and [`LogMean`] needs the whole
//! epoch; they override the case or epoch step. Their scratch (the worst
//! output, the case sum) lives inside one call.
//!
//! # Example
//!
//! ```rust
//! use mlfn::ErrorKind;
//!
//! let metric = ErrorKind::MeanSquare.metric();
//! let mut deriv = [0.0; 2];
//! let case = metric.case_error(&[0.5, -0.5], &[0.0, 0.0], &mut deriv);
//! assert_eq!(case, 0.5);
//! assert_eq!(deriv, [1.0, -1.0]);
//!
//! let (error, _scale) = metric.finish_epoch(case, 1, 2);
//! assert_eq!(error, 25.0);
//! ```
//!
//! All denominators and logarithms are floored at [`EPSILON`].

use crate::config::{ErrorKind, EPSILON};

/// Scalar error metric over network outputs.
pub trait ErrorMetric: Sync {
    /// Which metric this is.
    fn kind(&self) -> ErrorKind;

    /// Contribution of one output and its derivative w.r.t. `attained`.
    fn term(&self, attained: f64, target: f64) -> (f64, f64);

    /// Error of one case. Writes dE/d(attained) for every output.
    fn case_error(&self, attained: &[f64], target: &[f64], deriv: &mut [f64]) -> f64 {
        let mut sum = 0.0;
        for ((&a, &t), d) in attained.iter().zip(target).zip(deriv.iter_mut()) {
            let (e, de) = self.term(a, t);
            sum += e;
            *d = de;
        }
        sum
    }

    /// Converts the summed case errors of an epoch into the reported error.
    ///
    /// Returns `(error, grad_scale)`: the accumulated per-case gradients
    /// times `grad_scale` is the gradient of `error`.
    fn finish_epoch(&self, total: f64, n_cases: usize, n_outputs: usize) -> (f64, f64) {
        let n = (n_cases.max(1) * n_outputs.max(1)) as f64;
        (100.0 * total / n, 100.0 / n)
    }
}

impl ErrorKind {
    /// The metric implementation.
    pub fn metric(self) -> &'static dyn ErrorMetric {
        match self {
            ErrorKind::MeanSquare => &MeanSquare,
            ErrorKind::Absolute => &Absolute,
            ErrorKind::KalmanKwasny => &KalmanKwasny,
            ErrorKind::CrossEntropy => &CrossEntropy,
            ErrorKind::Max => &Max,
            ErrorKind::EighthPower => &EighthPower,
            ErrorKind::LogMean => &LogMean,
            ErrorKind::MeanLog => &MeanLog,
        }
    }

    /// Output weights can be solved by least squares only under
    /// squared error.
    #[inline]
    pub fn allows_regression(self) -> bool {
        self == ErrorKind::MeanSquare
    }
}

/// Squared error.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanSquare;

impl ErrorMetric for MeanSquare {
    fn kind(&self) -> ErrorKind {
        ErrorKind::MeanSquare
    }

    #[inline]
    fn term(&self, attained: f64, target: f64) -> (f64, f64) {
        let d = attained - target;
        (d * d, 2.0 * d)
    }
}

/// Absolute error. The derivative at zero error is zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct Absolute;

impl ErrorMetric for Absolute {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Absolute
    }

    #[inline]
    fn term(&self, attained: f64, target: f64) -> (f64, f64) {
        let d = attained - target;
        let sign = if d > 0.0 {
            1.0
        } else if d < 0.0 {
            -1.0
        } else {
            0.0
        };
        (d.abs(), sign)
    }
}

/// Squared error divided by the squashing slack `1 - a²`.
///
/// Outputs near saturation are penalized more heavily.
#[derive(Debug, Clone, Copy, Default)]
pub struct KalmanKwasny;

impl ErrorMetric for KalmanKwasny {
    fn kind(&self) -> ErrorKind {
        ErrorKind::KalmanKwasny
    }

    #[inline]
    fn term(&self, attained: f64, target: f64) -> (f64, f64) {
        let d = attained - target;
        let slack = 1.0 - attained * attained;
        if slack < EPSILON {
            return (d * d / EPSILON, 2.0 * d / EPSILON);
        }
        let e = d * d / slack;
        let de = (2.0 * d * slack + 2.0 * attained * d * d) / (slack * slack);
        (e, de)
    }
}

/// Cross entropy of outputs read as probabilities `p = (1 + a) / 2`.
///
/// Measured as the divergence from the target probability, so a perfect
/// output scores zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropy;

impl ErrorMetric for CrossEntropy {
    fn kind(&self) -> ErrorKind {
        ErrorKind::CrossEntropy
    }

    fn term(&self, attained: f64, target: f64) -> (f64, f64) {
        let raw_p = 0.5 * (1.0 + attained);
        let p = raw_p.clamp(EPSILON, 1.0 - EPSILON);
        let q = (0.5 * (1.0 + target)).clamp(EPSILON, 1.0 - EPSILON);

        let e = q * (q / p).ln() + (1.0 - q) * ((1.0 - q) / (1.0 - p)).ln();
        // Flat outside the clamp
        let de = if p == raw_p {
            0.5 * (-q / p + (1.0 - q) / (1.0 - p))
        } else {
            0.0
        };
        (e, de)
    }
}

/// Worst squared error of each case.
///
/// Only the first output attaining the maximum receives a derivative.
#[derive(Debug, Clone, Copy, Default)]
pub struct Max;

impl ErrorMetric for Max {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Max
    }

    #[inline]
    fn term(&self, attained: f64, target: f64) -> (f64, f64) {
        MeanSquare.term(attained, target)
    }

    fn case_error(&self, attained: &[f64], target: &[f64], deriv: &mut [f64]) -> f64 {
        let mut worst = f64::NEG_INFINITY;
        let mut worst_idx = 0;
        let mut worst_diff = 0.0;

        for (k, (&a, &t)) in attained.iter().zip(target).enumerate() {
            let d = a - t;
            if d * d > worst {
                worst = d * d;
                worst_idx = k;
                worst_diff = d;
            }
        }

        deriv.fill(0.0);
        if attained.is_empty() {
            return 0.0;
        }
        deriv[worst_idx] = 2.0 * worst_diff;
        worst
    }

    fn finish_epoch(&self, total: f64, n_cases: usize, _n_outputs: usize) -> (f64, f64) {
        let n = n_cases.max(1) as f64;
        (100.0 * total / n, 100.0 / n)
    }
}

/// Eighth power of the error; concentrates on the worst outputs while
/// staying smooth.
#[derive(Debug, Clone, Copy, Default)]
pub struct EighthPower;

impl ErrorMetric for EighthPower {
    fn kind(&self) -> ErrorKind {
        ErrorKind::EighthPower
    }

    #[inline]
    fn term(&self, attained: f64, target: f64) -> (f64, f64) {
        let d = attained - target;
        let d2 = d * d;
        let d4 = d2 * d2;
        (d4 * d4, 8.0 * d4 * d2 * d)
    }
}

/// Log of the epoch's mean squared error.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMean;

impl ErrorMetric for LogMean {
    fn kind(&self) -> ErrorKind {
        ErrorKind::LogMean
    }

    #[inline]
    fn term(&self, attained: f64, target: f64) -> (f64, f64) {
        MeanSquare.term(attained, target)
    }

    fn finish_epoch(&self, total: f64, n_cases: usize, n_outputs: usize) -> (f64, f64) {
        let n = (n_cases.max(1) * n_outputs.max(1)) as f64;
        let error = (total / n).max(EPSILON).ln();
        (error, 1.0 / total.max(EPSILON * n))
    }
}

/// Mean over cases of the log of each case's mean squared error.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanLog;

impl ErrorMetric for MeanLog {
    fn kind(&self) -> ErrorKind {
        ErrorKind::MeanLog
    }

    #[inline]
    fn term(&self, attained: f64, target: f64) -> (f64, f64) {
        MeanSquare.term(attained, target)
    }

    fn case_error(&self, attained: &[f64], target: &[f64], deriv: &mut [f64]) -> f64 {
        let k = attained.len().max(1) as f64;
        let sum: f64 = attained
            .iter()
            .zip(target)
            .map(|(&a, &t)| (a - t) * (a - t))
            .sum();

        if sum / k < EPSILON {
            deriv.fill(0.0);
            return EPSILON.ln();
        }
        for ((&a, &t), d) in attained.iter().zip(target).zip(deriv.iter_mut()) {
            *d = 2.0 * (a - t) / sum;
        }
        (sum / k).ln()
    }

    fn finish_epoch(&self, total: f64, n_cases: usize, _n_outputs: usize) -> (f64, f64) {
        let n = n_cases.max(1) as f64;
        (total / n, 1.0 / n)
    }
}
