//! Unified error types for mlfn.
//!
//! This module provides [`MlfnError`], the error type returned by every
//! fallible setup operation (network construction, training-set checks,
//! regression setup). It uses the `thiserror` crate for ergonomic error
//! handling.
//!
//! Training itself does not fail through `Err` once setup has succeeded:
//! its result is a [`TrainOutcome`], which distinguishes a finished run,
//! a cancelled run and a run that could not allocate its working memory.
//!
//! # Example
//!
//! ```rust
//! use mlfn::MlfnError;
//!
//! fn validate_width(expected: usize, got: usize) -> Result<(), MlfnError> {
//!     if expected != got {
//!         return Err(MlfnError::shape_mismatch(&[expected], &[got]));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::config::ConfigError;

/// Unified error type for mlfn operations.
#[derive(Error, Debug)]
pub enum MlfnError {
    /// Invalid topology or learning parameters.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A request that does not fit the network it is applied to.
    ///
    /// Raised at the call boundary, e.g. output regression requested for
    /// a network whose error metric is not mean squared error.
    #[error("Configuration mismatch: {0}")]
    ConfigMismatch(String),

    /// Working memory could not be allocated.
    #[error("Out of resources: {0}")]
    OutOfResources(String),

    /// Shape mismatch between expected and actual buffer shapes.
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape received.
        got: Vec<usize>,
    },

    /// Integer overflow in size calculations.
    #[error("Integer overflow: {0}")]
    Overflow(String),

    /// The training set is empty or does not match the network.
    #[error("Training set error: {0}")]
    TrainingSet(String),

    /// A saved network could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for mlfn operations.
pub type MlfnResult<T> = Result<T, MlfnError>;

impl MlfnError {
    /// Creates a shape mismatch error.
    pub fn shape_mismatch(expected: &[usize], got: &[usize]) -> Self {
        MlfnError::ShapeMismatch {
            expected: expected.to_vec(),
            got: got.to_vec(),
        }
    }

    /// Creates a configuration mismatch error.
    pub fn config_mismatch<S: Into<String>>(msg: S) -> Self {
        MlfnError::ConfigMismatch(msg.into())
    }

    /// Creates an out-of-resources error.
    pub fn out_of_resources<S: Into<String>>(msg: S) -> Self {
        MlfnError::OutOfResources(msg.into())
    }

    /// Creates an overflow error.
    pub fn overflow<S: Into<String>>(msg: S) -> Self {
        MlfnError::Overflow(msg.into())
    }

    /// Creates a training set error.
    pub fn training_set<S: Into<String>>(msg: S) -> Self {
        MlfnError::TrainingSet(msg.into())
    }

    /// True for allocation failures, which training reports as
    /// [`TrainOutcome::OutOfResources`] instead of an error.
    pub fn is_out_of_resources(&self) -> bool {
        matches!(self, MlfnError::OutOfResources(_) | MlfnError::Overflow(_))
    }
}

/// Signal that the caller's cancellation predicate fired.
///
/// Returned by line-search criteria and optimizer inner loops; every
/// routine that sees it unwinds with its best-known weights in place.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Result of a training request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrainOutcome {
    /// Training ran to completion; `error` is the final (best) error.
    Trained {
        /// Final error on the normalized scale of the network's metric.
        error: f64,
    },
    /// The cancellation predicate fired. The network holds the best
    /// weights seen before cancellation, whose error is `error`.
    Cancelled {
        /// Error of the weights left in the network.
        error: f64,
    },
    /// Working memory could not be allocated. The network's weights are
    /// untouched.
    OutOfResources,
}

impl TrainOutcome {
    /// Error of the weights left in the network, if any were produced.
    pub fn error(&self) -> Option<f64> {
        match *self {
            TrainOutcome::Trained { error } | TrainOutcome::Cancelled { error } => Some(error),
            TrainOutcome::OutOfResources => None,
        }
    }

    /// True if training ran to completion.
    pub fn is_trained(&self) -> bool {
        matches!(self, TrainOutcome::Trained { .. })
    }

    /// True if training was interrupted by the cancellation predicate.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TrainOutcome::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch() {
        let err = MlfnError::shape_mismatch(&[1, 2, 3], &[1, 2, 4]);
        let msg = err.to_string();
        assert!(msg.contains("Shape mismatch"));
        assert!(msg.contains("[1, 2, 3]"));
        assert!(msg.contains("[1, 2, 4]"));
    }

    #[test]
    fn test_config_mismatch() {
        let err = MlfnError::config_mismatch("regression needs squared error");
        assert!(err.to_string().contains("Configuration mismatch"));
        assert!(!err.is_out_of_resources());
    }

    #[test]
    fn test_config_error_conversion() {
        let err: MlfnError = ConfigError::InvalidDimension("n_inputs must be > 0").into();
        assert!(err.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_outcome_accessors() {
        let done = TrainOutcome::Trained { error: 0.5 };
        assert!(done.is_trained());
        assert_eq!(done.error(), Some(0.5));

        let stopped = TrainOutcome::Cancelled { error: 2.0 };
        assert!(stopped.is_cancelled());
        assert_eq!(stopped.error(), Some(2.0));

        assert_eq!(TrainOutcome::OutOfResources.error(), None);
    }
}
