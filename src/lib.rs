//! # mlfn - Multilayer Feed-Forward Network Trainer
//!
//! Feed-forward networks with up to two hidden layers in the real domain
//! or one of three complex domains, trained by a hybrid of simulated
//! annealing, conjugate-gradient descent and SVD output regression.
//!
//! ## Architecture
//! - Flat 64-byte aligned weight buffer, one row per neuron, bias last
//! - Complex neurons store `(re, im)` pairs; inputs are staged in a
//!   sign-flipped and a swapped copy so complex products are two real dots
//! - Activation derivatives cached during the forward pass, scalar per
//!   real neuron and a 2×2 Jacobian per complex neuron
//! - All training memory allocated before the first weight changes
//!
//! ## Usage
//! ```rust
//! use mlfn::{HybridTrainer, LearnParams, Network, NetworkTopology, TrainingSet};
//!
//! let mut set = TrainingSet::mapping(2, 1);
//! set.push_mapping(&[-1.0, -1.0], &[-0.8]).unwrap();
//! set.push_mapping(&[1.0, 1.0], &[0.8]).unwrap();
//!
//! let mut net = Network::new(NetworkTopology::new(2, 1).with_hidden(2, 0)).unwrap();
//! let params = LearnParams { quit_error: 1.0, seed: Some(7), ..Default::default() };
//! let outcome = HybridTrainer::new(params).unwrap().train(&mut net, &set, &mut ()).unwrap();
//!
//! assert!(outcome.is_trained());
//! let out = net.trial(&[1.0, 1.0]);
//! assert_eq!(out.len(), 1);
//! ```

pub mod activation;
pub mod anneal;
pub mod buffer;
pub mod config;
pub mod error;
pub mod gradient;
pub mod layer;
pub mod line_search;
pub mod loss;
pub mod network;
pub mod optimizer;
pub mod regress;
pub mod trainer;
pub mod training_set;
pub mod weights;

// Re-exports
pub use activation::{Activation, Jacobian};
pub use anneal::{AnnealStart, Annealer};
pub use buffer::{AlignedBuffer, CACHE_LINE};
pub use config::{
    AnnealSchedule, ConfigError, Density, Domain, ErrorKind, LearnParams, NetworkTopology,
    TargetRange, TrainMethod, EPSILON, MAX_HIDDEN_LAYERS, SQUASH_GAIN, SVD_THRESHOLD,
};
pub use error::{Cancelled, MlfnError, MlfnResult, TrainOutcome};
pub use gradient::Objective;
pub use layer::LayerShape;
pub use line_search::{bracket_minimum, refine_minimum, Bracket};
pub use loss::ErrorMetric;
pub use network::Network;
pub use optimizer::{ConjugateGradient, DescentConfig};
pub use regress::OutputRegression;
pub use trainer::{FnMonitor, HybridTrainer, TrainMonitor};
pub use training_set::{CaseLayout, TrainingSet};
pub use weights::WeightStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
