//! Feed-forward network: topology, weights and activation cache.

use crate::buffer::ActivationCache;
use crate::config::NetworkTopology;
use crate::error::MlfnResult;
use crate::layer::{shapes_for, LayerShape};
use crate::weights::WeightStore;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A network of up to two hidden layers.
///
/// The topology is fixed at construction. Weights start at zero; the
/// trainer (or the caller through [`weights_mut`](Self::weights_mut))
/// fills them in.
///
/// # Example
///
/// ```rust
/// use mlfn::{Network, NetworkTopology};
///
/// let mut net = Network::new(NetworkTopology::new(2, 1).with_hidden(3, 0)).unwrap();
/// net.weights_mut().as_mut_slice().fill(0.1);
///
/// let out = net.trial(&[1.0, -1.0]).to_vec();
/// assert_eq!(out.len(), 1);
/// assert_eq!(net.trial(&[1.0, -1.0]), &out[..]);
/// ```
#[derive(Debug)]
pub struct Network {
    pub(crate) topology: NetworkTopology,
    pub(crate) shapes: Vec<LayerShape>,
    pub(crate) weights: WeightStore,
    pub(crate) cache: ActivationCache,
    trained: bool,
}

impl Network {
    /// Builds a network with zero weights.
    ///
    /// # Errors
    ///
    /// [`MlfnError::Config`](crate::MlfnError::Config) for an invalid
    /// topology, [`MlfnError::OutOfResources`](crate::MlfnError::OutOfResources)
    /// if the weights or scratch cannot be allocated.
    pub fn new(topology: NetworkTopology) -> MlfnResult<Self> {
        topology.validate()?;
        let shapes = shapes_for(&topology);
        let weights = WeightStore::for_shapes(&shapes)?;
        let cache = ActivationCache::for_shapes(&shapes)?;

        Ok(Self {
            topology,
            shapes,
            weights,
            cache,
            trained: false,
        })
    }

    /// Topology.
    #[inline]
    pub fn topology(&self) -> &NetworkTopology {
        &self.topology
    }

    /// Layer shapes, input side first.
    #[inline]
    pub fn shapes(&self) -> &[LayerShape] {
        &self.shapes
    }

    /// Number of weight layers.
    #[inline]
    pub fn num_layers(&self) -> usize {
        self.shapes.len()
    }

    /// Total number of weights.
    #[inline]
    pub fn param_count(&self) -> usize {
        self.weights.len()
    }

    /// Reals per input vector.
    #[inline]
    pub fn input_width(&self) -> usize {
        self.topology.input_width()
    }

    /// Reals per output vector.
    #[inline]
    pub fn output_width(&self) -> usize {
        self.topology.output_width()
    }

    /// Weights.
    #[inline]
    pub fn weights(&self) -> &WeightStore {
        &self.weights
    }

    /// Weights, mutable. Clears the trained flag.
    #[inline]
    pub fn weights_mut(&mut self) -> &mut WeightStore {
        self.trained = false;
        &mut self.weights
    }

    /// Has a training run completed on these weights?
    #[inline]
    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Sets the trained flag.
    #[inline]
    pub fn set_trained(&mut self, trained: bool) {
        self.trained = trained;
    }

    /// Forward pass of one input vector.
    ///
    /// Overwrites the activation cache and returns the output activations
    /// (complex outputs interleaved re, im). Given the same weights and
    /// input the result is bit-identical across calls.
    pub fn trial(&mut self, input: &[f64]) -> &[f64] {
        debug_assert_eq!(input.len(), self.input_width());

        let cache = &mut self.cache;
        for (l, shape) in self.shapes.iter().enumerate() {
            let (done, rest) = cache.acts.split_at_mut(l);
            let source: &[f64] = if l == 0 {
                input
            } else {
                done[l - 1].as_slice()
            };
            shape.forward(
                self.weights.layer(l),
                source,
                cache.flipped.as_mut_slice(),
                cache.swapped.as_mut_slice(),
                rest[0].as_mut_slice(),
                cache.derivs[l].as_mut_slice(),
            );
        }

        self.outputs()
    }

    /// Output activations of the most recent [`trial`](Self::trial).
    #[inline]
    pub fn outputs(&self) -> &[f64] {
        self.cache
            .acts
            .last()
            .map(|buf| buf.as_slice())
            .unwrap_or(&[])
    }

    /// Activations of layer `l` from the most recent trial.
    #[inline]
    pub fn layer_activations(&self, l: usize) -> &[f64] {
        self.cache.acts[l].as_slice()
    }

    /// Saves topology, weights and the trained flag using bincode.
    #[cfg(feature = "serde")]
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(&SavedNetworkRef {
            topology: &self.topology,
            weights: &self.weights,
            trained: self.trained,
        })
    }

    /// Restores a network saved by [`to_bytes`](Self::to_bytes).
    #[cfg(feature = "serde")]
    pub fn from_bytes(bytes: &[u8]) -> MlfnResult<Self> {
        let saved: SavedNetwork = bincode::deserialize(bytes)
            .map_err(|e| crate::MlfnError::Serialization(e.to_string()))?;
        let mut net = Network::new(saved.topology)?;
        net.weights.copy_from(&saved.weights)?;
        net.trained = saved.trained;
        Ok(net)
    }
}

#[cfg(feature = "serde")]
#[derive(Serialize)]
struct SavedNetworkRef<'a> {
    topology: &'a NetworkTopology,
    weights: &'a WeightStore,
    trained: bool,
}

#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct SavedNetwork {
    topology: NetworkTopology,
    weights: Vec<f64>,
    trained: bool,
}
