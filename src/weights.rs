//! Contiguous weight storage.
//!
//! All weights of a network live in one [`AlignedBuffer`], partitioned
//! into per-layer ranges in layer order (input side first). The output
//! layer is always the last range, so the weights a nonlinear optimizer
//! searches over when output regression owns the output layer are a
//! prefix of the buffer.
//!
//! # Persistence
//!
//! [`WeightStore::to_le_bytes`] writes the flat sequence of little-endian
//! IEEE-754 doubles without any header; the reader must know the topology.

use std::ops::Range;

#[cfg(feature = "serde")]
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::buffer::AlignedBuffer;
use crate::error::{MlfnError, MlfnResult};
use crate::layer::LayerShape;

const F64_BYTES: usize = std::mem::size_of::<f64>();

/// One network's weights.
#[derive(Debug, Clone)]
pub struct WeightStore {
    data: AlignedBuffer,
    ranges: Vec<Range<usize>>,
}

impl WeightStore {
    /// Allocates zeroed weights for the given layers.
    pub fn for_shapes(shapes: &[LayerShape]) -> MlfnResult<Self> {
        let mut ranges = Vec::with_capacity(shapes.len());
        let mut total = 0usize;
        for shape in shapes {
            let count = shape.weight_count();
            let end = total
                .checked_add(count)
                .ok_or_else(|| MlfnError::overflow("weight count overflow"))?;
            ranges.push(total..end);
            total = end;
        }

        Ok(Self {
            data: AlignedBuffer::try_zeroed(total)?,
            ranges,
        })
    }

    /// Total weight count.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Is empty?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of layers.
    #[inline]
    pub fn n_layers(&self) -> usize {
        self.ranges.len()
    }

    /// All weights, layer order.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        self.data.as_slice()
    }

    /// All weights, mutable.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        self.data.as_mut_slice()
    }

    /// Index range of layer `l` inside [`as_slice`](Self::as_slice).
    #[inline]
    pub fn layer_range(&self, l: usize) -> Range<usize> {
        self.ranges[l].clone()
    }

    /// Weights of layer `l`.
    #[inline]
    pub fn layer(&self, l: usize) -> &[f64] {
        &self.data.as_slice()[self.layer_range(l)]
    }

    /// Weights of layer `l`, mutable.
    #[inline]
    pub fn layer_mut(&mut self, l: usize) -> &mut [f64] {
        let range = self.layer_range(l);
        &mut self.data.as_mut_slice()[range]
    }

    /// Range of the output layer.
    #[inline]
    pub fn output_range(&self) -> Range<usize> {
        self.ranges.last().cloned().unwrap_or(0..0)
    }

    /// Sets every weight to zero.
    pub fn zero(&mut self) {
        self.data.zero();
    }

    /// Copies all weights from `src`.
    ///
    /// # Errors
    ///
    /// [`MlfnError::ShapeMismatch`] if the lengths differ.
    pub fn copy_from(&mut self, src: &[f64]) -> MlfnResult<()> {
        if src.len() != self.len() {
            return Err(MlfnError::shape_mismatch(&[self.len()], &[src.len()]));
        }
        self.data.as_mut_slice().copy_from_slice(src);
        Ok(())
    }

    /// Flat little-endian encoding of all weights.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.len() * F64_BYTES);
        for w in self.as_slice() {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        bytes
    }

    /// Loads weights written by [`to_le_bytes`](Self::to_le_bytes).
    ///
    /// # Errors
    ///
    /// [`MlfnError::ShapeMismatch`] if `bytes` does not hold exactly
    /// [`len`](Self::len) doubles.
    pub fn load_le_bytes(&mut self, bytes: &[u8]) -> MlfnResult<()> {
        let expected = self.len() * F64_BYTES;
        if bytes.len() != expected {
            return Err(MlfnError::shape_mismatch(&[expected], &[bytes.len()]));
        }
        for (w, chunk) in self
            .data
            .as_mut_slice()
            .iter_mut()
            .zip(bytes.chunks_exact(F64_BYTES))
        {
            let mut raw = [0u8; F64_BYTES];
            raw.copy_from_slice(chunk);
            *w = f64::from_le_bytes(raw);
        }
        Ok(())
    }
}

#[cfg(feature = "serde")]
impl Serialize for WeightStore {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.data.serialize(serializer)
    }
}

/// Deserialized weights carry no layer ranges; the owning network
/// re-partitions them with [`WeightStore::for_shapes`] + `copy_from`.
#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for WeightStore {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let data = AlignedBuffer::deserialize(deserializer)?;
        let len = data.len();
        Ok(Self {
            data,
            ranges: vec![0..len],
        })
    }
}
