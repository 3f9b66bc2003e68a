//! Aligned buffers and the per-network activation cache.
//!
//! This module provides two key types:
//!
//! - [`AlignedBuffer`] — 64-byte aligned `f64` buffer for SIMD operations
//! - [`ActivationCache`] — scratch holding the latest forward pass and the
//!   backprop ping-pong buffers
//!
//! # Fallible Allocation
//!
//! Training allocates all of its working memory before it modifies a
//! single weight. [`AlignedBuffer::try_zeroed`] reports allocation failure
//! as [`MlfnError::OutOfResources`] instead of aborting, so a failed setup
//! leaves a previously trained network intact.
//!
//! # Memory Alignment
//!
//! [`AlignedBuffer`] uses 64-byte alignment ([`CACHE_LINE`]) so the `f64x4`
//! dot products of the forward pass run on aligned rows.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

#[cfg(feature = "serde")]
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{MlfnError, MlfnResult};
use crate::layer::LayerShape;

/// Cache line size for memory alignment (64 bytes).
pub const CACHE_LINE: usize = 64;

/// Largest element count any single buffer may hold.
pub const MAX_BUFFER_ELEMENTS: usize = isize::MAX as usize / 8;

/// Multiplies two sizes, failing on overflow or on exceeding
/// [`MAX_BUFFER_ELEMENTS`].
///
/// ```rust
/// use mlfn::buffer::checked_len;
///
/// assert_eq!(checked_len(100, 32).unwrap(), 3200);
/// assert!(checked_len(usize::MAX, 2).is_err());
/// ```
pub fn checked_len(a: usize, b: usize) -> MlfnResult<usize> {
    let n = a
        .checked_mul(b)
        .ok_or_else(|| MlfnError::overflow(format!("buffer size overflow: {a} * {b}")))?;
    if n > MAX_BUFFER_ELEMENTS {
        return Err(MlfnError::overflow(format!(
            "buffer of {n} elements exceeds limit {MAX_BUFFER_ELEMENTS}"
        )));
    }
    Ok(n)
}

/// 64-byte aligned `f64` buffer.
///
/// Provides a `Vec<f64>`-like interface with cache-friendly alignment.
///
/// # Example
///
/// ```rust
/// use mlfn::AlignedBuffer;
///
/// let mut buf = AlignedBuffer::try_zeroed(100).unwrap();
/// buf.as_mut_slice()[0] = 1.0;
/// assert_eq!(buf[0], 1.0);
/// assert_eq!(buf.len(), 100);
/// ```
///
/// # Safety
///
/// The buffer uses raw allocation with proper alignment. All unsafe
/// operations are encapsulated and the public API is safe.
#[repr(C)]
pub struct AlignedBuffer {
    ptr: NonNull<f64>,
    len: usize,
    capacity: usize,
}

// Safety: AlignedBuffer owns its data and doesn't share it
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    /// Creates a new empty aligned buffer.
    pub fn new() -> Self {
        Self {
            ptr: NonNull::dangling(),
            len: 0,
            capacity: 0,
        }
    }

    /// Allocates a zero-filled buffer of `len` elements.
    ///
    /// # Errors
    ///
    /// [`MlfnError::OutOfResources`] if the allocator refuses the request,
    /// [`MlfnError::Overflow`] if the byte size does not fit a layout.
    pub fn try_zeroed(len: usize) -> MlfnResult<Self> {
        if len == 0 {
            return Ok(Self::new());
        }
        checked_len(len, 1)?;

        let layout = Self::layout(len)?;
        // SAFETY: layout has non-zero size because len > 0
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw as *mut f64).ok_or_else(|| {
            MlfnError::out_of_resources(format!("failed to allocate {len} f64 elements"))
        })?;

        Ok(Self {
            ptr,
            len,
            capacity: len,
        })
    }

    /// Fills with zeros.
    #[inline]
    pub fn zero(&mut self) {
        self.as_mut_slice().fill(0.0);
    }

    /// Current length.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Is empty?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns a slice of the buffer.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        if self.len == 0 {
            &[]
        } else {
            // SAFETY: ptr is valid for `len` contiguous elements
            unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
        }
    }

    /// Returns a mutable slice of the buffer.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        if self.len == 0 {
            &mut []
        } else {
            // SAFETY: ptr uniquely owned, valid for `len` contiguous elements
            unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
        }
    }

    /// Raw pointer (for alignment checks).
    #[inline]
    pub fn as_ptr(&self) -> *const f64 {
        self.ptr.as_ptr()
    }

    fn layout(capacity: usize) -> MlfnResult<Layout> {
        let bytes = capacity
            .checked_mul(std::mem::size_of::<f64>())
            .ok_or_else(|| MlfnError::overflow(format!("byte size overflow for {capacity} elements")))?;
        Layout::from_size_align(bytes, CACHE_LINE)
            .map_err(|e| MlfnError::overflow(format!("invalid layout for {capacity} elements: {e}")))
    }
}

impl Default for AlignedBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        if self.capacity > 0 {
            // SAFETY: the same layout was valid when the buffer was allocated
            unsafe {
                let layout = Layout::from_size_align_unchecked(
                    self.capacity * std::mem::size_of::<f64>(),
                    CACHE_LINE,
                );
                dealloc(self.ptr.as_ptr() as *mut u8, layout);
            }
        }
    }
}

impl Clone for AlignedBuffer {
    fn clone(&self) -> Self {
        if self.len == 0 {
            return Self::new();
        }
        // SAFETY: the same layout was valid when `self` was allocated, size is non-zero
        let ptr = unsafe {
            let layout = Layout::from_size_align_unchecked(
                self.capacity * std::mem::size_of::<f64>(),
                CACHE_LINE,
            );
            let raw = alloc_zeroed(layout);
            if raw.is_null() {
                std::alloc::handle_alloc_error(layout);
            }
            NonNull::new_unchecked(raw as *mut f64)
        };
        // SAFETY: source/dest are distinct allocations, len is within both
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.as_ptr(), ptr.as_ptr(), self.len);
        }
        Self {
            ptr,
            len: self.len,
            capacity: self.capacity,
        }
    }
}

impl std::fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

impl std::ops::Index<usize> for AlignedBuffer {
    type Output = f64;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.as_slice()[index]
    }
}

impl std::ops::IndexMut<usize> for AlignedBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.as_mut_slice()[index]
    }
}

#[cfg(feature = "serde")]
impl Serialize for AlignedBuffer {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.as_slice().serialize(serializer)
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for AlignedBuffer {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let data: Vec<f64> = Vec::<f64>::deserialize(deserializer)?;
        let mut buf = AlignedBuffer::try_zeroed(data.len()).map_err(serde::de::Error::custom)?;
        buf.as_mut_slice().copy_from_slice(&data);
        Ok(buf)
    }
}

/// Scratch owned by one network: the latest forward pass plus the
/// buffers backpropagation ping-pongs through.
///
/// Every [`Network::trial`](crate::Network::trial) overwrites `acts` and
/// `derivs`; nothing here survives a call in a meaningful way other than
/// the activations of the most recent input.
///
/// # Buffer Layout
///
/// - `acts[l]`: activations of layer `l`, `[out_width]` (complex units
///   interleaved re, im)
/// - `derivs[l]`: activation derivatives of layer `l`: one `f'(net)` per
///   real neuron, four Jacobian partials per complex neuron
/// - `flipped`, `swapped`: complex staging rows `[x, -y, ...]` and
///   `[y, x, ...]` so both parts of a complex net input are real dot
///   products
/// - `delta`, `delta_prev`: dE/d(net) of the current and previous layer
/// - `target`, `case_deriv`: one case's targets and dE/d(output)
#[derive(Debug, Default)]
pub struct ActivationCache {
    /// Layer activations.
    pub acts: Vec<AlignedBuffer>,
    /// Layer activation derivatives.
    pub derivs: Vec<AlignedBuffer>,
    /// Sign-flipped complex staging row.
    pub flipped: AlignedBuffer,
    /// Swapped complex staging row.
    pub swapped: AlignedBuffer,
    /// Backprop delta of the current layer.
    pub delta: AlignedBuffer,
    /// Backprop delta of the previous layer.
    pub delta_prev: AlignedBuffer,
    /// Targets of the current case.
    pub target: AlignedBuffer,
    /// Error derivative w.r.t. each output of the current case.
    pub case_deriv: AlignedBuffer,
}

impl ActivationCache {
    /// Allocates a cache for the given layer shapes.
    pub fn for_shapes(shapes: &[LayerShape]) -> MlfnResult<Self> {
        let mut acts = Vec::with_capacity(shapes.len());
        let mut derivs = Vec::with_capacity(shapes.len());
        let mut max_in = 0;
        let mut max_width = 0;

        for shape in shapes {
            acts.push(AlignedBuffer::try_zeroed(shape.out_width())?);
            derivs.push(AlignedBuffer::try_zeroed(shape.deriv_len())?);
            max_in = max_in.max(shape.in_width());
            max_width = max_width.max(shape.in_width()).max(shape.out_width());
        }

        let out_width = shapes.last().map(LayerShape::out_width).unwrap_or(0);

        Ok(Self {
            acts,
            derivs,
            flipped: AlignedBuffer::try_zeroed(max_in)?,
            swapped: AlignedBuffer::try_zeroed(max_in)?,
            delta: AlignedBuffer::try_zeroed(max_width)?,
            delta_prev: AlignedBuffer::try_zeroed(max_width)?,
            target: AlignedBuffer::try_zeroed(out_width)?,
            case_deriv: AlignedBuffer::try_zeroed(out_width)?,
        })
    }
}
