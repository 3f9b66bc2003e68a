//! Activation functions for real and complex neurons.
//!
//! # Real Squash
//!
//! `f(x) = tanh(1.5 x)`, so `f'(x) = 1.5 (1 - f²)` is computed from the
//! activation alone.
//!
//! # Complex Squash
//!
//! `f(z) = tanh(1.5 |z|) · z / |z|`: the phase passes through unchanged and
//! the magnitude is squashed into `[0, 1)`. The map is not holomorphic, so
//! its derivative is the full 2×2 real [`Jacobian`] rather than a single
//! complex number; backpropagation carries all four partials.
//!
//! # Linear
//!
//! Identity, used on the output layer when the topology asks for linear
//! outputs. Applies component-wise to complex neurons.

use num_complex::Complex64;

use crate::config::{EPSILON, SQUASH_GAIN};

/// Below this radius the complex squash uses its series expansion.
const SMALL_RADIUS: f64 = 1e-4;

/// Largest magnitude passed to `atanh` when inverting the squash.
const INVERSE_LIMIT: f64 = 1.0 - 1e-10;

/// Activation applied by every neuron of a layer.
///
/// Resolved once when the network is built, from the layer's domain and
/// the output-linearity flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Real `tanh(1.5 x)`.
    Squash,
    /// Complex magnitude squash.
    ComplexSquash,
    /// Identity (real or complex).
    Linear,
}

impl Activation {
    /// Picks the activation of a layer.
    pub fn resolve(complex: bool, linear: bool) -> Self {
        match (complex, linear) {
            (_, true) => Activation::Linear,
            (true, false) => Activation::ComplexSquash,
            (false, false) => Activation::Squash,
        }
    }

    /// Is this the identity?
    #[inline]
    pub fn is_linear(self) -> bool {
        self == Activation::Linear
    }
}

/// Jacobian of a complex map viewed as `R² → R²`.
///
/// `rr = ∂Re f/∂Re z`, `ri = ∂Re f/∂Im z`, `ir = ∂Im f/∂Re z`,
/// `ii = ∂Im f/∂Im z`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Jacobian {
    pub rr: f64,
    pub ri: f64,
    pub ir: f64,
    pub ii: f64,
}

impl Jacobian {
    /// Jacobian of the identity.
    pub const IDENTITY: Jacobian = Jacobian {
        rr: 1.0,
        ri: 0.0,
        ir: 0.0,
        ii: 1.0,
    };

    /// Pulls a gradient w.r.t. the activation back to the net input.
    ///
    /// Given `(∂E/∂Re f, ∂E/∂Im f)` returns `(∂E/∂Re z, ∂E/∂Im z)`.
    #[inline]
    pub fn pull_back(&self, g_re: f64, g_im: f64) -> (f64, f64) {
        (
            g_re * self.rr + g_im * self.ir,
            g_re * self.ri + g_im * self.ii,
        )
    }

    /// Stores the four partials as `[rr, ri, ir, ii]`.
    #[inline]
    pub fn write_to(&self, out: &mut [f64]) {
        out[0] = self.rr;
        out[1] = self.ri;
        out[2] = self.ir;
        out[3] = self.ii;
    }

    /// Reads partials stored by [`write_to`](Self::write_to).
    #[inline]
    pub fn read_from(src: &[f64]) -> Self {
        Self {
            rr: src[0],
            ri: src[1],
            ir: src[2],
            ii: src[3],
        }
    }
}

/// Real squashing function.
#[inline]
pub fn squash(x: f64) -> f64 {
    (SQUASH_GAIN * x).tanh()
}

/// Derivative of [`squash`] given its output.
#[inline]
pub fn squash_deriv(f: f64) -> f64 {
    SQUASH_GAIN * (1.0 - f * f)
}

/// Net input producing activation `f`, clamped short of the asymptotes.
#[inline]
pub fn inverse_squash(f: f64) -> f64 {
    f.clamp(-INVERSE_LIMIT, INVERSE_LIMIT).atanh() / SQUASH_GAIN
}

/// Complex squashing function and its Jacobian.
pub fn complex_squash(z: Complex64) -> (Complex64, Jacobian) {
    let a = SQUASH_GAIN;
    let r = z.norm();

    // f = g(r) z with g(r) = tanh(a r) / r; k = g'(r) / r
    let (g, k) = if r < SMALL_RADIUS {
        let a3 = a * a * a;
        (a - a3 * r * r / 3.0, -2.0 * a3 / 3.0)
    } else {
        let t = (a * r).tanh();
        let sech2 = 1.0 - t * t;
        (t / r, (a * sech2 * r - t) / (r * r * r))
    };

    let (x, y) = (z.re, z.im);
    let jac = Jacobian {
        rr: g + x * x * k,
        ri: x * y * k,
        ir: x * y * k,
        ii: g + y * y * k,
    };

    (z * g, jac)
}

/// Net input producing complex activation `w`.
pub fn inverse_complex_squash(w: Complex64) -> Complex64 {
    let m = w.norm();
    if m < EPSILON {
        return w / SQUASH_GAIN;
    }
    let clamped = m.min(INVERSE_LIMIT);
    w * (clamped.atanh() / (SQUASH_GAIN * m))
}
