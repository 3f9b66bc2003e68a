//! Per-layer forward and backward algebra.
//!
//! # Weight Rows
//!
//! A layer owns `n_out` rows of [`LayerShape::row_len`] weights. Each row
//! holds one destination neuron's incoming weights followed by its bias:
//!
//! ```text
//! real source:     [w_0, w_1, ..., w_{n-1}, bias]
//! complex source:  [a_0, b_0, a_1, b_1, ..., bias]          (real neuron)
//!                  [a_0, b_0, a_1, b_1, ..., bias_re, bias_im] (complex neuron)
//! ```
//!
//! where `a_k + i b_k` is the complex weight of source unit `k`.
//!
//! # Complex Net Input
//!
//! With source unit `z_k = x_k + i y_k` the forward pass stages two rows,
//! `flipped = [x_0, -y_0, x_1, -y_1, ...]` and
//! `swapped = [y_0, x_0, y_1, x_1, ...]`, so that
//!
//! ```text
//! Re(Σ w_k z_k) = dot(row, flipped)
//! Im(Σ w_k z_k) = dot(row, swapped)
//! ```
//!
//! Both halves are then plain real dot products and share the SIMD kernel.
//! A real neuron fed by complex units keeps only the real part.

use num_complex::Complex64;
use wide::f64x4;

use crate::activation::{complex_squash, squash, squash_deriv, Activation, Jacobian};
use crate::config::NetworkTopology;

/// Shape and activation of one weight layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerShape {
    /// Source units (complex units counted once).
    pub n_in: usize,
    /// Destination neurons (complex neurons counted once).
    pub n_out: usize,
    /// Source units are complex.
    pub in_complex: bool,
    /// Destination neurons are complex.
    pub out_complex: bool,
    /// Activation of every destination neuron.
    pub activation: Activation,
}

impl LayerShape {
    /// Creates a layer shape.
    ///
    /// Complex neurons always take complex sources; no domain produces
    /// a complex layer over real units.
    pub fn new(
        n_in: usize,
        n_out: usize,
        in_complex: bool,
        out_complex: bool,
        activation: Activation,
    ) -> Self {
        debug_assert!(in_complex || !out_complex);
        Self {
            n_in,
            n_out,
            in_complex,
            out_complex,
            activation,
        }
    }

    /// Number of reals read from the source layer.
    #[inline]
    pub fn in_width(&self) -> usize {
        if self.in_complex {
            2 * self.n_in
        } else {
            self.n_in
        }
    }

    /// Number of reals written to the destination layer.
    #[inline]
    pub fn out_width(&self) -> usize {
        if self.out_complex {
            2 * self.n_out
        } else {
            self.n_out
        }
    }

    /// Bias terms per neuron.
    #[inline]
    pub fn bias_len(&self) -> usize {
        if self.out_complex {
            2
        } else {
            1
        }
    }

    /// Weights per neuron, bias included.
    #[inline]
    pub fn row_len(&self) -> usize {
        self.in_width() + self.bias_len()
    }

    /// Weights in the whole layer.
    #[inline]
    pub fn weight_count(&self) -> usize {
        self.n_out * self.row_len()
    }

    /// Activation derivatives stored per forward pass.
    #[inline]
    pub fn deriv_len(&self) -> usize {
        if self.out_complex {
            4 * self.n_out
        } else {
            self.n_out
        }
    }

    /// Forward pass of one layer.
    ///
    /// Writes activations to `out` and activation derivatives to `deriv`.
    /// `flipped` and `swapped` are staging rows of at least
    /// [`in_width`](Self::in_width) elements; only used for complex sources.
    pub fn forward(
        &self,
        weights: &[f64],
        input: &[f64],
        flipped: &mut [f64],
        swapped: &mut [f64],
        out: &mut [f64],
        deriv: &mut [f64],
    ) {
        let in_w = self.in_width();
        let row_len = self.row_len();
        debug_assert_eq!(weights.len(), self.weight_count());
        debug_assert_eq!(input.len(), in_w);

        let source: &[f64] = if self.in_complex {
            stage_complex(input, &mut flipped[..in_w], &mut swapped[..in_w]);
            &flipped[..in_w]
        } else {
            input
        };

        for (j, row) in weights.chunks_exact(row_len).enumerate() {
            let w = &row[..in_w];

            if self.out_complex {
                let re = dot(w, source) + row[in_w];
                let im = dot(w, &swapped[..in_w]) + row[in_w + 1];

                let (f, jac) = if self.activation.is_linear() {
                    (Complex64::new(re, im), Jacobian::IDENTITY)
                } else {
                    complex_squash(Complex64::new(re, im))
                };
                out[2 * j] = f.re;
                out[2 * j + 1] = f.im;
                jac.write_to(&mut deriv[4 * j..4 * j + 4]);
            } else {
                let net = dot(w, source) + row[in_w];
                if self.activation.is_linear() {
                    out[j] = net;
                    deriv[j] = 1.0;
                } else {
                    let f = squash(net);
                    out[j] = f;
                    deriv[j] = squash_deriv(f);
                }
            }
        }
    }

    /// Converts dE/d(activation) into dE/d(net) using the derivatives
    /// stored by [`forward`](Self::forward).
    pub fn delta_from(&self, deriv: &[f64], grad_act: &[f64], delta: &mut [f64]) {
        if self.out_complex {
            for j in 0..self.n_out {
                let jac = Jacobian::read_from(&deriv[4 * j..4 * j + 4]);
                let (dr, di) = jac.pull_back(grad_act[2 * j], grad_act[2 * j + 1]);
                delta[2 * j] = dr;
                delta[2 * j + 1] = di;
            }
        } else {
            for j in 0..self.n_out {
                delta[j] = grad_act[j] * deriv[j];
            }
        }
    }

    /// Backward pass of one layer.
    ///
    /// `delta` is dE/d(net) of this layer's neurons (interleaved for
    /// complex neurons). Accumulates the weight gradient into `grad` and
    /// writes dE/d(source activation) into `grad_input`; either may be
    /// skipped.
    pub fn backward(
        &self,
        weights: &[f64],
        input: &[f64],
        delta: &[f64],
        mut grad: Option<&mut [f64]>,
        mut grad_input: Option<&mut [f64]>,
    ) {
        let in_w = self.in_width();
        let row_len = self.row_len();

        if let Some(gi) = grad_input.as_deref_mut() {
            gi[..in_w].fill(0.0);
        }

        for (j, row) in weights.chunks_exact(row_len).enumerate() {
            let g_row = grad
                .as_deref_mut()
                .map(|g| &mut g[j * row_len..(j + 1) * row_len]);

            match (self.in_complex, self.out_complex) {
                (false, _) => {
                    let d = delta[j];
                    if let Some(g) = g_row {
                        for (gw, &x) in g[..in_w].iter_mut().zip(input) {
                            *gw += d * x;
                        }
                        g[in_w] += d;
                    }
                    if let Some(gi) = grad_input.as_deref_mut() {
                        for (gx, &w) in gi[..in_w].iter_mut().zip(&row[..in_w]) {
                            *gx += d * w;
                        }
                    }
                }
                (true, false) => {
                    let d = delta[j];
                    if let Some(g) = g_row {
                        for k in 0..self.n_in {
                            g[2 * k] += d * input[2 * k];
                            g[2 * k + 1] -= d * input[2 * k + 1];
                        }
                        g[in_w] += d;
                    }
                    if let Some(gi) = grad_input.as_deref_mut() {
                        for k in 0..self.n_in {
                            gi[2 * k] += d * row[2 * k];
                            gi[2 * k + 1] -= d * row[2 * k + 1];
                        }
                    }
                }
                (true, true) => {
                    let (dr, di) = (delta[2 * j], delta[2 * j + 1]);
                    if let Some(g) = g_row {
                        for k in 0..self.n_in {
                            let (x, y) = (input[2 * k], input[2 * k + 1]);
                            g[2 * k] += dr * x + di * y;
                            g[2 * k + 1] += di * x - dr * y;
                        }
                        g[in_w] += dr;
                        g[in_w + 1] += di;
                    }
                    if let Some(gi) = grad_input.as_deref_mut() {
                        for k in 0..self.n_in {
                            let (a, b) = (row[2 * k], row[2 * k + 1]);
                            gi[2 * k] += dr * a + di * b;
                            gi[2 * k + 1] += di * a - dr * b;
                        }
                    }
                }
            }
        }
    }
}

/// Layer shapes of a topology, input side first.
pub fn shapes_for(topology: &NetworkTopology) -> Vec<LayerShape> {
    let units = topology.layer_units();
    let domain = topology.domain;
    let n_layers = units.len() - 1;

    (0..n_layers)
        .map(|l| {
            let is_output = l + 1 == n_layers;
            let in_complex = if l == 0 {
                domain.input_complex()
            } else {
                domain.hidden_complex()
            };
            let out_complex = if is_output {
                domain.output_complex()
            } else {
                domain.hidden_complex()
            };
            let linear = is_output && topology.linear_output;
            LayerShape::new(
                units[l],
                units[l + 1],
                in_complex,
                out_complex,
                Activation::resolve(out_complex, linear),
            )
        })
        .collect()
}

/// Builds the `flipped` and `swapped` staging rows of complex units.
#[inline]
pub fn stage_complex(input: &[f64], flipped: &mut [f64], swapped: &mut [f64]) {
    for ((z, f), s) in input
        .chunks_exact(2)
        .zip(flipped.chunks_exact_mut(2))
        .zip(swapped.chunks_exact_mut(2))
    {
        f[0] = z[0];
        f[1] = -z[1];
        s[0] = z[1];
        s[1] = z[0];
    }
}

/// SIMD dot product (4-wide) with scalar tail.
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    let chunks = n / 4;

    let mut acc = f64x4::splat(0.0);
    for c in 0..chunks {
        let i = c * 4;
        let va = f64x4::new([a[i], a[i + 1], a[i + 2], a[i + 3]]);
        let vb = f64x4::new([b[i], b[i + 1], b[i + 2], b[i + 3]]);
        acc += va * vb;
    }

    let arr: [f64; 4] = acc.into();
    let mut sum: f64 = arr.iter().sum();

    // Tail
    for i in (chunks * 4)..n {
        sum += a[i] * b[i];
    }

    sum
}
