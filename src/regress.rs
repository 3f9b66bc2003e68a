//! Output-layer weights by linear least squares.
//!
//! Under squared error with a linear output activation, the error is a
//! quadratic function of the output weights for fixed hidden weights, so
//! the best output layer is the least-squares solution of
//!
//! ```text
//! design · W = targets
//! ```
//!
//! where row `i` of `design` is what output neuron `j`'s weight row is
//! dotted with for case `i` (the last hidden layer's activations, or the
//! inputs, plus bias columns). Complex sources use the sign-flipped layout
//! `[x, -y, ...]`, and complex outputs contribute two rows per case:
//!
//! ```text
//! real part:  [x_0, -y_0, x_1, -y_1, ..., 1, 0]
//! imag part:  [y_0,  x_0, y_1,  x_1, ..., 0, 1]
//! ```
//!
//! With a squashing output the targets are first mapped through the
//! inverse activation. That solution is only approximate (it minimizes
//! error in net-input space) and is used to seed annealing cheaply.
//!
//! The system is solved by SVD with small singular values zeroed, giving
//! the minimum-norm solution even when the design is rank deficient
//! (a single case, dead hidden neurons, duplicated inputs).

use nalgebra::DMatrix;
use num_complex::Complex64;

use crate::activation::{inverse_complex_squash, inverse_squash, Activation};
use crate::buffer::checked_len;
use crate::config::SVD_THRESHOLD;
use crate::error::{MlfnError, MlfnResult};
use crate::layer::LayerShape;
use crate::network::Network;
use crate::training_set::TrainingSet;

/// Sweep cap of the SVD iteration.
const SVD_MAX_ITERATIONS: usize = 1000;

/// Least-squares solver of a network's output layer.
#[derive(Debug, Clone)]
pub struct OutputRegression {
    design: DMatrix<f64>,
    rhs: DMatrix<f64>,
    target: Vec<f64>,
    exact: bool,
}

impl OutputRegression {
    /// Preallocates the regression matrices for `net` over `set`.
    ///
    /// # Errors
    ///
    /// - [`MlfnError::ConfigMismatch`] if the metric is not squared error
    /// - [`MlfnError::TrainingSet`] / [`MlfnError::ShapeMismatch`] if the
    ///   set does not fit the network
    /// - [`MlfnError::OutOfResources`] if the matrices cannot be allocated
    pub fn new(net: &Network, set: &TrainingSet) -> MlfnResult<Self> {
        let topology = net.topology();
        if !topology.error.allows_regression() {
            return Err(MlfnError::config_mismatch(format!(
                "output regression requires squared error, network uses {:?}",
                topology.error
            )));
        }
        set.check_compatible(topology)?;

        let shape = output_shape(net);
        let rows_per_case = if shape.out_complex { 2 } else { 1 };
        let rows = checked_len(set.len(), rows_per_case)?;

        Ok(Self {
            design: try_matrix(rows, shape.row_len())?,
            rhs: try_matrix(rows, shape.n_out)?,
            target: try_vec(shape.out_width())?,
            exact: shape.activation == Activation::Linear,
        })
    }

    /// True when the output activation is linear, so the solution is the
    /// exact minimizer of the error.
    #[inline]
    pub fn is_exact(&self) -> bool {
        self.exact
    }

    /// Solves the output layer of `net` in place.
    ///
    /// Returns `false` (weights unchanged) if the SVD did not converge or
    /// produced non-finite weights.
    pub fn solve(&mut self, net: &mut Network, set: &TrainingSet) -> bool {
        let last = net.num_layers() - 1;
        let shape = output_shape(net);
        let in_w = shape.in_width();

        for i in 0..set.len() {
            if last > 0 {
                net.trial(set.input(i));
            }
            let source = if last > 0 {
                net.layer_activations(last - 1)
            } else {
                set.input(i)
            };
            set.fill_target(i, &mut self.target);

            if shape.out_complex {
                let (re_row, im_row) = (2 * i, 2 * i + 1);
                for k in 0..shape.n_in {
                    let (x, y) = (source[2 * k], source[2 * k + 1]);
                    self.design[(re_row, 2 * k)] = x;
                    self.design[(re_row, 2 * k + 1)] = -y;
                    self.design[(im_row, 2 * k)] = y;
                    self.design[(im_row, 2 * k + 1)] = x;
                }
                self.design[(re_row, in_w)] = 1.0;
                self.design[(re_row, in_w + 1)] = 0.0;
                self.design[(im_row, in_w)] = 0.0;
                self.design[(im_row, in_w + 1)] = 1.0;

                for j in 0..shape.n_out {
                    let t = Complex64::new(self.target[2 * j], self.target[2 * j + 1]);
                    let net_target = match shape.activation {
                        Activation::Linear => t,
                        _ => inverse_complex_squash(t),
                    };
                    self.rhs[(re_row, j)] = net_target.re;
                    self.rhs[(im_row, j)] = net_target.im;
                }
            } else {
                if shape.in_complex {
                    for k in 0..shape.n_in {
                        self.design[(i, 2 * k)] = source[2 * k];
                        self.design[(i, 2 * k + 1)] = -source[2 * k + 1];
                    }
                } else {
                    for (k, &x) in source.iter().enumerate() {
                        self.design[(i, k)] = x;
                    }
                }
                self.design[(i, in_w)] = 1.0;

                for j in 0..shape.n_out {
                    let t = self.target[j];
                    self.rhs[(i, j)] = match shape.activation {
                        Activation::Linear => t,
                        _ => inverse_squash(t),
                    };
                }
            }
        }

        let Some(svd) = self
            .design
            .clone()
            .try_svd(true, true, f64::EPSILON, SVD_MAX_ITERATIONS)
        else {
            log::warn!("output regression: SVD did not converge, keeping output weights");
            return false;
        };

        let threshold = SVD_THRESHOLD * svd.singular_values.max();
        let solution = match svd.solve(&self.rhs, threshold) {
            Ok(solution) => solution,
            Err(msg) => {
                log::warn!("output regression: {msg}");
                return false;
            }
        };
        if solution.iter().any(|w| !w.is_finite()) {
            log::warn!("output regression: non-finite solution, keeping output weights");
            return false;
        }

        let row_len = shape.row_len();
        let layer = net.weights.layer_mut(last);
        for (j, row) in layer.chunks_exact_mut(row_len).enumerate() {
            for (c, w) in row.iter_mut().enumerate() {
                *w = solution[(c, j)];
            }
        }
        true
    }
}

fn output_shape(net: &Network) -> LayerShape {
    net.shapes()[net.num_layers() - 1]
}

/// Zeroed matrix whose storage is reserved fallibly.
fn try_matrix(rows: usize, cols: usize) -> MlfnResult<DMatrix<f64>> {
    let len = checked_len(rows, cols)?;
    let data = try_vec(len)?;
    Ok(DMatrix::from_vec(rows, cols, data))
}

fn try_vec(len: usize) -> MlfnResult<Vec<f64>> {
    let mut data = Vec::new();
    data.try_reserve_exact(len).map_err(|e| {
        MlfnError::out_of_resources(format!("regression buffer of {len} elements: {e}"))
    })?;
    data.resize(len, 0.0);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Domain, ErrorKind, NetworkTopology};

    #[test]
    fn test_rejects_non_squared_error() {
        let net = Network::new(NetworkTopology::new(1, 1).with_error(ErrorKind::Absolute)).unwrap();
        let mut set = TrainingSet::mapping(1, 1);
        set.push_mapping(&[0.0], &[0.0]).unwrap();
        let err = OutputRegression::new(&net, &set).unwrap_err();
        assert!(matches!(err, MlfnError::ConfigMismatch(_)));
    }

    #[test]
    fn test_exact_line_fit() {
        let mut net = Network::new(NetworkTopology::new(1, 1).with_linear_output(true)).unwrap();
        let mut set = TrainingSet::mapping(1, 1);
        for x in [-1.0, 0.0, 0.5, 2.0] {
            set.push_mapping(&[x], &[3.0 * x - 0.5]).unwrap();
        }

        let mut regression = OutputRegression::new(&net, &set).unwrap();
        assert!(regression.is_exact());
        assert!(regression.solve(&mut net, &set));

        let w = net.weights().as_slice();
        assert!((w[0] - 3.0).abs() < 1e-10);
        assert!((w[1] + 0.5).abs() < 1e-10);
        assert!(net.epoch_error(&set) < 1e-16);
    }

    #[test]
    fn test_complex_fit() {
        let topology = NetworkTopology::new(1, 1)
            .with_domain(Domain::FullComplex)
            .with_linear_output(true);
        let mut net = Network::new(topology).unwrap();

        // t = (0.5 - 2i) z + (0.1 + 0.3i)
        let w = Complex64::new(0.5, -2.0);
        let b = Complex64::new(0.1, 0.3);
        let mut set = TrainingSet::mapping(2, 2);
        for z in [Complex64::new(1.0, 0.0), Complex64::new(0.3, -0.7), Complex64::new(-1.2, 0.4)] {
            let t = w * z + b;
            set.push_mapping(&[z.re, z.im], &[t.re, t.im]).unwrap();
        }

        let mut regression = OutputRegression::new(&net, &set).unwrap();
        assert!(regression.solve(&mut net, &set));
        let row = net.weights().as_slice();
        assert!((row[0] - 0.5).abs() < 1e-10);
        assert!((row[1] + 2.0).abs() < 1e-10);
        assert!((row[2] - 0.1).abs() < 1e-10);
        assert!((row[3] - 0.3).abs() < 1e-10);
    }

    #[test]
    fn test_single_case_is_finite() {
        let mut net = Network::new(
            NetworkTopology::new(2, 1)
                .with_hidden(4, 0)
                .with_linear_output(true),
        )
        .unwrap();
        let mut set = TrainingSet::mapping(2, 1);
        set.push_mapping(&[0.3, -0.3], &[0.7]).unwrap();

        let mut regression = OutputRegression::new(&net, &set).unwrap();
        assert!(regression.solve(&mut net, &set));
        assert!(net.weights().as_slice().iter().all(|w| w.is_finite()));
        assert!(net.epoch_error(&set) < 1e-12);
    }

    #[test]
    fn test_approximate_with_squash_output() {
        let net = Network::new(NetworkTopology::new(1, 1)).unwrap();
        let mut set = TrainingSet::mapping(1, 1);
        set.push_mapping(&[1.0], &[0.5]).unwrap();
        assert!(!OutputRegression::new(&net, &set).unwrap().is_exact());
    }
}
