//! Training cases stored with a fixed stride.
//!
//! Each case is an input vector (complex inputs interleaved re, im)
//! followed by either a target vector or a single class slot:
//!
//! ```text
//! Mapping:         [x_0 .. x_{w-1}, t_0 .. t_{k-1}]
//! Classification:  [x_0 .. x_{w-1}, class]
//! ```
//!
//! Classification targets are generated on the fly: [`TargetRange::on`]
//! for the output matching the class, [`TargetRange::off`] elsewhere.

use crate::config::{NetworkTopology, TargetRange};
use crate::error::{MlfnError, MlfnResult};

/// What follows the inputs of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseLayout {
    /// An explicit target vector of `n_targets` reals.
    Mapping {
        /// Reals per target vector.
        n_targets: usize,
    },
    /// A class index in `0..n_classes`.
    Classification {
        /// Number of classes (one output per class).
        n_classes: usize,
    },
}

/// Read-only sequence of training cases.
///
/// # Example
///
/// ```rust
/// use mlfn::TrainingSet;
///
/// let mut set = TrainingSet::classification(2, 3);
/// set.push_class(&[0.5, 1.0], 2).unwrap();
///
/// let mut target = [0.0; 3];
/// set.fill_target(0, &mut target);
/// assert_eq!(target, [-0.9, -0.9, 0.9]);
/// ```
#[derive(Debug, Clone)]
pub struct TrainingSet {
    data: Vec<f64>,
    input_width: usize,
    layout: CaseLayout,
    range: TargetRange,
}

impl TrainingSet {
    /// Empty set of input/target-vector cases.
    pub fn mapping(input_width: usize, n_targets: usize) -> Self {
        Self {
            data: Vec::new(),
            input_width,
            layout: CaseLayout::Mapping { n_targets },
            range: TargetRange::default(),
        }
    }

    /// Empty set of input/class cases.
    pub fn classification(input_width: usize, n_classes: usize) -> Self {
        Self {
            data: Vec::new(),
            input_width,
            layout: CaseLayout::Classification { n_classes },
            range: TargetRange::default(),
        }
    }

    /// Sets the on/off targets used for classes.
    pub fn with_target_range(mut self, range: TargetRange) -> Self {
        self.range = range;
        self
    }

    /// Target range.
    #[inline]
    pub fn target_range(&self) -> TargetRange {
        self.range
    }

    /// Case layout.
    #[inline]
    pub fn layout(&self) -> CaseLayout {
        self.layout
    }

    /// Reals per input vector.
    #[inline]
    pub fn input_width(&self) -> usize {
        self.input_width
    }

    /// Reals per generated target vector.
    #[inline]
    pub fn target_width(&self) -> usize {
        match self.layout {
            CaseLayout::Mapping { n_targets } => n_targets,
            CaseLayout::Classification { n_classes } => n_classes,
        }
    }

    /// Reals per stored case.
    #[inline]
    pub fn stride(&self) -> usize {
        match self.layout {
            CaseLayout::Mapping { n_targets } => self.input_width + n_targets,
            CaseLayout::Classification { .. } => self.input_width + 1,
        }
    }

    /// Number of cases.
    #[inline]
    pub fn len(&self) -> usize {
        match self.stride() {
            0 => 0,
            stride => self.data.len() / stride,
        }
    }

    /// Is empty?
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends a mapping case.
    ///
    /// # Errors
    ///
    /// [`MlfnError::TrainingSet`] if the set holds classes,
    /// [`MlfnError::ShapeMismatch`] on wrong vector lengths.
    pub fn push_mapping(&mut self, input: &[f64], target: &[f64]) -> MlfnResult<()> {
        let CaseLayout::Mapping { n_targets } = self.layout else {
            return Err(MlfnError::training_set("set holds class cases"));
        };
        if input.len() != self.input_width || target.len() != n_targets {
            return Err(MlfnError::shape_mismatch(
                &[self.input_width, n_targets],
                &[input.len(), target.len()],
            ));
        }
        self.data.extend_from_slice(input);
        self.data.extend_from_slice(target);
        Ok(())
    }

    /// Appends a classification case.
    ///
    /// # Errors
    ///
    /// [`MlfnError::TrainingSet`] if the set holds mappings or the class
    /// is out of range, [`MlfnError::ShapeMismatch`] on a wrong input
    /// length.
    pub fn push_class(&mut self, input: &[f64], class: usize) -> MlfnResult<()> {
        let CaseLayout::Classification { n_classes } = self.layout else {
            return Err(MlfnError::training_set("set holds mapping cases"));
        };
        if class >= n_classes {
            return Err(MlfnError::training_set(format!(
                "class {class} out of range 0..{n_classes}"
            )));
        }
        if input.len() != self.input_width {
            return Err(MlfnError::shape_mismatch(&[self.input_width], &[input.len()]));
        }
        self.data.extend_from_slice(input);
        self.data.push(class as f64);
        Ok(())
    }

    /// Input vector of case `i`.
    #[inline]
    pub fn input(&self, i: usize) -> &[f64] {
        let start = i * self.stride();
        &self.data[start..start + self.input_width]
    }

    /// Writes the target vector of case `i`.
    pub fn fill_target(&self, i: usize, target: &mut [f64]) {
        let start = i * self.stride() + self.input_width;
        match self.layout {
            CaseLayout::Mapping { n_targets } => {
                target[..n_targets].copy_from_slice(&self.data[start..start + n_targets]);
            }
            CaseLayout::Classification { n_classes } => {
                let class = self.data[start] as usize;
                for (k, t) in target[..n_classes].iter_mut().enumerate() {
                    *t = if k == class {
                        self.range.on
                    } else {
                        self.range.off
                    };
                }
            }
        }
    }

    /// Checks that the set can train a network of this topology.
    ///
    /// # Errors
    ///
    /// [`MlfnError::TrainingSet`] if the set is empty or holds classes
    /// for complex outputs, [`MlfnError::ShapeMismatch`] on width
    /// mismatch.
    pub fn check_compatible(&self, topology: &NetworkTopology) -> MlfnResult<()> {
        if self.is_empty() {
            return Err(MlfnError::training_set("training set is empty"));
        }
        if matches!(self.layout, CaseLayout::Classification { .. })
            && topology.domain.output_complex()
        {
            return Err(MlfnError::training_set(
                "classification needs real-valued outputs",
            ));
        }
        let expected = [topology.input_width(), topology.output_width()];
        let got = [self.input_width, self.target_width()];
        if expected != got {
            return Err(MlfnError::shape_mismatch(&expected, &got));
        }
        Ok(())
    }
}
