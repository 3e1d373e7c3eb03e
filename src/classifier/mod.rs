//! Classifier abstraction
//!
//! Two classifier families sit behind one tagged variant so the training
//! orchestrator and evaluation aggregator are written once:
//!
//! - [`LinearClassifier`] (tabular): margin classifier with a linear kernel
//!   over standardized feature vectors.
//! - [`ConvClassifier`] (sequence): 1-D convolutional network consuming raw
//!   (gravity-filtered) windows directly.
//!
//! Both variants reject inputs whose shape disagrees with what they were
//! trained on, and both resolve output labels through the ClassLabelSet that
//! was active at train time (held by the surrounding artifact).

mod conv;
mod linear;
mod scaler;

pub use conv::ConvClassifier;
pub use linear::LinearClassifier;
pub use scaler::{ChannelScaler, StandardScaler};

use crate::types::{FeatureVector, Window};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Shapes & Errors
// ============================================================================

/// The input shape a trained classifier expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum InputShape {
    /// A feature vector of `n_features` values.
    Tabular { n_features: usize },
    /// A raw window of `(window_size, n_channels)` samples.
    Sequence {
        window_size: usize,
        n_channels: usize,
    },
}

impl std::fmt::Display for InputShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InputShape::Tabular { n_features } => write!(f, "({n_features},) features"),
            InputShape::Sequence {
                window_size,
                n_channels,
            } => write!(f, "({window_size}, {n_channels}) window"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClassifierError {
    #[error("input shape {actual} does not match trained shape {expected}")]
    ShapeMismatch {
        expected: InputShape,
        actual: InputShape,
    },

    #[error("cannot train on an empty dataset")]
    EmptyDataset,

    #[error("label index {index} out of range for {n_classes} classes")]
    LabelOutOfRange { index: usize, n_classes: usize },

    #[error("window of {window_size} samples is too short for the conv stack (minimum {minimum})")]
    SequenceTooShort { window_size: usize, minimum: usize },
}

// ============================================================================
// Training Options
// ============================================================================

/// Gradient-descent hyperparameters shared by both variants.
#[derive(Debug, Clone, Copy)]
pub struct TrainOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Non-improving validation epochs tolerated before rolling back to the
    /// best checkpoint (sequence variant only).
    pub early_stopping_patience: usize,
    /// Seed for weight init and epoch shuffles.
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: 75,
            batch_size: 64,
            learning_rate: 0.001,
            early_stopping_patience: 8,
            seed: 42,
        }
    }
}

// ============================================================================
// Model Variant
// ============================================================================

/// A classifier's raw output: winning class index plus the full softmax-like
/// probability vector in ClassLabelSet order.
#[derive(Debug, Clone)]
pub struct RawPrediction {
    pub class_index: usize,
    pub probabilities: Vec<f64>,
}

/// One input for prediction; which variant it fits is checked at call time.
#[derive(Debug, Clone, Copy)]
pub enum ClassifierInput<'a> {
    Features(&'a FeatureVector),
    Window(&'a Window),
}

impl ClassifierInput<'_> {
    fn shape(&self) -> InputShape {
        match self {
            ClassifierInput::Features(fv) => InputShape::Tabular {
                n_features: fv.len(),
            },
            ClassifierInput::Window(w) => InputShape::Sequence {
                window_size: w.len(),
                n_channels: w.n_channels(),
            },
        }
    }
}

/// Tagged variant over the two classifier families.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "kebab-case")]
pub enum ClassifierModel {
    Linear(LinearClassifier),
    Conv(ConvClassifier),
}

impl ClassifierModel {
    pub fn expected_input_shape(&self) -> InputShape {
        match self {
            ClassifierModel::Linear(m) => m.expected_input_shape(),
            ClassifierModel::Conv(m) => m.expected_input_shape(),
        }
    }

    pub fn n_classes(&self) -> usize {
        match self {
            ClassifierModel::Linear(m) => m.n_classes(),
            ClassifierModel::Conv(m) => m.n_classes(),
        }
    }

    /// Predict one input, rejecting anything whose shape does not match the
    /// trained shape.
    pub fn predict(&self, input: ClassifierInput<'_>) -> Result<RawPrediction, ClassifierError> {
        match (self, input) {
            (ClassifierModel::Linear(m), ClassifierInput::Features(fv)) => m.predict(fv.values()),
            (ClassifierModel::Conv(m), ClassifierInput::Window(w)) => m.predict(w),
            (model, input) => Err(ClassifierError::ShapeMismatch {
                expected: model.expected_input_shape(),
                actual: input.shape(),
            }),
        }
    }
}

/// Numerically stable softmax.
pub(crate) fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

/// Arg-max with lowest-index tie-break.
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate().skip(1) {
        if *v > values[best] {
            best = i;
        }
    }
    best
}
