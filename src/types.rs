//! Shared data structures for the activity-recognition pipeline
//!
//! This module defines the core types flowing through the pipeline:
//! - Window / LabeledWindow (segmentation output)
//! - FeatureVector (statistical feature extraction output)
//! - ClassLabelSet (canonical activity label ordering bound to an artifact)
//! - Trial (group of windows sharing one ground-truth label)
//! - Prediction / EvaluationTally (classifier and evaluation outputs)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Channel Layout
// ============================================================================

/// Canonical channel order for one sample: accX, accY, accZ, gyroX, gyroY, gyroZ.
pub const CHANNEL_NAMES: [&str; 6] = ["acc_x", "acc_y", "acc_z", "gyro_x", "gyro_y", "gyro_z"];

/// Number of accelerometer channels (always the first three).
pub const ACC_CHANNELS: usize = 3;

// ============================================================================
// Window
// ============================================================================

/// A fixed-length slice of multichannel sensor samples.
///
/// Invariant: every row has exactly `n_channels` values. Constructed only
/// through [`Window::new`], which enforces the shape; rows with non-numeric
/// values are dropped upstream (CSV ingestion) before a `Window` exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    samples: Vec<Vec<f64>>,
    n_channels: usize,
}

impl Window {
    /// Build a window from rows, validating that every row has `n_channels` values.
    pub fn new(samples: Vec<Vec<f64>>, n_channels: usize) -> Result<Self, WindowShapeError> {
        for (row_idx, row) in samples.iter().enumerate() {
            if row.len() != n_channels {
                return Err(WindowShapeError {
                    row: row_idx,
                    expected: n_channels,
                    actual: row.len(),
                });
            }
        }
        Ok(Self { samples, n_channels })
    }

    /// Number of samples (rows) in the window.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of channels per sample.
    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    /// All samples, row-major.
    pub fn samples(&self) -> &[Vec<f64>] {
        &self.samples
    }

    /// Values of one channel across the whole window.
    pub fn channel(&self, idx: usize) -> Option<Vec<f64>> {
        if idx >= self.n_channels {
            return None;
        }
        Some(self.samples.iter().map(|row| row[idx]).collect())
    }
}

/// A row with the wrong number of channel values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("row {row} has {actual} channel values, expected {expected}")]
pub struct WindowShapeError {
    pub row: usize,
    pub expected: usize,
    pub actual: usize,
}

/// A window plus its ground-truth activity label.
#[derive(Debug, Clone)]
pub struct LabeledWindow {
    pub window: Window,
    pub label: String,
}

// ============================================================================
// Feature Vector
// ============================================================================

/// Fixed-length ordered feature vector: one `(mean, std, rms, max, min)`
/// 5-tuple per channel, then the SMA scalar. For 6 channels that is 31 values.
///
/// Order is significant and must match between training and inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub Vec<f64>);

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    /// Expected feature-vector length for a given channel count.
    pub fn expected_len(n_channels: usize) -> usize {
        5 * n_channels + 1
    }
}

// ============================================================================
// Class Labels
// ============================================================================

/// Canonical, sorted, deduplicated ordering of activity labels.
///
/// The ordering is fixed at training time and persisted alongside the model;
/// class index = position in this sequence. The same ordering must be used
/// for every train/predict/evaluate call against one artifact — reordering
/// silently corrupts predictions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLabelSet {
    labels: Vec<String>,
}

impl ClassLabelSet {
    /// Build the canonical label set from observed labels: sorted and
    /// deduplicated, independent of input enumeration order.
    pub fn from_observed<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        labels.sort();
        labels.dedup();
        Self { labels }
    }

    /// Restore a label set in a previously persisted order. No sorting —
    /// the stored order is authoritative for an existing artifact.
    pub fn from_manifest(labels: Vec<String>) -> Self {
        Self { labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Class index of a label, if known.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Label at a class index.
    pub fn label_at(&self, idx: usize) -> Option<&str> {
        self.labels.get(idx).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

// ============================================================================
// Trial
// ============================================================================

/// A named group of windows sharing one ground-truth label. Used only during
/// evaluation: all windows are predicted, then a majority vote produces the
/// trial verdict.
#[derive(Debug, Clone)]
pub struct Trial {
    pub name: String,
    pub true_label: String,
    pub windows: Vec<Window>,
}

// ============================================================================
// Prediction
// ============================================================================

/// One classifier prediction: resolved label, confidence in `0..=1`, and the
/// full per-class probability vector ordered per the artifact's ClassLabelSet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub class_index: usize,
    pub confidence: f64,
    pub probabilities: Vec<f64>,
}

// ============================================================================
// Evaluation Tally
// ============================================================================

/// Pass/total counts for one activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityCount {
    pub passed: usize,
    pub total: usize,
}

impl ActivityCount {
    pub fn failed(&self) -> usize {
        self.total - self.passed
    }

    /// Accuracy percentage, 0.0 when nothing was evaluated.
    pub fn accuracy_pct(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.passed as f64 / self.total as f64) * 100.0
        }
    }
}

/// Mapping from activity label to pass/total counts, mutated monotonically
/// during one evaluation run (counts only ever increase).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationTally {
    pub activities: BTreeMap<String, ActivityCount>,
    /// Items (windows or trials) skipped due to per-item failures.
    pub skipped: usize,
}

impl EvaluationTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one verdict for `true_label`. `passed` means predicted == true.
    pub fn record(&mut self, true_label: &str, passed: bool) {
        let entry = self.activities.entry(true_label.to_string()).or_default();
        entry.total += 1;
        if passed {
            entry.passed += 1;
        }
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    /// Overall accuracy percentage across all activities.
    pub fn overall_accuracy_pct(&self) -> f64 {
        let (passed, total) = self
            .activities
            .values()
            .fold((0usize, 0usize), |(p, t), c| (p + c.passed, t + c.total));
        if total == 0 {
            0.0
        } else {
            (passed as f64 / total as f64) * 100.0
        }
    }
}
