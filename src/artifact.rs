//! Trained artifact persistence and the predict entry point
//!
//! A [`ClassifierArtifact`] bundles everything one trained model needs to be
//! used safely later: the model weights, the ClassLabelSet ordering that was
//! active at train time, and the preprocessing settings (gravity filter,
//! feature normalization) training used — inference always mirrors them.
//!
//! Artifacts are immutable once trained; retraining produces a new artifact.
//! `load` returns an `Arc` handle that is shared read-only across concurrent
//! predict calls — no hidden module-level global, no implicit reload.
//!
//! On disk an artifact is a JSON file plus a `class_labels.json` manifest
//! next to it. The manifest is written once at training time and verified on
//! every load; a disagreement between manifest and artifact is a fatal
//! [`ArtifactError`].

use crate::classifier::{ClassifierError, ClassifierInput, ClassifierModel, InputShape};
use crate::config::Normalization;
use crate::features::{FeatureError, FeatureExtractor};
use crate::gravity::GravityFilter;
use crate::types::{ClassLabelSet, Prediction, Window, WindowShapeError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Filename of the label manifest persisted alongside every artifact.
pub const LABEL_MANIFEST_FILE: &str = "class_labels.json";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to load artifact from {path}: {reason}")]
    Load { path: String, reason: String },

    #[error("failed to save artifact to {path}: {reason}")]
    Save { path: String, reason: String },

    #[error(
        "label manifest at {path} disagrees with artifact labels — \
         the artifact and its manifest must come from the same training run"
    )]
    ManifestMismatch { path: String },
}

/// Per-window prediction failure.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error(transparent)]
    Classifier(#[from] ClassifierError),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Shape(#[from] WindowShapeError),
}

/// Preprocessing applied at train time, replayed identically at inference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingSettings {
    pub n_channels: usize,
    pub apply_gravity_filter: bool,
    pub gravity_alpha: f64,
    pub feature_normalization: Normalization,
}

/// An immutable trained classifier plus its label ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierArtifact {
    pub created_at: DateTime<Utc>,
    labels: ClassLabelSet,
    preprocessing: PreprocessingSettings,
    model: ClassifierModel,
}

impl ClassifierArtifact {
    pub fn new(
        model: ClassifierModel,
        labels: ClassLabelSet,
        preprocessing: PreprocessingSettings,
    ) -> Self {
        Self {
            created_at: Utc::now(),
            labels,
            preprocessing,
            model,
        }
    }

    pub fn labels(&self) -> &ClassLabelSet {
        &self.labels
    }

    pub fn preprocessing(&self) -> &PreprocessingSettings {
        &self.preprocessing
    }

    pub fn expected_input_shape(&self) -> InputShape {
        self.model.expected_input_shape()
    }

    /// Predict the activity for one raw window.
    ///
    /// Applies the artifact's own preprocessing (gravity filter, feature
    /// extraction for the tabular variant) so callers never have to know
    /// which variant they are talking to.
    pub fn predict(&self, window: &Window) -> Result<Prediction, PredictError> {
        let filtered;
        let input_window = if self.preprocessing.apply_gravity_filter {
            filtered = GravityFilter::new(self.preprocessing.gravity_alpha).apply(window)?;
            &filtered
        } else {
            window
        };

        let raw = match &self.model {
            ClassifierModel::Linear(_) => {
                let extractor = FeatureExtractor::new(
                    self.preprocessing.n_channels,
                    self.preprocessing.feature_normalization,
                );
                let features = extractor.extract(input_window)?;
                self.model.predict(ClassifierInput::Features(&features))?
            }
            ClassifierModel::Conv(_) => {
                self.model.predict(ClassifierInput::Window(input_window))?
            }
        };

        let label = self
            .labels
            .label_at(raw.class_index)
            .unwrap_or("unknown")
            .to_string();
        let confidence = raw.probabilities[raw.class_index];

        Ok(Prediction {
            label,
            class_index: raw.class_index,
            confidence,
            probabilities: raw.probabilities,
        })
    }

    /// Persist the artifact and its label manifest next to each other.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ArtifactError> {
        let path = path.as_ref();
        let save_err = |reason: String| ArtifactError::Save {
            path: path.display().to_string(),
            reason,
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| save_err(e.to_string()))?;
            }
        }

        let json = serde_json::to_vec_pretty(self).map_err(|e| save_err(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| save_err(e.to_string()))?;

        let manifest_path = manifest_path_for(path);
        let manifest = serde_json::to_vec_pretty(self.labels.labels())
            .map_err(|e| save_err(e.to_string()))?;
        std::fs::write(&manifest_path, manifest).map_err(|e| save_err(e.to_string()))?;

        info!(
            artifact = %path.display(),
            manifest = %manifest_path.display(),
            classes = self.labels.len(),
            "Saved classifier artifact"
        );
        Ok(())
    }

    /// Load an artifact and verify it against its label manifest.
    ///
    /// Failure here is fatal to the surrounding run — there is no fallback
    /// model.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Arc<Self>, ArtifactError> {
        let path = path.as_ref();
        let load_err = |reason: String| ArtifactError::Load {
            path: path.display().to_string(),
            reason,
        };

        let raw = std::fs::read(path).map_err(|e| load_err(e.to_string()))?;
        let artifact: Self =
            serde_json::from_slice(&raw).map_err(|e| load_err(e.to_string()))?;

        if artifact.labels.len() != artifact.model.n_classes() {
            return Err(load_err(format!(
                "label manifest has {} labels but model was trained for {} classes",
                artifact.labels.len(),
                artifact.model.n_classes()
            )));
        }

        let manifest_path = manifest_path_for(path);
        let manifest_raw =
            std::fs::read(&manifest_path).map_err(|e| load_err(format!(
                "missing label manifest {}: {e}",
                manifest_path.display()
            )))?;
        let manifest: Vec<String> =
            serde_json::from_slice(&manifest_raw).map_err(|e| load_err(e.to_string()))?;

        if manifest != artifact.labels.labels() {
            return Err(ArtifactError::ManifestMismatch {
                path: manifest_path.display().to_string(),
            });
        }

        info!(
            artifact = %path.display(),
            classes = artifact.labels.len(),
            shape = %artifact.expected_input_shape(),
            "Loaded classifier artifact"
        );
        Ok(Arc::new(artifact))
    }
}

/// The label manifest lives next to the artifact file.
fn manifest_path_for(artifact_path: &Path) -> std::path::PathBuf {
    artifact_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(LABEL_MANIFEST_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{LinearClassifier, TrainOptions};

    fn toy_artifact() -> ClassifierArtifact {
        // Features from constant windows: class 0 near zero, class 1 near 2.
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..20 {
            let j = (i % 5) as f64 * 0.01;
            features.push(constant_features(0.0 + j));
            labels.push(0);
            features.push(constant_features(2.0 + j));
            labels.push(1);
        }
        let model = LinearClassifier::train(
            &features,
            &labels,
            2,
            &TrainOptions {
                epochs: 20,
                learning_rate: 0.05,
                ..TrainOptions::default()
            },
        )
        .unwrap();

        ClassifierArtifact::new(
            ClassifierModel::Linear(model),
            ClassLabelSet::from_observed(["run", "walk"]),
            PreprocessingSettings {
                n_channels: 6,
                apply_gravity_filter: false,
                gravity_alpha: 0.8,
                feature_normalization: Normalization::None,
            },
        )
    }

    fn constant_features(level: f64) -> Vec<f64> {
        let mut fv = Vec::new();
        for _ in 0..6 {
            fv.extend_from_slice(&[level, 0.0, level, level, level]);
        }
        fv.push(level * 3.0);
        fv
    }

    fn constant_window(level: f64) -> Window {
        Window::new(vec![vec![level; 6]; 100], 6).unwrap()
    }

    #[test]
    fn predict_resolves_labels_through_the_label_set() {
        let artifact = toy_artifact();
        let p = artifact.predict(&constant_window(2.0)).unwrap();
        assert_eq!(p.label, artifact.labels().label_at(p.class_index).unwrap());
        assert_eq!(p.probabilities.len(), 2);
        assert!((0.0..=1.0).contains(&p.confidence));
    }

    #[test]
    fn save_load_round_trip_preserves_predictions() {
        let artifact = toy_artifact();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        artifact.save(&path).unwrap();
        assert!(dir.path().join(LABEL_MANIFEST_FILE).exists());

        let loaded = ClassifierArtifact::load(&path).unwrap();
        let before = artifact.predict(&constant_window(0.0)).unwrap();
        let after = loaded.predict(&constant_window(0.0)).unwrap();
        assert_eq!(before.class_index, after.class_index);
        assert_eq!(before.probabilities, after.probabilities);
        assert_eq!(loaded.labels(), artifact.labels());
    }

    #[test]
    fn tampered_manifest_is_fatal() {
        let artifact = toy_artifact();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        artifact.save(&path).unwrap();

        std::fs::write(
            dir.path().join(LABEL_MANIFEST_FILE),
            serde_json::to_vec(&["walk", "run"]).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            ClassifierArtifact::load(&path).unwrap_err(),
            ArtifactError::ManifestMismatch { .. }
        ));
    }

    #[test]
    fn missing_artifact_is_fatal() {
        let err = ClassifierArtifact::load("/nonexistent/model.json").unwrap_err();
        assert!(matches!(err, ArtifactError::Load { .. }));
    }

    #[test]
    fn gravity_setting_is_replayed_at_inference() {
        let mut artifact = toy_artifact();
        artifact.preprocessing.apply_gravity_filter = true;

        // Constant acceleration with zero gyro filters to all-zero motion,
        // so the prediction must be identical to an all-zero window's.
        let acc_only =
            Window::new(vec![vec![2.0, 2.0, 2.0, 0.0, 0.0, 0.0]; 100], 6).unwrap();
        let p = artifact.predict(&acc_only).unwrap();
        let zero = artifact.predict(&constant_window(0.0)).unwrap();
        assert_eq!(p.probabilities, zero.probabilities);
    }
}
