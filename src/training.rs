//! Training orchestration
//!
//! Walks a labeled corpus directory, builds the canonical ClassLabelSet,
//! splits the dataset reproducibly, trains the configured classifier variant
//! and produces the immutable artifact.
//!
//! Corpus layout: per-activity subdirectories (directory name decoded to the
//! label) containing window CSVs, or label-coded CSV files at the top level.
//! A window whose shape or content is invalid is skipped and logged — one bad
//! file never aborts a training run — and the final report carries the count
//! of skipped items.

use crate::artifact::{ClassifierArtifact, PreprocessingSettings};
use crate::classifier::{
    ClassifierError, ClassifierModel, ConvClassifier, LinearClassifier, TrainOptions,
};
use crate::config::{ClassifierKind, PipelineConfig};
use crate::features::FeatureExtractor;
use crate::gravity::GravityFilter;
use crate::ingest::{self};
use crate::labels::{FolderDecoder, LabelDecoder};
use crate::types::{ClassLabelSet, LabeledWindow, Window};
use rand::prelude::SliceRandom;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("no valid windows found in corpus ({scanned} files scanned, {skipped} skipped)")]
    EmptyDataset { scanned: usize, skipped: usize },

    #[error("failed to read corpus directory {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

/// Outcome of one training run, alongside the artifact itself.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub classes: Vec<String>,
    pub windows_used: usize,
    pub windows_skipped: usize,
    pub train_size: usize,
    pub validation_size: usize,
}

/// Drives corpus loading, splitting and classifier training.
pub struct TrainingOrchestrator {
    config: PipelineConfig,
    decoder: Box<dyn LabelDecoder>,
}

impl TrainingOrchestrator {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            decoder: Box::new(FolderDecoder),
        }
    }

    /// Swap the corpus-naming convention.
    pub fn with_decoder(mut self, decoder: Box<dyn LabelDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Train an artifact from every valid window under `corpus_dir`.
    pub fn train<P: AsRef<Path>>(
        &self,
        corpus_dir: P,
    ) -> Result<(ClassifierArtifact, TrainingReport), TrainingError> {
        let (windows, scanned, skipped) = self.load_corpus(corpus_dir.as_ref())?;
        if windows.is_empty() {
            return Err(TrainingError::EmptyDataset { scanned, skipped });
        }

        // Canonical label ordering: sorted distinct labels, independent of
        // filesystem enumeration order.
        let label_set = ClassLabelSet::from_observed(windows.iter().map(|w| w.label.clone()));
        let targets: Vec<usize> = windows
            .iter()
            .map(|w| {
                label_set
                    .index_of(&w.label)
                    .expect("label observed during corpus walk")
            })
            .collect();

        info!(
            windows = windows.len(),
            skipped,
            classes = ?label_set.labels(),
            "Corpus loaded"
        );

        // Reproducible split: seeded shuffle, then partition.
        let mut order: Vec<usize> = (0..windows.len()).collect();
        let mut rng = StdRng::seed_from_u64(self.config.training.split_seed);
        order.shuffle(&mut rng);
        let train_n = ((windows.len() as f64) * self.config.training.train_validation_split)
            .round()
            .max(1.0) as usize;
        let train_n = train_n.min(windows.len());
        let (train_idx, val_idx) = order.split_at(train_n);

        let opts = TrainOptions {
            epochs: self.config.training.epochs,
            batch_size: self.config.training.batch_size,
            learning_rate: self.config.training.learning_rate,
            early_stopping_patience: self.config.training.early_stopping_patience,
            seed: self.config.training.split_seed,
        };

        let model = match self.config.training.classifier {
            ClassifierKind::Linear => {
                let extractor = FeatureExtractor::new(
                    self.config.window.n_channels,
                    self.config.features.normalization,
                );
                let mut features = Vec::with_capacity(train_idx.len());
                let mut labels = Vec::with_capacity(train_idx.len());
                for &i in train_idx {
                    match extractor.extract(&windows[i].window) {
                        Ok(fv) => {
                            features.push(fv.0);
                            labels.push(targets[i]);
                        }
                        Err(e) => {
                            warn!(error = %e, "Skipping window during feature extraction")
                        }
                    }
                }
                ClassifierModel::Linear(LinearClassifier::train(
                    &features,
                    &labels,
                    label_set.len(),
                    &opts,
                )?)
            }
            ClassifierKind::Conv => {
                let gather = |idx: &[usize]| -> (Vec<Window>, Vec<usize>) {
                    (
                        idx.iter().map(|&i| windows[i].window.clone()).collect(),
                        idx.iter().map(|&i| targets[i]).collect(),
                    )
                };
                let (train_x, train_y) = gather(train_idx);
                let (val_x, val_y) = gather(val_idx);
                ClassifierModel::Conv(ConvClassifier::train(
                    &train_x,
                    &train_y,
                    &val_x,
                    &val_y,
                    label_set.len(),
                    self.config.window.window_size,
                    self.config.window.n_channels,
                    &opts,
                )?)
            }
        };

        let report = TrainingReport {
            classes: label_set.labels().to_vec(),
            windows_used: windows.len(),
            windows_skipped: skipped,
            train_size: train_idx.len(),
            validation_size: val_idx.len(),
        };

        let artifact = ClassifierArtifact::new(
            model,
            label_set,
            PreprocessingSettings {
                n_channels: self.config.window.n_channels,
                apply_gravity_filter: self.config.filter.apply_gravity_filter,
                gravity_alpha: self.config.filter.gravity_alpha,
                feature_normalization: self.config.features.normalization,
            },
        );

        info!(
            train = report.train_size,
            validation = report.validation_size,
            skipped = report.windows_skipped,
            "Training complete"
        );
        Ok((artifact, report))
    }

    /// Walk the corpus: per-activity subdirectories and/or label-coded files.
    /// Returns `(windows, files_scanned, items_skipped)`.
    fn load_corpus(
        &self,
        corpus_dir: &Path,
    ) -> Result<(Vec<LabeledWindow>, usize, usize), TrainingError> {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(corpus_dir)
            .map_err(|source| TrainingError::Io {
                path: corpus_dir.display().to_string(),
                source,
            })?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .collect();
        entries.sort();

        let mut windows = Vec::new();
        let mut scanned = 0usize;
        let mut skipped = 0usize;

        for entry in entries {
            if entry.is_dir() {
                let dir_name = entry
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                let label = match self.decoder.decode(&dir_name) {
                    Ok(label) => label,
                    Err(e) => {
                        warn!(directory = %dir_name, error = %e, "Skipping unlabeled directory");
                        skipped += 1;
                        continue;
                    }
                };
                self.load_class_dir(&entry, &label, &mut windows, &mut scanned, &mut skipped)?;
            } else if is_csv(&entry) {
                scanned += 1;
                let file_name = entry
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                match self.decoder.decode(&file_name) {
                    Ok(label) => self.load_window_file(&entry, &label, &mut windows, &mut skipped),
                    Err(e) => {
                        warn!(file = %file_name, error = %e, "Skipping unlabeled file");
                        skipped += 1;
                    }
                }
            }
        }

        Ok((windows, scanned, skipped))
    }

    fn load_class_dir(
        &self,
        dir: &Path,
        label: &str,
        windows: &mut Vec<LabeledWindow>,
        scanned: &mut usize,
        skipped: &mut usize,
    ) -> Result<(), TrainingError> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|source| TrainingError::Io {
                path: dir.display().to_string(),
                source,
            })?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| is_csv(p))
            .collect();
        files.sort();

        for file in files {
            *scanned += 1;
            self.load_window_file(&file, label, windows, skipped);
        }
        Ok(())
    }

    /// Load one window CSV; anything invalid is skipped and logged.
    fn load_window_file(
        &self,
        path: &Path,
        label: &str,
        windows: &mut Vec<LabeledWindow>,
        skipped: &mut usize,
    ) {
        let window_size = self.config.window.window_size;
        let n_channels = self.config.window.n_channels;

        let parsed = match ingest::read_sensor_rows(path, n_channels) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping unreadable window file");
                *skipped += 1;
                return;
            }
        };
        if parsed.dropped_rows > 0 {
            warn!(
                file = %path.display(),
                dropped = parsed.dropped_rows,
                "Dropped non-numeric rows"
            );
        }
        if parsed.rows.len() != window_size {
            warn!(
                file = %path.display(),
                rows = parsed.rows.len(),
                expected = window_size,
                "Skipping window with wrong shape"
            );
            *skipped += 1;
            return;
        }

        let window = match Window::new(parsed.rows, n_channels) {
            Ok(w) => w,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping malformed window");
                *skipped += 1;
                return;
            }
        };

        let window = if self.config.filter.apply_gravity_filter {
            match GravityFilter::new(self.config.filter.gravity_alpha).apply(&window) {
                Ok(w) => w,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "Skipping unfilterable window");
                    *skipped += 1;
                    return;
                }
            }
        } else {
            window
        };

        windows.push(LabeledWindow {
            window,
            label: label.to_string(),
        });
    }
}

fn is_csv(path: &Path) -> bool {
    path.extension().map(|e| e == "csv").unwrap_or(false)
}
