//! Evaluation aggregation
//!
//! Runs a loaded artifact over labeled windows or trials and reduces the
//! predictions to a per-activity pass/fail tally. A run moves through
//! `Idle -> LoadArtifact -> {PerWindow | PerTrialVote} -> Tally -> Done`:
//! artifact load failure is fatal, per-item failures are logged, counted and
//! excluded from the tally.
//!
//! Per-window predictions inside one trial are independent, so they run on
//! the rayon pool; the majority vote only happens after every window of the
//! trial has been predicted.
//!
//! Majority-vote tie-break is deterministic: among tied labels the lowest
//! class index wins, never input order.

use crate::artifact::ClassifierArtifact;
use crate::ingest;
use crate::labels::LabelDecoder;
use crate::types::{EvaluationTally, LabeledWindow, Trial, Window};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("failed to read trial directory {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Stateless driver for one evaluation run.
pub struct EvaluationAggregator;

impl EvaluationAggregator {
    /// Per-trial mode: every window of a trial is predicted, then the trial
    /// verdict is the majority vote across the per-window labels.
    pub fn evaluate_trials(
        artifact: &ClassifierArtifact,
        trials: &[Trial],
    ) -> EvaluationTally {
        let mut tally = EvaluationTally::new();

        for trial in trials {
            if trial.windows.is_empty() {
                warn!(trial = %trial.name, "Skipping trial with no windows");
                tally.record_skipped();
                continue;
            }

            // All windows must be predicted before the vote.
            let votes: Vec<usize> = trial
                .windows
                .par_iter()
                .filter_map(|w| match artifact.predict(w) {
                    Ok(p) => Some(p.class_index),
                    Err(e) => {
                        warn!(trial = %trial.name, error = %e, "Excluding window from vote");
                        None
                    }
                })
                .collect();

            let Some(verdict_idx) = majority_vote(&votes) else {
                warn!(trial = %trial.name, "Every window failed, skipping trial");
                tally.record_skipped();
                continue;
            };
            let verdict = artifact.labels().label_at(verdict_idx).unwrap_or("unknown");

            debug!(
                trial = %trial.name,
                verdict,
                expected = %trial.true_label,
                votes = votes.len(),
                "Trial verdict"
            );
            tally.record(&trial.true_label, verdict == trial.true_label);
        }

        info!(
            trials = trials.len(),
            skipped = tally.skipped,
            accuracy = tally.overall_accuracy_pct(),
            "Per-trial evaluation complete"
        );
        tally
    }

    /// Per-window mode: no grouping, no voting — every window is scored
    /// directly against its own label.
    pub fn evaluate_windows(
        artifact: &ClassifierArtifact,
        windows: &[LabeledWindow],
    ) -> EvaluationTally {
        let outcomes: Vec<Option<(String, bool)>> = windows
            .par_iter()
            .map(|lw| match artifact.predict(&lw.window) {
                Ok(p) => Some((lw.label.clone(), p.label == lw.label)),
                Err(e) => {
                    warn!(error = %e, "Excluding window from tally");
                    None
                }
            })
            .collect();

        let mut tally = EvaluationTally::new();
        for outcome in outcomes {
            match outcome {
                Some((label, passed)) => tally.record(&label, passed),
                None => tally.record_skipped(),
            }
        }

        info!(
            windows = windows.len(),
            skipped = tally.skipped,
            accuracy = tally.overall_accuracy_pct(),
            "Per-window evaluation complete"
        );
        tally
    }
}

/// Majority vote over class indices. Ties resolve to the lowest class index.
pub fn majority_vote(votes: &[usize]) -> Option<usize> {
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for &v in votes {
        *counts.entry(v).or_default() += 1;
    }
    // BTreeMap iterates in ascending key order, so a strict `>` keeps the
    // lowest index among tied labels.
    let mut best: Option<(usize, usize)> = None;
    for (idx, count) in counts {
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((idx, count)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Load labeled trials from a directory: each subdirectory is one trial, its
/// name decoded to the ground-truth label, its CSV files the windows.
///
/// Returns the trials plus the count of skipped items (unlabeled or
/// unreadable). Never fatal on a single bad trial.
pub fn load_trials(
    dir: &Path,
    decoder: &dyn LabelDecoder,
    n_channels: usize,
) -> Result<(Vec<Trial>, usize), EvaluationError> {
    let mut subdirs: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|source| EvaluationError::Io {
            path: dir.display().to_string(),
            source,
        })?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    subdirs.sort();

    let mut trials = Vec::new();
    let mut skipped = 0usize;

    for subdir in subdirs {
        let name = subdir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let true_label = match decoder.decode(&name) {
            Ok(label) => label,
            Err(e) => {
                warn!(trial = %name, error = %e, "Skipping trial with unknown label");
                skipped += 1;
                continue;
            }
        };

        let mut files: Vec<PathBuf> = match std::fs::read_dir(&subdir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().map(|e| e == "csv").unwrap_or(false))
                .collect(),
            Err(e) => {
                warn!(trial = %name, error = %e, "Skipping unreadable trial directory");
                skipped += 1;
                continue;
            }
        };
        files.sort();

        let mut windows = Vec::new();
        for file in files {
            match ingest::read_sensor_rows(&file, n_channels) {
                Ok(parsed) => match Window::new(parsed.rows, n_channels) {
                    Ok(w) if !w.is_empty() => windows.push(w),
                    _ => {
                        warn!(file = %file.display(), "Skipping empty window file");
                        skipped += 1;
                    }
                },
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "Skipping unreadable window file");
                    skipped += 1;
                }
            }
        }

        trials.push(Trial {
            name,
            true_label,
            windows,
        });
    }

    Ok((trials, skipped))
}
