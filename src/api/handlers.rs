//! Request handlers and shared application state

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::artifact::ClassifierArtifact;
use crate::config::PipelineConfig;
use crate::evaluation::{load_trials, EvaluationAggregator};
use crate::labels::CodeDecoder;
use crate::training::TrainingOrchestrator;
use crate::types::{EvaluationTally, LabeledWindow, Window};

use super::api_error;

/// Shared state: the read-only artifact handle plus the pipeline config.
///
/// The artifact slot is swapped atomically after a successful training run;
/// in-flight predictions keep their own `Arc` and are never disturbed.
#[derive(Clone)]
pub struct AppState {
    pub artifact: Arc<RwLock<Option<Arc<ClassifierArtifact>>>>,
    pub config: Arc<PipelineConfig>,
    /// Where `/train` persists its artifact.
    pub artifact_path: Arc<PathBuf>,
}

impl AppState {
    pub fn new(
        config: PipelineConfig,
        artifact: Option<Arc<ClassifierArtifact>>,
        artifact_path: PathBuf,
    ) -> Self {
        Self {
            artifact: Arc::new(RwLock::new(artifact)),
            config: Arc::new(config),
            artifact_path: Arc::new(artifact_path),
        }
    }
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub artifact_loaded: bool,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let loaded = state.artifact.read().await.is_some();
    Json(HealthResponse {
        status: "ok",
        artifact_loaded: loaded,
    })
}

// ============================================================================
// Predict
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    /// `window_size` samples of `n_channels` numbers each.
    pub window: Vec<Vec<f64>>,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub prediction: String,
    pub confidence: f64,
    /// Ordered per the artifact's class label set.
    pub probabilities: Vec<f64>,
}

pub async fn predict(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> Response {
    let Some(artifact) = state.artifact.read().await.clone() else {
        return api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "no_artifact",
            "no trained artifact is loaded",
        );
    };

    let n_channels = state.config.window.n_channels;
    let window_size = state.config.window.window_size;
    if request.window.len() != window_size
        || request.window.iter().any(|row| row.len() != n_channels)
    {
        let rows = request.window.len();
        let cols = request.window.first().map(Vec::len).unwrap_or(0);
        return api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "shape_mismatch",
            format!("expected ({window_size}, {n_channels}) window, got ({rows}, {cols})"),
        );
    }

    let window = match Window::new(request.window, n_channels) {
        Ok(w) => w,
        Err(e) => {
            return api_error(StatusCode::UNPROCESSABLE_ENTITY, "shape_mismatch", e.to_string())
        }
    };

    // Prediction is CPU-bound; run it off the async runtime with a timeout
    // that abandons the request (never partially mutates anything).
    let timeout = Duration::from_secs(state.config.server.predict_timeout_secs);
    let task = tokio::task::spawn_blocking(move || artifact.predict(&window));
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(prediction))) => Json(PredictResponse {
            prediction: prediction.label,
            confidence: prediction.confidence,
            probabilities: prediction.probabilities,
        })
        .into_response(),
        Ok(Ok(Err(e))) => api_error(StatusCode::UNPROCESSABLE_ENTITY, "predict_failed", e.to_string()),
        Ok(Err(join_err)) => {
            error!(error = %join_err, "Prediction task panicked");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "predict_failed",
                "prediction task failed",
            )
        }
        Err(_) => api_error(
            StatusCode::GATEWAY_TIMEOUT,
            "predict_timeout",
            format!("prediction did not finish within {}s", timeout.as_secs()),
        ),
    }
}

// ============================================================================
// Train
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TrainRequest {
    pub corpus_dir: String,
}

#[derive(Debug, Serialize)]
pub struct TrainResponse {
    pub classes: Vec<String>,
    pub windows_used: usize,
    pub windows_skipped: usize,
    pub artifact_path: String,
}

/// Train a new artifact. Reports success or failure, never partial success —
/// the artifact is persisted and swapped in only after training completed.
pub async fn train(State(state): State<AppState>, Json(request): Json<TrainRequest>) -> Response {
    let config = (*state.config).clone();
    let artifact_path = (*state.artifact_path).clone();
    let corpus_dir = request.corpus_dir.clone();

    let result = tokio::task::spawn_blocking(move || {
        let (artifact, report) = TrainingOrchestrator::new(config).train(&corpus_dir)?;
        artifact.save(&artifact_path).map_err(|e| {
            anyhow::anyhow!("training succeeded but saving the artifact failed: {e}")
        })?;
        Ok::<_, anyhow::Error>((artifact, report))
    })
    .await;

    match result {
        Ok(Ok((artifact, report))) => {
            *state.artifact.write().await = Some(Arc::new(artifact));
            info!(classes = ?report.classes, "Artifact trained and swapped in");
            Json(TrainResponse {
                classes: report.classes,
                windows_used: report.windows_used,
                windows_skipped: report.windows_skipped,
                artifact_path: state.artifact_path.display().to_string(),
            })
            .into_response()
        }
        Ok(Err(e)) => api_error(StatusCode::BAD_REQUEST, "training_failed", e.to_string()),
        Err(join_err) => {
            error!(error = %join_err, "Training task panicked");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "training_failed",
                "training task failed",
            )
        }
    }
}

// ============================================================================
// Evaluate
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub trials_dir: String,
    /// Evaluate window-by-window instead of per-trial majority vote.
    #[serde(default)]
    pub per_window: bool,
}

#[derive(Debug, Serialize)]
pub struct ActivitySummary {
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
    pub accuracy_pct: f64,
}

#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    pub summary: BTreeMap<String, ActivitySummary>,
    pub overall_accuracy_pct: f64,
    pub skipped: usize,
}

impl From<EvaluationTally> for EvaluateResponse {
    fn from(tally: EvaluationTally) -> Self {
        let summary = tally
            .activities
            .iter()
            .map(|(label, count)| {
                (
                    label.clone(),
                    ActivitySummary {
                        passed: count.passed,
                        failed: count.failed(),
                        total: count.total,
                        accuracy_pct: count.accuracy_pct(),
                    },
                )
            })
            .collect();
        Self {
            overall_accuracy_pct: tally.overall_accuracy_pct(),
            skipped: tally.skipped,
            summary,
        }
    }
}

pub async fn evaluate(
    State(state): State<AppState>,
    Json(request): Json<EvaluateRequest>,
) -> Response {
    let Some(artifact) = state.artifact.read().await.clone() else {
        return api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "no_artifact",
            "no trained artifact is loaded",
        );
    };

    let n_channels = state.config.window.n_channels;
    let result = tokio::task::spawn_blocking(move || {
        let decoder = CodeDecoder::default();
        let (trials, load_skipped) =
            load_trials(Path::new(&request.trials_dir), &decoder, n_channels)?;

        let mut tally = if request.per_window {
            let windows: Vec<LabeledWindow> = trials
                .into_iter()
                .flat_map(|t| {
                    let label = t.true_label;
                    t.windows
                        .into_iter()
                        .map(move |window| LabeledWindow {
                            window,
                            label: label.clone(),
                        })
                })
                .collect();
            EvaluationAggregator::evaluate_windows(&artifact, &windows)
        } else {
            EvaluationAggregator::evaluate_trials(&artifact, &trials)
        };
        tally.skipped += load_skipped;
        Ok::<_, crate::evaluation::EvaluationError>(tally)
    })
    .await;

    match result {
        Ok(Ok(tally)) => Json(EvaluateResponse::from(tally)).into_response(),
        Ok(Err(e)) => api_error(StatusCode::BAD_REQUEST, "evaluation_failed", e.to_string()),
        Err(join_err) => {
            error!(error = %join_err, "Evaluation task panicked");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "evaluation_failed",
                "evaluation task failed",
            )
        }
    }
}
