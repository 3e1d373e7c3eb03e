//! MotionSense - Wearable Activity Recognition
//!
//! Activity-recognition pipeline for 6-channel accelerometer/gyroscope
//! recordings.
//!
//! # Usage
//!
//! ```bash
//! # Slice raw recordings into fixed-size windows
//! motionsense segment --input recordings/ --output windows/ --overlap
//!
//! # Train an artifact from a labeled window corpus
//! motionsense train --corpus windows/ --artifact data/model.json
//!
//! # Evaluate the artifact against labeled trial directories
//! motionsense evaluate --trials trials/ --artifact data/model.json
//!
//! # Serve the HTTP API
//! motionsense serve --artifact data/model.json
//! ```
//!
//! # Environment Variables
//!
//! - `MOTIONSENSE_CONFIG`: Path to a TOML config file
//! - `MOTIONSENSE_CORS_ORIGINS`: Comma-separated CORS origins for development
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use motionsense::api::{create_app, AppState};
use motionsense::artifact::ClassifierArtifact;
use motionsense::config::PipelineConfig;
use motionsense::evaluation::{load_trials, EvaluationAggregator};
use motionsense::labels::CodeDecoder;
use motionsense::segmentation;
use motionsense::training::TrainingOrchestrator;
use motionsense::types::LabeledWindow;
use std::path::PathBuf;
use tracing::{info, warn};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "motionsense")]
#[command(about = "Wearable activity recognition pipeline")]
#[command(version)]
struct CliArgs {
    /// Override the config file path (also settable via MOTIONSENSE_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Serve the prediction/training/evaluation HTTP API
    Serve {
        /// Artifact to load at startup; omit to start without a model
        #[arg(long)]
        artifact: Option<PathBuf>,

        /// Override the bind address (default from config, "0.0.0.0:10000")
        #[arg(short, long)]
        addr: Option<String>,
    },

    /// Train a classifier artifact from a labeled window corpus
    Train {
        /// Corpus root: per-activity subdirectories of window CSVs
        #[arg(long)]
        corpus: PathBuf,

        /// Where to write the trained artifact
        #[arg(long, default_value = "data/model.json")]
        artifact: PathBuf,
    },

    /// Evaluate a trained artifact against labeled trial directories
    Evaluate {
        /// Trials root: one subdirectory per trial, name encodes the label
        #[arg(long)]
        trials: PathBuf,

        /// Artifact to evaluate
        #[arg(long, default_value = "data/model.json")]
        artifact: PathBuf,

        /// Score each window directly instead of per-trial majority vote
        #[arg(long)]
        per_window: bool,
    },

    /// Slice raw recordings into fixed-size window CSVs
    Segment {
        /// Directory of recording CSVs (class subdirectories preserved)
        #[arg(long)]
        input: PathBuf,

        /// Output directory for per-window files
        #[arg(long)]
        output: PathBuf,

        /// Use a 50%-overlap step instead of back-to-back windows
        #[arg(long)]
        overlap: bool,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    let config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PipelineConfig::load().context("Failed to load config")?,
    };

    match args.command {
        Command::Serve { artifact, addr } => run_serve(config, artifact, addr).await,
        Command::Train { corpus, artifact } => run_train(config, &corpus, &artifact),
        Command::Evaluate {
            trials,
            artifact,
            per_window,
        } => run_evaluate(config, &trials, &artifact, per_window),
        Command::Segment {
            input,
            output,
            overlap,
        } => run_segment(config, &input, &output, overlap),
    }
}

// ============================================================================
// Subcommands
// ============================================================================

async fn run_serve(
    config: PipelineConfig,
    artifact_path: Option<PathBuf>,
    addr: Option<String>,
) -> Result<()> {
    let default_artifact = PathBuf::from("data/model.json");
    let artifact_path = artifact_path.unwrap_or(default_artifact);

    let artifact = if artifact_path.exists() {
        Some(
            ClassifierArtifact::load(&artifact_path)
                .with_context(|| format!("Failed to load {}", artifact_path.display()))?,
        )
    } else {
        warn!(
            path = %artifact_path.display(),
            "No artifact found; /predict and /evaluate return 503 until /train runs"
        );
        None
    };

    let server_addr = addr.unwrap_or_else(|| config.server.bind_addr.clone());
    let state = AppState::new(config, artifact, artifact_path);
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("Failed to bind to {server_addr}"))?;
    info!("HTTP server listening on {server_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received shutdown signal");
        })
        .await
        .context("HTTP server error")?;

    Ok(())
}

fn run_train(config: PipelineConfig, corpus: &PathBuf, artifact_path: &PathBuf) -> Result<()> {
    let (artifact, report) = TrainingOrchestrator::new(config)
        .train(corpus)
        .context("Training failed")?;
    artifact
        .save(artifact_path)
        .with_context(|| format!("Failed to save {}", artifact_path.display()))?;

    info!(
        classes = ?report.classes,
        windows = report.windows_used,
        skipped = report.windows_skipped,
        artifact = %artifact_path.display(),
        "Training complete"
    );
    Ok(())
}

fn run_evaluate(
    config: PipelineConfig,
    trials_dir: &PathBuf,
    artifact_path: &PathBuf,
    per_window: bool,
) -> Result<()> {
    let artifact = ClassifierArtifact::load(artifact_path)
        .with_context(|| format!("Failed to load {}", artifact_path.display()))?;

    let decoder = CodeDecoder::default();
    let (trials, load_skipped) = load_trials(trials_dir, &decoder, config.window.n_channels)
        .context("Failed to load trials")?;

    let mut tally = if per_window {
        let windows: Vec<LabeledWindow> = trials
            .into_iter()
            .flat_map(|t| {
                let label = t.true_label;
                t.windows.into_iter().map(move |window| LabeledWindow {
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

    for (activity, count) in &tally.activities {
        info!(
            activity,
            passed = count.passed,
            failed = count.failed(),
            total = count.total,
            accuracy = format!("{:.1}%", count.accuracy_pct()),
            "Activity result"
        );
    }
    info!(
        overall = format!("{:.1}%", tally.overall_accuracy_pct()),
        skipped = tally.skipped,
        "Evaluation complete"
    );
    Ok(())
}

fn run_segment(
    config: PipelineConfig,
    input: &PathBuf,
    output: &PathBuf,
    overlap: bool,
) -> Result<()> {
    let window_size = config.window.window_size;
    let step = if overlap {
        (window_size / 2).max(1)
    } else {
        config.window.effective_step()
    };

    let summary = segmentation::slice_corpus(
        input,
        output,
        window_size,
        step,
        config.window.n_channels,
    )
    .context("Segmentation failed")?;

    info!(
        recordings = summary.recordings,
        windows = summary.windows_written,
        skipped = summary.skipped_files,
        "Segmentation complete"
    );
    Ok(())
}
