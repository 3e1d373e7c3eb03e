//! Pipeline Roundtrip Tests
//!
//! Exercises the full pipeline end to end with synthetic sensor data:
//! slicing raw recordings into windows, training both classifier variants,
//! artifact save/load, and majority-vote trial evaluation. The synthetic
//! classes are constant-level signals far enough apart that a correctly
//! wired pipeline must separate them perfectly.

use motionsense::config::{ClassifierKind, Normalization, PipelineConfig};
use motionsense::evaluation::{load_trials, EvaluationAggregator};
use motionsense::labels::CodeDecoder;
use motionsense::segmentation;
use motionsense::training::TrainingOrchestrator;
use motionsense::ClassifierArtifact;
use std::fmt::Write as _;
use std::path::Path;

const WINDOW_SIZE: usize = 20;

/// Synthetic 6-channel sample row at a given signal level.
fn row(level: f64, jitter: f64) -> String {
    let v = level + jitter;
    format!("{v},{v},{v},0.0,0.1,-0.1")
}

/// Write one raw recording CSV of `rows` samples at a constant level.
fn write_recording(path: &Path, rows: usize, level: f64) {
    let mut body = String::new();
    for t in 0..rows {
        writeln!(body, "{}", row(level, 0.01 * (t % 4) as f64)).unwrap();
    }
    std::fs::write(path, body).unwrap();
}

/// Write a training corpus: per-activity directories of window CSVs.
fn write_corpus(root: &Path, window_size: usize) {
    for (class, level) in [("walk", 0.5f64), ("run", 3.0f64)] {
        let dir = root.join(class);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..10 {
            let mut body = String::new();
            for t in 0..window_size {
                writeln!(body, "{}", row(level, 0.01 * ((t + i) % 4) as f64)).unwrap();
            }
            std::fs::write(dir.join(format!("window_{i}.csv")), body).unwrap();
        }
    }
}

/// Write a labeled trial directory: name encodes the activity via the
/// `_L_`/`_O_` convention, contents are window CSVs at the given level.
fn write_trial(root: &Path, name: &str, level: f64, windows: usize) {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    for i in 0..windows {
        let mut body = String::new();
        for t in 0..WINDOW_SIZE {
            writeln!(body, "{}", row(level, 0.01 * ((t + i) % 4) as f64)).unwrap();
        }
        std::fs::write(dir.join(format!("window_{}.csv", i + 1)), body).unwrap();
    }
}

fn linear_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.window.window_size = WINDOW_SIZE;
    config.training.classifier = ClassifierKind::Linear;
    config.training.epochs = 30;
    config.training.learning_rate = 0.05;
    config.filter.apply_gravity_filter = false;
    config.features.normalization = Normalization::None;
    config
}

#[test]
fn slicing_produces_expected_window_files() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();

    let class_dir = input.path().join("walk");
    std::fs::create_dir_all(&class_dir).unwrap();
    write_recording(&class_dir.join("session1.csv"), 105, 0.5);

    let summary =
        segmentation::slice_corpus(input.path(), output.path(), WINDOW_SIZE, WINDOW_SIZE, 6)
            .unwrap();

    // 105 rows at window 20, step 20: 5 windows, trailing 5 rows dropped.
    assert_eq!(summary.recordings, 1);
    assert_eq!(summary.windows_written, 5);
    assert_eq!(summary.skipped_files, 0);

    let window_dir = output.path().join("walk").join("session1");
    for i in 1..=5 {
        assert!(window_dir.join(format!("window_{i}.csv")).exists());
    }
    assert!(!window_dir.join("window_6.csv").exists());
}

#[test]
fn overlap_slicing_doubles_coverage() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_recording(&input.path().join("rec.csv"), 100, 1.0);

    let summary =
        segmentation::slice_corpus(input.path(), output.path(), WINDOW_SIZE, WINDOW_SIZE / 2, 6)
            .unwrap();

    // (100 - 20) / 10 + 1 = 9 half-overlapping windows.
    assert_eq!(summary.windows_written, 9);
}

#[test]
fn train_save_load_evaluate_roundtrip() {
    let corpus = tempfile::tempdir().unwrap();
    write_corpus(corpus.path(), WINDOW_SIZE);

    let (artifact, report) = TrainingOrchestrator::new(linear_config())
        .train(corpus.path())
        .unwrap();
    assert_eq!(report.classes, vec!["run", "walk"]);
    assert_eq!(report.windows_used, 20);

    // Persist and reload: predictions must survive the roundtrip.
    let model_dir = tempfile::tempdir().unwrap();
    let model_path = model_dir.path().join("model.json");
    artifact.save(&model_path).unwrap();
    let loaded = ClassifierArtifact::load(&model_path).unwrap();
    assert_eq!(loaded.labels(), artifact.labels());

    // Trials: directory names carry the activity code (_L_ walk, _O_ run).
    let trials_dir = tempfile::tempdir().unwrap();
    write_trial(trials_dir.path(), "sub1_L_1", 0.5, 4);
    write_trial(trials_dir.path(), "sub1_L_2", 0.5, 3);
    write_trial(trials_dir.path(), "sub2_O_1", 3.0, 5);

    let decoder = CodeDecoder::default();
    let (trials, skipped) = load_trials(trials_dir.path(), &decoder, 6).unwrap();
    assert_eq!(trials.len(), 3);
    assert_eq!(skipped, 0);

    let tally = EvaluationAggregator::evaluate_trials(&loaded, &trials);
    assert_eq!(tally.activities["walk"].passed, 2);
    assert_eq!(tally.activities["walk"].total, 2);
    assert_eq!(tally.activities["run"].passed, 1);
    assert_eq!(tally.activities["run"].total, 1);
    assert_eq!(tally.overall_accuracy_pct(), 100.0);
}

#[test]
fn unknown_trial_codes_are_skipped_not_fatal() {
    let corpus = tempfile::tempdir().unwrap();
    write_corpus(corpus.path(), WINDOW_SIZE);
    let (artifact, _) = TrainingOrchestrator::new(linear_config())
        .train(corpus.path())
        .unwrap();

    let trials_dir = tempfile::tempdir().unwrap();
    write_trial(trials_dir.path(), "sub1_L_1", 0.5, 3);
    write_trial(trials_dir.path(), "sub1_X_1", 0.5, 3); // unknown code

    let decoder = CodeDecoder::default();
    let (trials, skipped) = load_trials(trials_dir.path(), &decoder, 6).unwrap();
    assert_eq!(trials.len(), 1);
    assert_eq!(skipped, 1);

    let tally = EvaluationAggregator::evaluate_trials(&artifact, &trials);
    assert_eq!(tally.activities["walk"].total, 1);
}

#[test]
fn conv_variant_trains_and_separates_classes() {
    let corpus = tempfile::tempdir().unwrap();
    write_corpus(corpus.path(), WINDOW_SIZE);

    let mut config = linear_config();
    config.training.classifier = ClassifierKind::Conv;
    config.training.epochs = 15;
    config.training.batch_size = 4;
    config.training.learning_rate = 0.01;

    let (artifact, report) = TrainingOrchestrator::new(config)
        .train(corpus.path())
        .unwrap();
    assert_eq!(report.classes, vec!["run", "walk"]);

    let trials_dir = tempfile::tempdir().unwrap();
    write_trial(trials_dir.path(), "sub1_L_1", 0.5, 3);
    write_trial(trials_dir.path(), "sub1_O_1", 3.0, 3);

    let decoder = CodeDecoder::default();
    let (trials, _) = load_trials(trials_dir.path(), &decoder, 6).unwrap();
    let tally = EvaluationAggregator::evaluate_trials(&artifact, &trials);
    assert_eq!(tally.overall_accuracy_pct(), 100.0);
}

#[test]
fn gravity_filter_setting_travels_with_the_artifact() {
    let corpus = tempfile::tempdir().unwrap();
    write_corpus(corpus.path(), WINDOW_SIZE);

    let mut config = linear_config();
    config.filter.apply_gravity_filter = true;

    let (artifact, _) = TrainingOrchestrator::new(config)
        .train(corpus.path())
        .unwrap();
    assert!(artifact.preprocessing().apply_gravity_filter);

    let model_dir = tempfile::tempdir().unwrap();
    let model_path = model_dir.path().join("model.json");
    artifact.save(&model_path).unwrap();
    let loaded = ClassifierArtifact::load(&model_path).unwrap();
    assert!(loaded.preprocessing().apply_gravity_filter);
}
