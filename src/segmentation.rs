//! Window segmentation
//!
//! Slices a continuous sensor stream into fixed-length windows, optionally
//! overlapping. Windows are emitted left to right; trailing samples that
//! cannot fill a complete window are dropped, never zero-padded.
//!
//! `step = window_size` gives non-overlapping windows; `step = window_size/2`
//! gives the 50%-overlap variant. Re-running [`segment`] over the same rows
//! yields the same sequence.
//!
//! Also provides the corpus-level slicer behind the `segment` CLI
//! subcommand: every recording CSV in a directory becomes a subdirectory of
//! per-window CSV files (`window_1.csv`, `window_2.csv`, ...).

use crate::ingest::{self, IngestError};
use crate::types::{Window, WindowShapeError};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum SegmentationError {
    #[error(transparent)]
    Shape(#[from] WindowShapeError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("segmentation I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write window CSV {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("step must be > 0")]
    ZeroStep,
}

// ============================================================================
// Stream Segmentation
// ============================================================================

/// Lazy, restartable iterator over the windows of one stream.
///
/// Each call to `next` validates the rows of the upcoming window; a row with
/// the wrong channel count surfaces as a [`WindowShapeError`] and ends the
/// iteration.
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    rows: &'a [Vec<f64>],
    window_size: usize,
    step: usize,
    n_channels: usize,
    cursor: usize,
    failed: bool,
}

impl<'a> Iterator for Segments<'a> {
    type Item = Result<Window, WindowShapeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.cursor + self.window_size > self.rows.len() {
            return None;
        }
        let slice = &self.rows[self.cursor..self.cursor + self.window_size];
        self.cursor += self.step;

        match Window::new(slice.to_vec(), self.n_channels) {
            Ok(window) => Some(Ok(window)),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Segment a stream of samples into windows of `window_size` rows advancing
/// by `step` rows.
pub fn segment<'a>(
    rows: &'a [Vec<f64>],
    window_size: usize,
    step: usize,
    n_channels: usize,
) -> Result<Segments<'a>, SegmentationError> {
    if step == 0 {
        return Err(SegmentationError::ZeroStep);
    }
    Ok(Segments {
        rows,
        window_size,
        step,
        n_channels,
        cursor: 0,
        failed: false,
    })
}

/// Number of windows segmentation will produce for a stream of `len` rows.
pub fn window_count(len: usize, window_size: usize, step: usize) -> usize {
    if window_size == 0 || step == 0 || len < window_size {
        0
    } else {
        (len - window_size) / step + 1
    }
}

// ============================================================================
// Corpus Slicing
// ============================================================================

/// Summary of one corpus slicing run.
#[derive(Debug, Clone, Default)]
pub struct SliceSummary {
    pub recordings: usize,
    pub windows_written: usize,
    pub skipped_files: usize,
}

/// Slice one recording CSV into per-window CSVs under `output_dir`.
///
/// Returns the number of windows written. Rows with non-numeric values are
/// dropped before segmentation (and logged); trailing partial windows are
/// dropped per the segmentation contract.
pub fn slice_recording<P: AsRef<Path>, Q: AsRef<Path>>(
    input_csv: P,
    output_dir: Q,
    window_size: usize,
    step: usize,
    n_channels: usize,
) -> Result<usize, SegmentationError> {
    let input_csv = input_csv.as_ref();
    let output_dir = output_dir.as_ref();

    let parsed = ingest::read_sensor_rows(input_csv, n_channels)?;
    if parsed.dropped_rows > 0 {
        warn!(
            file = %input_csv.display(),
            dropped = parsed.dropped_rows,
            "Dropped non-numeric rows before segmentation"
        );
    }

    std::fs::create_dir_all(output_dir).map_err(|source| SegmentationError::Io {
        path: output_dir.display().to_string(),
        source,
    })?;

    let mut written = 0usize;
    for (idx, window) in segment(&parsed.rows, window_size, step, n_channels)?.enumerate() {
        let window = window?;
        let out_path = output_dir.join(format!("window_{}.csv", idx + 1));
        let mut writer =
            csv::Writer::from_path(&out_path).map_err(|source| SegmentationError::Write {
                path: out_path.display().to_string(),
                source,
            })?;
        for row in window.samples() {
            writer
                .serialize(row)
                .map_err(|source| SegmentationError::Write {
                    path: out_path.display().to_string(),
                    source,
                })?;
        }
        writer.flush().map_err(|source| SegmentationError::Io {
            path: out_path.display().to_string(),
            source,
        })?;
        written += 1;
    }

    debug!(file = %input_csv.display(), windows = written, "Sliced recording");
    Ok(written)
}

/// Slice every `*.csv` recording in `input_dir` (and its class subdirectories)
/// into per-window files. Each recording gets its own output subdirectory
/// named after the file stem, preserving any class-directory level.
///
/// A recording that fails to parse is skipped and counted, never fatal to the
/// whole run.
pub fn slice_corpus<P: AsRef<Path>, Q: AsRef<Path>>(
    input_dir: P,
    output_dir: Q,
    window_size: usize,
    step: usize,
    n_channels: usize,
) -> Result<SliceSummary, SegmentationError> {
    let input_dir = input_dir.as_ref();
    let output_dir = output_dir.as_ref();
    let mut summary = SliceSummary::default();

    let mut pending: Vec<(std::path::PathBuf, std::path::PathBuf)> = vec![];
    collect_recordings(input_dir, output_dir, &mut pending)?;
    // Deterministic processing order regardless of filesystem enumeration.
    pending.sort();

    for (input_csv, out_subdir) in pending {
        match slice_recording(&input_csv, &out_subdir, window_size, step, n_channels) {
            Ok(windows) => {
                summary.recordings += 1;
                summary.windows_written += windows;
            }
            Err(e) => {
                warn!(file = %input_csv.display(), error = %e, "Skipping unreadable recording");
                summary.skipped_files += 1;
            }
        }
    }

    info!(
        recordings = summary.recordings,
        windows = summary.windows_written,
        skipped = summary.skipped_files,
        "Corpus slicing complete"
    );
    Ok(summary)
}

/// Gather `(recording, output_subdir)` pairs one class-directory level deep.
fn collect_recordings(
    input_dir: &Path,
    output_dir: &Path,
    pending: &mut Vec<(std::path::PathBuf, std::path::PathBuf)>,
) -> Result<(), SegmentationError> {
    let entries = std::fs::read_dir(input_dir).map_err(|source| SegmentationError::Io {
        path: input_dir.display().to_string(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| SegmentationError::Io {
            path: input_dir.display().to_string(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            let class_out = output_dir.join(entry.file_name());
            collect_recordings(&path, &class_out, pending)?;
        } else if path.extension().map(|e| e == "csv").unwrap_or(false) {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            pending.push((path.clone(), output_dir.join(stem)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(len: usize) -> Vec<Vec<f64>> {
        (0..len).map(|i| vec![i as f64; 6]).collect()
    }

    #[test]
    fn non_overlapping_count() {
        let stream = rows(1000);
        let windows: Vec<_> = segment(&stream, 100, 100, 6)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(windows.len(), 10);
        assert_eq!(window_count(1000, 100, 100), 10);
    }

    #[test]
    fn fifty_percent_overlap_count() {
        let stream = rows(1000);
        let windows: Vec<_> = segment(&stream, 100, 50, 6)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(windows.len(), 19);
        assert_eq!(window_count(1000, 100, 50), 19);
    }

    #[test]
    fn trailing_samples_are_dropped() {
        let stream = rows(250);
        let windows: Vec<_> = segment(&stream, 100, 100, 6)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(windows.len(), 2);
        // Last window ends at row 199; rows 200..249 are dropped.
        assert_eq!(windows[1].samples()[99][0], 199.0);
    }

    #[test]
    fn stream_shorter_than_window_yields_nothing() {
        let stream = rows(99);
        assert_eq!(segment(&stream, 100, 100, 6).unwrap().count(), 0);
        assert_eq!(window_count(99, 100, 50), 0);
    }

    #[test]
    fn segmentation_is_restartable() {
        let stream = rows(300);
        let first: Vec<_> = segment(&stream, 100, 50, 6)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        let second: Vec<_> = segment(&stream, 100, 50, 6)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn bad_row_surfaces_shape_error() {
        let mut stream = rows(100);
        stream[42] = vec![0.0; 5];
        let result: Result<Vec<_>, _> = segment(&stream, 100, 100, 6).unwrap().collect();
        let err = result.unwrap_err();
        assert_eq!(err.row, 42);
        assert_eq!(err.actual, 5);
    }

    #[test]
    fn zero_step_is_rejected() {
        let stream = rows(100);
        assert!(matches!(
            segment(&stream, 100, 0, 6),
            Err(SegmentationError::ZeroStep)
        ));
    }

    #[test]
    fn overlapping_windows_share_rows() {
        let stream = rows(150);
        let windows: Vec<_> = segment(&stream, 100, 50, 6)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(windows.len(), 2);
        // Second window starts at row 50.
        assert_eq!(windows[1].samples()[0][0], 50.0);
    }
}
