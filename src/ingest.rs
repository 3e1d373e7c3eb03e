//! Sensor CSV ingestion
//!
//! Window and recording files are headerless CSVs in one of two layouts:
//!
//! - **6 columns**: `accX, accY, accZ, gyroX, gyroY, gyroZ`
//! - **8 columns**: `time_acc, accX, accY, accZ, time_gyro, gyroX, gyroY, gyroZ`
//!   (raw recorder output; the two timestamp columns are discarded)
//!
//! Rows containing non-numeric values are dropped and counted, not zero
//! filled — a window emptied this way is rejected downstream. A row with too
//! few columns is a structural error for the whole file.

use std::path::Path;
use thiserror::Error;

/// Column indices of the sensor channels in the 8-column recorder layout.
const TIMESTAMPED_LAYOUT: [usize; 6] = [1, 2, 3, 5, 6, 7];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse CSV {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("{path} row {row} has {actual} columns, expected {expected} (the timestamped layout adds 2)")]
    MissingColumns {
        path: String,
        row: usize,
        expected: usize,
        actual: usize,
    },
}

/// Parsed numeric rows from one CSV, plus the count of rows dropped for
/// containing non-numeric values.
#[derive(Debug, Clone)]
pub struct SensorRows {
    pub rows: Vec<Vec<f64>>,
    pub dropped_rows: usize,
}

/// Read one sensor CSV into numeric rows of exactly `n_channels` values.
pub fn read_sensor_rows<P: AsRef<Path>>(
    path: P,
    n_channels: usize,
) -> Result<SensorRows, IngestError> {
    let path_str = path.as_ref().display().to_string();

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(&path)
        .map_err(|e| match e.kind() {
            csv::ErrorKind::Io(_) => IngestError::Io {
                path: path_str.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            },
            _ => IngestError::Csv {
                path: path_str.clone(),
                source: e,
            },
        })?;

    let mut rows = Vec::new();
    let mut dropped_rows = 0usize;

    for (row_idx, record) in reader.records().enumerate() {
        let record = record.map_err(|source| IngestError::Csv {
            path: path_str.clone(),
            source,
        })?;

        // Trailing blank line shows up as a single empty field.
        if record.len() == 1 && record.get(0).map(str::is_empty).unwrap_or(false) {
            continue;
        }

        let fields: Vec<&str> = if record.len() == n_channels {
            record.iter().collect()
        } else if n_channels == 6 && record.len() == n_channels + 2 {
            TIMESTAMPED_LAYOUT
                .iter()
                .map(|&i| record.get(i).unwrap_or(""))
                .collect()
        } else {
            return Err(IngestError::MissingColumns {
                path: path_str,
                row: row_idx,
                expected: n_channels,
                actual: record.len(),
            });
        };

        match fields
            .iter()
            .map(|f| f.parse::<f64>())
            .collect::<Result<Vec<f64>, _>>()
        {
            Ok(values) if values.iter().all(|v| v.is_finite()) => rows.push(values),
            // Non-numeric (or NaN/inf) value: drop the row, keep the file.
            _ => dropped_rows += 1,
        }
    }

    Ok(SensorRows { rows, dropped_rows })
}
