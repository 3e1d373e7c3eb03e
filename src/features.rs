//! Statistical feature extraction
//!
//! Reduces one window to a fixed-length feature vector: for each channel, in
//! canonical order, the 5-tuple `(mean, population std, rms, max, min)`, then
//! one Signal Magnitude Area scalar computed from the three accelerometer
//! channels:
//!
//! ```text
//! SMA = sum over samples of (|accX| + |accY| + |accZ|) / window_size
//! ```
//!
//! Note the divisor is the window length only — NOT `3 * window_size`. This
//! replicates the feature definition the existing artifacts were trained
//! with; changing it silently breaks comparability.
//!
//! An optional per-window normalization (min-max, z-score, or max-abs) is
//! applied independently to each channel 5-tuple and to the SMA scalar,
//! using only that tuple's own statistics. This is deliberately per-window
//! (not dataset-level standardization).

use crate::config::Normalization;
use crate::types::{FeatureVector, Window, ACC_CHANNELS, CHANNEL_NAMES};
use statrs::statistics::Statistics;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeatureError {
    #[error("required channel {name:?} (index {index}) is absent: window has {available} channels")]
    MissingChannel {
        name: String,
        index: usize,
        available: usize,
    },

    #[error("window has no rows left to extract features from")]
    EmptyWindow,
}

/// Deterministic window-to-feature-vector reducer.
#[derive(Debug, Clone, Copy)]
pub struct FeatureExtractor {
    n_channels: usize,
    normalization: Normalization,
}

impl FeatureExtractor {
    pub fn new(n_channels: usize, normalization: Normalization) -> Self {
        Self {
            n_channels,
            normalization,
        }
    }

    /// Extract the `5 * n_channels + 1` feature vector from one window.
    ///
    /// Same input always produces a bit-identical output.
    pub fn extract(&self, window: &Window) -> Result<FeatureVector, FeatureError> {
        if window.is_empty() {
            return Err(FeatureError::EmptyWindow);
        }
        if window.n_channels() < self.n_channels {
            let index = window.n_channels();
            return Err(FeatureError::MissingChannel {
                name: CHANNEL_NAMES
                    .get(index)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("channel_{index}")),
                index,
                available: window.n_channels(),
            });
        }

        let mut values = Vec::with_capacity(FeatureVector::expected_len(self.n_channels));

        for c in 0..self.n_channels {
            let series = window
                .channel(c)
                .expect("channel bound checked above");
            let mut tuple = [
                Statistics::mean(series.iter()),
                Statistics::population_std_dev(series.iter()),
                Statistics::quadratic_mean(series.iter()), // RMS
                Statistics::max(series.iter()),
                Statistics::min(series.iter()),
            ];
            normalize_in_place(&mut tuple, self.normalization);
            values.extend_from_slice(&tuple);
        }

        let acc = ACC_CHANNELS.min(self.n_channels);
        let abs_sum: f64 = window
            .samples()
            .iter()
            .map(|row| row[..acc].iter().map(|v| v.abs()).sum::<f64>())
            .sum();
        let mut sma = [abs_sum / window.len() as f64];
        normalize_in_place(&mut sma, self.normalization);
        values.push(sma[0]);

        Ok(FeatureVector(values))
    }
}

/// Normalize one tuple in place using only its own statistics.
fn normalize_in_place(tuple: &mut [f64], mode: Normalization) {
    match mode {
        Normalization::None => {}
        Normalization::MinMax => {
            let min = tuple.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = tuple.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let range = max - min;
            for v in tuple.iter_mut() {
                *v = if range == 0.0 { 0.0 } else { (*v - min) / range };
            }
        }
        Normalization::ZScore => {
            let n = tuple.len() as f64;
            let mean = tuple.iter().sum::<f64>() / n;
            let var = tuple.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            for v in tuple.iter_mut() {
                *v = if std == 0.0 { 0.0 } else { (*v - mean) / std };
            }
        }
        Normalization::MaxAbs => {
            let max_abs = tuple.iter().map(|v| v.abs()).fold(0.0f64, f64::max);
            for v in tuple.iter_mut() {
                *v = if max_abs == 0.0 { 0.0 } else { *v / max_abs };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> FeatureExtractor {
        FeatureExtractor::new(6, Normalization::None)
    }

    fn constant_window(acc: [f64; 3], gyro: [f64; 3], len: usize) -> Window {
        let row = vec![acc[0], acc[1], acc[2], gyro[0], gyro[1], gyro[2]];
        Window::new(vec![row; len], 6).unwrap()
    }

    #[test]
    fn feature_vector_has_expected_length() {
        let w = constant_window([1.0, 0.0, 0.0], [0.0, 0.0, 0.0], 100);
        let fv = extractor().extract(&w).unwrap();
        assert_eq!(fv.len(), 31);
        assert_eq!(FeatureVector::expected_len(6), 31);
    }

    #[test]
    fn extraction_is_deterministic() {
        let w = Window::new(
            (0..100)
                .map(|i| vec![i as f64 * 0.1, -0.3, 9.81, 0.01, 0.02, 0.03])
                .collect(),
            6,
        )
        .unwrap();
        let a = extractor().extract(&w).unwrap();
        let b = extractor().extract(&w).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn constant_channel_statistics() {
        let w = constant_window([2.0, 0.0, 0.0], [0.0, 0.0, 0.0], 50);
        let fv = extractor().extract(&w).unwrap();
        // accX 5-tuple: mean=2, std=0, rms=2, max=2, min=2
        assert_eq!(&fv.values()[0..5], &[2.0, 0.0, 2.0, 2.0, 2.0]);
        // SMA = sum(|2| + 0 + 0) / 50 = 2
        assert_eq!(fv.values()[30], 2.0);
    }

    #[test]
    fn sma_is_not_divided_by_three() {
        let w = constant_window([1.0, 1.0, 1.0], [0.0, 0.0, 0.0], 10);
        let fv = extractor().extract(&w).unwrap();
        // per-sample |1|+|1|+|1| = 3, summed over 10 rows = 30, / 10 = 3.
        assert_eq!(fv.values()[30], 3.0);
    }

    #[test]
    fn zero_motion_window_gives_zero_acc_features_and_sma() {
        let w = constant_window([0.0, 0.0, 0.0], [0.0, 0.0, 0.0], 100);
        let fv = extractor().extract(&w).unwrap();
        assert!(fv.values()[..15].iter().all(|&v| v == 0.0));
        assert_eq!(fv.values()[30], 0.0);
    }

    #[test]
    fn rms_of_alternating_signal() {
        let samples: Vec<Vec<f64>> = (0..4)
            .map(|i| {
                let v = if i % 2 == 0 { 3.0 } else { -3.0 };
                vec![v, 0.0, 0.0, 0.0, 0.0, 0.0]
            })
            .collect();
        let w = Window::new(samples, 6).unwrap();
        let fv = extractor().extract(&w).unwrap();
        // accX: mean=0, pop-std=3, rms=3, max=3, min=-3
        assert!((fv.values()[0]).abs() < 1e-12);
        assert!((fv.values()[1] - 3.0).abs() < 1e-12);
        assert!((fv.values()[2] - 3.0).abs() < 1e-12);
        assert_eq!(fv.values()[3], 3.0);
        assert_eq!(fv.values()[4], -3.0);
    }

    #[test]
    fn missing_channel_is_rejected() {
        let w = Window::new(vec![vec![1.0; 4]; 10], 4).unwrap();
        let err = extractor().extract(&w).unwrap_err();
        match err {
            FeatureError::MissingChannel { name, index, available } => {
                assert_eq!(name, "gyro_y");
                assert_eq!(index, 4);
                assert_eq!(available, 4);
            }
            other => panic!("expected MissingChannel, got {other:?}"),
        }
    }

    #[test]
    fn empty_window_is_rejected() {
        let w = Window::new(vec![], 6).unwrap();
        assert_eq!(extractor().extract(&w).unwrap_err(), FeatureError::EmptyWindow);
    }

    #[test]
    fn min_max_normalization_uses_tuple_statistics_only() {
        let w = Window::new(
            (0..10)
                .map(|i| vec![i as f64, 0.0, 0.0, 0.0, 0.0, 0.0])
                .collect(),
            6,
        )
        .unwrap();
        let fv = FeatureExtractor::new(6, Normalization::MinMax)
            .extract(&w)
            .unwrap();
        let tuple = &fv.values()[0..5];
        // min of tuple maps to 0, max maps to 1.
        assert!(tuple.iter().cloned().fold(f64::INFINITY, f64::min) == 0.0);
        assert!(tuple.iter().cloned().fold(f64::NEG_INFINITY, f64::max) == 1.0);
        assert!(tuple.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn max_abs_normalization_bounds_tuples() {
        let w = Window::new(
            (0..10)
                .map(|i| vec![-(i as f64), 2.0, -3.0, 0.5, 0.5, 0.5])
                .collect(),
            6,
        )
        .unwrap();
        let fv = FeatureExtractor::new(6, Normalization::MaxAbs)
            .extract(&w)
            .unwrap();
        assert!(fv.values().iter().all(|v| v.abs() <= 1.0 + 1e-12));
    }
}
