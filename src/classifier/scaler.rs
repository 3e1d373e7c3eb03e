//! Train-set standardization
//!
//! Both classifier variants standardize their inputs with statistics fit on
//! the training set only, stored inside the model so inference applies the
//! identical transform.

use crate::types::Window;
use serde::{Deserialize, Serialize};

/// Zero-mean / unit-variance scaling per feature column (tabular variant).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    /// Fit column means and population standard deviations. Columns with
    /// zero variance scale by 1 so they pass through centered.
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let n_cols = rows.first().map(Vec::len).unwrap_or(0);
        let n = rows.len().max(1) as f64;

        let mut means = vec![0.0; n_cols];
        for row in rows {
            for (m, v) in means.iter_mut().zip(row) {
                *m += v;
            }
        }
        for m in &mut means {
            *m /= n;
        }

        let mut stds = vec![0.0; n_cols];
        for row in rows {
            for (s, (v, m)) in stds.iter_mut().zip(row.iter().zip(&means)) {
                *s += (v - m).powi(2);
            }
        }
        for s in &mut stds {
            *s = (*s / n).sqrt();
            if *s == 0.0 {
                *s = 1.0;
            }
        }

        Self { means, stds }
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.stds))
            .map(|(v, (m, s))| (v - m) / s)
            .collect()
    }

    pub fn n_features(&self) -> usize {
        self.means.len()
    }
}

/// Per-channel standardization over raw windows (sequence variant). The
/// equivalent of adapting a normalization layer to the training set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelScaler {
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl ChannelScaler {
    /// Fit per-channel mean/std across every sample of every training window.
    pub fn fit(windows: &[Window], n_channels: usize) -> Self {
        let mut means = vec![0.0f64; n_channels];
        let mut count = 0usize;
        for w in windows {
            for row in w.samples() {
                for c in 0..n_channels {
                    means[c] += row[c];
                }
                count += 1;
            }
        }
        let n = count.max(1) as f64;
        for m in &mut means {
            *m /= n;
        }

        let mut stds = vec![0.0f64; n_channels];
        for w in windows {
            for row in w.samples() {
                for c in 0..n_channels {
                    stds[c] += (row[c] - means[c]).powi(2);
                }
            }
        }
        for s in &mut stds {
            *s = (*s / n).sqrt();
            if *s == 0.0 {
                *s = 1.0;
            }
        }

        Self { means, stds }
    }

    /// Standardize one window into row-major `[time][channel]` values.
    pub fn transform(&self, window: &Window) -> Vec<Vec<f64>> {
        window
            .samples()
            .iter()
            .map(|row| {
                row.iter()
                    .zip(self.means.iter().zip(&self.stds))
                    .map(|(v, (m, s))| (v - m) / s)
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_scaler_centers_and_scales() {
        let rows = vec![vec![1.0, 10.0], vec![3.0, 10.0]];
        let scaler = StandardScaler::fit(&rows);
        let t0 = scaler.transform(&rows[0]);
        let t1 = scaler.transform(&rows[1]);
        // Column 0: mean 2, pop std 1 -> -1 and +1.
        assert!((t0[0] + 1.0).abs() < 1e-12);
        assert!((t1[0] - 1.0).abs() < 1e-12);
        // Zero-variance column passes through centered.
        assert_eq!(t0[1], 0.0);
        assert_eq!(t1[1], 0.0);
    }

    #[test]
    fn channel_scaler_standardizes_each_channel() {
        let w1 = Window::new(vec![vec![0.0, 5.0], vec![2.0, 5.0]], 2).unwrap();
        let w2 = Window::new(vec![vec![4.0, 5.0], vec![6.0, 5.0]], 2).unwrap();
        let scaler = ChannelScaler::fit(&[w1.clone(), w2], 2);
        let t = scaler.transform(&w1);
        // Channel 0: mean 3, values 0 and 2 map below the mean.
        assert!(t[0][0] < 0.0 && t[1][0] < 0.0);
        // Constant channel maps to exactly zero.
        assert_eq!(t[0][1], 0.0);
    }
}
