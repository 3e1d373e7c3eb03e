//! Gravity removal filter
//!
//! First-order recursive high-pass filter that strips the constant gravity
//! component from the accelerometer channels, leaving motion-only
//! acceleration. Gyroscope channels pass through unmodified.
//!
//! ```text
//! gravity[0] = raw_acc[0]
//! gravity[i] = alpha * gravity[i-1] + (1 - alpha) * raw_acc[i]    i >= 1
//! motion[i]  = raw_acc[i] - gravity[i]
//! ```
//!
//! The initial condition makes the very first sample report zero motion.
//! That transient is intentional and must stay bit-for-bit identical across
//! reimplementations — trained artifacts depend on it.
//!
//! The filter is applied independently per window; there is no cross-window
//! state.

use crate::types::{Window, WindowShapeError, ACC_CHANNELS};
use serde::{Deserialize, Serialize};

/// Stateless handle applying the per-window gravity EMA.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GravityFilter {
    pub alpha: f64,
}

impl Default for GravityFilter {
    fn default() -> Self {
        Self { alpha: 0.8 }
    }
}

impl GravityFilter {
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }

    /// Apply gravity removal to the accelerometer channels of one window.
    pub fn apply(&self, window: &Window) -> Result<Window, WindowShapeError> {
        let n_channels = window.n_channels();
        let acc = ACC_CHANNELS.min(n_channels);

        let mut gravity = vec![0.0f64; acc];
        let mut filtered = Vec::with_capacity(window.len());

        for (i, row) in window.samples().iter().enumerate() {
            let mut out = row.clone();
            for c in 0..acc {
                if i == 0 {
                    gravity[c] = row[c];
                } else {
                    gravity[c] = self.alpha * gravity[c] + (1.0 - self.alpha) * row[c];
                }
                out[c] = row[c] - gravity[c];
            }
            filtered.push(out);
        }

        Window::new(filtered, n_channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window_of(samples: Vec<Vec<f64>>) -> Window {
        Window::new(samples, 6).unwrap()
    }

    #[test]
    fn first_sample_always_reports_zero_motion() {
        let w = window_of(vec![vec![3.0, -1.5, 9.81, 0.2, 0.3, 0.4], vec![1.0; 6]]);
        let out = GravityFilter::default().apply(&w).unwrap();
        assert_eq!(out.samples()[0][0], 0.0);
        assert_eq!(out.samples()[0][1], 0.0);
        assert_eq!(out.samples()[0][2], 0.0);
    }

    #[test]
    fn constant_input_yields_zero_motion_everywhere() {
        let w = window_of(vec![vec![1.0, 2.0, 9.81, 0.0, 0.0, 0.0]; 100]);
        let out = GravityFilter::default().apply(&w).unwrap();
        for row in out.samples() {
            assert_eq!(row[0], 0.0);
            assert_eq!(row[1], 0.0);
            assert_eq!(row[2], 0.0);
        }
    }

    #[test]
    fn gyro_channels_pass_through_unmodified() {
        let w = window_of(vec![
            vec![1.0, 2.0, 3.0, 0.7, -0.8, 0.9],
            vec![4.0, 5.0, 6.0, 1.7, -1.8, 1.9],
        ]);
        let out = GravityFilter::default().apply(&w).unwrap();
        assert_eq!(out.samples()[0][3..], [0.7, -0.8, 0.9]);
        assert_eq!(out.samples()[1][3..], [1.7, -1.8, 1.9]);
    }

    #[test]
    fn ema_recursion_matches_reference_values() {
        // raw accX: [1, 2] with alpha 0.8:
        //   gravity[0] = 1           motion[0] = 0
        //   gravity[1] = 0.8*1 + 0.2*2 = 1.2   motion[1] = 0.8
        let w = window_of(vec![
            vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            vec![2.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        ]);
        let out = GravityFilter::new(0.8).apply(&w).unwrap();
        assert!((out.samples()[1][0] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn windows_are_filtered_independently() {
        let w = window_of(vec![vec![5.0, 0.0, 0.0, 0.0, 0.0, 0.0]; 10]);
        let filter = GravityFilter::default();
        let a = filter.apply(&w).unwrap();
        let b = filter.apply(&w).unwrap();
        // No cross-window memory: identical inputs give identical outputs.
        assert_eq!(a, b);
        assert_eq!(a.samples()[0][0], 0.0);
    }
}
