//! Tabular linear-kernel margin classifier
//!
//! One-vs-rest linear classifier over standardized feature vectors, trained
//! by subgradient descent on the hinge loss with light L2 regularization.
//! Prediction takes the arg-max class over per-class margins; the reported
//! confidence is the softmax of the margins, which is monotonic in the
//! winning margin.

use super::scaler::StandardScaler;
use super::{argmax, softmax, ClassifierError, InputShape, RawPrediction, TrainOptions};
use rand::prelude::SliceRandom;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// L2 weight decay applied per update.
const LAMBDA: f64 = 1e-4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearClassifier {
    scaler: StandardScaler,
    /// Per-class weight rows, `[n_classes][n_features]`.
    weights: Vec<Vec<f64>>,
    biases: Vec<f64>,
}

impl LinearClassifier {
    /// Train on pre-extracted feature vectors.
    ///
    /// The standardization scaler is fit on the training partition only and
    /// stored with the model so inference applies the identical transform.
    pub fn train(
        features: &[Vec<f64>],
        labels: &[usize],
        n_classes: usize,
        opts: &TrainOptions,
    ) -> Result<Self, ClassifierError> {
        if features.is_empty() || n_classes == 0 {
            return Err(ClassifierError::EmptyDataset);
        }
        if let Some(&bad) = labels.iter().find(|&&l| l >= n_classes) {
            return Err(ClassifierError::LabelOutOfRange {
                index: bad,
                n_classes,
            });
        }

        let scaler = StandardScaler::fit(features);
        let scaled: Vec<Vec<f64>> = features.iter().map(|f| scaler.transform(f)).collect();
        let n_features = scaler.n_features();

        let mut weights = vec![vec![0.0f64; n_features]; n_classes];
        let mut biases = vec![0.0f64; n_classes];

        let mut rng = StdRng::seed_from_u64(opts.seed);
        let mut order: Vec<usize> = (0..scaled.len()).collect();
        let lr = opts.learning_rate;

        for epoch in 0..opts.epochs {
            order.shuffle(&mut rng);
            let mut hinge_sum = 0.0;

            for &idx in &order {
                let x = &scaled[idx];
                let target = labels[idx];

                for k in 0..n_classes {
                    let y = if k == target { 1.0 } else { -1.0 };
                    let margin = y * (dot(&weights[k], x) + biases[k]);

                    // Weight decay happens every step; the hinge subgradient
                    // only when the sample is inside the margin.
                    for w in weights[k].iter_mut() {
                        *w *= 1.0 - lr * LAMBDA;
                    }
                    if margin < 1.0 {
                        hinge_sum += 1.0 - margin;
                        for (w, xv) in weights[k].iter_mut().zip(x) {
                            *w += lr * y * xv;
                        }
                        biases[k] += lr * y;
                    }
                }
            }

            debug!(
                epoch,
                hinge_loss = hinge_sum / scaled.len() as f64,
                "Linear classifier epoch complete"
            );
        }

        info!(
            samples = features.len(),
            n_features, n_classes, "Trained linear classifier"
        );
        Ok(Self {
            scaler,
            weights,
            biases,
        })
    }

    pub fn n_classes(&self) -> usize {
        self.weights.len()
    }

    pub fn expected_input_shape(&self) -> InputShape {
        InputShape::Tabular {
            n_features: self.scaler.n_features(),
        }
    }

    /// Predict one feature vector, rejecting a length mismatch.
    pub fn predict(&self, features: &[f64]) -> Result<RawPrediction, ClassifierError> {
        if features.len() != self.scaler.n_features() {
            return Err(ClassifierError::ShapeMismatch {
                expected: self.expected_input_shape(),
                actual: InputShape::Tabular {
                    n_features: features.len(),
                },
            });
        }

        let x = self.scaler.transform(features);
        let margins: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.biases)
            .map(|(w, b)| dot(w, &x) + b)
            .collect();

        Ok(RawPrediction {
            class_index: argmax(&margins),
            probabilities: softmax(&margins),
        })
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two well-separated clusters in feature space.
    fn toy_dataset() -> (Vec<Vec<f64>>, Vec<usize>) {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let jitter = (i % 7) as f64 * 0.01;
            features.push(vec![1.0 + jitter, 0.0, 0.5]);
            labels.push(0);
            features.push(vec![-1.0 - jitter, 1.0, -0.5]);
            labels.push(1);
        }
        (features, labels)
    }

    fn quick_opts() -> TrainOptions {
        TrainOptions {
            epochs: 30,
            learning_rate: 0.05,
            ..TrainOptions::default()
        }
    }

    #[test]
    fn separable_classes_are_learned() {
        let (features, labels) = toy_dataset();
        let model = LinearClassifier::train(&features, &labels, 2, &quick_opts()).unwrap();

        let p0 = model.predict(&[1.1, 0.0, 0.5]).unwrap();
        let p1 = model.predict(&[-1.2, 1.0, -0.5]).unwrap();
        assert_eq!(p0.class_index, 0);
        assert_eq!(p1.class_index, 1);
        assert!(p0.probabilities[0] > 0.5);
    }

    #[test]
    fn probabilities_are_a_distribution() {
        let (features, labels) = toy_dataset();
        let model = LinearClassifier::train(&features, &labels, 2, &quick_opts()).unwrap();
        let p = model.predict(&[0.2, 0.4, 0.0]).unwrap();
        assert_eq!(p.probabilities.len(), 2);
        assert!((p.probabilities.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn training_is_reproducible_for_a_seed() {
        let (features, labels) = toy_dataset();
        let a = LinearClassifier::train(&features, &labels, 2, &quick_opts()).unwrap();
        let b = LinearClassifier::train(&features, &labels, 2, &quick_opts()).unwrap();
        let pa = a.predict(&[0.3, 0.1, 0.2]).unwrap();
        let pb = b.predict(&[0.3, 0.1, 0.2]).unwrap();
        assert_eq!(pa.probabilities, pb.probabilities);
    }

    #[test]
    fn wrong_feature_length_is_rejected() {
        let (features, labels) = toy_dataset();
        let model = LinearClassifier::train(&features, &labels, 2, &quick_opts()).unwrap();
        let err = model.predict(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, ClassifierError::ShapeMismatch { .. }));
    }

    #[test]
    fn empty_dataset_is_rejected() {
        let err = LinearClassifier::train(&[], &[], 2, &TrainOptions::default()).unwrap_err();
        assert!(matches!(err, ClassifierError::EmptyDataset));
    }

    #[test]
    fn out_of_range_label_is_rejected() {
        let err = LinearClassifier::train(
            &[vec![1.0], vec![2.0]],
            &[0, 5],
            2,
            &TrainOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ClassifierError::LabelOutOfRange { index: 5, n_classes: 2 }
        ));
    }
}
