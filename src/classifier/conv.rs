//! Sequence classifier: 1-D convolutional network
//!
//! Feature-hierarchy classifier over raw (gravity-filtered) windows of shape
//! `(window_size, n_channels)`:
//!
//! ```text
//! standardize -> conv1d(32, k=3) + ReLU -> maxpool(2)
//!             -> conv1d(64, k=3) + ReLU -> maxpool(2)
//!             -> flatten -> dense(128) + ReLU -> dense(n_classes) + softmax
//! ```
//!
//! Trained by mini-batch gradient descent on categorical cross-entropy with
//! fixed-patience early stopping: after `patience` non-improving validation
//! epochs, training stops and the weights roll back to the best validation
//! checkpoint.

use super::scaler::ChannelScaler;
use super::{argmax, softmax, ClassifierError, InputShape, RawPrediction, TrainOptions};
use crate::types::Window;
use rand::prelude::SliceRandom;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const CONV1_FILTERS: usize = 32;
const CONV2_FILTERS: usize = 64;
const KERNEL: usize = 3;
const POOL: usize = 2;
const HIDDEN: usize = 128;

/// Minimum improvement in validation loss that resets the patience counter.
const MIN_DELTA: f64 = 1e-6;

// ============================================================================
// Layers
// ============================================================================

/// Valid (no padding) 1-D convolution, weights `[out_ch][kernel][in_ch]`
/// stored flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ConvLayer {
    in_ch: usize,
    out_ch: usize,
    w: Vec<f64>,
    b: Vec<f64>,
}

impl ConvLayer {
    fn init(in_ch: usize, out_ch: usize, rng: &mut StdRng) -> Self {
        let fan_in = (KERNEL * in_ch) as f64;
        let normal = Normal::new(0.0, (2.0 / fan_in).sqrt()).expect("valid std dev");
        Self {
            in_ch,
            out_ch,
            w: (0..out_ch * KERNEL * in_ch)
                .map(|_| normal.sample(rng))
                .collect(),
            b: vec![0.0; out_ch],
        }
    }

    #[inline]
    fn idx(&self, o: usize, dt: usize, i: usize) -> usize {
        (o * KERNEL + dt) * self.in_ch + i
    }

    /// Pre-activation output, `[T - KERNEL + 1][out_ch]`.
    fn forward(&self, x: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let t_out = x.len() + 1 - KERNEL;
        let mut out = vec![vec![0.0; self.out_ch]; t_out];
        for (t, out_row) in out.iter_mut().enumerate() {
            for (o, z) in out_row.iter_mut().enumerate() {
                let mut acc = self.b[o];
                for dt in 0..KERNEL {
                    let row = &x[t + dt];
                    for i in 0..self.in_ch {
                        acc += self.w[self.idx(o, dt, i)] * row[i];
                    }
                }
                *z = acc;
            }
        }
        out
    }

    fn zeros_like(&self) -> ConvGrad {
        ConvGrad {
            w: vec![0.0; self.w.len()],
            b: vec![0.0; self.b.len()],
        }
    }

    fn apply(&mut self, grad: &ConvGrad, scale: f64) {
        for (w, g) in self.w.iter_mut().zip(&grad.w) {
            *w -= scale * g;
        }
        for (b, g) in self.b.iter_mut().zip(&grad.b) {
            *b -= scale * g;
        }
    }
}

#[derive(Debug, Clone)]
struct ConvGrad {
    w: Vec<f64>,
    b: Vec<f64>,
}

/// Fully-connected layer, weights `[out_dim][in_dim]` stored flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DenseLayer {
    in_dim: usize,
    out_dim: usize,
    w: Vec<f64>,
    b: Vec<f64>,
}

impl DenseLayer {
    fn init(in_dim: usize, out_dim: usize, rng: &mut StdRng) -> Self {
        let normal = Normal::new(0.0, (2.0 / in_dim as f64).sqrt()).expect("valid std dev");
        Self {
            in_dim,
            out_dim,
            w: (0..out_dim * in_dim).map(|_| normal.sample(rng)).collect(),
            b: vec![0.0; out_dim],
        }
    }

    fn forward(&self, x: &[f64]) -> Vec<f64> {
        (0..self.out_dim)
            .map(|o| {
                let row = &self.w[o * self.in_dim..(o + 1) * self.in_dim];
                self.b[o] + row.iter().zip(x).map(|(w, v)| w * v).sum::<f64>()
            })
            .collect()
    }

    fn zeros_like(&self) -> DenseGrad {
        DenseGrad {
            w: vec![0.0; self.w.len()],
            b: vec![0.0; self.b.len()],
        }
    }

    fn apply(&mut self, grad: &DenseGrad, scale: f64) {
        for (w, g) in self.w.iter_mut().zip(&grad.w) {
            *w -= scale * g;
        }
        for (b, g) in self.b.iter_mut().zip(&grad.b) {
            *b -= scale * g;
        }
    }
}

#[derive(Debug, Clone)]
struct DenseGrad {
    w: Vec<f64>,
    b: Vec<f64>,
}

fn relu(rows: &mut [Vec<f64>]) {
    for row in rows {
        for v in row.iter_mut() {
            if *v < 0.0 {
                *v = 0.0;
            }
        }
    }
}

/// Max pool over non-overlapping pairs of time steps; trailing odd step is
/// dropped. Returns the pooled rows and, for backprop, which source row won.
fn maxpool(x: &[Vec<f64>]) -> (Vec<Vec<f64>>, Vec<Vec<usize>>) {
    let t_out = x.len() / POOL;
    let channels = x.first().map(Vec::len).unwrap_or(0);
    let mut out = vec![vec![0.0; channels]; t_out];
    let mut winners = vec![vec![0usize; channels]; t_out];
    for t in 0..t_out {
        for c in 0..channels {
            let (a, b) = (x[POOL * t][c], x[POOL * t + 1][c]);
            if a >= b {
                out[t][c] = a;
                winners[t][c] = POOL * t;
            } else {
                out[t][c] = b;
                winners[t][c] = POOL * t + 1;
            }
        }
    }
    (out, winners)
}

// ============================================================================
// Model
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvClassifier {
    window_size: usize,
    n_channels: usize,
    n_classes: usize,
    scaler: ChannelScaler,
    conv1: ConvLayer,
    conv2: ConvLayer,
    fc1: DenseLayer,
    fc2: DenseLayer,
}

/// Every intermediate needed for one backward pass.
struct ForwardCache {
    x0: Vec<Vec<f64>>,
    z1: Vec<Vec<f64>>,
    a1: Vec<Vec<f64>>,
    p1: Vec<Vec<f64>>,
    win1: Vec<Vec<usize>>,
    z2: Vec<Vec<f64>>,
    a2: Vec<Vec<f64>>,
    p2: Vec<Vec<f64>>,
    win2: Vec<Vec<usize>>,
    flat: Vec<f64>,
    z3: Vec<f64>,
    a3: Vec<f64>,
    probs: Vec<f64>,
}

struct Grads {
    conv1: ConvGrad,
    conv2: ConvGrad,
    fc1: DenseGrad,
    fc2: DenseGrad,
}

impl ConvClassifier {
    /// Train on raw windows. `val` drives early stopping; when it is empty
    /// the training loss is used instead.
    #[allow(clippy::too_many_arguments)]
    pub fn train(
        train_x: &[Window],
        train_y: &[usize],
        val_x: &[Window],
        val_y: &[usize],
        n_classes: usize,
        window_size: usize,
        n_channels: usize,
        opts: &TrainOptions,
    ) -> Result<Self, ClassifierError> {
        if train_x.is_empty() || n_classes == 0 {
            return Err(ClassifierError::EmptyDataset);
        }
        let expected = InputShape::Sequence {
            window_size,
            n_channels,
        };
        for w in train_x.iter().chain(val_x) {
            if w.len() != window_size || w.n_channels() != n_channels {
                return Err(ClassifierError::ShapeMismatch {
                    expected,
                    actual: InputShape::Sequence {
                        window_size: w.len(),
                        n_channels: w.n_channels(),
                    },
                });
            }
        }
        if let Some(&bad) = train_y.iter().chain(val_y).find(|&&l| l >= n_classes) {
            return Err(ClassifierError::LabelOutOfRange {
                index: bad,
                n_classes,
            });
        }
        // Two conv+pool stages must leave at least one time step:
        // t1 = W-2, pooled t1/2, t2 = t1/2 - 2, pooled t2/2 >= 1 => W >= 10.
        const MIN_WINDOW: usize = 10;
        if window_size < MIN_WINDOW {
            return Err(ClassifierError::SequenceTooShort {
                window_size,
                minimum: MIN_WINDOW,
            });
        }
        let t1p = (window_size - KERNEL + 1) / POOL;
        let t2p = (t1p - KERNEL + 1) / POOL;

        let scaler = ChannelScaler::fit(train_x, n_channels);
        let train_scaled: Vec<Vec<Vec<f64>>> =
            train_x.iter().map(|w| scaler.transform(w)).collect();
        let val_scaled: Vec<Vec<Vec<f64>>> = val_x.iter().map(|w| scaler.transform(w)).collect();

        let mut rng = StdRng::seed_from_u64(opts.seed);
        let flat_dim = t2p * CONV2_FILTERS;

        let mut model = Self {
            window_size,
            n_channels,
            n_classes,
            scaler,
            conv1: ConvLayer::init(n_channels, CONV1_FILTERS, &mut rng),
            conv2: ConvLayer::init(CONV1_FILTERS, CONV2_FILTERS, &mut rng),
            fc1: DenseLayer::init(flat_dim, HIDDEN, &mut rng),
            fc2: DenseLayer::init(HIDDEN, n_classes, &mut rng),
        };

        let mut order: Vec<usize> = (0..train_scaled.len()).collect();
        let mut best_loss = f64::INFINITY;
        let mut best_weights: Option<(ConvLayer, ConvLayer, DenseLayer, DenseLayer)> = None;
        let mut patience_left = opts.early_stopping_patience;

        for epoch in 0..opts.epochs {
            order.shuffle(&mut rng);
            let mut train_loss = 0.0;

            for batch in order.chunks(opts.batch_size) {
                let mut grads = Grads {
                    conv1: model.conv1.zeros_like(),
                    conv2: model.conv2.zeros_like(),
                    fc1: model.fc1.zeros_like(),
                    fc2: model.fc2.zeros_like(),
                };
                for &idx in batch {
                    let cache = model.forward(&train_scaled[idx]);
                    train_loss += cross_entropy(&cache.probs, train_y[idx]);
                    model.backward(&cache, train_y[idx], &mut grads);
                }
                let scale = opts.learning_rate / batch.len() as f64;
                model.conv1.apply(&grads.conv1, scale);
                model.conv2.apply(&grads.conv2, scale);
                model.fc1.apply(&grads.fc1, scale);
                model.fc2.apply(&grads.fc2, scale);
            }
            train_loss /= train_scaled.len() as f64;

            let monitored = if val_scaled.is_empty() {
                train_loss
            } else {
                model.mean_loss(&val_scaled, val_y)
            };

            debug!(epoch, train_loss, val_loss = monitored, "Conv epoch complete");

            if monitored + MIN_DELTA < best_loss {
                best_loss = monitored;
                best_weights = Some((
                    model.conv1.clone(),
                    model.conv2.clone(),
                    model.fc1.clone(),
                    model.fc2.clone(),
                ));
                patience_left = opts.early_stopping_patience;
            } else if patience_left > 0 {
                patience_left -= 1;
            } else {
                info!(epoch, best_loss, "Early stopping, rolling back to best checkpoint");
                break;
            }
        }

        if let Some((c1, c2, f1, f2)) = best_weights {
            model.conv1 = c1;
            model.conv2 = c2;
            model.fc1 = f1;
            model.fc2 = f2;
        }

        info!(
            samples = train_x.len(),
            n_classes, window_size, n_channels, best_loss, "Trained conv classifier"
        );
        Ok(model)
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn expected_input_shape(&self) -> InputShape {
        InputShape::Sequence {
            window_size: self.window_size,
            n_channels: self.n_channels,
        }
    }

    /// Predict one raw window, rejecting a shape mismatch.
    pub fn predict(&self, window: &Window) -> Result<RawPrediction, ClassifierError> {
        if window.len() != self.window_size || window.n_channels() != self.n_channels {
            return Err(ClassifierError::ShapeMismatch {
                expected: self.expected_input_shape(),
                actual: InputShape::Sequence {
                    window_size: window.len(),
                    n_channels: window.n_channels(),
                },
            });
        }
        let x0 = self.scaler.transform(window);
        let cache = self.forward(&x0);
        Ok(RawPrediction {
            class_index: argmax(&cache.probs),
            probabilities: cache.probs,
        })
    }

    fn forward(&self, x0: &[Vec<f64>]) -> ForwardCache {
        let z1 = self.conv1.forward(x0);
        let mut a1 = z1.clone();
        relu(&mut a1);
        let (p1, win1) = maxpool(&a1);

        let z2 = self.conv2.forward(&p1);
        let mut a2 = z2.clone();
        relu(&mut a2);
        let (p2, win2) = maxpool(&a2);

        let flat: Vec<f64> = p2.iter().flatten().copied().collect();
        let z3 = self.fc1.forward(&flat);
        let a3: Vec<f64> = z3.iter().map(|v| v.max(0.0)).collect();
        let z4 = self.fc2.forward(&a3);
        let probs = softmax(&z4);

        ForwardCache {
            x0: x0.to_vec(),
            z1,
            a1,
            p1,
            win1,
            z2,
            a2,
            p2,
            win2,
            flat,
            z3,
            a3,
            probs,
        }
    }

    /// Accumulate gradients for one sample (softmax + cross-entropy head).
    fn backward(&self, cache: &ForwardCache, target: usize, grads: &mut Grads) {
        // d(loss)/d(z4) = probs - onehot(target)
        let mut dz4 = cache.probs.clone();
        dz4[target] -= 1.0;

        // fc2
        let mut da3 = vec![0.0; self.fc1.out_dim];
        for (o, &d) in dz4.iter().enumerate() {
            grads.fc2.b[o] += d;
            let row = o * self.fc2.in_dim;
            for (i, &a) in cache.a3.iter().enumerate() {
                grads.fc2.w[row + i] += d * a;
                da3[i] += self.fc2.w[row + i] * d;
            }
        }

        // fc1 (through ReLU)
        let mut dflat = vec![0.0; self.fc1.in_dim];
        for (o, &da) in da3.iter().enumerate() {
            if cache.z3[o] <= 0.0 {
                continue;
            }
            grads.fc1.b[o] += da;
            let row = o * self.fc1.in_dim;
            for (i, &f) in cache.flat.iter().enumerate() {
                grads.fc1.w[row + i] += da * f;
                dflat[i] += self.fc1.w[row + i] * da;
            }
        }

        // unflatten -> pool2 -> conv2
        let mut da2 = vec![vec![0.0; CONV2_FILTERS]; cache.a2.len()];
        for (t, winners) in cache.win2.iter().enumerate() {
            for (c, &src) in winners.iter().enumerate() {
                da2[src][c] = dflat[t * CONV2_FILTERS + c];
            }
        }
        let dp1 = self.conv_backward(&self.conv2, &cache.z2, &cache.p1, &da2, &mut grads.conv2);

        // pool1 -> conv1
        let mut da1 = vec![vec![0.0; CONV1_FILTERS]; cache.a1.len()];
        for (t, winners) in cache.win1.iter().enumerate() {
            for (c, &src) in winners.iter().enumerate() {
                da1[src][c] = dp1[t][c];
            }
        }
        self.conv_backward(&self.conv1, &cache.z1, &cache.x0, &da1, &mut grads.conv1);
    }

    /// Backward through one conv layer: accumulates weight/bias gradients and
    /// returns the gradient w.r.t. the layer input.
    fn conv_backward(
        &self,
        layer: &ConvLayer,
        z: &[Vec<f64>],
        input: &[Vec<f64>],
        d_out: &[Vec<f64>],
        grad: &mut ConvGrad,
    ) -> Vec<Vec<f64>> {
        let mut d_in = vec![vec![0.0; layer.in_ch]; input.len()];
        for (t, d_row) in d_out.iter().enumerate() {
            for (o, &d) in d_row.iter().enumerate() {
                if d == 0.0 || z[t][o] <= 0.0 {
                    continue;
                }
                grad.b[o] += d;
                for dt in 0..KERNEL {
                    let in_row = &input[t + dt];
                    for i in 0..layer.in_ch {
                        let w_idx = layer.idx(o, dt, i);
                        grad.w[w_idx] += d * in_row[i];
                        d_in[t + dt][i] += layer.w[w_idx] * d;
                    }
                }
            }
        }
        d_in
    }

    fn mean_loss(&self, xs: &[Vec<Vec<f64>>], ys: &[usize]) -> f64 {
        let total: f64 = xs
            .iter()
            .zip(ys)
            .map(|(x, &y)| cross_entropy(&self.forward(x).probs, y))
            .sum();
        total / xs.len().max(1) as f64
    }
}

fn cross_entropy(probs: &[f64], target: usize) -> f64 {
    -probs[target].max(1e-12).ln()
}
