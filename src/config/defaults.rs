//! Built-in configuration defaults
//!
//! These match the values the pipeline was originally tuned with: 1-second
//! windows at 100 Hz, 6 sensor channels, gravity EMA alpha 0.8, 80/20
//! train/validation split with a fixed seed.

pub fn window_size() -> usize {
    100
}

pub fn n_channels() -> usize {
    6
}

pub fn gravity_alpha() -> f64 {
    0.8
}

pub fn apply_gravity_filter() -> bool {
    true
}

pub fn train_validation_split() -> f64 {
    0.8
}

pub fn split_seed() -> u64 {
    42
}

pub fn epochs() -> usize {
    75
}

pub fn batch_size() -> usize {
    64
}

pub fn learning_rate() -> f64 {
    0.001
}

pub fn early_stopping_patience() -> usize {
    8
}

pub fn bind_addr() -> String {
    "0.0.0.0:10000".to_string()
}

pub fn predict_timeout_secs() -> u64 {
    10
}
