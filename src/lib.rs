//! MotionSense: Wearable Activity Recognition
//!
//! Accelerometer/gyroscope activity-recognition pipeline: window
//! segmentation, gravity removal, statistical feature extraction, linear
//! and convolutional classifiers, and majority-vote trial evaluation.
//!
//! ## Architecture
//!
//! - **Segmentation**: fixed-size (optionally overlapping) windows from raw recordings
//! - **Gravity Filter**: EMA-based gravity removal on the accelerometer channels
//! - **Feature Extractor**: per-channel statistics plus Signal Magnitude Area
//! - **Classifiers**: margin classifier over features, 1-D conv net over windows
//! - **Evaluation**: per-trial majority vote with per-activity tallies

// Pipeline modules
pub mod api;
pub mod artifact;
pub mod classifier;
pub mod config;
pub mod evaluation;
pub mod features;
pub mod gravity;
pub mod ingest;
pub mod labels;
pub mod segmentation;
pub mod training;
pub mod types;

// Re-export pipeline configuration
pub use config::{ClassifierKind, Normalization, PipelineConfig};

// Re-export commonly used types
pub use types::{
    ActivityCount, ClassLabelSet, EvaluationTally, FeatureVector, LabeledWindow, Prediction,
    Trial, Window, WindowShapeError,
};

// Re-export the trained-artifact surface
pub use artifact::{ClassifierArtifact, PreprocessingSettings};

// Re-export classifier components
pub use classifier::{ClassifierInput, ClassifierModel, InputShape, TrainOptions};

// Re-export pipeline stages
pub use evaluation::EvaluationAggregator;
pub use features::FeatureExtractor;
pub use gravity::GravityFilter;
pub use training::{TrainingOrchestrator, TrainingReport};
