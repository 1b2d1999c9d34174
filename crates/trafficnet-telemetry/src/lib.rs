//! Congestion telemetry for trafficnet.
//!
//! Scoring strategies turn a node's recent window into a `CongestionLayer`;
//! the threshold optimizer retunes the live bands every N accepted blocks;
//! the predictor is the pluggable congestion/anomaly classifier.

pub mod detector;
pub mod predictor;
pub mod scoring;
pub mod thresholds;

pub use detector::CongestionDetector;
pub use predictor::{
    CategoricalEncoder, CongestionPredictor, EncodedFeatures, FeatureEncoders, Prediction,
    PredictionFeatures, RuleBasedPredictor,
};
pub use scoring::{clamp01, CongestionScoring, NormalizedLoadScoring, WindowedVolumeScoring};
pub use thresholds::{ThresholdOptimizer, CANDIDATE_THRESHOLDS};
