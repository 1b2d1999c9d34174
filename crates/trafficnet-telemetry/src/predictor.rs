// CONGESTION PREDICTION
// Classifier contract plus a deterministic rule-based stand-in
//
// SAFETY INVARIANTS:
// 1. predict() never fails: unseen categorical values fall back to the
//    encoder's first known class and are logged
// 2. The same features always yield the same prediction
// 3. A lower score means more anomalous (decision-function convention)

use std::collections::BTreeMap;

use log::warn;
use serde::{Deserialize, Serialize};
use trafficnet_core::{Block, CongestionLevel, HealthStatus, TrafficKind};

/// Classifier input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionFeatures {
    pub node_id: String,
    pub traffic_volume: f64,
    pub latency: f64,
    pub network_health: String,
    pub traffic_type: String,
}

impl From<&Block> for PredictionFeatures {
    fn from(block: &Block) -> Self {
        PredictionFeatures {
            node_id: block.node_id.clone(),
            traffic_volume: block.traffic.volume,
            latency: block.health.latency,
            network_health: block.health.status.as_str().to_string(),
            traffic_type: block.traffic.kind.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub level: CongestionLevel,
    /// Decision score: negative is anomalous
    pub score: f64,
    pub anomaly: bool,
}

pub trait CongestionPredictor: Send + Sync {
    fn predict(&self, features: &PredictionFeatures) -> Prediction;
}

/// Label encoder over a fixed, ordered class list.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoricalEncoder {
    column: String,
    classes: Vec<String>,
    codes: BTreeMap<String, usize>,
}

impl CategoricalEncoder {
    pub fn new<I, S>(column: impl Into<String>, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list: Vec<String> = Vec::new();
        for class in classes {
            let class = class.into();
            if !list.contains(&class) {
                list.push(class);
            }
        }
        let codes = list.iter().enumerate().map(|(i, c)| (c.clone(), i)).collect();
        CategoricalEncoder {
            column: column.into(),
            classes: list,
            codes,
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Code for `value`; unseen values map to the first known class.
    pub fn encode(&self, value: &str) -> usize {
        match self.codes.get(value) {
            Some(code) => *code,
            None => {
                warn!(
                    "Unknown value '{}' in {}, replacing with '{}'",
                    value,
                    self.column,
                    self.classes.first().map(String::as_str).unwrap_or("<none>")
                );
                0
            }
        }
    }

    pub fn decode(&self, code: usize) -> Option<&str> {
        self.classes.get(code).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncodedFeatures {
    pub node_id: usize,
    pub traffic_type: usize,
    pub traffic_volume: f64,
    pub network_health: usize,
    pub latency: f64,
}

/// One encoder per categorical column.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureEncoders {
    pub node_id: CategoricalEncoder,
    pub traffic_type: CategoricalEncoder,
    pub network_health: CategoricalEncoder,
}

impl FeatureEncoders {
    pub fn new<I, S>(node_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FeatureEncoders {
            node_id: CategoricalEncoder::new("node_id", node_ids),
            traffic_type: CategoricalEncoder::new(
                "traffic_type",
                [TrafficKind::Data, TrafficKind::Stream, TrafficKind::Game, TrafficKind::Priority]
                    .iter()
                    .map(TrafficKind::as_str),
            ),
            network_health: CategoricalEncoder::new(
                "network_health",
                [HealthStatus::Normal, HealthStatus::Delayed, HealthStatus::Down]
                    .iter()
                    .map(HealthStatus::as_str),
            ),
        }
    }

    pub fn encode(&self, features: &PredictionFeatures) -> EncodedFeatures {
        EncodedFeatures {
            node_id: self.node_id.encode(&features.node_id),
            traffic_type: self.traffic_type.encode(&features.traffic_type),
            traffic_volume: sanitize(features.traffic_volume),
            network_health: self.network_health.encode(&features.network_health),
            latency: sanitize(features.latency),
        }
    }
}

fn sanitize(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        warn!("Non-finite feature value replaced with 0");
        0.0
    }
}

/// Deterministic stand-in for a trained congestion model.
///
/// risk  = 0.7 * volume / reference_capacity + 0.3 * latency / 10 + health penalty
/// score = 0.5 - risk
///
/// Negative scores are anomalies: `High` below `-0.1`, else `Medium`.
#[derive(Debug, Clone)]
pub struct RuleBasedPredictor {
    encoders: FeatureEncoders,
    reference_capacity: f64,
    /// Indexed by `network_health` code
    health_penalty: Vec<f64>,
}

impl RuleBasedPredictor {
    pub fn new(encoders: FeatureEncoders, reference_capacity: f64) -> Self {
        let health_penalty = encoders
            .network_health
            .classes()
            .iter()
            .map(|class| match class.as_str() {
                "Down" => 0.2,
                "Delayed" => 0.1,
                _ => 0.0,
            })
            .collect();
        RuleBasedPredictor {
            encoders,
            reference_capacity: reference_capacity.max(1.0),
            health_penalty,
        }
    }

    pub fn encoders(&self) -> &FeatureEncoders {
        &self.encoders
    }
}

impl CongestionPredictor for RuleBasedPredictor {
    fn predict(&self, features: &PredictionFeatures) -> Prediction {
        let encoded = self.encoders.encode(features);
        let penalty = self
            .health_penalty
            .get(encoded.network_health)
            .copied()
            .unwrap_or(0.0);
        let risk = 0.7 * encoded.traffic_volume / self.reference_capacity
            + 0.3 * encoded.latency / 10.0
            + penalty;
        let score = 0.5 - risk;
        let anomaly = score < 0.0;
        let level = if !anomaly {
            CongestionLevel::Low
        } else if score < -0.1 {
            CongestionLevel::High
        } else {
            CongestionLevel::Medium
        };
        Prediction { level, score, anomaly }
    }
}
