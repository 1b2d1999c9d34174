// TELEMETRY BLOCK
// One immutable, hash-linked, optionally signed record per node observation
//
// SAFETY INVARIANTS:
// 1. hash == SHA-256(canonical JSON of every field except hash and signature)
// 2. Every stage output (suggestions, order type, healing, allocation) is hashed
// 3. Blocks are never mutated after acceptance; derived stages build new blocks
// 4. A block carries exactly one stage profile tag

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use trafficnet_crypto::content_digest;

use crate::error::LedgerResult;

/// Pseudo-issuer of every ledger's first block.
pub const GENESIS_ID: &str = "Genesis";

/// Previous-hash sentinel carried by genesis blocks.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrafficKind {
    Data,
    Stream,
    Game,
    Priority,
}

impl TrafficKind {
    /// Kinds emitted by the traffic simulators.
    pub const SIMULATED: [TrafficKind; 3] = [TrafficKind::Data, TrafficKind::Stream, TrafficKind::Game];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficKind::Data => "Data",
            TrafficKind::Stream => "Stream",
            TrafficKind::Game => "Game",
            TrafficKind::Priority => "Priority",
        }
    }
}

impl fmt::Display for TrafficKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Nominal operation ("Up" in reactivation advisories)
    #[serde(alias = "Up")]
    Normal,
    Delayed,
    Down,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Normal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Normal => "Normal",
            HealthStatus::Delayed => "Delayed",
            HealthStatus::Down => "Down",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CongestionLevel {
    Low,
    Medium,
    High,
}

impl CongestionLevel {
    /// Strict banding: `High` above `high`, `Medium` above `medium`, else `Low`.
    pub fn classify(value: f64, thresholds: &Thresholds) -> Self {
        if value > thresholds.high {
            CongestionLevel::High
        } else if value > thresholds.medium {
            CongestionLevel::Medium
        } else {
            CongestionLevel::Low
        }
    }

    pub fn is_congested(&self) -> bool {
        !matches!(self, CongestionLevel::Low)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CongestionLevel::Low => "Low",
            CongestionLevel::Medium => "Medium",
            CongestionLevel::High => "High",
        }
    }
}

impl fmt::Display for CongestionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live congestion cut-offs. Retuned only by the threshold optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub medium: f64,
    pub high: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds { medium: 40.0, high: 70.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Standard,
    Priority,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Standard => f.write_str("Standard"),
            OrderType::Priority => f.write_str("Priority"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Normal,
    Outage,
    #[serde(rename = "DDoS")]
    Ddos,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Normal => f.write_str("Normal"),
            EventKind::Outage => f.write_str("Outage"),
            EventKind::Ddos => f.write_str("DDoS"),
        }
    }
}

/// Stage profile tag. Each pipeline stage emits blocks of exactly one profile,
/// each a superset of the previous stage's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Telemetry,
    Congestion,
    Managed,
    Ordered,
    RealTime,
    Smart,
    Healed,
    Optimized,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::Telemetry,
        Stage::Congestion,
        Stage::Managed,
        Stage::Ordered,
        Stage::RealTime,
        Stage::Smart,
        Stage::Healed,
        Stage::Optimized,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Telemetry => "telemetry",
            Stage::Congestion => "congestion",
            Stage::Managed => "managed",
            Stage::Ordered => "ordered",
            Stage::RealTime => "real-time",
            Stage::Smart => "smart",
            Stage::Healed => "healed",
            Stage::Optimized => "optimized",
        }
    }

    /// The stage whose ledger this stage consumes.
    pub fn upstream(&self) -> Option<Stage> {
        let idx = Stage::ALL.iter().position(|s| s == self)?;
        idx.checked_sub(1).map(|i| Stage::ALL[i])
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == normalized || (normalized == "realtime" && *stage == Stage::RealTime))
            .ok_or_else(|| format!("unknown stage '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficLayer {
    #[serde(rename = "type")]
    pub kind: TrafficKind,
    pub volume: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthLayer {
    pub status: HealthStatus,
    pub latency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CongestionLayer {
    pub is_congested: bool,
    pub score: f64,
    pub impact: f64,
    pub level: CongestionLevel,
}

impl CongestionLayer {
    pub fn new(level: CongestionLevel, score: f64, impact: f64) -> Self {
        CongestionLayer {
            is_congested: level.is_congested(),
            score,
            impact,
            level,
        }
    }
}

impl Default for CongestionLayer {
    fn default() -> Self {
        CongestionLayer::new(CongestionLevel::Low, 0.0, 0.0)
    }
}

/// Optional outputs attached by downstream stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotations {
    pub traffic_suggestion: Option<String>,
    pub redistribution: Option<String>,
    pub healing_action: Option<String>,
    pub reroute: Option<String>,
    pub predicted_congestion: Option<CongestionLevel>,
    pub resource_allocation: Option<String>,
}

impl Annotations {
    /// Single free-text advisory for the persisted record: every present
    /// annotation, in pipeline order, joined with " | ".
    pub fn advisory_text(&self) -> Option<String> {
        let parts: Vec<&str> = [
            &self.traffic_suggestion,
            &self.redistribution,
            &self.reroute,
            &self.healing_action,
            &self.resource_allocation,
        ]
        .into_iter()
        .filter_map(|part| part.as_deref())
        .filter(|part| !part.is_empty())
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" | "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Observation time
    pub timestamp: NaiveDateTime,

    /// Issuing node
    pub node_id: String,

    pub traffic: TrafficLayer,

    pub health: HealthLayer,

    /// Hash of the previous block in this stage's ledger
    pub previous_hash: String,

    /// Bumped on every failed validator draw
    pub nonce: u64,

    pub stage: Stage,

    pub event: EventKind,

    pub congestion: CongestionLayer,

    pub order_type: Option<OrderType>,

    pub annotations: Annotations,

    /// Hash of the upstream-stage block this one was derived from
    pub source_hash: Option<String>,

    /// Content digest (excluded from itself)
    pub hash: String,

    /// ECDSA signature over `hash` (excluded from the digest)
    pub signature: Option<Vec<u8>>,
}

/// The hashed view of a block: every field except `hash` and `signature`.
#[derive(Serialize)]
struct HashView<'a> {
    timestamp: &'a NaiveDateTime,
    node_id: &'a str,
    traffic_layer: &'a TrafficLayer,
    health_layer: &'a HealthLayer,
    previous_hash: &'a str,
    nonce: u64,
    stage: Stage,
    event_type: EventKind,
    congestion_layer: &'a CongestionLayer,
    order_type: Option<OrderType>,
    annotations: &'a Annotations,
    source_hash: Option<&'a str>,
}

impl Block {
    /// Build and seal a fresh telemetry-stage block.
    pub fn telemetry(
        timestamp: NaiveDateTime,
        node_id: impl Into<String>,
        traffic: TrafficLayer,
        health: HealthLayer,
        previous_hash: impl Into<String>,
    ) -> LedgerResult<Self> {
        let mut block = Block {
            timestamp,
            node_id: node_id.into(),
            traffic,
            health,
            previous_hash: previous_hash.into(),
            nonce: 0,
            stage: Stage::Telemetry,
            event: EventKind::Normal,
            congestion: CongestionLayer::default(),
            order_type: None,
            annotations: Annotations::default(),
            source_hash: None,
            hash: String::new(),
            signature: None,
        };
        block.seal()?;
        Ok(block)
    }

    /// Genesis block for a stage ledger: fixed issuer, sentinel previous hash, zero volume.
    pub fn genesis(stage: Stage) -> LedgerResult<Self> {
        let mut block = Block::telemetry(
            genesis_timestamp(),
            GENESIS_ID,
            TrafficLayer { kind: TrafficKind::Data, volume: 0.0 },
            HealthLayer { status: HealthStatus::Normal, latency: 0.0 },
            GENESIS_PREVIOUS_HASH,
        )?;
        block.stage = stage;
        block.seal()?;
        Ok(block)
    }

    /// Start a derived block for `stage` from this (upstream) block.
    ///
    /// The result is unsealed and unsigned; the receiving ledger re-links and
    /// seals it (see `Ledger::rebase`).
    pub fn derive(&self, stage: Stage) -> Block {
        Block {
            stage,
            source_hash: Some(self.hash.clone()),
            signature: None,
            nonce: 0,
            ..self.clone()
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.node_id == GENESIS_ID
    }

    /// Compute the content digest over the canonical, key-sorted encoding.
    pub fn compute_hash(&self) -> LedgerResult<String> {
        let view = HashView {
            timestamp: &self.timestamp,
            node_id: &self.node_id,
            traffic_layer: &self.traffic,
            health_layer: &self.health,
            previous_hash: &self.previous_hash,
            nonce: self.nonce,
            stage: self.stage,
            event_type: self.event,
            congestion_layer: &self.congestion,
            order_type: self.order_type,
            annotations: &self.annotations,
            source_hash: self.source_hash.as_deref(),
        };
        Ok(content_digest(&view)?)
    }

    /// Recompute `hash` and drop any signature made over the old hash.
    pub fn seal(&mut self) -> LedgerResult<()> {
        let hash = self.compute_hash()?;
        if hash != self.hash {
            self.signature = None;
        }
        self.hash = hash;
        Ok(())
    }

    /// True iff the stored hash is the digest of the current content.
    pub fn hash_is_consistent(&self) -> bool {
        self.compute_hash().map(|h| h == self.hash).unwrap_or(false)
    }

    pub fn advisory_text(&self) -> Option<String> {
        self.annotations.advisory_text()
    }

    /// Hour of day with fractional minutes, used for peak-hour rules.
    pub fn hour_of_day(&self) -> f64 {
        self.timestamp.hour() as f64 + self.timestamp.minute() as f64 / 60.0
    }
}

/// Fixed genesis time shared by every stage ledger.
pub fn genesis_timestamp() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 2, 27)
        .and_then(|d| d.and_hms_opt(7, 0, 0))
        .unwrap_or_default()
}

/// True between 08:00 and 18:00.
pub fn is_peak_hour(hour: f64) -> bool {
    (8.0..18.0).contains(&hour)
}
