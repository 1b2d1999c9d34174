// === Topology & Configuration ===
pub mod config;
pub mod topology;

// === Core Ledger Logic ===
pub mod block;
pub mod error;
pub mod ledger;
pub mod telemetry_cache;

// === Persistence ===
pub mod storage;

// === Re-exports for broader workspace access ===
pub use block::{
    Annotations, Block, CongestionLayer, CongestionLevel, EventKind, HealthLayer, HealthStatus,
    OrderType, Stage, Thresholds, TrafficKind, TrafficLayer, GENESIS_ID,
};
pub use config::{CapacityRange, ConfigError, NetworkConfig};
pub use error::{LedgerError, LedgerResult, StorageError, StorageResult};
pub use ledger::{AppendReceipt, Ledger, SlotAuthority};
pub use storage::{LedgerRecord, LedgerStore, OptimizationRecord, RetryPolicy, VerifiedLoad};
pub use telemetry_cache::TelemetryCache;
pub use topology::{Graph, Link, Node, NodeId, NodeRegistry, Topology};
