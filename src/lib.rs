//! trafficnet: a signed, hash-linked traffic telemetry ledger.
//!
//! Facade over the workspace crates. Most callers only need
//! [`scheduler::Pipeline`] and [`core::NetworkConfig`].

// === Ledger Primitives ===
pub use trafficnet_core as core;
pub use trafficnet_crypto as crypto;

// === Validation & Congestion ===
pub use trafficnet_consensus as consensus;
pub use trafficnet_telemetry as telemetry;

// === Network State ===
pub use trafficnet_state as state;

// === Orchestration ===
pub use trafficnet_scheduler as scheduler;

pub use trafficnet_core::{Block, Ledger, LedgerStore, NetworkConfig, Stage};
pub use trafficnet_scheduler::{Monitor, Pipeline, StageReport};
