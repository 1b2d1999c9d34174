// === Shared Network State ===
pub mod context;

// === Traffic Engineering ===
pub mod advisory;
pub mod allocation;
pub mod redistribution;

// === Self-Healing ===
pub mod healing;

pub use advisory::{block_rng, suggest_traffic, SuggestionProfile};
pub use allocation::{allocate_bandwidth, AllocationOutcome, HIGH_TRAFFIC_AVERAGE};
pub use context::{NetworkContext, SharedContext, StateError, StateResult};
pub use healing::{reactivation_probability, HealingOutcome, SelfHealingController};
pub use redistribution::{manage_load, redistribute, Redistribution};
