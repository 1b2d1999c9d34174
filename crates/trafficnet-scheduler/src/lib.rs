//! Pipeline orchestration for trafficnet.
//!
//! Stages run sequentially, each turning its upstream stage ledger into a
//! new, richer ledger: telemetry -> congestion -> managed -> ordered ->
//! real-time -> smart -> healed -> optimized. The live monitor produces
//! blocks into the smart ledger on a fixed interval.

// === Orchestration ===
pub mod error;
pub mod pipeline;
pub mod report;
mod stages;

// === Simulation & Work Distribution ===
pub mod simulation;
pub mod workers;

// === Live Monitoring ===
pub mod monitor;

pub use error::{PipelineError, PipelineResult};
pub use monitor::{Monitor, MonitorSummary};
pub use pipeline::Pipeline;
pub use report::{StageReport, StageStatus, VerifyReport};
pub use simulation::{LiveSimulator, Observation, TrafficSimulator};
pub use workers::WorkerPool;
