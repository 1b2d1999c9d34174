use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use trafficnet_core::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Completed,
    /// Upstream ledger was empty or missing; nothing to do
    NoInput,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Completed => f.write_str("completed"),
            StageStatus::NoInput => f.write_str("no input"),
        }
    }
}

/// Result of one stage run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub status: StageStatus,
    pub summary: String,
    /// Blocks accepted into the stage ledger, genesis excluded
    pub block_count: usize,
    /// Candidates dropped on integrity failure
    pub rejected: usize,
    /// Stage-specific counters
    pub details: Value,
}

impl StageReport {
    pub fn completed(stage: Stage, block_count: usize, rejected: usize, summary: String, details: Value) -> Self {
        StageReport {
            stage,
            status: StageStatus::Completed,
            summary,
            block_count,
            rejected,
            details,
        }
    }

    pub fn no_input(stage: Stage) -> Self {
        StageReport {
            stage,
            status: StageStatus::NoInput,
            summary: format!("{}: upstream ledger empty, nothing to process", stage),
            block_count: 0,
            rejected: 0,
            details: Value::Null,
        }
    }
}

impl fmt::Display for StageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} - {} blocks, {} rejected: {}",
            self.stage, self.status, self.block_count, self.rejected, self.summary
        )
    }
}

/// Result of re-checking a persisted ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub stage: Stage,
    pub blocks: usize,
    pub valid: bool,
    pub violation: Option<String>,
}

impl fmt::Display for VerifyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.violation {
            None => write!(f, "{} ledger valid ({} blocks)", self.stage, self.blocks),
            Some(v) => write!(f, "{} ledger INVALID ({} blocks): {}", self.stage, self.blocks, v),
        }
    }
}
