use std::time::Duration;

use log::{info, warn};
use serde_json::json;
use trafficnet_consensus::StakeWeightedSelector;
use trafficnet_core::{Block, LedgerError, Stage};

use crate::error::PipelineResult;
use crate::pipeline::Pipeline;
use crate::report::StageReport;
use crate::simulation::TrafficSimulator;

impl Pipeline {
    /// Simulate telemetry for every node over `time_steps` and append it
    /// through validator selection.
    pub(crate) fn run_telemetry(&self) -> PipelineResult<StageReport> {
        self.reset_context();
        let mut ledger = self.new_ledger(Stage::Telemetry)?;
        let mut selector = StakeWeightedSelector::from_config(&self.config);
        let mut simulator = TrafficSimulator::new(self.config.seed, self.config.start_time);
        let budget = Duration::from_millis(self.config.selection_timeout_ms);

        let mut tasks = simulator.schedule(&self.config.node_ids(), self.config.time_steps);
        if let Some(limit) = self.config.block_limit {
            tasks.truncate(limit);
        }

        let mut rejected = 0;
        let mut timeouts = 0;
        let mut retries: u64 = 0;
        for (timestamp, node_id) in tasks {
            let observation = simulator.observe(&timestamp);
            let candidate = Block::telemetry(
                timestamp,
                node_id.as_str(),
                observation.traffic.clone(),
                observation.health.clone(),
                ledger.head_hash(),
            )?;

            let mut ctx = self.context.lock();
            match ledger.append(candidate, ctx.registry_mut(), &mut selector, budget) {
                Ok(receipt) => {
                    retries += receipt.nonce;
                    ctx.observe(
                        &node_id,
                        observation.traffic.volume,
                        observation.health.status,
                        observation.health.latency,
                    )?;
                    info!(
                        "Block added for {} at {}: {:.2} MB/s, {}",
                        node_id, timestamp, observation.traffic.volume, observation.health.status
                    );
                }
                Err(LedgerError::ValidatorTimeout { .. }) => {
                    timeouts += 1;
                }
                Err(e) if e.is_integrity_failure() => {
                    rejected += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        if timeouts > 0 {
            warn!("{} telemetry blocks timed out in validator selection", timeouts);
        }
        self.persist(&ledger)?;

        let block_count = ledger.len() - 1;
        let details = json!({
            "nodes": self.config.node_count,
            "time_steps": self.config.time_steps,
            "validator_timeouts": timeouts,
            "selection_retries": retries,
        });
        Ok(StageReport::completed(
            Stage::Telemetry,
            block_count,
            rejected,
            format!("{} telemetry blocks validated and signed", block_count),
            details,
        ))
    }
}
