use std::collections::BTreeMap;

use log::info;
use serde_json::json;
use trafficnet_core::{Block, Stage};
use trafficnet_state::{allocate_bandwidth, HIGH_TRAFFIC_AVERAGE};

use crate::error::PipelineResult;
use crate::pipeline::Pipeline;
use crate::report::StageReport;

/// Mean volume per node over `blocks`.
pub(crate) fn average_volumes(blocks: &[Block]) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for block in blocks {
        let entry = sums.entry(block.node_id.clone()).or_default();
        entry.0 += block.traffic.volume;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(node, (sum, count))| (node, sum / count as f64))
        .collect()
}

impl Pipeline {
    /// Bandwidth allocation driven by priority, predicted congestion and failures.
    pub(crate) fn run_optimized(&self) -> PipelineResult<StageReport> {
        let Some(upstream) = self.load_upstream(Stage::Optimized)? else {
            return Ok(StageReport::no_input(Stage::Optimized));
        };
        self.reset_context();

        let averages = average_volumes(&upstream.blocks);
        let high_traffic: Vec<&String> = averages
            .iter()
            .filter(|(_, avg)| **avg > HIGH_TRAFFIC_AVERAGE)
            .map(|(node, _)| node)
            .collect();

        let mut ledger = self.new_ledger(Stage::Optimized)?;
        let mut rejected = upstream.rejected;
        let mut allocations = 0;

        for source in &upstream.blocks {
            let mut block = source.derive(Stage::Optimized);
            let outcome = {
                let mut ctx = self.context.lock();
                ctx.apply_event(&block.node_id, block.event)?;
                if block.annotations.healing_action.is_some() {
                    ctx.reactivate(&block.node_id, block.health.latency)?;
                }
                ctx.observe(&block.node_id, block.traffic.volume, block.health.status, block.health.latency)?;
                let predicted = block
                    .annotations
                    .predicted_congestion
                    .unwrap_or(block.congestion.level);
                let average = averages.get(&block.node_id).copied().unwrap_or(0.0);
                allocate_bandwidth(&mut ctx, &block, predicted, average)?
            };

            let allocated = outcome.is_allocation();
            if allocated {
                info!("{}: {}", block.node_id, outcome.advisory);
            }
            block.annotations.resource_allocation = Some(outcome.advisory);
            if Self::commit_derived(&mut ledger, block, &mut rejected)? && allocated {
                allocations += 1;
            }
        }

        self.persist(&ledger)?;
        let bandwidth: BTreeMap<String, f64> = self
            .context
            .lock()
            .registry()
            .iter()
            .map(|n| (n.id.clone(), n.allocated_bandwidth))
            .collect();
        let block_count = ledger.len() - 1;
        Ok(StageReport::completed(
            Stage::Optimized,
            block_count,
            rejected,
            format!(
                "{} blocks optimized, {} allocations, {} high-traffic nodes",
                block_count,
                allocations,
                high_traffic.len()
            ),
            json!({
                "allocations": allocations,
                "high_traffic_nodes": high_traffic,
                "allocated_bandwidth": bandwidth,
            }),
        ))
    }
}
