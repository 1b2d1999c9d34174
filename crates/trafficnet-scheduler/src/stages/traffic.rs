// TRAFFIC MANAGEMENT STAGES
// managed, ordered and real-time: suggestions for congested blocks
//
// SAFETY INVARIANTS:
// 1. Only congested blocks are ever promoted to Priority
// 2. Real-time processing order is Priority first, otherwise upstream order
// 3. Suggestions are a pure function of (seed, block, neighbors)

use std::collections::BTreeMap;
use std::time::Duration;

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use trafficnet_core::block::is_peak_hour;
use trafficnet_core::{Block, OrderType, Stage, TrafficKind};
use trafficnet_state::{block_rng, suggest_traffic, SuggestionProfile};

use crate::error::PipelineResult;
use crate::pipeline::Pipeline;
use crate::report::StageReport;

const PRIORITY_PROBABILITY: f64 = 0.3;
const PRIORITY_DELAY_SECS: f64 = 0.05;
const STANDARD_DELAY_SECS: f64 = 0.1;

/// Simulated per-block processing budget in the real-time stage.
pub(crate) fn processing_delay(block: &Block) -> f64 {
    if block.order_type == Some(OrderType::Priority) {
        PRIORITY_DELAY_SECS
    } else {
        STANDARD_DELAY_SECS
    }
}

/// Mark congested blocks Priority with fixed probability; everything else is Standard.
pub(crate) fn classify_orders(blocks: &mut [Block], seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed ^ 0x04de_40d0);
    for block in blocks.iter_mut() {
        if block.congestion.is_congested && rng.gen::<f64>() < PRIORITY_PROBABILITY {
            block.order_type = Some(OrderType::Priority);
            block.traffic.kind = TrafficKind::Priority;
        } else {
            block.order_type = Some(OrderType::Standard);
        }
    }
}

/// Stable reorder: Priority blocks first.
pub(crate) fn priority_first(blocks: &mut [Block]) {
    blocks.sort_by_key(|b| b.order_type != Some(OrderType::Priority));
}

impl Pipeline {
    pub(crate) fn run_traffic(&self, stage: Stage) -> PipelineResult<StageReport> {
        let profile = match stage {
            Stage::Ordered => SuggestionProfile::Ordered,
            Stage::RealTime => SuggestionProfile::RealTime,
            _ => SuggestionProfile::Managed,
        };
        let Some(upstream) = self.load_upstream(stage)? else {
            return Ok(StageReport::no_input(stage));
        };
        self.reset_context();

        let mut blocks: Vec<Block> = upstream.blocks.iter().map(|b| b.derive(stage)).collect();
        match stage {
            Stage::Ordered => classify_orders(&mut blocks, self.config.seed),
            Stage::RealTime => priority_first(&mut blocks),
            _ => {}
        }

        let graph = self.context.lock().graph().clone();
        let seed = self.config.seed;
        let suggestions = self.workers.map(&blocks, |block| {
            let neighbors = graph.neighbor_ids(&block.node_id);
            let mut rng = block_rng(seed, &block.hash);
            suggest_traffic(block, profile, &neighbors, &mut rng)
        });

        let mut ledger = self.new_ledger(stage)?;
        let mut rejected = upstream.rejected;
        let mut congested_per_node: BTreeMap<String, usize> = BTreeMap::new();
        let mut peak_congested = 0;
        let mut priority_count = 0;
        let mut suggestion_count = 0;
        let mut latency_budget = 0.0;

        for (mut block, suggestion) in blocks.into_iter().zip(suggestions) {
            if stage == Stage::RealTime {
                let delay = processing_delay(&block);
                latency_budget += delay;
                if self.config.realtime_delay {
                    std::thread::sleep(Duration::from_secs_f64(delay));
                }
            }
            if let Some(text) = &suggestion {
                info!("{} at {}: {}", block.node_id, block.timestamp, text);
            }
            block.annotations.traffic_suggestion = suggestion;

            let congested = block.congestion.is_congested;
            let priority = block.order_type == Some(OrderType::Priority);
            let has_suggestion = block.annotations.traffic_suggestion.is_some();
            let peak = is_peak_hour(block.hour_of_day());
            let node_id = block.node_id.clone();

            if Self::commit_derived(&mut ledger, block, &mut rejected)? {
                if congested {
                    *congested_per_node.entry(node_id).or_default() += 1;
                    if peak {
                        peak_congested += 1;
                    }
                }
                if priority {
                    priority_count += 1;
                }
                if has_suggestion {
                    suggestion_count += 1;
                }
            }
        }

        self.persist(&ledger)?;
        let block_count = ledger.len() - 1;
        let (summary, details) = match stage {
            Stage::Managed => (
                format!(
                    "{} blocks managed, {} congested in peak hours",
                    block_count, peak_congested
                ),
                json!({
                    "suggestions": suggestion_count,
                    "congested_per_node": congested_per_node,
                    "peak_congested": peak_congested,
                }),
            ),
            Stage::Ordered => (
                format!("{} blocks ordered, {} Priority", block_count, priority_count),
                json!({
                    "suggestions": suggestion_count,
                    "priority_count": priority_count,
                }),
            ),
            _ => (
                format!(
                    "{} blocks processed Priority first, {} Priority",
                    block_count, priority_count
                ),
                json!({
                    "suggestions": suggestion_count,
                    "priority_count": priority_count,
                    "latency_budget_s": latency_budget,
                }),
            ),
        };
        Ok(StageReport::completed(stage, block_count, rejected, summary, details))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trafficnet_core::block::genesis_timestamp;
    use trafficnet_core::{CongestionLayer, CongestionLevel, HealthLayer, HealthStatus, TrafficLayer};

    fn block(level: CongestionLevel) -> Block {
        let mut b = Block::telemetry(
            genesis_timestamp(),
            "Node_1",
            TrafficLayer { kind: TrafficKind::Data, volume: 50.0 },
            HealthLayer { status: HealthStatus::Normal, latency: 1.0 },
            "0",
        )
        .unwrap();
        b.congestion = CongestionLayer::new(level, 50.0, 1.0);
        b
    }

    #[test]
    fn test_only_congested_blocks_become_priority() {
        let mut blocks: Vec<Block> = (0..400)
            .map(|i| block(if i % 2 == 0 { CongestionLevel::Low } else { CongestionLevel::High }))
            .collect();
        classify_orders(&mut blocks, 42);

        let promoted: Vec<&Block> = blocks
            .iter()
            .filter(|b| b.order_type == Some(OrderType::Priority))
            .collect();
        assert!(promoted.iter().all(|b| b.congestion.is_congested));
        assert!(promoted.iter().all(|b| b.traffic.kind == TrafficKind::Priority));
        assert!(blocks.iter().all(|b| b.order_type.is_some()));
        assert!((30..90).contains(&promoted.len()), "promoted {}", promoted.len());
    }

    #[test]
    fn test_priority_first_is_stable() {
        let mut blocks: Vec<Block> = (0..6).map(|_| block(CongestionLevel::High)).collect();
        for (i, b) in blocks.iter_mut().enumerate() {
            b.traffic.volume = i as f64;
            b.order_type = Some(if i % 3 == 0 { OrderType::Priority } else { OrderType::Standard });
        }
        priority_first(&mut blocks);
        let volumes: Vec<f64> = blocks.iter().map(|b| b.traffic.volume).collect();
        assert_eq!(volumes, vec![0.0, 3.0, 1.0, 2.0, 4.0, 5.0]);
        assert_eq!(processing_delay(&blocks[0]), 0.05);
        assert_eq!(processing_delay(&blocks[5]), 0.1);
    }
}
