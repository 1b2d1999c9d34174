use log::info;
use serde_json::json;
use trafficnet_core::{CongestionLevel, Stage};
use trafficnet_telemetry::CongestionDetector;

use super::window_with;
use crate::error::PipelineResult;
use crate::pipeline::Pipeline;
use crate::report::StageReport;

impl Pipeline {
    /// Score every telemetry block over its node's sliding window.
    pub(crate) fn run_congestion(&self) -> PipelineResult<StageReport> {
        let Some(upstream) = self.load_upstream(Stage::Congestion)? else {
            return Ok(StageReport::no_input(Stage::Congestion));
        };
        self.reset_context();
        let mut ledger = self.new_ledger(Stage::Congestion)?;
        let detector = CongestionDetector::default();
        let mut rejected = upstream.rejected;
        let mut high_count = 0;
        let mut score_total = 0.0;

        for source in &upstream.blocks {
            let mut block = source.derive(Stage::Congestion);
            let (capacity, thresholds) = {
                let ctx = self.context.lock();
                (ctx.node(&block.node_id)?.capacity, ctx.thresholds())
            };
            let layer = {
                let window = window_with(ledger.cache(), &block);
                detector.assess(&window, capacity, &thresholds)
            };
            block.congestion = layer;

            let (level, score, node_id) = (block.congestion.level, block.congestion.score, block.node_id.clone());
            if Self::commit_derived(&mut ledger, block, &mut rejected)? {
                if level == CongestionLevel::High {
                    high_count += 1;
                }
                score_total += score;
                info!("Congestion for {}: {} (score {:.2})", node_id, level, score);
            }
        }

        self.persist(&ledger)?;
        let block_count = ledger.len() - 1;
        let average_score = if block_count == 0 { 0.0 } else { score_total / block_count as f64 };
        Ok(StageReport::completed(
            Stage::Congestion,
            block_count,
            rejected,
            format!("{} blocks scored, {} at High congestion", block_count, high_count),
            json!({
                "strategy": detector.strategy_name(),
                "high_count": high_count,
                "average_score": average_score,
            }),
        ))
    }
}
