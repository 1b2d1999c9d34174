// SMART STAGE
// Live scenarios, normalized congestion, redistribution, prediction and
// threshold adaptation over the real-time ledger
//
// SAFETY INVARIANTS:
// 1. Events are applied to the context before the block is scored
// 2. Redistribution and threshold updates happen in upstream order on one writer
// 3. Only predictions run on the worker pool

use log::{info, warn};
use serde_json::json;
use trafficnet_core::{EventKind, Stage, TelemetryCache};
use trafficnet_state::manage_load;
use trafficnet_telemetry::{CongestionDetector, NormalizedLoadScoring, PredictionFeatures, ThresholdOptimizer};

use super::window_with;
use crate::error::PipelineResult;
use crate::pipeline::Pipeline;
use crate::report::StageReport;
use crate::simulation::{LiveSimulator, Observation};

impl Pipeline {
    pub(crate) fn run_smart(&self) -> PipelineResult<StageReport> {
        let Some(upstream) = self.load_upstream(Stage::Smart)? else {
            return Ok(StageReport::no_input(Stage::Smart));
        };
        self.reset_context();

        let detector = CongestionDetector::new(Box::new(NormalizedLoadScoring));
        let mut optimizer = ThresholdOptimizer::new(self.config.optimization_period);
        let mut live = LiveSimulator::new(self.config.seed);
        let mut ledger = self.new_ledger(Stage::Smart)?;
        let mut rejected = upstream.rejected;

        let mut redistributions = 0;
        let mut threshold_changes = 0;
        let mut outages = 0;
        let mut ddos = 0;
        let mut cache = TelemetryCache::new(self.config.cache_window);
        let mut prepared = Vec::with_capacity(upstream.blocks.len());

        for source in &upstream.blocks {
            let mut block = source.derive(Stage::Smart);
            let mut ctx = self.context.lock();
            let node = ctx.node(&block.node_id)?;
            let (active, capacity) = (node.active, node.capacity);

            let observation = live.overlay(
                active,
                Observation {
                    traffic: block.traffic.clone(),
                    health: block.health.clone(),
                    event: block.event,
                },
            );
            block.traffic = observation.traffic;
            block.health = observation.health;
            block.event = observation.event;
            match block.event {
                EventKind::Outage => {
                    outages += 1;
                    warn!("Outage on {} at {}", block.node_id, block.timestamp);
                }
                EventKind::Ddos => {
                    ddos += 1;
                    warn!("DDoS on {} at {}: {:.2} MB/s", block.node_id, block.timestamp, block.traffic.volume);
                }
                EventKind::Normal => {}
            }

            ctx.apply_event(&block.node_id, block.event)?;
            ctx.observe(&block.node_id, block.traffic.volume, block.health.status, block.health.latency)?;

            let thresholds = ctx.thresholds();
            let layer = {
                let window = window_with(&cache, &block);
                detector.assess(&window, capacity, &thresholds)
            };
            block.congestion = layer;

            if let Some(outcome) =
                manage_load(&mut ctx, &block.node_id, block.traffic.volume, block.congestion.level, block.event)?
            {
                redistributions += 1;
                block.annotations.redistribution = Some(outcome.advisory);
            }

            let mut live_thresholds = thresholds;
            if let Some(record) = optimizer.observe(block.traffic.volume, block.timestamp, &mut live_thresholds) {
                if live_thresholds != thresholds {
                    threshold_changes += 1;
                }
                ctx.set_thresholds(live_thresholds);
                drop(ctx);
                self.store.log_optimization(&record)?;
            }
            cache.push(block.clone());
            prepared.push(block);
        }

        let predictor = &self.predictor;
        let predictions = self
            .workers
            .map(&prepared, |block| predictor.predict(&PredictionFeatures::from(block)));

        let mut anomalies = 0;
        for (mut block, prediction) in prepared.into_iter().zip(predictions) {
            block.annotations.predicted_congestion = Some(prediction.level);
            if prediction.anomaly {
                anomalies += 1;
            }
            let node_id = block.node_id.clone();
            if Self::commit_derived(&mut ledger, block, &mut rejected)? {
                info!("Smart block for {}: predicted {}", node_id, prediction.level);
            }
        }

        self.persist(&ledger)?;
        let final_thresholds = self.context.lock().thresholds();
        let block_count = ledger.len() - 1;
        Ok(StageReport::completed(
            Stage::Smart,
            block_count,
            rejected,
            format!(
                "{} smart blocks, {} redistributions, {} threshold changes",
                block_count, redistributions, threshold_changes
            ),
            json!({
                "redistributions": redistributions,
                "threshold_changes": threshold_changes,
                "outages": outages,
                "ddos": ddos,
                "anomalies": anomalies,
                "thresholds": final_thresholds,
            }),
        ))
    }
}
