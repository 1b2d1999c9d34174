// LIVE MONITOR
// One tokio task producing live blocks into the smart ledger
//
// SAFETY INVARIANTS:
// 1. Cancellation is checked before every tick; a cancelled monitor produces nothing further
// 2. The context lock is never held across an await point
// 3. Every accepted block is persisted before the next tick
// 4. An existing smart ledger is continued from its head, never forked
// 5. Unsigned persisted blocks are re-signed and written back before the chain audit

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use log::{error, info, warn};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use trafficnet_core::{Block, EventKind, Ledger, LedgerStore, Stage};
use trafficnet_state::{manage_load, SharedContext};
use trafficnet_telemetry::{
    CongestionDetector, CongestionPredictor, NormalizedLoadScoring, PredictionFeatures, ThresholdOptimizer,
};

use crate::error::PipelineResult;
use crate::pipeline::Pipeline;
use crate::simulation::LiveSimulator;
use crate::stages::window_with;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitorSummary {
    pub blocks: usize,
    pub rejected: usize,
    pub outages: usize,
    pub ddos: usize,
    pub redistributions: usize,
    pub threshold_changes: usize,
}

pub struct Monitor {
    store: Arc<LedgerStore>,
    context: SharedContext,
    predictor: Arc<dyn CongestionPredictor>,
    node_ids: Vec<String>,
    interval: Duration,
    ledger: Ledger,
    live: LiveSimulator,
    detector: CongestionDetector,
    optimizer: ThresholdOptimizer,
    summary: MonitorSummary,
}

impl Monitor {
    /// Attach to the pipeline's smart ledger, continuing it if one is persisted.
    pub fn new(pipeline: &Pipeline) -> PipelineResult<Self> {
        let config = pipeline.config();
        let store = Arc::clone(pipeline.store());
        let existing = store.load_verified(Stage::Smart, pipeline.keys())?;
        if existing.resigned > 0 {
            warn!("Re-signed {} unsigned smart blocks on load", existing.resigned);
            store.replace(Stage::Smart, &existing.blocks)?;
        }

        let ledger = if existing.blocks.is_empty() {
            let ledger = Ledger::new(Stage::Smart, Arc::clone(pipeline.keys()), config.cache_window)?;
            if let Some(genesis) = ledger.genesis() {
                store.append(Stage::Smart, genesis)?;
            }
            ledger
        } else {
            let ledger = Ledger::from_blocks(
                Stage::Smart,
                Arc::clone(pipeline.keys()),
                config.cache_window,
                existing.blocks,
            )?;
            ledger.verify_chain()?;
            info!("Continuing smart ledger at height {}", ledger.len());
            ledger
        };

        Ok(Monitor {
            store,
            context: Arc::clone(pipeline.context()),
            predictor: Arc::clone(&pipeline.predictor),
            node_ids: config.node_ids(),
            interval: Duration::from_millis(config.monitor_interval_ms.max(1)),
            ledger,
            live: LiveSimulator::new(config.seed ^ 0x0100_0000),
            detector: CongestionDetector::new(Box::new(NormalizedLoadScoring)),
            optimizer: ThresholdOptimizer::new(config.optimization_period),
            summary: MonitorSummary::default(),
        })
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn summary(&self) -> &MonitorSummary {
        &self.summary
    }

    /// Produce, commit and persist one live block stamped `now`.
    /// Returns `None` when the block was discarded.
    pub fn tick(&mut self, now: NaiveDateTime) -> PipelineResult<Option<Block>> {
        let Some(node_id) = self.live.pick_node(&self.node_ids).cloned() else {
            return Ok(None);
        };

        let mut ctx = self.context.lock();
        let (active, capacity) = {
            let node = ctx.node(&node_id)?;
            (node.active, node.capacity)
        };
        let observation = self.live.observe(active, &now);
        let mut block = Block::telemetry(
            now,
            node_id.as_str(),
            observation.traffic,
            observation.health,
            self.ledger.head_hash(),
        )?;
        block.stage = Stage::Smart;
        block.event = observation.event;
        match block.event {
            EventKind::Outage => self.summary.outages += 1,
            EventKind::Ddos => self.summary.ddos += 1,
            EventKind::Normal => {}
        }

        ctx.apply_event(&node_id, block.event)?;
        ctx.observe(&node_id, block.traffic.volume, block.health.status, block.health.latency)?;

        let thresholds = ctx.thresholds();
        let layer = {
            let window = window_with(self.ledger.cache(), &block);
            self.detector.assess(&window, capacity, &thresholds)
        };
        block.congestion = layer;

        if let Some(outcome) = manage_load(&mut ctx, &node_id, block.traffic.volume, block.congestion.level, block.event)? {
            self.summary.redistributions += 1;
            block.annotations.redistribution = Some(outcome.advisory);
        }
        let prediction = self.predictor.predict(&PredictionFeatures::from(&block));
        block.annotations.predicted_congestion = Some(prediction.level);

        let mut live_thresholds = thresholds;
        let optimization = self.optimizer.observe(block.traffic.volume, now, &mut live_thresholds);
        if optimization.is_some() {
            if live_thresholds != thresholds {
                self.summary.threshold_changes += 1;
            }
            ctx.set_thresholds(live_thresholds);
        }
        drop(ctx);

        if let Some(record) = optimization {
            self.store.log_optimization(&record)?;
        }

        block.seal()?;
        match self.ledger.record(block) {
            Ok(receipt) => {
                let Some(accepted) = self.ledger.blocks().last().cloned() else {
                    return Ok(None);
                };
                self.store.append(Stage::Smart, &accepted)?;
                self.summary.blocks += 1;
                info!(
                    "Live block {} from {}: {:.2} MB/s, {} congestion, predicted {}",
                    receipt.height, accepted.node_id, accepted.traffic.volume, accepted.congestion.level, prediction.level
                );
                Ok(Some(accepted))
            }
            Err(e) if e.is_integrity_failure() => {
                self.summary.rejected += 1;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Poll at the configured interval until cancelled or `max_blocks` are accepted.
    pub async fn run(mut self, cancel: CancellationToken, max_blocks: Option<usize>) -> PipelineResult<MonitorSummary> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Live monitor started, interval {:?}", self.interval);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Live monitor cancelled");
                    break;
                }
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.tick(Local::now().naive_local()) {
                error!("Live monitor stopped: {}", e);
                return Err(e);
            }
            if max_blocks.map_or(false, |max| self.summary.blocks >= max) {
                break;
            }
        }

        self.store.flush()?;
        info!(
            "Live monitor finished: {} blocks, {} rejected",
            self.summary.blocks, self.summary.rejected
        );
        Ok(self.summary)
    }

    pub fn spawn(self, cancel: CancellationToken, max_blocks: Option<usize>) -> JoinHandle<PipelineResult<MonitorSummary>> {
        tokio::spawn(self.run(cancel, max_blocks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trafficnet_core::NetworkConfig;

    fn pipeline() -> Pipeline {
        let config = NetworkConfig {
            node_count: 4,
            monitor_interval_ms: 1,
            optimization_period: 3,
            ..NetworkConfig::default()
        };
        Pipeline::new(config, Arc::new(LedgerStore::temporary().unwrap())).unwrap()
    }

    #[tokio::test]
    async fn test_monitor_stops_after_max_blocks() {
        let pipeline = pipeline();
        let monitor = Monitor::new(&pipeline).unwrap();
        let summary = monitor.run(CancellationToken::new(), Some(5)).await.unwrap();

        assert_eq!(summary.blocks, 5);
        assert_eq!(pipeline.store().load(Stage::Smart).unwrap().len(), 6);
        assert!(pipeline.verify(Stage::Smart).unwrap().valid);
        assert!(!pipeline.store().optimization_log().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_monitor_produces_nothing() {
        let pipeline = pipeline();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let handle = Monitor::new(&pipeline).unwrap().spawn(cancel, None);
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.blocks, 0);
        assert_eq!(pipeline.store().load(Stage::Smart).unwrap().len(), 1);
    }

    #[test]
    fn test_monitor_continues_existing_ledger() {
        let pipeline = pipeline();
        tokio_test::block_on(async {
            Monitor::new(&pipeline).unwrap().run(CancellationToken::new(), Some(2)).await.unwrap();
            let resumed = Monitor::new(&pipeline).unwrap();
            assert_eq!(resumed.ledger().len(), 3);
            resumed.run(CancellationToken::new(), Some(2)).await.unwrap();
        });
        assert_eq!(pipeline.store().load(Stage::Smart).unwrap().len(), 5);
        assert!(pipeline.verify(Stage::Smart).unwrap().valid);
    }

    #[tokio::test]
    async fn test_monitor_resumes_unsigned_ledger() {
        let pipeline = pipeline();
        Monitor::new(&pipeline).unwrap().run(CancellationToken::new(), Some(3)).await.unwrap();

        let store = pipeline.store();
        let mut blocks = store.load(Stage::Smart).unwrap();
        for block in &mut blocks {
            block.signature = None;
        }
        store.replace(Stage::Smart, &blocks).unwrap();

        let resumed = Monitor::new(&pipeline).unwrap();
        assert_eq!(resumed.ledger().len(), 4);
        assert!(store.load(Stage::Smart).unwrap().iter().all(|b| b.signature.is_some()));

        resumed.run(CancellationToken::new(), Some(1)).await.unwrap();
        assert_eq!(store.load(Stage::Smart).unwrap().len(), 5);
        assert!(pipeline.verify(Stage::Smart).unwrap().valid);
    }
}
