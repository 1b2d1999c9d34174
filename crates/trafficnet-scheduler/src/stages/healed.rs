use log::info;
use serde_json::json;
use trafficnet_core::Stage;
use trafficnet_state::{manage_load, SelfHealingController};

use crate::error::PipelineResult;
use crate::pipeline::Pipeline;
use crate::report::StageReport;

impl Pipeline {
    /// Replay smart blocks against node status and attempt self-healing.
    pub(crate) fn run_healed(&self) -> PipelineResult<StageReport> {
        let Some(upstream) = self.load_upstream(Stage::Healed)? else {
            return Ok(StageReport::no_input(Stage::Healed));
        };
        self.reset_context();

        let mut controller = SelfHealingController::new(self.config.seed);
        let mut ledger = self.new_ledger(Stage::Healed)?;
        let mut rejected = upstream.rejected;
        let mut reactivations = 0;
        let mut reroutes = 0;
        let mut heal_actions = 0;

        for source in &upstream.blocks {
            let mut block = source.derive(Stage::Healed);
            let outcome = {
                let mut ctx = self.context.lock();
                ctx.apply_event(&block.node_id, block.event)?;
                ctx.observe(&block.node_id, block.traffic.volume, block.health.status, block.health.latency)?;
                manage_load(&mut ctx, &block.node_id, block.traffic.volume, block.congestion.level, block.event)?;
                let predicted = block.annotations.predicted_congestion;
                controller.heal(&mut ctx, &block, predicted)?
            };

            block.health = outcome.health;
            block.annotations.healing_action = outcome.healing_action;
            block.annotations.reroute = outcome.reroute;
            let acted = block.annotations.healing_action.is_some() || block.annotations.reroute.is_some();
            let rerouted = block.annotations.reroute.is_some();
            let node_id = block.node_id.clone();

            if Self::commit_derived(&mut ledger, block, &mut rejected)? {
                if outcome.reactivated {
                    reactivations += 1;
                }
                if rerouted {
                    reroutes += 1;
                }
                if acted {
                    heal_actions += 1;
                    info!("Healing action recorded for {}", node_id);
                }
            }
        }

        self.persist(&ledger)?;
        let inactive: Vec<String> = self
            .context
            .lock()
            .registry()
            .iter()
            .filter(|n| !n.active)
            .map(|n| n.id.clone())
            .collect();
        let block_count = ledger.len() - 1;
        Ok(StageReport::completed(
            Stage::Healed,
            block_count,
            rejected,
            format!("{} blocks healed, {} healing actions", block_count, heal_actions),
            json!({
                "heal_actions": heal_actions,
                "reactivations": reactivations,
                "reroutes": reroutes,
                "inactive_nodes": inactive,
            }),
        ))
    }
}
