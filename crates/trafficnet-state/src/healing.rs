// SELF-HEALING CONTROLLER
// Probabilistic reactivation of failed nodes plus reroute advisories
//
// SAFETY INVARIANTS:
// 1. Node state is only ever Active or Inactive
// 2. p = min(0.8, 0.1 + 0.4 * own healthy fraction + 0.3 * neighbor healthy fraction)
// 3. A node with no recorded history gets exactly p = 0.1
// 4. Reactivation resets health to Normal with latency in [0, 5)
// 5. Every reactivation advisory states the probability that was used

use std::collections::{BTreeMap, VecDeque};

use log::info;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use trafficnet_core::{Block, CongestionLevel, HealthLayer, HealthStatus};

use crate::context::{NetworkContext, StateResult};

const HISTORY_DEPTH: usize = 10;
const BASE_PROBABILITY: f64 = 0.1;
const MAX_PROBABILITY: f64 = 0.8;

/// Reactivation probability from a node's recent health and its neighbors'.
pub fn reactivation_probability(
    recent: &[HealthStatus],
    healthy_neighbors: usize,
    total_neighbors: usize,
) -> f64 {
    if recent.is_empty() {
        return BASE_PROBABILITY;
    }
    let own = recent.iter().filter(|s| s.is_healthy()).count() as f64 / recent.len() as f64;
    let neighbors = if total_neighbors == 0 {
        0.0
    } else {
        healthy_neighbors as f64 / total_neighbors as f64
    };
    (BASE_PROBABILITY + 0.4 * own + 0.3 * neighbors).min(MAX_PROBABILITY)
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealingOutcome {
    /// Probability used, when a reactivation draw happened
    pub probability: Option<f64>,
    pub reactivated: bool,
    pub healing_action: Option<String>,
    pub reroute: Option<String>,
    /// Health to record on the emitted block (reset on reactivation)
    pub health: HealthLayer,
}

pub struct SelfHealingController {
    rng: StdRng,
    history: BTreeMap<String, VecDeque<HealthStatus>>,
}

impl SelfHealingController {
    pub fn new(seed: u64) -> Self {
        SelfHealingController {
            rng: StdRng::seed_from_u64(seed),
            history: BTreeMap::new(),
        }
    }

    /// Most recent health observations for `node_id`, oldest first.
    pub fn recent(&self, node_id: &str) -> Vec<HealthStatus> {
        self.history
            .get(node_id)
            .map(|q| q.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn record(&mut self, node_id: &str, status: HealthStatus) {
        let entry = self.history.entry(node_id.to_string()).or_default();
        entry.push_back(status);
        while entry.len() > HISTORY_DEPTH {
            entry.pop_front();
        }
    }

    fn healthy_neighbors(ctx: &NetworkContext, node_id: &str) -> (Vec<String>, usize) {
        let links = ctx.graph().neighbors(node_id);
        let healthy = links
            .iter()
            .filter(|l| {
                ctx.registry()
                    .get(&l.neighbor)
                    .map(|n| n.active && n.health.is_healthy())
                    .unwrap_or(false)
            })
            .map(|l| l.neighbor.clone())
            .collect();
        (healthy, links.len())
    }

    pub fn probability_for(&self, ctx: &NetworkContext, node_id: &str) -> f64 {
        let (healthy, total) = Self::healthy_neighbors(ctx, node_id);
        reactivation_probability(&self.recent(node_id), healthy.len(), total)
    }

    /// Evaluate one block: attempt reactivation if the issuer is down, then
    /// pick a reroute advisory from `predicted` (or the block's own level).
    pub fn heal(
        &mut self,
        ctx: &mut NetworkContext,
        block: &Block,
        predicted: Option<CongestionLevel>,
    ) -> StateResult<HealingOutcome> {
        let node_id = block.node_id.as_str();
        let congestion = predicted.unwrap_or(block.congestion.level);
        let observed_health = block.health.status;
        let (healthy, total) = Self::healthy_neighbors(ctx, node_id);

        let mut outcome = HealingOutcome {
            probability: None,
            reactivated: false,
            healing_action: None,
            reroute: None,
            health: block.health.clone(),
        };

        if !ctx.node(node_id)?.active {
            let p = reactivation_probability(&self.recent(node_id), healthy.len(), total);
            outcome.probability = Some(p);
            if self.rng.gen::<f64>() < p {
                let latency = self.rng.gen_range(0.0..5.0);
                ctx.node_mut(node_id)?.reactivate(latency);
                outcome.reactivated = true;
                outcome.health = HealthLayer { status: HealthStatus::Normal, latency };
                outcome.healing_action = Some(format!("Node reactivated with probability {:.2}", p));
                info!("{} reactivated with probability {:.2}", node_id, p);
            }
        }

        outcome.reroute = if congestion.is_congested() && !healthy.is_empty() {
            healthy.choose(&mut self.rng).map(|n| {
                format!(
                    "Reroute traffic to healthy neighbor {} due to predicted {} congestion",
                    n, congestion
                )
            })
        } else if observed_health == HealthStatus::Down && !healthy.is_empty() {
            healthy
                .choose(&mut self.rng)
                .map(|n| format!("Reroute traffic to healthy neighbor {} due to node failure", n))
        } else if congestion == CongestionLevel::High {
            Some("Reduce traffic load by 40% to prevent congestion".to_string())
        } else {
            None
        };

        self.record(node_id, outcome.health.status);
        Ok(outcome)
    }
}
