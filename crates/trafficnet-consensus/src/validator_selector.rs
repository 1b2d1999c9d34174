// STAKE-WEIGHTED VALIDATOR SELECTION
// Advisory gating for ledger appends
//
// SAFETY INVARIANTS:
// 1. weight(node) = capacity + history * K, over every registered node
// 2. Exactly one weighted draw per authorization attempt
// 3. Only the drawn node's history is credited, and only on success
// 4. Zero total weight never authorizes anyone
// 5. Same seed + same registry state => same sequence of draws

use log::{debug, warn};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;
use trafficnet_core::{NetworkConfig, NodeId, NodeRegistry, SlotAuthority};

/// Current stake weight of every node, in registry (id) order.
pub fn selection_weights(registry: &NodeRegistry, stake_multiplier: f64) -> Vec<(NodeId, f64)> {
    registry
        .iter()
        .map(|node| {
            let weight = node.capacity + node.history as f64 * stake_multiplier;
            (node.id.clone(), weight.max(0.0))
        })
        .collect()
}

/// Weighted lottery over node stake.
///
/// Authorization succeeds iff the drawn node is the issuer. This is the
/// gating model of the ledger, not a BFT protocol: a failed draw only makes
/// the issuer retry with a new nonce.
#[derive(Debug)]
pub struct StakeWeightedSelector {
    stake_multiplier: f64,
    rng: StdRng,
}

impl StakeWeightedSelector {
    pub fn new(stake_multiplier: f64, seed: u64) -> Self {
        StakeWeightedSelector {
            stake_multiplier,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_config(config: &NetworkConfig) -> Self {
        Self::new(config.stake_multiplier, config.seed)
    }

    pub fn stake_multiplier(&self) -> f64 {
        self.stake_multiplier
    }

    /// One weighted draw without side effects on the registry.
    pub fn draw(&mut self, registry: &NodeRegistry) -> Option<NodeId> {
        let weights = selection_weights(registry, self.stake_multiplier);
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        if weights.is_empty() || total <= 0.0 {
            return None;
        }
        let index = match WeightedIndex::new(weights.iter().map(|(_, w)| *w)) {
            Ok(index) => index,
            Err(e) => {
                warn!("Cannot build validator distribution: {}", e);
                return None;
            }
        };
        let picked = index.sample(&mut self.rng);
        weights.into_iter().nth(picked).map(|(id, _)| id)
    }
}

impl SlotAuthority for StakeWeightedSelector {
    fn authorize(&mut self, registry: &mut NodeRegistry, issuer: &str) -> bool {
        let Some(selected) = self.draw(registry) else {
            return false;
        };
        if selected != issuer {
            return false;
        }
        if let Some(node) = registry.get_mut(&selected) {
            node.record_validation();
            debug!("{} selected as validator (history {})", selected, node.history);
        }
        true
    }

    fn eligible(&self, registry: &NodeRegistry) -> bool {
        selection_weights(registry, self.stake_multiplier)
            .iter()
            .map(|(_, w)| w)
            .sum::<f64>()
            > 0.0
    }
}
