// LOAD REDISTRIBUTION
// Split an overloaded node's excess evenly across qualifying neighbors
//
// SAFETY INVARIANTS:
// 1. Triggered only for congested, active nodes whose load exceeds capacity
// 2. A neighbor qualifies iff active and load + excess/|neighbors| <= its capacity
// 3. Either the full excess lands on qualifying neighbors, or none of it does
//    (capped, unserved) and the advisory says so
// 4. The overloaded node always ends at exactly its capacity

use log::{info, warn};
use trafficnet_core::{CongestionLevel, EventKind};

use crate::context::{NetworkContext, StateResult};

pub const NO_AVAILABLE_NEIGHBORS: &str = "No available neighbors";

#[derive(Debug, Clone, PartialEq)]
pub struct Redistribution {
    pub node_id: String,
    /// Load the node was capped at
    pub capped_at: f64,
    pub excess: f64,
    /// Per-neighbor shares; empty when nothing qualified
    pub shares: Vec<(String, f64)>,
    pub advisory: String,
}

impl Redistribution {
    pub fn delivered(&self) -> f64 {
        self.shares.iter().map(|(_, s)| s).sum()
    }

    pub fn dropped(&self) -> f64 {
        if self.shares.is_empty() {
            self.excess
        } else {
            0.0
        }
    }
}

/// Spread `excess` from `node_id` over qualifying neighbors.
///
/// Returns the shares applied (empty when no neighbor qualifies).
pub fn redistribute(ctx: &mut NetworkContext, node_id: &str, excess: f64) -> Vec<(String, f64)> {
    let neighbors: Vec<String> = ctx
        .graph()
        .neighbors(node_id)
        .iter()
        .map(|l| l.neighbor.clone())
        .collect();
    if neighbors.is_empty() || excess <= 0.0 {
        return Vec::new();
    }

    let tentative = excess / neighbors.len() as f64;
    let qualifying: Vec<String> = neighbors
        .into_iter()
        .filter(|n| {
            ctx.registry()
                .get(n)
                .map(|node| node.active && node.current_load + tentative <= node.capacity)
                .unwrap_or(false)
        })
        .collect();
    if qualifying.is_empty() {
        return Vec::new();
    }

    let split = excess / qualifying.len() as f64;
    let mut shares = Vec::with_capacity(qualifying.len());
    for neighbor in qualifying {
        if let Some(node) = ctx.registry_mut().get_mut(&neighbor) {
            node.current_load += split;
            shares.push((neighbor, split));
        }
    }
    shares
}

fn describe(shares: &[(String, f64)]) -> String {
    if shares.is_empty() {
        return NO_AVAILABLE_NEIGHBORS.to_string();
    }
    shares
        .iter()
        .map(|(n, s)| format!("{:.2} MB/s to {}", s, n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Record `volume` on `node_id` and relieve any overload.
///
/// Returns `None` when no redistribution was needed.
pub fn manage_load(
    ctx: &mut NetworkContext,
    node_id: &str,
    volume: f64,
    level: CongestionLevel,
    event: EventKind,
) -> StateResult<Option<Redistribution>> {
    let (active, capacity) = {
        let node = ctx.node_mut(node_id)?;
        node.current_load = if node.active { volume } else { 0.0 };
        (node.active, node.capacity)
    };

    if !level.is_congested() || !active || volume <= capacity {
        return Ok(None);
    }

    let excess = volume - capacity;
    ctx.node_mut(node_id)?.current_load = capacity;
    let shares = redistribute(ctx, node_id, excess);
    let detail = describe(&shares);

    let advisory = if event == EventKind::Ddos {
        format!(
            "Limited to {:.2} MB/s, {:.2} redistributed: {}",
            capacity, excess, detail
        )
    } else {
        detail
    };

    if shares.is_empty() {
        warn!("{} overloaded by {:.2}, no available neighbors; load capped", node_id, excess);
    } else {
        info!("{} overloaded by {:.2}: {}", node_id, excess, advisory);
    }

    Ok(Some(Redistribution {
        node_id: node_id.to_string(),
        capped_at: capacity,
        excess,
        shares,
        advisory,
    }))
}
