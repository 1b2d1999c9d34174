// BANDWIDTH ALLOCATION
// Fixed-quantum bandwidth shifts driven by priority and predicted congestion
//
// SAFETY INVARIANTS:
// 1. Rules are evaluated in order: priority, predicted congestion, failure
// 2. Congestion shifts conserve bandwidth: what the issuer loses, neighbors gain
// 3. Only active neighbors below capacity receive bandwidth

use log::info;
use trafficnet_core::{Block, CongestionLevel, HealthStatus, OrderType, TrafficKind};

use crate::context::{NetworkContext, StateResult};

/// Average volume above which a node counts as high-traffic.
pub const HIGH_TRAFFIC_AVERAGE: f64 = 50.0;

const PRIORITY_BONUS: f64 = 30.0;
const CONGESTION_SHIFT: f64 = 20.0;
const FAILURE_SHARE: f64 = 10.0;

pub const NO_OPTIMIZATION: &str = "No resource optimization needed";

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationOutcome {
    pub advisory: String,
    /// Net bandwidth change per node
    pub changes: Vec<(String, f64)>,
}

impl AllocationOutcome {
    fn none() -> Self {
        AllocationOutcome { advisory: NO_OPTIMIZATION.to_string(), changes: Vec::new() }
    }

    pub fn is_allocation(&self) -> bool {
        self.advisory != NO_OPTIMIZATION
    }
}

/// Reallocate bandwidth around `block`'s issuer.
///
/// `predicted` is the predictor's level for the block; `average_volume` is
/// the issuer's mean volume over the upstream ledger.
pub fn allocate_bandwidth(
    ctx: &mut NetworkContext,
    block: &Block,
    predicted: CongestionLevel,
    average_volume: f64,
) -> StateResult<AllocationOutcome> {
    let node_id = block.node_id.as_str();
    ctx.node(node_id)?;

    let is_priority =
        block.traffic.kind == TrafficKind::Priority || block.order_type == Some(OrderType::Priority);

    if is_priority {
        ctx.node_mut(node_id)?.allocated_bandwidth += PRIORITY_BONUS;
        info!("Allocated {} MB/s extra bandwidth to {}", PRIORITY_BONUS, node_id);
        return Ok(AllocationOutcome {
            advisory: format!(
                "Allocated {} MB/s extra bandwidth due to Priority traffic",
                PRIORITY_BONUS
            ),
            changes: vec![(node_id.to_string(), PRIORITY_BONUS)],
        });
    }

    if predicted.is_congested() && average_volume > HIGH_TRAFFIC_AVERAGE {
        let healthy = ctx.available_neighbors(node_id);
        if healthy.is_empty() {
            return Ok(AllocationOutcome {
                advisory: format!(
                    "Reduced {} MB/s bandwidth due to high congestion, no healthy neighbors available",
                    CONGESTION_SHIFT
                ),
                changes: Vec::new(),
            });
        }
        let split = CONGESTION_SHIFT / healthy.len() as f64;
        ctx.node_mut(node_id)?.allocated_bandwidth -= CONGESTION_SHIFT;
        let mut changes = vec![(node_id.to_string(), -CONGESTION_SHIFT)];
        for neighbor in &healthy {
            ctx.node_mut(neighbor)?.allocated_bandwidth += split;
            changes.push((neighbor.clone(), split));
        }
        return Ok(AllocationOutcome {
            advisory: format!(
                "Reduced {} MB/s bandwidth, redistributed {:.2} MB/s to {}",
                CONGESTION_SHIFT,
                split,
                healthy.join(", ")
            ),
            changes,
        });
    }

    if block.health.status == HealthStatus::Down {
        let healthy = ctx.available_neighbors(node_id);
        if !healthy.is_empty() {
            let split = FAILURE_SHARE / healthy.len() as f64;
            let mut changes = Vec::with_capacity(healthy.len());
            for neighbor in &healthy {
                ctx.node_mut(neighbor)?.allocated_bandwidth += split;
                changes.push((neighbor.clone(), split));
            }
            return Ok(AllocationOutcome {
                advisory: format!(
                    "Redistributed {:.2} MB/s to {} due to node failure",
                    split,
                    healthy.join(", ")
                ),
                changes,
            });
        }
    }

    Ok(AllocationOutcome::none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use trafficnet_core::block::genesis_timestamp;
    use trafficnet_core::{Graph, HealthLayer, Node, NodeRegistry, Thresholds, Topology, TrafficLayer};

    fn context() -> NetworkContext {
        let registry = NodeRegistry::from_nodes(vec![
            Node::new("A", 100.0, 50.0),
            Node::new("B", 100.0, 50.0),
            Node::new("C", 100.0, 50.0),
        ]);
        let graph = Graph::from_edges(vec![("A", "B", 1.0), ("A", "C", 1.0)]);
        NetworkContext::new(Topology::from_parts(graph, registry), Thresholds::default())
    }

    fn block(kind: TrafficKind, status: HealthStatus) -> Block {
        Block::telemetry(
            genesis_timestamp(),
            "A",
            TrafficLayer { kind, volume: 60.0 },
            HealthLayer { status, latency: 1.0 },
            "0",
        )
        .unwrap()
    }

    #[test]
    fn test_priority_bonus() {
        let mut ctx = context();
        let outcome = allocate_bandwidth(&mut ctx, &block(TrafficKind::Priority, HealthStatus::Down), CongestionLevel::High, 90.0).unwrap();
        assert_eq!(outcome.advisory, "Allocated 30 MB/s extra bandwidth due to Priority traffic");
        assert_eq!(ctx.node("A").unwrap().allocated_bandwidth, 80.0);
    }

    #[test]
    fn test_congestion_shift_conserves_bandwidth() {
        let mut ctx = context();
        let before = ctx.total_bandwidth();
        let outcome = allocate_bandwidth(&mut ctx, &block(TrafficKind::Data, HealthStatus::Normal), CongestionLevel::Medium, 55.0).unwrap();
        assert_eq!(outcome.advisory, "Reduced 20 MB/s bandwidth, redistributed 10.00 MB/s to B, C");
        assert_eq!(ctx.node("A").unwrap().allocated_bandwidth, 30.0);
        assert_eq!(ctx.node("B").unwrap().allocated_bandwidth, 60.0);
        assert_eq!(ctx.total_bandwidth(), before);
    }

    #[test]
    fn test_low_average_skips_congestion_rule() {
        let mut ctx = context();
        let outcome = allocate_bandwidth(&mut ctx, &block(TrafficKind::Data, HealthStatus::Normal), CongestionLevel::High, 50.0).unwrap();
        assert!(!outcome.is_allocation());
        assert_eq!(ctx.total_bandwidth(), 150.0);
    }

    #[test]
    fn test_failure_share() {
        let mut ctx = context();
        ctx.apply_event("C", trafficnet_core::EventKind::Outage).unwrap();
        let outcome = allocate_bandwidth(&mut ctx, &block(TrafficKind::Game, HealthStatus::Down), CongestionLevel::Low, 10.0).unwrap();
        assert_eq!(outcome.advisory, "Redistributed 10.00 MB/s to B due to node failure");
        assert_eq!(ctx.node("B").unwrap().allocated_bandwidth, 60.0);
    }

    #[test]
    fn test_congested_without_neighbors() {
        let mut ctx = context();
        ctx.apply_event("B", trafficnet_core::EventKind::Outage).unwrap();
        ctx.apply_event("C", trafficnet_core::EventKind::Outage).unwrap();
        let outcome = allocate_bandwidth(&mut ctx, &block(TrafficKind::Data, HealthStatus::Normal), CongestionLevel::High, 80.0).unwrap();
        assert!(outcome.advisory.contains("no healthy neighbors"));
        assert_eq!(ctx.node("A").unwrap().allocated_bandwidth, 50.0);
    }
}
