use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use trafficnet_core::{Block, HealthStatus, OrderType, TrafficKind};

/// Which stage's rule set to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionProfile {
    Managed,
    Ordered,
    RealTime,
}

/// Per-block RNG so suggestion work can run in parallel and stay reproducible.
pub fn block_rng(seed: u64, block_hash: &str) -> StdRng {
    let prefix = block_hash.get(..16).unwrap_or(block_hash);
    let salt = u64::from_str_radix(prefix, 16).unwrap_or(0);
    StdRng::seed_from_u64(seed ^ salt)
}

/// Traffic-management suggestion for a congested block; `None` otherwise.
/// First matching rule wins.
pub fn suggest_traffic<R: Rng + ?Sized>(
    block: &Block,
    profile: SuggestionProfile,
    neighbors: &[&str],
    rng: &mut R,
) -> Option<String> {
    if !block.congestion.is_congested {
        return None;
    }
    let kind = block.traffic.kind;
    let neighbor = neighbors.choose(rng);

    let suggestion = match profile {
        SuggestionProfile::Ordered if kind == TrafficKind::Priority => format!(
            "Prioritize {} traffic, allocate maximum bandwidth to {}",
            kind, block.node_id
        ),
        SuggestionProfile::RealTime if block.order_type == Some(OrderType::Priority) => format!(
            "Fast-track {} traffic, allocate maximum resources to {}",
            kind, block.node_id
        ),
        _ if block.traffic.volume > 70.0 => match neighbor {
            Some(n) => format!("Redirect {} traffic to {} or limit bandwidth by 50%", kind, n),
            None => format!("Limit {} bandwidth by 50%", kind),
        },
        _ if block.health.status == HealthStatus::Down => match neighbor {
            Some(n) => format!("Increase monitoring for {}, reroute to {}", kind, n),
            None => format!("Increase monitoring for {}", kind),
        },
        _ if block.health.status == HealthStatus::Delayed => {
            format!("Optimize {} routing, reduce load by 30%", kind)
        }
        _ => format!("Reduce {} traffic by 20% or prioritize critical nodes", kind),
    };
    Some(suggestion)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trafficnet_core::block::genesis_timestamp;
    use trafficnet_core::{CongestionLayer, CongestionLevel, HealthLayer, TrafficLayer};

    fn block(kind: TrafficKind, volume: f64, status: HealthStatus, level: CongestionLevel) -> Block {
        let mut b = Block::telemetry(
            genesis_timestamp(),
            "Node_3",
            TrafficLayer { kind, volume },
            HealthLayer { status, latency: 1.0 },
            "0",
        )
        .unwrap();
        b.congestion = CongestionLayer::new(level, volume, 1.0);
        b
    }

    #[test]
    fn test_uncongested_gets_nothing() {
        let b = block(TrafficKind::Data, 10.0, HealthStatus::Down, CongestionLevel::Low);
        let mut rng = block_rng(1, &b.hash);
        assert_eq!(suggest_traffic(&b, SuggestionProfile::Managed, &["Node_1"], &mut rng), None);
    }

    #[test]
    fn test_rule_order() {
        let mut rng = block_rng(1, "00");
        let high = block(TrafficKind::Stream, 90.0, HealthStatus::Down, CongestionLevel::High);
        assert_eq!(
            suggest_traffic(&high, SuggestionProfile::Managed, &["Node_1"], &mut rng).unwrap(),
            "Redirect Stream traffic to Node_1 or limit bandwidth by 50%"
        );

        let down = block(TrafficKind::Game, 50.0, HealthStatus::Down, CongestionLevel::Medium);
        assert_eq!(
            suggest_traffic(&down, SuggestionProfile::Managed, &["Node_2"], &mut rng).unwrap(),
            "Increase monitoring for Game, reroute to Node_2"
        );

        let delayed = block(TrafficKind::Data, 50.0, HealthStatus::Delayed, CongestionLevel::Medium);
        assert_eq!(
            suggest_traffic(&delayed, SuggestionProfile::Managed, &[], &mut rng).unwrap(),
            "Optimize Data routing, reduce load by 30%"
        );

        let plain = block(TrafficKind::Data, 50.0, HealthStatus::Normal, CongestionLevel::Medium);
        assert_eq!(
            suggest_traffic(&plain, SuggestionProfile::Managed, &[], &mut rng).unwrap(),
            "Reduce Data traffic by 20% or prioritize critical nodes"
        );
    }

    #[test]
    fn test_priority_profiles() {
        let mut rng = block_rng(3, "ff");
        let priority = block(TrafficKind::Priority, 90.0, HealthStatus::Normal, CongestionLevel::High);
        assert_eq!(
            suggest_traffic(&priority, SuggestionProfile::Ordered, &["Node_1"], &mut rng).unwrap(),
            "Prioritize Priority traffic, allocate maximum bandwidth to Node_3"
        );

        let mut ordered = priority.clone();
        ordered.order_type = Some(OrderType::Priority);
        assert_eq!(
            suggest_traffic(&ordered, SuggestionProfile::RealTime, &["Node_1"], &mut rng).unwrap(),
            "Fast-track Priority traffic, allocate maximum resources to Node_3"
        );
    }

    #[test]
    fn test_block_rng_is_reproducible() {
        let mut a = block_rng(9, "a1b2c3d4e5f60718");
        let mut b = block_rng(9, "a1b2c3d4e5f60718");
        assert_eq!(a.gen::<u64>(), b.gen::<u64>());
    }
}
