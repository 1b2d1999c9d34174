//! One module per stage family. Each adds a `run_*` method to `Pipeline`.

mod congestion;
mod healed;
mod optimized;
mod smart;
mod telemetry;
mod traffic;

use trafficnet_core::{Block, TelemetryCache};

/// The node's cached window plus `current`, oldest first, at most `window` long.
pub(crate) fn window_with<'a>(cache: &'a TelemetryCache, current: &'a Block) -> Vec<&'a Block> {
    let mut window = cache.recent(&current.node_id);
    window.push(current);
    let excess = window.len().saturating_sub(cache.window());
    window.drain(..excess);
    window
}

#[cfg(test)]
mod tests {
    use super::*;
    use trafficnet_core::block::genesis_timestamp;
    use trafficnet_core::{HealthLayer, HealthStatus, TrafficKind, TrafficLayer};

    fn block(node: &str, volume: f64) -> Block {
        Block::telemetry(
            genesis_timestamp(),
            node,
            TrafficLayer { kind: TrafficKind::Data, volume },
            HealthLayer { status: HealthStatus::Normal, latency: 1.0 },
            "0",
        )
        .unwrap()
    }

    #[test]
    fn test_window_keeps_latest_entries() {
        let mut cache = TelemetryCache::new(3);
        for v in [1.0, 2.0, 3.0] {
            cache.push(block("Node_1", v));
        }
        cache.push(block("Node_2", 99.0));
        let current = block("Node_1", 4.0);
        let window = window_with(&cache, &current);
        let volumes: Vec<f64> = window.iter().map(|b| b.traffic.volume).collect();
        assert_eq!(volumes, vec![2.0, 3.0, 4.0]);
    }
}
