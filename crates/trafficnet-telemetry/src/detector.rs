use log::debug;
use trafficnet_core::{Block, CongestionLayer, TelemetryCache, Thresholds};

use crate::scoring::{CongestionScoring, WindowedVolumeScoring};

/// Congestion detector over the ledger's telemetry cache.
///
/// The detector holds no thresholds of its own: callers pass the live
/// thresholds owned by the network context, so optimizer updates take
/// effect on the next assessment.
pub struct CongestionDetector {
    strategy: Box<dyn CongestionScoring>,
}

impl CongestionDetector {
    pub fn new(strategy: Box<dyn CongestionScoring>) -> Self {
        CongestionDetector { strategy }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Assess `node_id` from its cached window.
    pub fn detect(
        &self,
        cache: &TelemetryCache,
        node_id: &str,
        capacity: f64,
        thresholds: &Thresholds,
    ) -> CongestionLayer {
        let window = cache.recent(node_id);
        let layer = self.strategy.score(&window, capacity, thresholds);
        debug!(
            "{} congestion for {}: {} (score {:.2}, impact {:.2})",
            self.strategy.name(),
            node_id,
            layer.level,
            layer.score,
            layer.impact
        );
        layer
    }

    /// Assess an explicit window (oldest first).
    pub fn assess(&self, window: &[&Block], capacity: f64, thresholds: &Thresholds) -> CongestionLayer {
        self.strategy.score(window, capacity, thresholds)
    }
}

impl Default for CongestionDetector {
    fn default() -> Self {
        CongestionDetector::new(Box::new(WindowedVolumeScoring))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::NormalizedLoadScoring;
    use trafficnet_core::block::genesis_timestamp;
    use trafficnet_core::{CongestionLevel, HealthLayer, HealthStatus, TrafficKind, TrafficLayer};

    fn push(cache: &mut TelemetryCache, volume: f64) {
        cache.push(
            Block::telemetry(
                genesis_timestamp(),
                "Node_4",
                TrafficLayer { kind: TrafficKind::Stream, volume },
                HealthLayer { status: HealthStatus::Normal, latency: 2.0 },
                "0",
            )
            .unwrap(),
        );
    }

    #[test]
    fn test_detect_reads_cache_window() {
        let mut cache = TelemetryCache::new(4);
        for v in [10.0, 20.0, 30.0, 40.0, 100.0] {
            push(&mut cache, v);
        }
        let detector = CongestionDetector::default();
        let layer = detector.detect(&cache, "Node_4", 100.0, &Thresholds::default());
        assert_eq!(layer.level, CongestionLevel::High);
        assert_eq!(layer.score, 47.5);
        assert_eq!(detector.strategy_name(), "windowed-volume");
    }

    #[test]
    fn test_thresholds_are_live() {
        let mut cache = TelemetryCache::new(4);
        push(&mut cache, 55.0);
        let detector = CongestionDetector::default();
        let strict = Thresholds { medium: 30.0, high: 50.0 };
        assert_eq!(detector.detect(&cache, "Node_4", 100.0, &Thresholds::default()).level, CongestionLevel::Medium);
        assert_eq!(detector.detect(&cache, "Node_4", 100.0, &strict).level, CongestionLevel::High);
    }

    #[test]
    fn test_unknown_node_is_low() {
        let detector = CongestionDetector::new(Box::new(NormalizedLoadScoring));
        let layer = detector.detect(&TelemetryCache::default(), "Node_9", 100.0, &Thresholds::default());
        assert_eq!(layer.level, CongestionLevel::Low);
    }
}
