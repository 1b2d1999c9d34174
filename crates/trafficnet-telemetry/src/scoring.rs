use trafficnet_core::{Block, CongestionLayer, CongestionLevel, Thresholds};

pub fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// Turns a node's recent window (oldest first, latest last) into a congestion assessment.
pub trait CongestionScoring: Send + Sync {
    fn name(&self) -> &'static str;

    fn score(&self, window: &[&Block], capacity: f64, thresholds: &Thresholds) -> CongestionLayer;
}

/// Level from the latest raw volume; score and impact are window means.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowedVolumeScoring;

impl CongestionScoring for WindowedVolumeScoring {
    fn name(&self) -> &'static str {
        "windowed-volume"
    }

    fn score(&self, window: &[&Block], _capacity: f64, thresholds: &Thresholds) -> CongestionLayer {
        let Some(latest) = window.last() else {
            return CongestionLayer::default();
        };
        let n = window.len() as f64;
        let mean_volume = window.iter().map(|b| b.traffic.volume).sum::<f64>() / n;
        let mean_latency = window.iter().map(|b| b.health.latency).sum::<f64>() / n;
        let level = CongestionLevel::classify(latest.traffic.volume, thresholds);
        CongestionLayer::new(level, mean_volume, mean_latency)
    }
}

/// Capacity-normalized load of the latest block.
///
/// score  = clamp01(0.7 * v/cap + 0.3 * lat/10)
/// impact = clamp01((lat/10) * (v/cap))
///
/// Bands are applied to the score expressed in percent, so the same
/// volume-scale thresholds (40/70) serve both strategies.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedLoadScoring;

impl NormalizedLoadScoring {
    pub fn load_score(volume: f64, latency: f64, capacity: f64) -> (f64, f64) {
        if capacity <= 0.0 {
            return (1.0, clamp01(latency / 10.0));
        }
        let load = volume / capacity;
        let score = clamp01(0.7 * load + 0.3 * (latency / 10.0));
        let impact = clamp01((latency / 10.0) * load);
        (score, impact)
    }
}

impl CongestionScoring for NormalizedLoadScoring {
    fn name(&self) -> &'static str {
        "normalized-load"
    }

    fn score(&self, window: &[&Block], capacity: f64, thresholds: &Thresholds) -> CongestionLayer {
        let Some(latest) = window.last() else {
            return CongestionLayer::default();
        };
        let (score, impact) =
            Self::load_score(latest.traffic.volume, latest.health.latency, capacity);
        let level = CongestionLevel::classify(score * 100.0, thresholds);
        CongestionLayer::new(level, score, impact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trafficnet_core::block::genesis_timestamp;
    use trafficnet_core::{HealthLayer, HealthStatus, TrafficKind, TrafficLayer};

    fn block(volume: f64, latency: f64) -> Block {
        Block::telemetry(
            genesis_timestamp(),
            "Node_1",
            TrafficLayer { kind: TrafficKind::Data, volume },
            HealthLayer { status: HealthStatus::Normal, latency },
            "0",
        )
        .unwrap()
    }

    #[test]
    fn test_windowed_uses_latest_for_level() {
        let blocks = [block(90.0, 2.0), block(10.0, 4.0)];
        let window: Vec<&Block> = blocks.iter().collect();
        let layer = WindowedVolumeScoring.score(&window, 100.0, &Thresholds::default());
        assert_eq!(layer.level, CongestionLevel::Low);
        assert!(!layer.is_congested);
        assert_eq!(layer.score, 50.0);
        assert_eq!(layer.impact, 3.0);
    }

    #[test]
    fn test_windowed_boundaries() {
        let t = Thresholds::default();
        for (volume, expected) in [
            (40.0, CongestionLevel::Low),
            (40.5, CongestionLevel::Medium),
            (70.0, CongestionLevel::Medium),
            (70.5, CongestionLevel::High),
        ] {
            let b = block(volume, 1.0);
            let layer = WindowedVolumeScoring.score(&[&b], 100.0, &t);
            assert_eq!(layer.level, expected, "volume {}", volume);
            assert_eq!(layer.is_congested, expected != CongestionLevel::Low);
        }
    }

    #[test]
    fn test_empty_window_is_low() {
        let layer = NormalizedLoadScoring.score(&[], 100.0, &Thresholds::default());
        assert_eq!(layer, CongestionLayer::default());
    }

    #[test]
    fn test_normalized_formula() {
        let b = block(50.0, 5.0);
        let layer = NormalizedLoadScoring.score(&[&b], 100.0, &Thresholds::default());
        // 0.7 * 0.5 + 0.3 * 0.5
        assert!((layer.score - 0.5).abs() < 1e-12);
        assert!((layer.impact - 0.25).abs() < 1e-12);
        assert_eq!(layer.level, CongestionLevel::Medium);

        let b = block(400.0, 50.0);
        let layer = NormalizedLoadScoring.score(&[&b], 100.0, &Thresholds::default());
        assert_eq!(layer.score, 1.0);
        assert_eq!(layer.impact, 1.0);
        assert_eq!(layer.level, CongestionLevel::High);
    }

    #[test]
    fn test_zero_capacity_saturates() {
        let (score, _) = NormalizedLoadScoring::load_score(10.0, 0.0, 0.0);
        assert_eq!(score, 1.0);
        assert_eq!(clamp01(f64::NAN), 0.0);
    }
}
