use proptest::prelude::*;
use trafficnet_core::block::genesis_timestamp;
use trafficnet_core::{CongestionLevel, Thresholds};
use trafficnet_telemetry::{ThresholdOptimizer, CANDIDATE_THRESHOLDS};

proptest! {
    #[test]
    fn quiet_windows_always_pick_tightest(volumes in prop::collection::vec(0.0f64..30.0, 100)) {
        let mut optimizer = ThresholdOptimizer::new(100);
        let mut live = Thresholds::default();
        let mut record = None;
        for v in &volumes {
            record = optimizer.observe(*v, genesis_timestamp(), &mut live).or(record);
        }
        let record = record.unwrap();
        prop_assert_eq!(record.thresholds, CANDIDATE_THRESHOLDS[0]);
        prop_assert_eq!(record.high_count, 0);
        prop_assert_eq!(live, CANDIDATE_THRESHOLDS[0]);
    }

    #[test]
    fn chosen_pair_minimizes_high_count(volumes in prop::collection::vec(0.0f64..200.0, 100)) {
        let optimizer = ThresholdOptimizer::new(100);
        let (_, best) = optimizer.best_for(&volumes).unwrap();
        for candidate in CANDIDATE_THRESHOLDS {
            let count = volumes.iter().filter(|v| **v > candidate.high).count();
            prop_assert!(best <= count);
        }
    }

    #[test]
    fn bands_are_ordered(x in 0.0f64..200.0, y in 0.0f64..200.0) {
        let t = Thresholds::default();
        if x <= y {
            prop_assert!(CongestionLevel::classify(x, &t) <= CongestionLevel::classify(y, &t));
        }
    }
}
