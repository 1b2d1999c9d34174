// ADAPTIVE CONGESTION THRESHOLDS
// Periodic local search over a fixed candidate set
//
// SAFETY INVARIANTS:
// 1. Runs exactly once per `period` observed blocks, and only on a full window
// 2. The chosen pair minimizes the count of window volumes above `high`
// 3. Ties keep the first-seen candidate
// 4. Every run produces one log record, changed or not

use std::collections::VecDeque;

use chrono::NaiveDateTime;
use log::info;
use trafficnet_core::{OptimizationRecord, Thresholds};

pub const CANDIDATE_THRESHOLDS: [Thresholds; 3] = [
    Thresholds { medium: 30.0, high: 60.0 },
    Thresholds { medium: 40.0, high: 70.0 },
    Thresholds { medium: 50.0, high: 80.0 },
];

#[derive(Debug, Clone)]
pub struct ThresholdOptimizer {
    candidates: Vec<Thresholds>,
    period: usize,
    window: VecDeque<f64>,
    since_last_run: usize,
}

impl ThresholdOptimizer {
    pub fn new(period: usize) -> Self {
        Self::with_candidates(period, CANDIDATE_THRESHOLDS.to_vec())
    }

    pub fn with_candidates(period: usize, candidates: Vec<Thresholds>) -> Self {
        let period = period.max(1);
        ThresholdOptimizer {
            candidates,
            period,
            window: VecDeque::with_capacity(period),
            since_last_run: 0,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// Pick the candidate with the fewest volumes above its `high`.
    /// Returns `None` when there are no candidates.
    pub fn best_for(&self, volumes: &[f64]) -> Option<(Thresholds, usize)> {
        let mut best: Option<(Thresholds, usize)> = None;
        for candidate in &self.candidates {
            let high_count = volumes.iter().filter(|v| **v > candidate.high).count();
            match best {
                Some((_, count)) if high_count >= count => {}
                _ => best = Some((*candidate, high_count)),
            }
        }
        best
    }

    /// Feed one accepted block's volume. Every `period` blocks (once the
    /// window is full) retunes `live` in place and returns the log record.
    pub fn observe(
        &mut self,
        volume: f64,
        timestamp: NaiveDateTime,
        live: &mut Thresholds,
    ) -> Option<OptimizationRecord> {
        self.window.push_back(volume);
        while self.window.len() > self.period {
            self.window.pop_front();
        }
        self.since_last_run += 1;
        if self.since_last_run < self.period || self.window.len() < self.period {
            return None;
        }
        self.since_last_run = 0;

        let volumes: Vec<f64> = self.window.iter().copied().collect();
        let (chosen, high_count) = self.best_for(&volumes)?;
        *live = chosen;
        info!(
            "Thresholds updated: Medium={}, High={}, High Blocks={}",
            chosen.medium, chosen.high, high_count
        );
        Some(OptimizationRecord {
            timestamp,
            thresholds: chosen,
            high_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trafficnet_core::block::genesis_timestamp;

    #[test]
    fn test_low_volumes_pick_first_candidate() {
        let optimizer = ThresholdOptimizer::new(100);
        let volumes = vec![12.0; 100];
        let (chosen, count) = optimizer.best_for(&volumes).unwrap();
        assert_eq!(chosen, Thresholds { medium: 30.0, high: 60.0 });
        assert_eq!(count, 0);
    }

    #[test]
    fn test_heavy_volumes_pick_loosest() {
        let optimizer = ThresholdOptimizer::new(100);
        let volumes: Vec<f64> = (0..100).map(|i| if i % 2 == 0 { 75.0 } else { 65.0 }).collect();
        let (chosen, count) = optimizer.best_for(&volumes).unwrap();
        assert_eq!(chosen, Thresholds { medium: 50.0, high: 80.0 });
        assert_eq!(count, 0);
    }

    #[test]
    fn test_runs_once_per_period() {
        let mut optimizer = ThresholdOptimizer::new(100);
        let mut live = Thresholds::default();
        let mut records = Vec::new();
        for _ in 0..250 {
            if let Some(record) = optimizer.observe(20.0, genesis_timestamp(), &mut live) {
                records.push(record);
            }
        }
        assert_eq!(records.len(), 2);
        assert_eq!(live, Thresholds { medium: 30.0, high: 60.0 });
        assert_eq!(records[0].high_count, 0);
    }

    #[test]
    fn test_not_before_full_window() {
        let mut optimizer = ThresholdOptimizer::new(100);
        let mut live = Thresholds::default();
        for _ in 0..99 {
            assert!(optimizer.observe(5.0, genesis_timestamp(), &mut live).is_none());
        }
        assert_eq!(live, Thresholds::default());
    }
}
