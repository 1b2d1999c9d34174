use std::collections::{BTreeMap, VecDeque};

use crate::block::Block;

/// Per-node FIFO of the most recently accepted blocks.
///
/// Only the ledger writes to the cache. Readers see a window of at most
/// `window` blocks per node, oldest first.
#[derive(Debug, Clone)]
pub struct TelemetryCache {
    window: usize,
    entries: BTreeMap<String, VecDeque<Block>>,
}

impl TelemetryCache {
    pub fn new(window: usize) -> Self {
        TelemetryCache {
            window: window.max(1),
            entries: BTreeMap::new(),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn push(&mut self, block: Block) {
        let entry = self.entries.entry(block.node_id.clone()).or_default();
        entry.push_back(block);
        while entry.len() > self.window {
            entry.pop_front();
        }
    }

    pub fn recent(&self, node_id: &str) -> Vec<&Block> {
        self.entries
            .get(node_id)
            .map(|q| q.iter().collect())
            .unwrap_or_default()
    }

    pub fn latest(&self, node_id: &str) -> Option<&Block> {
        self.entries.get(node_id).and_then(|q| q.back())
    }

    /// Mean volume over the node's window, if any.
    pub fn mean_volume(&self, node_id: &str) -> Option<f64> {
        self.mean_of(node_id, |b| b.traffic.volume)
    }

    pub fn mean_latency(&self, node_id: &str) -> Option<f64> {
        self.mean_of(node_id, |b| b.health.latency)
    }

    fn mean_of(&self, node_id: &str, f: impl Fn(&Block) -> f64) -> Option<f64> {
        let queue = self.entries.get(node_id)?;
        if queue.is_empty() {
            return None;
        }
        Some(queue.iter().map(f).sum::<f64>() / queue.len() as f64)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for TelemetryCache {
    fn default() -> Self {
        TelemetryCache::new(4)
    }
}
