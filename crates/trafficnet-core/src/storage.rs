// LEDGER PERSISTENCE
// sled-backed store: one tree per stage plus the threshold optimization log
//
// SAFETY INVARIANTS:
// 1. Keys are big-endian sequence numbers, so iteration order == append order
// 2. A stage tree is replaced atomically (single batch)
// 3. Contention is retried with bounded exponential backoff, then surfaced
// 4. Loaded records keep their stored hash; they are never silently rehashed

use std::convert::TryFrom;
use std::path::Path;
use std::thread;
use std::time::Duration;

use chrono::NaiveDateTime;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use trafficnet_crypto::KeyRing;

use crate::block::{
    Annotations, Block, CongestionLayer, CongestionLevel, EventKind, HealthLayer, HealthStatus,
    OrderType, Stage, Thresholds, TrafficKind, TrafficLayer,
};
use crate::error::{StorageError, StorageResult};

const OPTIMIZATION_TREE: &str = "optimization_log";

/// Flat persisted form of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub timestamp: NaiveDateTime,
    pub node_id: String,
    pub traffic_type: TrafficKind,
    pub traffic_volume: f64,
    pub network_health: HealthStatus,
    pub latency: f64,
    pub previous_hash: String,
    pub block_hash: String,
    pub is_congested: bool,
    pub congestion_level: CongestionLevel,
    pub congestion_score: f64,
    pub latency_impact: f64,
    pub advisory_text: Option<String>,
    pub order_type: Option<OrderType>,
    /// Hex-encoded signature
    pub signature: Option<String>,
    pub nonce: u64,
    pub stage: Stage,
    pub event_type: EventKind,
    pub source_hash: Option<String>,
    #[serde(default)]
    pub annotations: Annotations,
}

impl From<&Block> for LedgerRecord {
    fn from(block: &Block) -> Self {
        LedgerRecord {
            timestamp: block.timestamp,
            node_id: block.node_id.clone(),
            traffic_type: block.traffic.kind,
            traffic_volume: block.traffic.volume,
            network_health: block.health.status,
            latency: block.health.latency,
            previous_hash: block.previous_hash.clone(),
            block_hash: block.hash.clone(),
            is_congested: block.congestion.is_congested,
            congestion_level: block.congestion.level,
            congestion_score: block.congestion.score,
            latency_impact: block.congestion.impact,
            advisory_text: block.advisory_text(),
            order_type: block.order_type,
            signature: block.signature.as_ref().map(hex::encode),
            nonce: block.nonce,
            stage: block.stage,
            event_type: block.event,
            source_hash: block.source_hash.clone(),
            annotations: block.annotations.clone(),
        }
    }
}

impl TryFrom<LedgerRecord> for Block {
    type Error = StorageError;

    fn try_from(record: LedgerRecord) -> Result<Self, Self::Error> {
        let signature = match record.signature {
            Some(sig) => Some(hex::decode(&sig).map_err(|e| StorageError::Corrupt {
                tree: record.stage.as_str().to_string(),
                reason: format!("signature of {} is not hex: {}", record.block_hash, e),
            })?),
            None => None,
        };
        Ok(Block {
            timestamp: record.timestamp,
            node_id: record.node_id,
            traffic: TrafficLayer { kind: record.traffic_type, volume: record.traffic_volume },
            health: HealthLayer { status: record.network_health, latency: record.latency },
            previous_hash: record.previous_hash,
            nonce: record.nonce,
            stage: record.stage,
            event: record.event_type,
            congestion: CongestionLayer {
                is_congested: record.is_congested,
                score: record.congestion_score,
                impact: record.latency_impact,
                level: record.congestion_level,
            },
            order_type: record.order_type,
            annotations: record.annotations,
            source_hash: record.source_hash,
            hash: record.block_hash,
            signature,
        })
    }
}

/// One threshold optimizer decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRecord {
    pub timestamp: NaiveDateTime,
    pub thresholds: Thresholds,
    /// Volumes above the chosen `high` in the evaluated window
    pub high_count: usize,
}

/// Result of [`LedgerStore::load_verified`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerifiedLoad {
    pub blocks: Vec<Block>,
    /// Unsigned records that were signed on load
    pub resigned: usize,
    /// Records discarded for a bad or unsignable signature
    pub dropped: usize,
}

/// Bounded retry for transient contention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    /// Run `op`, retrying only on `StorageError::Contention`.
    pub fn run<T>(&self, mut op: impl FnMut() -> StorageResult<T>) -> StorageResult<T> {
        let mut backoff = self.initial_backoff;
        let mut attempt = 1;
        loop {
            match op() {
                Err(StorageError::Contention(reason)) if attempt < self.max_attempts => {
                    warn!(
                        "Storage contention (attempt {}/{}): {}, retrying in {:?}",
                        attempt, self.max_attempts, reason, backoff
                    );
                    thread::sleep(backoff);
                    backoff *= 2;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

pub struct LedgerStore {
    db: sled::Db,
    retry: RetryPolicy,
}

impl LedgerStore {
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        info!("Opened ledger store at {}", path.display());
        Ok(LedgerStore { db, retry: RetryPolicy::default() })
    }

    /// In-memory store removed on drop.
    pub fn temporary() -> StorageResult<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(LedgerStore { db, retry: RetryPolicy::default() })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn tree(&self, name: &str) -> StorageResult<sled::Tree> {
        self.retry.run(|| Ok(self.db.open_tree(name)?))
    }

    fn next_key(&self) -> StorageResult<[u8; 8]> {
        self.retry.run(|| Ok(self.db.generate_id()?.to_be_bytes()))
    }

    fn encode<T: Serialize>(tree: &str, value: &T) -> StorageResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| StorageError::Backend(format!("encoding into {}: {}", tree, e)))
    }

    /// Append one block to the stage tree.
    pub fn append(&self, stage: Stage, block: &Block) -> StorageResult<()> {
        let tree = self.tree(stage.as_str())?;
        let value = Self::encode(stage.as_str(), &LedgerRecord::from(block))?;
        let key = self.next_key()?;
        self.retry.run(|| {
            tree.insert(key, value.as_slice())?;
            Ok(())
        })
    }

    /// Atomically replace the stage tree with `blocks`.
    pub fn replace(&self, stage: Stage, blocks: &[Block]) -> StorageResult<()> {
        let tree = self.tree(stage.as_str())?;
        let mut batch = sled::Batch::default();
        for entry in tree.iter() {
            let (key, _) = entry?;
            batch.remove(key);
        }
        for block in blocks {
            let value = Self::encode(stage.as_str(), &LedgerRecord::from(block))?;
            batch.insert(self.next_key()?.to_vec(), value);
        }
        self.retry.run(|| Ok(tree.apply_batch(batch.clone())?))?;
        self.flush()?;
        info!("Persisted {} blocks to {} tree", blocks.len(), stage);
        Ok(())
    }

    pub fn load_records(&self, stage: Stage) -> StorageResult<Vec<LedgerRecord>> {
        let tree = self.tree(stage.as_str())?;
        let mut records = Vec::with_capacity(tree.len());
        for entry in tree.iter() {
            let (_, value) = entry?;
            let record: LedgerRecord =
                serde_json::from_slice(&value).map_err(|e| StorageError::Corrupt {
                    tree: stage.as_str().to_string(),
                    reason: e.to_string(),
                })?;
            records.push(record);
        }
        Ok(records)
    }

    /// Blocks exactly as stored, in append order.
    pub fn load(&self, stage: Stage) -> StorageResult<Vec<Block>> {
        self.load_records(stage)?
            .into_iter()
            .map(Block::try_from)
            .collect()
    }

    /// Blocks whose signatures check out under `keys`.
    ///
    /// Unsigned records are re-signed with the issuer's key; records with an
    /// invalid signature are dropped, logged and counted. Hashes are not
    /// recomputed.
    pub fn load_verified(&self, stage: Stage, keys: &KeyRing) -> StorageResult<VerifiedLoad> {
        let mut load = VerifiedLoad::default();
        for mut block in self.load(stage)? {
            match block.signature.as_deref() {
                None => match keys.sign(&block.node_id, &block.hash) {
                    Ok(sig) => {
                        block.signature = Some(sig);
                        load.resigned += 1;
                        load.blocks.push(block);
                    }
                    Err(e) => {
                        error!("Could not re-sign loaded block {}: {}", block.hash, e);
                        load.dropped += 1;
                    }
                },
                Some(sig) if keys.verify(&block.node_id, &block.hash, sig) => load.blocks.push(block),
                Some(_) => {
                    error!(
                        "Invalid signature for loaded block {} from {}, block dropped",
                        block.hash, block.node_id
                    );
                    load.dropped += 1;
                }
            }
        }
        Ok(load)
    }

    pub fn clear(&self, stage: Stage) -> StorageResult<()> {
        let tree = self.tree(stage.as_str())?;
        self.retry.run(|| Ok(tree.clear()?))
    }

    pub fn log_optimization(&self, record: &OptimizationRecord) -> StorageResult<()> {
        let tree = self.tree(OPTIMIZATION_TREE)?;
        let value = Self::encode(OPTIMIZATION_TREE, record)?;
        let key = self.next_key()?;
        self.retry.run(|| {
            tree.insert(key, value.as_slice())?;
            Ok(())
        })
    }

    pub fn optimization_log(&self) -> StorageResult<Vec<OptimizationRecord>> {
        let tree = self.tree(OPTIMIZATION_TREE)?;
        tree.iter()
            .map(|entry| {
                let (_, value) = entry?;
                serde_json::from_slice(&value).map_err(|e| StorageError::Corrupt {
                    tree: OPTIMIZATION_TREE.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    pub fn flush(&self) -> StorageResult<()> {
        self.retry.run(|| {
            self.db.flush()?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{genesis_timestamp, GENESIS_ID};
    use std::cell::Cell;

    fn block(node: &str, volume: f64, previous: &str) -> Block {
        let mut block = Block::telemetry(
            genesis_timestamp(),
            node,
            TrafficLayer { kind: TrafficKind::Game, volume },
            HealthLayer { status: HealthStatus::Delayed, latency: 0.1 + volume / 7.0 },
            previous,
        )
        .unwrap();
        block.annotations.traffic_suggestion = Some("Reduce Game traffic by 20%".into());
        block.order_type = Some(OrderType::Standard);
        block.seal().unwrap();
        block
    }

    fn keys() -> KeyRing {
        KeyRing::generate(["Node_1", "Node_2"], 9).with_alias(GENESIS_ID, "Node_1")
    }

    #[test]
    fn test_records_rehash_identically() {
        let store = LedgerStore::temporary().unwrap();
        let first = block("Node_1", 33.333333333333336, "0");
        let second = block("Node_2", 0.1 + 0.2, &first.hash);
        store.replace(Stage::Managed, &[first.clone(), second.clone()]).unwrap();

        let loaded = store.load(Stage::Managed).unwrap();
        assert_eq!(loaded, vec![first, second]);
        for b in &loaded {
            assert!(b.hash_is_consistent());
        }
    }

    #[test]
    fn test_replace_discards_previous_contents() {
        let store = LedgerStore::temporary().unwrap();
        store.append(Stage::Telemetry, &block("Node_1", 1.0, "0")).unwrap();
        store.append(Stage::Telemetry, &block("Node_1", 2.0, "0")).unwrap();
        store.replace(Stage::Telemetry, &[block("Node_2", 3.0, "0")]).unwrap();
        let loaded = store.load(Stage::Telemetry).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].node_id, "Node_2");
        assert!(store.load(Stage::Healed).unwrap().is_empty());
    }

    #[test]
    fn test_load_verified_resigns_and_drops() {
        let keys = keys();
        let store = LedgerStore::temporary().unwrap();

        let unsigned = block("Node_1", 10.0, "0");
        let mut forged = block("Node_2", 20.0, &unsigned.hash);
        forged.signature = Some(keys.sign("Node_1", &forged.hash).unwrap());
        let mut good = block("Node_2", 30.0, &forged.hash);
        good.signature = Some(keys.sign("Node_2", &good.hash).unwrap());
        store.replace(Stage::Smart, &[unsigned, forged, good.clone()]).unwrap();

        let loaded = store.load_verified(Stage::Smart, &keys).unwrap();
        assert_eq!(loaded.blocks.len(), 2);
        assert_eq!(loaded.dropped, 1);
        assert_eq!(loaded.resigned, 1);
        assert!(loaded.blocks[0].signature.is_some());
        assert_eq!(loaded.blocks[1], good);
    }

    #[test]
    fn test_optimization_log_roundtrip() {
        let store = LedgerStore::temporary().unwrap();
        let record = OptimizationRecord {
            timestamp: genesis_timestamp(),
            thresholds: Thresholds { medium: 30.0, high: 60.0 },
            high_count: 0,
        };
        store.log_optimization(&record).unwrap();
        assert_eq!(store.optimization_log().unwrap(), vec![record]);
    }

    #[test]
    fn test_retry_gives_up_after_max_attempts() {
        let policy = RetryPolicy { max_attempts: 5, initial_backoff: Duration::from_millis(1) };
        let calls = Cell::new(0);
        let result: StorageResult<()> = policy.run(|| {
            calls.set(calls.get() + 1);
            Err(StorageError::Contention("busy".into()))
        });
        assert!(matches!(result, Err(StorageError::Contention(_))));
        assert_eq!(calls.get(), 5);

        let calls = Cell::new(0);
        let result = policy.run(|| {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(StorageError::Contention("busy".into()))
            } else {
                Ok(7)
            }
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_backend_errors_not_retried() {
        let policy = RetryPolicy::default();
        let calls = Cell::new(0);
        let result: StorageResult<()> = policy.run(|| {
            calls.set(calls.get() + 1);
            Err(StorageError::Backend("disk".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }
}
