// STAGE LEDGER
// Append-only, hash-linked, signed chain with a single head cursor
//
// SAFETY INVARIANTS:
// 1. The first block is always the stage's genesis block
// 2. Every accepted block satisfies previous_hash == head at acceptance time
// 3. Every accepted block's hash is the digest of its content
// 4. Every accepted block carries a signature that verifies under its issuer's key
// 5. Rejected candidates leave head, chain and cache untouched

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use trafficnet_crypto::KeyRing;

use crate::block::{Block, Stage, GENESIS_ID, GENESIS_PREVIOUS_HASH};
use crate::error::{LedgerError, LedgerResult};
use crate::telemetry_cache::TelemetryCache;
use crate::topology::NodeRegistry;

/// Gate deciding whether `issuer` may fill the next slot.
///
/// Implementations may mutate the registry (e.g. credit the drawn node's
/// validation history). `authorize` is called repeatedly until it returns
/// `true` or the ledger's wall-clock budget runs out.
pub trait SlotAuthority {
    fn authorize(&mut self, registry: &mut NodeRegistry, issuer: &str) -> bool;

    /// `false` when no draw can ever succeed (e.g. zero total weight).
    fn eligible(&self, _registry: &NodeRegistry) -> bool {
        true
    }
}

/// Outcome of an accepted append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendReceipt {
    pub height: usize,
    pub hash: String,
    pub nonce: u64,
}

pub struct Ledger {
    stage: Stage,
    chain: Vec<Block>,
    head: String,
    cache: TelemetryCache,
    keys: Arc<KeyRing>,
}

impl Ledger {
    /// Start a ledger at a freshly signed genesis block.
    pub fn new(stage: Stage, keys: Arc<KeyRing>, cache_window: usize) -> LedgerResult<Self> {
        let genesis = Self::create_genesis(stage, &keys)?;
        let head = genesis.hash.clone();
        info!("Genesis block created for {} ledger: {}", stage, head);
        Ok(Ledger {
            stage,
            chain: vec![genesis],
            head,
            cache: TelemetryCache::new(cache_window),
            keys,
        })
    }

    /// Genesis for `stage`, signed under the keyring's `Genesis` alias.
    pub fn create_genesis(stage: Stage, keys: &KeyRing) -> LedgerResult<Block> {
        let mut genesis = Block::genesis(stage)?;
        genesis.signature = Some(keys.sign(GENESIS_ID, &genesis.hash)?);
        Ok(genesis)
    }

    /// Rebuild a ledger from persisted blocks without checking them.
    /// Call `verify_chain` to audit the result.
    pub fn from_blocks(
        stage: Stage,
        keys: Arc<KeyRing>,
        cache_window: usize,
        blocks: Vec<Block>,
    ) -> LedgerResult<Self> {
        if blocks.is_empty() {
            return Self::new(stage, keys, cache_window);
        }
        let mut cache = TelemetryCache::new(cache_window);
        for block in blocks.iter().filter(|b| !b.is_genesis()) {
            cache.push(block.clone());
        }
        let head = blocks.last().map(|b| b.hash.clone()).unwrap_or_default();
        Ok(Ledger { stage, chain: blocks, head, cache, keys })
    }

    /// Validator-gated append for freshly produced telemetry.
    ///
    /// A candidate that arrives already signed must verify as-is; otherwise
    /// it would be possible to launder a tampered block through re-signing.
    /// Each failed draw bumps the nonce and reseals. The retry loop is bounded
    /// by `budget`, not by a draw count.
    pub fn append(
        &mut self,
        mut candidate: Block,
        registry: &mut NodeRegistry,
        authority: &mut dyn SlotAuthority,
        budget: Duration,
    ) -> LedgerResult<AppendReceipt> {
        if candidate.signature.is_some() {
            self.check_integrity(&candidate)?;
        }

        let issuer = candidate.node_id.clone();
        let started = Instant::now();
        let mut attempts: u64 = 0;

        if !authority.eligible(registry) {
            warn!("No eligible validators for block from {}", issuer);
            return Err(LedgerError::ValidatorTimeout {
                node: issuer,
                elapsed_ms: 0,
                attempts: 0,
            });
        }

        while !authority.authorize(registry, &issuer) {
            attempts += 1;
            let elapsed = started.elapsed();
            if elapsed >= budget {
                warn!(
                    "Timeout for block at {} for {} after {} draws",
                    candidate.timestamp, issuer, attempts
                );
                return Err(LedgerError::ValidatorTimeout {
                    node: issuer,
                    elapsed_ms: elapsed.as_millis(),
                    attempts,
                });
            }
            candidate.nonce += 1;
            candidate.seal()?;
        }

        if candidate.signature.is_none() {
            candidate.signature = Some(self.keys.sign(&issuer, &candidate.hash)?);
        }
        self.commit(candidate)
    }

    /// Append path for derived stages: linkage and signature only.
    pub fn record(&mut self, mut candidate: Block) -> LedgerResult<AppendReceipt> {
        if candidate.signature.is_none() {
            candidate.signature = Some(self.keys.sign(&candidate.node_id, &candidate.hash)?);
        }
        self.commit(candidate)
    }

    /// Re-link a derived block onto this ledger's head and reseal it.
    ///
    /// `source_hash` keeps pointing at the upstream block; when unset it is
    /// taken from the block's current hash.
    pub fn rebase(&self, mut block: Block) -> LedgerResult<Block> {
        if block.source_hash.is_none() {
            block.source_hash = Some(block.hash.clone());
        }
        block.stage = self.stage;
        block.previous_hash = self.head.clone();
        block.signature = None;
        block.seal()?;
        Ok(block)
    }

    fn check_integrity(&self, block: &Block) -> LedgerResult<()> {
        let computed = block.compute_hash()?;
        if computed != block.hash {
            error!("Hash mismatch for block from {}, block discarded", block.node_id);
            return Err(LedgerError::HashMismatch {
                node: block.node_id.clone(),
                stored: block.hash.clone(),
                computed,
            });
        }

        let verified = block
            .signature
            .as_deref()
            .map(|sig| self.keys.verify(&block.node_id, &block.hash, sig))
            .unwrap_or(false);
        if !verified {
            error!("Invalid signature for block {}, block discarded", block.node_id);
            return Err(LedgerError::SignatureInvalid {
                node: block.node_id.clone(),
                hash: block.hash.clone(),
            });
        }
        Ok(())
    }

    fn commit(&mut self, block: Block) -> LedgerResult<AppendReceipt> {
        let computed = block.compute_hash()?;
        if computed != block.hash {
            error!("Hash mismatch for block from {}, block discarded", block.node_id);
            return Err(LedgerError::HashMismatch {
                node: block.node_id.clone(),
                stored: block.hash.clone(),
                computed,
            });
        }

        if block.previous_hash != self.head {
            error!(
                "Linkage mismatch for block from {}: expected {}, got {}",
                block.node_id, self.head, block.previous_hash
            );
            return Err(LedgerError::LinkageMismatch {
                node: block.node_id.clone(),
                expected: self.head.clone(),
                got: block.previous_hash.clone(),
            });
        }

        self.check_integrity(&block)?;

        let receipt = AppendReceipt {
            height: self.chain.len(),
            hash: block.hash.clone(),
            nonce: block.nonce,
        };
        debug!("Block {} accepted at height {} ({})", receipt.hash, receipt.height, self.stage);

        self.head = block.hash.clone();
        if !block.is_genesis() {
            self.cache.push(block.clone());
        }
        self.chain.push(block);
        Ok(receipt)
    }

    /// Re-check hash, linkage and signature for every block.
    /// Returns the first violation.
    pub fn verify_chain(&self) -> LedgerResult<()> {
        let mut expected_previous = GENESIS_PREVIOUS_HASH.to_string();
        for block in &self.chain {
            if block.previous_hash != expected_previous {
                return Err(LedgerError::LinkageMismatch {
                    node: block.node_id.clone(),
                    expected: expected_previous,
                    got: block.previous_hash.clone(),
                });
            }
            self.check_integrity(block)?;
            expected_previous = block.hash.clone();
        }
        Ok(())
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn head_hash(&self) -> &str {
        &self.head
    }

    pub fn genesis(&self) -> Option<&Block> {
        self.chain.first()
    }

    /// Number of blocks, genesis included.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    /// Accepted blocks after genesis.
    pub fn entries(&self) -> impl Iterator<Item = &Block> {
        self.chain.iter().filter(|b| !b.is_genesis())
    }

    pub fn cache(&self) -> &TelemetryCache {
        &self.cache
    }

    pub fn keys(&self) -> &Arc<KeyRing> {
        &self.keys
    }
}
