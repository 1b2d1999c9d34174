// STAGE PIPELINE
// telemetry -> congestion -> managed -> ordered -> real-time -> smart -> healed -> optimized
//
// SAFETY INVARIANTS:
// 1. Stages run one at a time; each reads only its upstream stage's tree
// 2. All node, load and threshold mutation goes through the shared NetworkContext
// 3. A stage tree is replaced atomically, and only after the whole stage succeeded
// 4. Integrity failures drop one block and are counted; they never abort a stage
// 5. A missing or empty upstream ledger is a zero-work success

use std::str::FromStr;
use std::sync::Arc;

use log::{error, info, warn};
use trafficnet_core::{Block, ConfigError, Ledger, LedgerStore, NetworkConfig, Stage, GENESIS_ID};
use trafficnet_crypto::KeyRing;
use trafficnet_state::{NetworkContext, SharedContext};
use trafficnet_telemetry::{CongestionPredictor, FeatureEncoders, RuleBasedPredictor};

use crate::error::{PipelineError, PipelineResult};
use crate::report::{StageReport, VerifyReport};
use crate::workers::WorkerPool;

/// Upstream blocks a stage will process, genesis excluded.
pub(crate) struct Upstream {
    pub blocks: Vec<Block>,
    /// Loaded blocks dropped for a bad signature or a hash that no longer matches their content
    pub rejected: usize,
}

pub struct Pipeline {
    pub(crate) config: NetworkConfig,
    pub(crate) store: Arc<LedgerStore>,
    pub(crate) keys: Arc<KeyRing>,
    pub(crate) context: SharedContext,
    pub(crate) predictor: Arc<dyn CongestionPredictor>,
    pub(crate) workers: WorkerPool,
}

impl Pipeline {
    /// Build a pipeline over `store` with the default rule-based predictor.
    pub fn new(config: NetworkConfig, store: Arc<LedgerStore>) -> PipelineResult<Self> {
        config.validate()?;
        let keys = Arc::new(
            KeyRing::generate(config.node_ids(), config.seed)
                .with_alias(GENESIS_ID, config.genesis_signer()),
        );
        if !keys.contains(GENESIS_ID) {
            return Err(PipelineError::Config(ConfigError::Invalid(format!(
                "genesis issuer {} is not a known node",
                config.genesis_signer()
            ))));
        }
        let context = NetworkContext::from_config(&config).into_shared();
        let reference_capacity = (config.capacity_range.min + config.capacity_range.max) / 2.0;
        let predictor: Arc<dyn CongestionPredictor> = Arc::new(RuleBasedPredictor::new(
            FeatureEncoders::new(config.node_ids()),
            reference_capacity,
        ));
        Ok(Pipeline {
            config,
            store,
            keys,
            context,
            predictor,
            workers: WorkerPool::new(0)?,
        })
    }

    /// Open the sled store under `config.data_dir` and build a pipeline over it.
    pub fn open(config: NetworkConfig) -> PipelineResult<Self> {
        let store = Arc::new(LedgerStore::open(&config.data_dir)?);
        Self::new(config, store)
    }

    /// Swap in another predictor (e.g. a trained model behind the same contract).
    pub fn with_predictor(mut self, predictor: Arc<dyn CongestionPredictor>) -> Self {
        self.predictor = predictor;
        self
    }

    pub fn with_workers(mut self, workers: WorkerPool) -> Self {
        self.workers = workers;
        self
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<LedgerStore> {
        &self.store
    }

    pub fn keys(&self) -> &Arc<KeyRing> {
        &self.keys
    }

    pub fn context(&self) -> &SharedContext {
        &self.context
    }

    /// Run one stage against its upstream ledger.
    pub fn run(&self, stage: Stage) -> PipelineResult<StageReport> {
        info!("Running {} stage", stage);
        let report = match stage {
            Stage::Telemetry => self.run_telemetry()?,
            Stage::Congestion => self.run_congestion()?,
            Stage::Managed | Stage::Ordered | Stage::RealTime => self.run_traffic(stage)?,
            Stage::Smart => self.run_smart()?,
            Stage::Healed => self.run_healed()?,
            Stage::Optimized => self.run_optimized()?,
        };
        info!("{}", report);
        Ok(report)
    }

    pub fn run_named(&self, name: &str) -> PipelineResult<StageReport> {
        let stage = Stage::from_str(name).map_err(|_| PipelineError::UnknownStage(name.to_string()))?;
        self.run(stage)
    }

    /// Every stage in pipeline order. Stops at the first stage that fails.
    pub fn run_all(&self) -> PipelineResult<Vec<StageReport>> {
        Stage::ALL.iter().map(|stage| self.run(*stage)).collect()
    }

    /// Re-check hash, linkage and signatures of a persisted stage ledger.
    pub fn verify(&self, stage: Stage) -> PipelineResult<VerifyReport> {
        let blocks = self.store.load(stage)?;
        let count = blocks.len();
        if blocks.is_empty() {
            return Ok(VerifyReport {
                stage,
                blocks: 0,
                valid: false,
                violation: Some("ledger is empty".to_string()),
            });
        }
        let ledger = Ledger::from_blocks(stage, Arc::clone(&self.keys), self.config.cache_window, blocks)?;
        let report = match ledger.verify_chain() {
            Ok(()) => VerifyReport { stage, blocks: count, valid: true, violation: None },
            Err(e) => {
                error!("{} ledger failed verification: {}", stage, e);
                VerifyReport { stage, blocks: count, valid: false, violation: Some(e.to_string()) }
            }
        };
        Ok(report)
    }

    /// Operator reactivation of an inactive node.
    pub fn reactivate(&self, node_id: &str) -> PipelineResult<()> {
        self.context.lock().reactivate(node_id, 0.0)?;
        Ok(())
    }

    // === Stage helpers ===

    pub(crate) fn new_ledger(&self, stage: Stage) -> PipelineResult<Ledger> {
        Ok(Ledger::new(stage, Arc::clone(&self.keys), self.config.cache_window)?)
    }

    /// Reset node load, activity and bandwidth before a stage replays its input.
    pub(crate) fn reset_context(&self) {
        let mut ctx = self.context.lock();
        ctx.reset_status(self.config.initial_bandwidth);
        ctx.set_thresholds(self.config.thresholds);
    }

    /// Signed, hash-consistent upstream blocks for `stage`, capped at `block_limit`.
    /// `None` when the upstream ledger is missing or holds only genesis.
    pub(crate) fn load_upstream(&self, stage: Stage) -> PipelineResult<Option<Upstream>> {
        let Some(upstream) = stage.upstream() else {
            return Ok(None);
        };
        let loaded = self.store.load_verified(upstream, &self.keys)?;
        let mut rejected = loaded.dropped;
        let mut blocks: Vec<Block> = loaded
            .blocks
            .into_iter()
            .filter(|b| !b.is_genesis())
            .filter(|b| {
                let consistent = b.hash_is_consistent();
                if !consistent {
                    error!("Loaded {} block from {} fails rehash, block dropped", upstream, b.node_id);
                    rejected += 1;
                }
                consistent
            })
            .collect();
        if let Some(limit) = self.config.block_limit {
            blocks.truncate(limit);
        }
        if blocks.is_empty() {
            warn!("{} ledger is empty, nothing for {} to process", upstream, stage);
            return Ok(None);
        }
        info!("Loaded {} blocks from {} ledger", blocks.len(), upstream);
        Ok(Some(Upstream { blocks, rejected }))
    }

    /// Re-link a derived block onto `ledger` and record it.
    ///
    /// Returns `false` when the block was discarded on an integrity failure.
    pub(crate) fn commit_derived(ledger: &mut Ledger, block: Block, rejected: &mut usize) -> PipelineResult<bool> {
        let linked = ledger.rebase(block)?;
        match ledger.record(linked) {
            Ok(_) => Ok(true),
            Err(e) if e.is_integrity_failure() => {
                *rejected += 1;
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn persist(&self, ledger: &Ledger) -> PipelineResult<()> {
        self.store.replace(ledger.stage(), ledger.blocks())?;
        Ok(())
    }
}
