use thiserror::Error;
use trafficnet_core::{ConfigError, LedgerError, StorageError};
use trafficnet_crypto::CryptoError;
use trafficnet_state::StateError;

/// Errors that abort a stage run.
///
/// Integrity failures on single blocks never surface here; stages drop the
/// offending block, count it and continue.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unknown stage '{0}'")]
    UnknownStage(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("worker pool: {0}")]
    Workers(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
