use thiserror::Error;
use trafficnet_crypto::CryptoError;

/// Ledger errors with enough context to log and discard the offending block.
///
/// Integrity failures (linkage, signature, hash) drop exactly one candidate;
/// they are never retried automatically and never abort a pipeline stage.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Candidate's previous hash does not match the chain head
    #[error("linkage mismatch for block from {node}: expected previous hash {expected}, got {got}")]
    LinkageMismatch { node: String, expected: String, got: String },

    /// Signature missing or does not verify under the issuer's key
    #[error("invalid signature on block {hash} from {node}")]
    SignatureInvalid { node: String, hash: String },

    /// Stored hash is not the digest of the block's content
    #[error("hash mismatch for block from {node}: stored {stored}, computed {computed}")]
    HashMismatch { node: String, stored: String, computed: String },

    /// Validator selection did not authorize the issuer within the wall-clock budget
    #[error("validator selection timed out for {node} after {elapsed_ms} ms ({attempts} draws)")]
    ValidatorTimeout { node: String, elapsed_ms: u128, attempts: u64 },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl LedgerError {
    /// Integrity failures discard one block; everything else is surfaced.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            LedgerError::LinkageMismatch { .. }
                | LedgerError::SignatureInvalid { .. }
                | LedgerError::HashMismatch { .. }
        )
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Transient lock/IO contention; safe to retry
    #[error("storage contention: {0}")]
    Contention(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    /// A persisted record could not be decoded
    #[error("corrupt record in {tree}: {reason}")]
    Corrupt { tree: String, reason: String },
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        use std::io::ErrorKind;
        match err {
            sled::Error::Io(io)
                if matches!(
                    io.kind(),
                    ErrorKind::WouldBlock | ErrorKind::Interrupted | ErrorKind::TimedOut
                ) =>
            {
                StorageError::Contention(io.to_string())
            }
            other => StorageError::Backend(other.to_string()),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
