// BLOCK SIGNATURES
// ECDSA (secp256k1) signatures over block hashes
//
// SAFETY INVARIANTS:
// 1. The signed message is the hex block hash, which already commits to every field
// 2. Verification failures are reported as `false`, never as panics
// 3. Malformed signature bytes are rejected before curve arithmetic

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use log::error;
use rand::{CryptoRng, RngCore};
use thiserror::Error;

/// Error type for cryptographic operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// No key registered for the requested node
    #[error("no signing key registered for node {0}")]
    UnknownSigner(String),

    /// Signature generation failed
    #[error("signing failed: {0}")]
    SigningFailed(String),

    /// Signature bytes could not be decoded
    #[error("invalid signature format: {0}")]
    InvalidSignatureFormat(String),

    /// Canonical encoding failed
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;

/// One node's ECDSA keypair.
#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
    verifying: VerifyingKey,
}

impl KeyPair {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let signing = SigningKey::random(rng);
        let verifying = signing.verifying_key().clone();
        Self { signing, verifying }
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying
    }

    /// Compressed SEC1 public key, hex encoded.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying.to_encoded_point(true).as_bytes())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

/// Sign a block hash. Returns the fixed-size (r || s) encoding.
pub fn sign_hash(key: &SigningKey, hash: &str) -> CryptoResult<Vec<u8>> {
    let signature: Signature = key
        .try_sign(hash.as_bytes())
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
    Ok(signature.to_bytes().to_vec())
}

/// Verify a signature over a block hash.
pub fn verify_hash(key: &VerifyingKey, hash: &str, signature: &[u8]) -> bool {
    let signature = match Signature::from_slice(signature) {
        Ok(sig) => sig,
        Err(e) => {
            error!("Malformed signature ({} bytes): {}", signature.len(), e);
            return false;
        }
    };
    match key.verify(hash.as_bytes(), &signature) {
        Ok(()) => true,
        Err(e) => {
            error!("Signature verification failed: {}", e);
            false
        }
    }
}
