//! Cryptographic primitives for the trafficnet ledger.
//!
//! - `digest`: canonical (key-sorted) JSON encoding and SHA-256 content digests
//! - `signature`: ECDSA signing and verification over block hashes
//! - `keyring`: one ephemeral keypair per node, derived from the topology seed

pub mod digest;
pub mod keyring;
pub mod signature;

pub use digest::{canonical_json, content_digest, sha256_hex};
pub use keyring::KeyRing;
pub use signature::{sign_hash, verify_hash, CryptoError, CryptoResult, KeyPair};
