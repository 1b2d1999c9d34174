use std::collections::BTreeMap;

use k256::ecdsa::VerifyingKey;
use log::{debug, error};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::signature::{sign_hash, verify_hash, CryptoError, CryptoResult, KeyPair};

/// Per-run key material: exactly one keypair per node id.
///
/// Keys are ephemeral (no PKI). They are derived from the topology seed so a
/// ledger persisted by one run can be verified by a later run with the same
/// seed. Aliases let a pseudo-issuer (e.g. the genesis issuer) sign with a
/// designated node's key.
#[derive(Debug, Clone, Default)]
pub struct KeyRing {
    keys: BTreeMap<String, KeyPair>,
    aliases: BTreeMap<String, String>,
}

impl KeyRing {
    /// Derive one keypair per id. Ids are sorted first so iteration order of
    /// the caller does not affect which key a node receives.
    pub fn generate<I, S>(node_ids: I, seed: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ids: Vec<String> = node_ids.into_iter().map(Into::into).collect();
        ids.sort();
        ids.dedup();

        let mut rng = StdRng::seed_from_u64(seed.rotate_left(17) ^ 0x5eed_cafe);
        let keys = ids
            .into_iter()
            .map(|id| {
                let pair = KeyPair::generate(&mut rng);
                debug!("Generated key for {}: {}", id, pair.public_key_hex());
                (id, pair)
            })
            .collect();

        Self { keys, aliases: BTreeMap::new() }
    }

    /// Make `alias` sign and verify with `target`'s key.
    pub fn with_alias(mut self, alias: impl Into<String>, target: impl Into<String>) -> Self {
        self.aliases.insert(alias.into(), target.into());
        self
    }

    fn resolve<'a>(&'a self, node_id: &'a str) -> &'a str {
        self.aliases.get(node_id).map(String::as_str).unwrap_or(node_id)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.keys.contains_key(self.resolve(node_id))
    }

    pub fn keypair(&self, node_id: &str) -> Option<&KeyPair> {
        self.keys.get(self.resolve(node_id))
    }

    pub fn public_key(&self, node_id: &str) -> Option<&VerifyingKey> {
        self.keypair(node_id).map(KeyPair::verifying_key)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    pub fn sign(&self, node_id: &str, hash: &str) -> CryptoResult<Vec<u8>> {
        let pair = self
            .keypair(node_id)
            .ok_or_else(|| CryptoError::UnknownSigner(node_id.to_string()))?;
        sign_hash(pair.signing_key(), hash)
    }

    /// Verify `signature` over `hash` under `node_id`'s public key.
    /// Unknown signers verify as `false`.
    pub fn verify(&self, node_id: &str, hash: &str, signature: &[u8]) -> bool {
        match self.public_key(node_id) {
            Some(key) => verify_hash(key, hash, signature),
            None => {
                error!("No public key for node {}, rejecting signature", node_id);
                false
            }
        }
    }
}
