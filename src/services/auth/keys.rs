//! Verification key material for access tokens.
//!
//! The token validator only talks to [`KeyStore`]. Two stores exist:
//! - [`JwksCache`](super::jwks::JwksCache): keys fetched from the identity provider's JWKS endpoint.
//! - [`StaticKeys`]: a fixed key set (PEM from config, or a JWKS document in tests).

use async_trait::async_trait;
use jsonwebtoken::{
    Algorithm, DecodingKey,
    jwk::{Jwk, KeyAlgorithm, PublicKeyUse},
};
use thiserror::Error;
use tracing::{debug, warn};

/// Key lookup / key fetch errors.
///
/// All of these end as a 401 at the HTTP edge (fail closed).
#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("failed to fetch JWKS: {0}")]
    Fetch(#[source] reqwest::Error),
    #[error("JWKS endpoint returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("JWKS refresh attempted recently and failed; keys unavailable")]
    Unavailable,
    #[error("no usable signing keys in key set")]
    NoUsableKeys,
    #[error("no key with kid '{0}' in key set")]
    UnknownKid(String),
    #[error("invalid public key: {0}")]
    InvalidKey(#[source] jsonwebtoken::errors::Error),
    #[error("key cache lock poisoned")]
    Poisoned,
}

/// A verification key resolved for one token.
#[derive(Clone)]
pub struct ResolvedKey {
    pub kid: Option<String>,
    pub key: DecodingKey,
    /// Algorithm pinned by the JWK `alg` member, if any.
    pub algorithm: Option<Algorithm>,
}

impl std::fmt::Debug for ResolvedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("ResolvedKey")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Source of verification keys.
///
/// Implementations must be safe to share across request tasks (`Arc<dyn KeyStore>`).
#[async_trait]
pub trait KeyStore: Send + Sync + 'static {
    // Returns the key-store name (for logging).
    fn source_name(&self) -> &'static str;

    // Resolve the key for a token header `kid`.
    //
    // Without a `kid`, the first signing key of the set is used.
    async fn decoding_key(&self, kid: Option<&str>) -> Result<ResolvedKey, KeyStoreError>;
}

/// An immutable set of signing keys, in document order.
#[derive(Clone, Debug, Default)]
pub struct KeySet {
    keys: Vec<ResolvedKey>,
}

impl KeySet {
    /// Build a key set from raw JWKS `keys` entries.
    ///
    /// Entries that fail to parse, encryption keys and unsupported key types are skipped
    /// so that one odd key published by the provider does not take the whole set down.
    pub fn from_jwk_values(values: Vec<serde_json::Value>) -> Result<Self, KeyStoreError> {
        let mut keys = Vec::with_capacity(values.len());

        for value in values {
            let jwk: Jwk = match serde_json::from_value(value) {
                Ok(jwk) => jwk,
                Err(err) => {
                    warn!(error = %err, "failed to parse JWK, skipping");
                    continue;
                }
            };

            if let Some(key) = signing_key(&jwk) {
                keys.push(key);
            }
        }

        if keys.is_empty() {
            return Err(KeyStoreError::NoUsableKeys);
        }

        Ok(Self { keys })
    }

    pub fn get(&self, kid: Option<&str>) -> Option<&ResolvedKey> {
        match kid {
            Some(kid) => self.keys.iter().find(|k| k.kid.as_deref() == Some(kid)),
            None => self.keys.first(),
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }
}

fn signing_key(jwk: &Jwk) -> Option<ResolvedKey> {
    let kid = jwk.common.key_id.clone();

    if matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)) {
        debug!(kid = ?kid, "skipping encryption JWK");
        return None;
    }

    let algorithm = match jwk.common.key_algorithm.as_ref() {
        Some(key_alg) => match signature_algorithm(key_alg) {
            Some(alg) => Some(alg),
            None => {
                debug!(kid = ?kid, "skipping JWK with non-signature algorithm");
                return None;
            }
        },
        None => None,
    };

    match DecodingKey::from_jwk(jwk) {
        Ok(key) => {
            debug!(kid = ?kid, "loaded JWK");
            Some(ResolvedKey {
                kid,
                key,
                algorithm,
            })
        }
        Err(err) => {
            warn!(kid = ?kid, error = %err, "failed to convert JWK, skipping");
            None
        }
    }
}

// Only asymmetric signature algorithms are meaningful for a published key set.
fn signature_algorithm(key_alg: &KeyAlgorithm) -> Option<Algorithm> {
    match key_alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    }
}

/// A fixed key set that never refreshes.
#[derive(Clone, Debug)]
pub struct StaticKeys {
    keys: KeySet,
}

impl StaticKeys {
    pub fn new(keys: KeySet) -> Self {
        Self { keys }
    }

    /// Accepts an RSA, EC or Ed25519 public key in PEM (SPKI) form.
    pub fn from_public_key_pem(pem: &str) -> Result<Self, KeyStoreError> {
        let bytes = pem.as_bytes();
        let key = DecodingKey::from_rsa_pem(bytes)
            .or_else(|_| DecodingKey::from_ec_pem(bytes))
            .or_else(|_| DecodingKey::from_ed_pem(bytes))
            .map_err(KeyStoreError::InvalidKey)?;

        Ok(Self::new(KeySet {
            keys: vec![ResolvedKey {
                kid: None,
                key,
                algorithm: None,
            }],
        }))
    }
}

#[async_trait]
impl KeyStore for StaticKeys {
    fn source_name(&self) -> &'static str {
        "static"
    }

    async fn decoding_key(&self, kid: Option<&str>) -> Result<ResolvedKey, KeyStoreError> {
        // A PEM key has no kid; it signs for whatever kid the token claims.
        if self.keys.len() == 1 && self.keys.keys[0].kid.is_none() {
            return Ok(self.keys.keys[0].clone());
        }

        self.keys
            .get(kid)
            .cloned()
            .ok_or_else(|| KeyStoreError::UnknownKid(kid.unwrap_or_default().to_string()))
    }
}
