use std::sync::Arc;

use jsonwebtoken::{Algorithm, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::keys::{KeyStore, KeyStoreError};

/// Errors returned by access-token verification.
///
/// The detail is for logs only; the HTTP edge maps every variant to the same 401.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("missing Authorization header")]
    MissingHeader,
    #[error("Authorization header is not a Bearer credential")]
    NotBearer,
    #[error("malformed token header: {0}")]
    MalformedHeader(#[source] jsonwebtoken::errors::Error),
    #[error("unsupported token algorithm {0:?}")]
    UnsupportedAlgorithm(Algorithm),
    #[error("token algorithm {token:?} does not match key algorithm {key:?}")]
    AlgorithmMismatch { token: Algorithm, key: Algorithm },
    #[error("verification key unavailable: {0}")]
    KeyStore(#[from] KeyStoreError),
    #[error("jwt verification failed: {0}")]
    Jwt(#[source] jsonwebtoken::errors::Error),
}

/// Outcome of `authorize`: either the token itself is bad, or it lacks the scope.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("required scope not granted")]
    MissingScope,
}

/// Verified token claims as a key/value map.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn subject(&self) -> Option<&str> {
        self.get("sub").and_then(Value::as_str)
    }

    /// The raw `scope` claim. `None` if absent or not a string.
    pub fn scope(&self) -> Option<&str> {
        self.get("scope").and_then(Value::as_str)
    }

    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope()
            .into_iter()
            .flat_map(str::split_ascii_whitespace)
    }

    /// Whole-entry membership in the space-delimited `scope` claim.
    ///
    /// `read:messagesExtra` does not grant `read:messages`.
    pub fn has_scope(&self, required: &str) -> bool {
        self.scopes().any(|granted| granted == required)
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Access-token verifier backed by a [`KeyStore`].
///
/// - signature: key chosen by the header `kid`
/// - `iss` / `aud` / `exp` required; `nbf` checked when present
/// - only asymmetric algorithms are accepted
pub struct TokenValidator {
    keys: Arc<dyn KeyStore>,
    issuer: String,
    audience: String,
    leeway_seconds: u64,
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("keys", &self.keys.source_name())
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("leeway_seconds", &self.leeway_seconds)
            .finish()
    }
}

impl TokenValidator {
    pub fn new(
        keys: Arc<dyn KeyStore>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        leeway_seconds: u64,
    ) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
            audience: audience.into(),
            leeway_seconds,
        }
    }

    /// Verify signature and standard claims, returning the decoded claims map.
    pub async fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        let header = jsonwebtoken::decode_header(token).map_err(TokenError::MalformedHeader)?;

        if !is_asymmetric(header.alg) {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }

        let resolved = self.keys.decoding_key(header.kid.as_deref()).await?;

        if let Some(key_alg) = resolved.algorithm {
            if key_alg != header.alg {
                return Err(TokenError::AlgorithmMismatch {
                    token: header.alg,
                    key: key_alg,
                });
            }
        }

        let validation = self.validation(header.alg);
        let data = jsonwebtoken::decode::<Claims>(token, &resolved.key, &validation)
            .map_err(TokenError::Jwt)?;

        Ok(data.claims)
    }

    /// `validate`, then require `required_scope` in the `scope` claim.
    pub async fn authorize(&self, token: &str, required_scope: &str) -> Result<Claims, AuthError> {
        let claims = self.validate(token).await?;

        if !claims.has_scope(required_scope) {
            return Err(AuthError::MissingScope);
        }

        Ok(claims)
    }

    fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.validate_nbf = true;
        validation.leeway = self.leeway_seconds;
        validation
    }
}

fn is_asymmetric(alg: Algorithm) -> bool {
    !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}
