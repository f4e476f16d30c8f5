//! Test-only token signer: an Ed25519 key pair that can publish itself as a JWK
//! and sign access tokens the way the identity provider would.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use ed25519_dalek::SigningKey;
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{EncodePrivateKey, EncodePublicKey};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{Value, json};

use super::keys::KeySet;

pub const ISSUER: &str = "https://tenant.example.test/";
pub const AUDIENCE: &str = "https://messages.example.test";

pub struct TestSigner {
    kid: String,
    signing_key: SigningKey,
}

impl TestSigner {
    pub fn new(kid: &str) -> Self {
        Self::new_with_seed(kid, 7)
    }

    pub fn new_with_seed(kid: &str, seed: u8) -> Self {
        Self {
            kid: kid.to_string(),
            signing_key: SigningKey::from_bytes(&[seed; 32]),
        }
    }

    pub fn jwk_value(&self) -> Value {
        json!({
            "kty": "OKP",
            "crv": "Ed25519",
            "use": "sig",
            "alg": "EdDSA",
            "kid": self.kid,
            "x": URL_SAFE_NO_PAD.encode(self.signing_key.verifying_key().to_bytes()),
        })
    }

    pub fn jwks_document(&self) -> Value {
        json!({ "keys": [self.jwk_value()] })
    }

    pub fn key_set(&self) -> KeySet {
        KeySet::from_jwk_values(vec![self.jwk_value()]).expect("usable jwk")
    }

    pub fn public_key_pem(&self) -> String {
        self.signing_key
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .expect("encode public key")
    }

    pub fn sign(&self, claims: &Value) -> String {
        let der = self.signing_key.to_pkcs8_der().expect("encode private key");
        let encoding_key = EncodingKey::from_ed_der(der.as_bytes());

        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.kid.clone());

        jsonwebtoken::encode(&header, claims, &encoding_key).expect("sign token")
    }

    /// Signs a token valid for the next ten minutes with the given `scope` claim.
    pub fn sign_with_scope(&self, scope: &str) -> String {
        self.sign(&claims_with(json!({ "scope": scope })))
    }
}

/// Standard claims (iss/aud/sub/iat/exp) merged with `extra`.
pub fn claims_with(extra: Value) -> Value {
    let now = chrono::Utc::now().timestamp();
    let mut claims = json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": "auth0|user-123",
        "iat": now,
        "exp": now + 600,
    });

    if let (Some(base), Value::Object(extra)) = (claims.as_object_mut(), extra) {
        base.extend(extra);
    }
    claims
}

/// Flips one bit in the first byte of the token's signature.
pub fn tamper_signature(token: &str) -> String {
    let (signed, signature) = token.rsplit_once('.').expect("compact jws");
    let mut bytes = URL_SAFE_NO_PAD.decode(signature).expect("base64url signature");
    bytes[0] ^= 0x01;
    format!("{signed}.{}", URL_SAFE_NO_PAD.encode(bytes))
}
