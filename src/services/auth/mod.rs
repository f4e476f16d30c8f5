pub mod access_jwt;
pub mod factory;
pub mod jwks;
pub mod keys;

#[cfg(test)]
pub mod testing;

pub use access_jwt::{AuthError, Claims, TokenError, TokenValidator};
pub use factory::build_token_validator;
pub use jwks::JwksCache;
pub use keys::{KeyStore, KeyStoreError, StaticKeys};
