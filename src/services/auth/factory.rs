/// Factory: build `TokenValidator` (and its key store) from application `Config`.
use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::services::auth::{JwksCache, KeyStore, KeyStoreError, StaticKeys, TokenValidator};

pub async fn build_token_validator(config: &Config) -> Result<Arc<TokenValidator>, KeyStoreError> {
    let keys: Arc<dyn KeyStore> = match config.auth_public_key_pem.as_deref() {
        Some(pem) => {
            info!("using static public key; JWKS fetching disabled");
            Arc::new(StaticKeys::from_public_key_pem(pem)?)
        }
        None => {
            let cache = JwksCache::new(
                config.jwks_url.clone(),
                config.jwks_refresh_interval,
                config.jwks_min_refresh_interval,
                config.jwks_fetch_timeout,
            )?;
            cache.prime().await;
            Arc::new(cache)
        }
    };

    Ok(Arc::new(TokenValidator::new(
        keys,
        config.auth_issuer.clone(),
        config.auth_audience.clone(),
        config.access_token_leeway_seconds,
    )))
}
