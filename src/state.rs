/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - config: 起動時に一度だけ組み立てた Config
 *   - auth: TokenValidator (内部に KeyStore / JWKS cache を持つ)
 * - Clone 前提で持つ (内部は Arc なので clone は安い)
 */
use std::sync::Arc;

use crate::config::Config;
use crate::services::auth::TokenValidator;

#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: Arc<TokenValidator>,
}

impl AppState {
    pub fn new(config: Arc<Config>, auth: Arc<TokenValidator>) -> Self {
        Self { config, auth }
    }

    pub fn required_scope(&self) -> &str {
        &self.config.required_scope
    }
}
