/*
 * Responsibility
 * - 環境変数 / .env の読み込み (PORT, AUTH_DOMAIN, AUTH_AUDIENCE など)
 * - 設定値のバリデーション (不足なら起動失敗、デフォルトでの bind はしない)
 */
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

pub const DEFAULT_REQUIRED_SCOPE: &str = "read:messages";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(value: Option<String>) -> Self {
        match value
            .unwrap_or_else(|| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing configuration: {0}")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub request_timeout: Duration,
    pub request_body_limit_bytes: usize,

    pub auth_issuer: String,
    pub auth_audience: String,
    pub required_scope: String,
    pub access_token_leeway_seconds: u64,

    pub jwks_url: Url,
    pub jwks_refresh_interval: Duration,
    pub jwks_min_refresh_interval: Duration,
    pub jwks_fetch_timeout: Duration,

    // Set => keys are never fetched from `jwks_url`.
    pub auth_public_key_pem: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup (process env in production, maps in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port: u16 = required(&lookup, "PORT")?
            .parse()
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::parse(lookup("APP_ENV"));

        let domain = required(&lookup, "AUTH_DOMAIN")?;
        let domain_url = domain_base_url(&domain).ok_or(ConfigError::Invalid("AUTH_DOMAIN"))?;

        let auth_audience = required(&lookup, "AUTH_AUDIENCE")?;

        let auth_issuer = optional(&lookup, "AUTH_ISSUER").unwrap_or_else(|| domain_url.to_string());

        let jwks_url = match optional(&lookup, "AUTH_JWKS_URL") {
            Some(raw) => parse_http_url(&raw).ok_or(ConfigError::Invalid("AUTH_JWKS_URL"))?,
            None => domain_url
                .join(".well-known/jwks.json")
                .map_err(|_| ConfigError::Invalid("AUTH_DOMAIN"))?,
        };

        let required_scope = optional(&lookup, "AUTH_REQUIRED_SCOPE")
            .unwrap_or_else(|| DEFAULT_REQUIRED_SCOPE.to_string());
        if required_scope.split_ascii_whitespace().count() != 1 {
            return Err(ConfigError::Invalid("AUTH_REQUIRED_SCOPE"));
        }

        let auth_public_key_pem =
            optional(&lookup, "AUTH_PUBLIC_KEY_PEM").map(|pem| pem.replace("\\n", "\n"));

        let jwks_refresh_interval = nonzero_seconds_or(&lookup, "JWKS_REFRESH_SECONDS", 3600)?;
        let jwks_min_refresh_interval = seconds_or(&lookup, "JWKS_MIN_REFRESH_SECONDS", 30)?;
        // A snapshot must not expire while its own fetch still blocks retries.
        if jwks_refresh_interval < jwks_min_refresh_interval {
            return Err(ConfigError::Invalid("JWKS_REFRESH_SECONDS"));
        }

        let request_body_limit_bytes: usize =
            parse_or(&lookup, "REQUEST_BODY_LIMIT_BYTES", 64 * 1024)?;
        if request_body_limit_bytes == 0 {
            return Err(ConfigError::Invalid("REQUEST_BODY_LIMIT_BYTES"));
        }

        Ok(Self {
            addr,
            app_env,
            request_timeout: nonzero_seconds_or(&lookup, "REQUEST_TIMEOUT_SECONDS", 30)?,
            request_body_limit_bytes,
            auth_issuer,
            auth_audience,
            required_scope,
            access_token_leeway_seconds: parse_or(&lookup, "ACCESS_TOKEN_LEEWAY_SECONDS", 60)?,
            jwks_url,
            jwks_refresh_interval,
            jwks_min_refresh_interval,
            jwks_fetch_timeout: nonzero_seconds_or(&lookup, "JWKS_FETCH_TIMEOUT_SECONDS", 10)?,
            auth_public_key_pem,
        })
    }
}

fn optional<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, key).ok_or(ConfigError::Missing(key))
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match optional(lookup, key) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

fn seconds_or<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    parse_or(lookup, key, default).map(Duration::from_secs)
}

fn nonzero_seconds_or<F>(lookup: &F, key: &'static str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match seconds_or(lookup, key, default)? {
        d if d.is_zero() => Err(ConfigError::Invalid(key)),
        d => Ok(d),
    }
}

// "tenant.example.com" and "https://tenant.example.com/" both resolve to "https://tenant.example.com/".
fn domain_base_url(domain: &str) -> Option<Url> {
    let domain = domain.trim_end_matches('/');
    if domain.starts_with("https://") || domain.starts_with("http://") {
        parse_http_url(&format!("{domain}/"))
    } else {
        parse_http_url(&format!("https://{domain}/"))
    }
}

fn parse_http_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw).ok()?;
    match url.scheme() {
        "https" | "http" if url.host_str().is_some() => Some(url),
        _ => None,
    }
}
