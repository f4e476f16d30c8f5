/*
 * Responsibility
 * - tracing 初期化 → Config 読み込み → 依存生成 → Router 組み立て
 * - Middleware の適用 (http 共通 / private ルートの access)
 * - axum::serve() で起動 (Ctrl-C / SIGTERM で graceful shutdown)
 */
use std::{panic, process, sync::Arc};

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::{self, handlers::root::root};
use crate::config::Config;
use crate::middleware;
use crate::services::auth::build_token_validator;
use crate::state::AppState;

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,scoped_messages_api=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // Always surface panics via tracing so they don't get "lost".
        tracing::error!(?info, "panic");

        // Development: crash the whole process so we notice immediately.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();

    // Missing PORT / AUTH_* aborts here, before any socket is opened.
    let config = Config::from_env().context("failed to load configuration")?;

    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        env = ?config.app_env,
        addr = %config.addr,
        issuer = %config.auth_issuer,
        audience = %config.auth_audience,
        required_scope = %config.required_scope,
        "starting API"
    );

    let addr = config.addr;
    let state = build_state(config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("server stopped");
    Ok(())
}

async fn build_state(config: Config) -> Result<AppState> {
    // Key store / token validator are process-level; request handlers only see AppState.
    let auth = build_token_validator(&config)
        .await
        .context("failed to build token validator")?;

    Ok(AppState::new(Arc::new(config), auth))
}

fn build_router(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    let router = Router::new()
        .route("/", get(root))
        .nest("/api", api::routes(state.clone()))
        .with_state(state);

    middleware::http::apply(router, &config)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
        response::Response,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::api::dto::MessageResponse;
    use crate::api::handlers::public::PUBLIC_MESSAGE;
    use std::time::Duration;

    use url::Url;

    use crate::services::auth::{
        JwksCache, KeyStore, StaticKeys, TokenValidator,
        testing::{AUDIENCE, ISSUER, TestSigner, claims_with, tamper_signature},
    };

    fn test_config() -> Config {
        Config::from_lookup(|key| match key {
            "PORT" => Some("8080".to_string()),
            "AUTH_DOMAIN" => Some("tenant.example.test".to_string()),
            "AUTH_AUDIENCE" => Some(AUDIENCE.to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn test_app(signer: &TestSigner) -> Router {
        app_with_keys(Arc::new(StaticKeys::new(signer.key_set())))
    }

    fn app_with_keys(keys: Arc<dyn KeyStore>) -> Router {
        let config = test_config();
        assert_eq!(config.auth_issuer, ISSUER);

        let auth = TokenValidator::new(
            keys,
            config.auth_issuer.clone(),
            config.auth_audience.clone(),
            config.access_token_leeway_seconds,
        );

        build_router(AppState::new(Arc::new(config), Arc::new(auth)))
    }

    async fn send(app: Router, uri: &str, authorization: Option<&str>) -> Response {
        let mut request = Request::builder().uri(uri);
        if let Some(value) = authorization {
            request = request.header(header::AUTHORIZATION, value);
        }
        app.oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn message(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice::<MessageResponse>(&bytes)
            .unwrap()
            .message
    }

    #[tokio::test]
    async fn root_returns_plain_greeting() {
        let app = test_app(&TestSigner::new("kid-1"));
        let response = send(app, "/", None).await;

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Hello World from Rust\n");
    }

    #[tokio::test]
    async fn public_is_ok_regardless_of_headers() {
        let signer = TestSigner::new("kid-1");
        let garbage = "Bearer not.a.token";
        let valid = format!("Bearer {}", signer.sign_with_scope("read:messages"));

        for authorization in [None, Some(garbage), Some(valid.as_str()), Some("Basic Zm9vOmJhcg==")] {
            let response = send(test_app(&signer), "/api/public", authorization).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(message(response).await, PUBLIC_MESSAGE);
        }
    }

    #[tokio::test]
    async fn private_without_header_is_unauthorized() {
        let app = test_app(&TestSigner::new("kid-1"));
        let response = send(app, "/api/private", None).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
        assert_eq!(message(response).await, "Invalid or missing access token.");
    }

    #[tokio::test]
    async fn private_with_wrongly_signed_token_is_unauthorized() {
        let signer = TestSigner::new("kid-1");
        let token = tamper_signature(&signer.sign_with_scope("read:messages"));

        let response = send(test_app(&signer), "/api/private", Some(&format!("Bearer {token}"))).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        // No cryptographic detail leaks into the body.
        assert_eq!(message(response).await, "Invalid or missing access token.");
    }

    #[tokio::test]
    async fn private_with_scoped_token_reaches_handler() {
        let signer = TestSigner::new("kid-1");
        let token = signer.sign_with_scope("openid profile read:messages");

        let response = send(test_app(&signer), "/api/private", Some(&format!("Bearer {token}"))).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(
            message(response).await,
            "Hello from a private endpoint! You need to be authenticated and have a scope of read:messages to see this."
        );
    }

    #[tokio::test]
    async fn private_with_lookalike_scope_is_unauthorized() {
        let signer = TestSigner::new("kid-1");
        let token = signer.sign_with_scope("read:messagesExtra write:messages");

        let response = send(test_app(&signer), "/api/private", Some(&format!("Bearer {token}"))).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = message(response).await;
        assert_eq!(body, "You do not have the required scope.");
        assert!(!body.contains("write:messages"));
    }

    #[tokio::test]
    async fn private_without_scope_claim_is_unauthorized() {
        let signer = TestSigner::new("kid-1");
        let token = signer.sign(&claims_with(serde_json::json!({})));

        let response = send(test_app(&signer), "/api/private", Some(&format!("Bearer {token}"))).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(message(response).await, "You do not have the required scope.");
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let app = test_app(&TestSigner::new("kid-1"));
        let response = send(app, "/api/nowhere", None).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn private_fails_closed_when_key_endpoint_is_unreachable() {
        let signer = TestSigner::new("kid-1");
        let token = signer.sign_with_scope("read:messages");

        // Nothing listens on the discard port.
        let url = Url::parse("http://127.0.0.1:9/.well-known/jwks.json").unwrap();
        let cache = JwksCache::new(
            url,
            Duration::from_secs(3600),
            Duration::from_secs(30),
            Duration::from_secs(2),
        )
        .unwrap();
        let app = app_with_keys(Arc::new(cache));

        let response = send(app, "/api/private", Some(&format!("Bearer {token}"))).await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(message(response).await, "Invalid or missing access token.");
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let app = test_app(&TestSigner::new("kid-1"));
        let limit = test_config().request_body_limit_bytes;

        let request = Request::builder()
            .method("POST")
            .uri("/api/public")
            .header(header::CONTENT_LENGTH, limit + 1)
            .body(Body::from(vec![b'x'; limit + 1]))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
