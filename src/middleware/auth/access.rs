//! access token（JWT）検証 + scope チェック → AuthCtx を extensions に入れる
//!
//! 状態遷移 (request 単位):
//! - Start → TokenValidated | TokenRejected
//! - TokenValidated → ScopeGranted (inner handler へ) | ScopeDenied
//!
//! TokenRejected / ScopeDenied はどちらも 401。内部の詳細はログのみに出す。

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderMap, Request, header},
    middleware::{self, Next},
    response::Response,
};

use crate::api::extractors::AuthCtx;
use crate::error::AppError;
use crate::services::auth::{AuthError, TokenError};
use crate::state::AppState;

/// Protect every route of `router` with the access middleware.
///
/// `route_layer` so that unmatched paths still fall through to 404 instead of 401.
pub fn apply(router: Router<AppState>, state: AppState) -> Router<AppState> {
    // axum 0.8 の from_fn は State extractor を受け取れないため、`from_fn_with_state` で明示的に state を渡す
    router.route_layer(middleware::from_fn_with_state(state, access_middleware))
}

async fn access_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = match bearer_token(req.headers()) {
        Ok(token) => token,
        Err(err) => {
            tracing::warn!(error = %err, "access token rejected");
            return Err(AppError::Unauthorized);
        }
    };

    let claims = match state.auth.authorize(token, state.required_scope()).await {
        Ok(claims) => claims,
        Err(AuthError::Token(err)) => {
            tracing::warn!(error = %err, "access token verification failed");
            return Err(AppError::Unauthorized);
        }
        Err(AuthError::MissingScope) => {
            tracing::warn!(
                required_scope = %state.required_scope(),
                "access token lacks required scope"
            );
            return Err(AppError::MissingScope);
        }
    };

    // middleware → extractor への受け渡し
    req.extensions_mut().insert(AuthCtx::from_claims(&claims));

    Ok(next.run(req).await)
}

/// `Authorization: Bearer <token>` → `<token>`. The scheme is case-insensitive.
fn bearer_token(headers: &HeaderMap) -> Result<&str, TokenError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(TokenError::MissingHeader)?
        .to_str()
        .map_err(|_| TokenError::NotBearer)?;

    let (scheme, token) = value.split_once(' ').ok_or(TokenError::NotBearer)?;
    let token = token.trim();

    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(TokenError::NotBearer);
    }

    Ok(token)
}
