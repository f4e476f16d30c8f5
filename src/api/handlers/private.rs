/*
 * Responsibility
 * - GET /api/private
 * - access middleware (署名 + scope) を通過した場合のみ実行される
 */
use axum::{Json, extract::State, http::StatusCode};

use crate::api::dto::MessageResponse;
use crate::api::extractors::AuthCtxExtractor;
use crate::state::AppState;

pub async fn private(
    State(state): State<AppState>,
    AuthCtxExtractor(auth): AuthCtxExtractor,
) -> (StatusCode, Json<MessageResponse>) {
    tracing::debug!(subject = ?auth.subject, scopes = ?auth.scopes, "private endpoint served");

    let message = format!(
        "Hello from a private endpoint! You need to be authenticated and have a scope of {} to see this.",
        state.required_scope()
    );

    (StatusCode::OK, Json(MessageResponse::new(message)))
}
