/*
 * Responsibility
 * - GET /api/public
 * - 認証なし。ヘッダに何が付いていても 200 を返す
 */
use axum::{Json, http::StatusCode};

use crate::api::dto::MessageResponse;

pub const PUBLIC_MESSAGE: &str =
    "Hello from a public endpoint! You don't need to be authenticated to see this.";

pub async fn public() -> (StatusCode, Json<MessageResponse>) {
    (StatusCode::OK, Json(MessageResponse::new(PUBLIC_MESSAGE)))
}
