/*
 * Responsibility
 * - アプリ共通の AppError 定義
 * - IntoResponse 実装 (401 + WWW-Authenticate / JSON message body)
 * - 内部エラーの詳細はレスポンスに出さない (ログ側の責務)
 */
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::api::dto::MessageResponse;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid or missing access token.")]
    Unauthorized,
    #[error("You do not have the required scope.")]
    MissingScope,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let challenge = match self {
            AppError::Unauthorized => r#"Bearer error="invalid_token""#,
            AppError::MissingScope => r#"Bearer error="insufficient_scope""#,
        };

        let mut response = (
            StatusCode::UNAUTHORIZED,
            Json(MessageResponse::new(self.to_string())),
        )
            .into_response();
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static(challenge),
        );
        response
    }
}
