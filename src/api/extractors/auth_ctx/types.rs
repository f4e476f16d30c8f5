/*
 * Responsibility
 * - Handler から見える「認証済みコンテキスト」の型
 * - middleware が検証して request extensions に格納し、handler はこの型だけを受け取る
 */
use crate::services::auth::Claims;

/// 認証済み (署名 + scope チェック済み) のリクエストに付与されるコンテキスト
#[derive(Debug, Clone)]
pub struct AuthCtx {
    pub subject: Option<String>,
    pub scopes: Vec<String>,
}

impl AuthCtx {
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            subject: claims.subject().map(str::to_string),
            scopes: claims.scopes().map(str::to_string).collect(),
        }
    }
}
