/*
 * Responsibility
 * - middleware の公開インターフェース
 * - auth: bearer token + scope の検証 (private ルートのみ)
 * - http: request-id / trace / body limit / timeout (全ルート)
 */
pub mod auth;
pub mod http;
