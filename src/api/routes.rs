/*
 * Responsibility
 * - /api 配下の URL 構造を定義
 * - /public はそのまま、/private だけに access middleware を route_layer で掛ける
 */
use axum::{Router, routing::get};

use crate::api::handlers::{private::private, public::public};
use crate::middleware;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    let protected = Router::new().route("/private", get(private));
    let protected = middleware::auth::access::apply(protected, state);

    Router::new()
        .route("/public", get(public))
        .merge(protected)
}
