/*
 * Responsibility
 * - URL layout of v1
 * - Everything here sits behind the OAuth2 gate (applied in app.rs)
 */
use axum::{Router, routing::get};

use crate::api::v1::handlers::me::{check_scope, me};

pub fn routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/me", get(me).post(me))
        .route("/me/scopes/{scope}", get(check_scope))
}
