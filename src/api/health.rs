/*
 * Responsibility
 * - GET /health (liveness, outside the OAuth2 gate)
 * - Reports whether the gate has built its chain yet
 */
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let gate = &state.gate;
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "oauth2": {
                "gateway_enabled": gate.config().gateway_enabled,
                "classifier": gate.classifier_name(),
                "chain_built": gate.is_built(),
            }
        })),
    )
}
