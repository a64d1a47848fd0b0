/*
 * Responsibility
 * - Shared context bound to the Router (AppState)
 * - Cheap to clone (Arc inside)
 */
use std::sync::Arc;

use crate::middleware::oauth2::OAuth2Gate;

#[derive(Clone, Debug)]
pub struct AppState {
    pub gate: Arc<OAuth2Gate>,
}

impl AppState {
    pub fn new(gate: Arc<OAuth2Gate>) -> Self {
        Self { gate }
    }
}
