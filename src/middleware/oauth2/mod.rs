//! OAuth2 admission gate as axum middleware.
//!
//! ```ignore
//! let gate = middleware::oauth2::authenticate(GateConfig::gated(true), Some(factory));
//! let v1 = middleware::oauth2::apply(api::v1::routes(), gate);
//! app = app.nest("/api/v1", v1);
//! ```

mod gate;

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::Response,
};

use crate::error::GateError;
use crate::services::oauth2::chain::ChainFactory;
use crate::services::oauth2::options::GateConfig;

pub use gate::{Admission, BypassReason, OAuth2Gate};

/// Build a gate with the default length heuristic.
pub fn authenticate(config: GateConfig, factory: Option<Arc<dyn ChainFactory>>) -> Arc<OAuth2Gate> {
    Arc::new(OAuth2Gate::new(config, factory))
}

/// Put every route of `router` behind `gate`.
pub fn apply<S>(router: Router<S>, gate: Arc<OAuth2Gate>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(gate, oauth2_middleware))
}

async fn oauth2_middleware(
    State(gate): State<Arc<OAuth2Gate>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, GateError> {
    gate.run(req, |req| next.run(req)).await
}
