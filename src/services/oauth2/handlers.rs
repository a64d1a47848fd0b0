//! Reference OAuth2 resource-server chain.
//!
//! bearer token -> token store -> required scopes
//!
//! The gate does not depend on any of this; it only sees a `ChainFactory`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, header},
};
use chrono::Utc;
use serde_json::Value;

use crate::api::v1::extractors::ValidatedIdentity;
use crate::services::oauth2::chain::{AuthHandler, ChainError, ChainFactory, Step};
use crate::services::oauth2::credential;
use crate::services::oauth2::options::{DEFAULT_BODY_LIMIT_BYTES, GateOptions};
use crate::services::oauth2::token_store::AccessTokenStore;

/// Options key holding the scopes every request must carry.
pub const SCOPES_OPTION: &str = "scopes";

/// The raw token found by [`BearerTokenHandler`], handed to the next handler.
#[derive(Clone)]
pub struct PresentedToken(pub String);

/// Finds the token: `Authorization: Bearer`, then body / query `access_token`.
pub struct BearerTokenHandler {
    body_limit: usize,
}

impl BearerTokenHandler {
    pub fn new(body_limit: usize) -> Self {
        Self { body_limit }
    }
}

impl Default for BearerTokenHandler {
    fn default() -> Self {
        Self::new(DEFAULT_BODY_LIMIT_BYTES)
    }
}

fn bearer(req: &Request<Body>) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
}

#[async_trait]
impl AuthHandler for BearerTokenHandler {
    fn name(&self) -> &'static str {
        "bearer_token"
    }

    async fn handle(&self, req: Request<Body>) -> Result<Step, ChainError> {
        let (mut req, token) = match bearer(&req) {
            Some(token) => (req, Some(token)),
            None => {
                let (req, found) = credential::extract(req, self.body_limit)
                    .await
                    .map_err(|err| ChainError::Malformed(err.to_string()))?;
                (req, found.map(|c| c.as_str().to_owned()))
            }
        };

        let token = token.ok_or(ChainError::InvalidToken)?;
        req.extensions_mut().insert(PresentedToken(token));
        Ok(Step::Forward(req))
    }
}

/// Resolves the presented token and attaches the [`ValidatedIdentity`].
pub struct TokenStoreHandler {
    store: Arc<dyn AccessTokenStore>,
}

impl TokenStoreHandler {
    pub fn new(store: Arc<dyn AccessTokenStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuthHandler for TokenStoreHandler {
    fn name(&self) -> &'static str {
        "token_store"
    }

    async fn handle(&self, mut req: Request<Body>) -> Result<Step, ChainError> {
        let token = req
            .extensions_mut()
            .remove::<PresentedToken>()
            .ok_or(ChainError::InvalidToken)?;

        let record = self
            .store
            .find(&token.0)
            .await
            .map_err(|err| ChainError::Backend(err.to_string()))?
            .ok_or(ChainError::InvalidToken)?;

        if record.is_expired_at(Utc::now()) {
            return Err(ChainError::ExpiredToken);
        }

        let identity = ValidatedIdentity::new(record.subject).with_scopes(record.scopes);
        let identity = match record.client_id {
            Some(client_id) => identity.with_client_id(client_id),
            None => identity,
        };

        req.extensions_mut().insert(identity);
        Ok(Step::Forward(req))
    }
}

/// Requires the identity's scopes to cover a fixed set.
pub struct ScopeHandler {
    required: Vec<String>,
}

impl ScopeHandler {
    pub fn new(required: Vec<String>) -> Self {
        Self { required }
    }
}

#[async_trait]
impl AuthHandler for ScopeHandler {
    fn name(&self) -> &'static str {
        "scope"
    }

    async fn handle(&self, req: Request<Body>) -> Result<Step, ChainError> {
        let identity = req
            .extensions()
            .get::<ValidatedIdentity>()
            .ok_or(ChainError::InvalidToken)?;
        let granted = identity.scopes.as_deref().unwrap_or_default();

        let missing: Vec<&str> = self
            .required
            .iter()
            .filter(|scope| !granted.contains(*scope))
            .map(String::as_str)
            .collect();

        if !missing.is_empty() {
            return Err(ChainError::InsufficientScope(missing.join(" ")));
        }

        Ok(Step::Forward(req))
    }
}

/// `scopes` option as either a space-separated string or an array of strings.
pub fn required_scopes(options: &GateOptions) -> Vec<String> {
    match options.get(SCOPES_OPTION) {
        Some(Value::String(s)) => s.split_whitespace().map(str::to_owned).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect(),
        _ => Vec::new(),
    }
}

/// Builds the reference chain from the options bag.
pub struct ReferenceChainFactory {
    store: Arc<dyn AccessTokenStore>,
    body_limit: usize,
}

impl ReferenceChainFactory {
    pub fn new(store: Arc<dyn AccessTokenStore>, body_limit: usize) -> Self {
        Self { store, body_limit }
    }
}

impl ChainFactory for ReferenceChainFactory {
    fn handlers(&self, options: &GateOptions) -> Vec<Arc<dyn AuthHandler>> {
        let mut handlers: Vec<Arc<dyn AuthHandler>> = vec![
            Arc::new(BearerTokenHandler::new(self.body_limit)),
            Arc::new(TokenStoreHandler::new(self.store.clone())),
        ];

        let scopes = required_scopes(options);
        if !scopes.is_empty() {
            handlers.push(Arc::new(ScopeHandler::new(scopes)));
        }

        handlers
    }
}
