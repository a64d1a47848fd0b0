//! OAuth2 handler chain.
//!
//! The chain is an ordered list of [`AuthHandler`]s produced by a
//! [`ChainFactory`]. Each handler either forwards the request to the next one
//! or terminates it with a response. The first error stops the chain.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use thiserror::Error;

use crate::error::GateError;
use crate::services::oauth2::options::GateOptions;

/// What a handler did with the request.
#[derive(Debug)]
pub enum Step {
    /// Continue with the (possibly updated) request.
    Forward(Request<Body>),
    /// Stop and answer with this response. Nothing downstream runs.
    Terminate(Response),
}

/// Errors reported by chain handlers.
///
/// The gate passes these through untouched; only the chain decides what they mean.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("invalid access token")]
    InvalidToken,

    #[error("access token expired")]
    ExpiredToken,

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("insufficient scope: {0}")]
    InsufficientScope(String),

    #[error("token backend failure: {0}")]
    Backend(String),
}

impl ChainError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidToken | Self::ExpiredToken => StatusCode::UNAUTHORIZED,
            Self::Malformed(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientScope(_) => StatusCode::FORBIDDEN,
            Self::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidToken => "INVALID_TOKEN",
            Self::ExpiredToken => "EXPIRED_TOKEN",
            Self::Malformed(_) => "INVALID_REQUEST",
            Self::InsufficientScope(_) => "INSUFFICIENT_SCOPE",
            Self::Backend(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}

/// One authentication step.
#[async_trait]
pub trait AuthHandler: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    async fn handle(&self, req: Request<Body>) -> Result<Step, ChainError>;
}

/// Source of the handler list for a gate.
///
/// Implementations must be deterministic for equal options: the gate may be
/// rebuilt after a reset and expects an equivalent chain.
pub trait ChainFactory: Send + Sync {
    fn handlers(&self, options: &GateOptions) -> Vec<Arc<dyn AuthHandler>>;
}

impl<F> ChainFactory for F
where
    F: Fn(&GateOptions) -> Vec<Arc<dyn AuthHandler>> + Send + Sync,
{
    fn handlers(&self, options: &GateOptions) -> Vec<Arc<dyn AuthHandler>> {
        self(options)
    }
}

/// Immutable, ordered composition of handlers.
#[derive(Clone)]
pub struct HandlerChain {
    handlers: Arc<[Arc<dyn AuthHandler>]>,
}

impl fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerChain")
            .field("handlers", &self.names())
            .finish()
    }
}

impl HandlerChain {
    /// Ask the registered factory for handlers and compose them in order.
    ///
    /// No factory means the owning application never configured OAuth2.
    pub fn build(
        factory: Option<&dyn ChainFactory>,
        options: &GateOptions,
    ) -> Result<Self, GateError> {
        let factory = factory.ok_or(GateError::Configuration)?;
        Ok(Self::from_handlers(factory.handlers(options)))
    }

    pub fn from_handlers(handlers: Vec<Arc<dyn AuthHandler>>) -> Self {
        Self {
            handlers: handlers.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Run every handler in order.
    ///
    /// Returns `Forward` with the final request when all handlers forwarded,
    /// the first `Terminate`, or the first error.
    pub async fn run(&self, mut req: Request<Body>) -> Result<Step, ChainError> {
        for handler in self.handlers.iter() {
            match handler.handle(req).await? {
                Step::Forward(next) => req = next,
                Step::Terminate(res) => {
                    tracing::debug!(handler = handler.name(), "chain terminated request");
                    return Ok(Step::Terminate(res));
                }
            }
        }

        Ok(Step::Forward(req))
    }
}
