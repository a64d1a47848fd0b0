//! Gate configuration and the opaque options bag handed to the chain factory.

use serde_json::{Map, Value};

/// Default limit for buffering a request body while looking for `access_token`.
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// Options passed through, untouched, to the [`ChainFactory`].
///
/// The gate never reads these; only the factory gives them meaning
/// (the reference chain understands `scopes`).
///
/// [`ChainFactory`]: crate::services::oauth2::chain::ChainFactory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateOptions(Map<String, Value>);

impl GateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for GateOptions {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Immutable per-gate configuration, captured when the gate is constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct GateConfig {
    /// When false every request runs through the chain.
    pub gateway_enabled: bool,
    /// Upper bound for buffering a form/JSON body during credential extraction.
    pub body_limit_bytes: usize,
    pub options: GateOptions,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            gateway_enabled: false,
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
            options: GateOptions::default(),
        }
    }
}

impl GateConfig {
    pub fn gated(gateway_enabled: bool) -> Self {
        Self {
            gateway_enabled,
            ..Self::default()
        }
    }

    pub fn with_options(mut self, options: GateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_body_limit(mut self, body_limit_bytes: usize) -> Self {
        self.body_limit_bytes = body_limit_bytes;
        self
    }
}
