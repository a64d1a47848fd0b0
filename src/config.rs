/*
 * Responsibility
 * - Read environment variables (PORT, OAuth2 gate settings, Valkey, ...)
 * - Validate values (fail startup when something is missing or invalid)
 * - Derive the immutable GateConfig handed to the gate
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use serde_json::Value;

use crate::services::oauth2::classifier::{
    DEFAULT_BYPASS_THRESHOLD, DEFAULT_USER_TOKEN_PREFIX, LengthHeuristic, OAUTH_TOKEN_LEN,
    USER_TOKEN_LEN,
};
use crate::services::oauth2::handlers::SCOPES_OPTION;
use crate::services::oauth2::options::{DEFAULT_BODY_LIMIT_BYTES, GateConfig, GateOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(value: Option<String>) -> Self {
        match value
            .unwrap_or_else(|| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

/// How the gate tells OAuth2 tokens from user tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifierChoice {
    Length,
    Lookup { valkey_url: String, prefix: String },
    // In-process index seeded from `USER_TOKENS`, for development and tests
    Memory { user_tokens: Vec<String>, prefix: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,

    pub gateway_enabled: bool,
    pub required_scopes: Vec<String>,
    pub classifier: ClassifierChoice,
    pub heuristic: LengthHeuristic,

    // `token=subject:client:scope scope;...`
    pub static_tokens: String,
    // Start without registering the chain factory (every gated request is refused)
    pub oauth2_disabled: bool,

    pub request_body_limit_bytes: usize,
}

fn parse_bool(key: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("") => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(_) => Err(ConfigError::Invalid(key)),
    }
}

fn parse_usize(key: &'static str, value: Option<String>, default: usize) -> Result<usize, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or(ConfigError::Invalid(key)),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the process environment in production).
    pub fn from_lookup<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port: u16 = var("PORT").and_then(|s| s.parse().ok()).unwrap_or(3000);

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::parse(var("APP_ENV"));

        let gateway_enabled = parse_bool(
            "OAUTH2_GATEWAY_ENABLED",
            var("OAUTH2_GATEWAY_ENABLED"),
            false,
        )?;

        let required_scopes = var("OAUTH2_SCOPES")
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect::<Vec<_>>();

        let prefix = || {
            var("USER_TOKEN_PREFIX").unwrap_or_else(|| DEFAULT_USER_TOKEN_PREFIX.to_string())
        };
        let classifier = match var("OAUTH2_CLASSIFIER")
            .unwrap_or_else(|| "length".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "length" => ClassifierChoice::Length,
            "lookup" => ClassifierChoice::Lookup {
                valkey_url: var("VALKEY_URL").ok_or(ConfigError::Missing("VALKEY_URL"))?,
                prefix: prefix(),
            },
            "memory" => ClassifierChoice::Memory {
                user_tokens: var("USER_TOKENS")
                    .unwrap_or_default()
                    .split_whitespace()
                    .map(str::to_string)
                    .collect(),
                prefix: prefix(),
            },
            _ => return Err(ConfigError::Invalid("OAUTH2_CLASSIFIER")),
        };

        let heuristic = LengthHeuristic {
            bypass_threshold: parse_usize(
                "OAUTH2_BYPASS_THRESHOLD",
                var("OAUTH2_BYPASS_THRESHOLD"),
                DEFAULT_BYPASS_THRESHOLD,
            )?,
            oauth_token_len: parse_usize(
                "OAUTH2_TOKEN_LENGTH",
                var("OAUTH2_TOKEN_LENGTH"),
                OAUTH_TOKEN_LEN,
            )?,
            user_token_len: parse_usize(
                "USER_TOKEN_LENGTH",
                var("USER_TOKEN_LENGTH"),
                USER_TOKEN_LEN,
            )?,
        };

        let static_tokens = var("OAUTH2_STATIC_TOKENS").unwrap_or_default();
        let oauth2_disabled = parse_bool("OAUTH2_DISABLED", var("OAUTH2_DISABLED"), false)?;

        let request_body_limit_bytes = parse_usize(
            "REQUEST_BODY_LIMIT_BYTES",
            var("REQUEST_BODY_LIMIT_BYTES"),
            DEFAULT_BODY_LIMIT_BYTES,
        )?;

        Ok(Self {
            addr,
            app_env,
            gateway_enabled,
            required_scopes,
            classifier,
            heuristic,
            static_tokens,
            oauth2_disabled,
            request_body_limit_bytes,
        })
    }

    /// Immutable gate configuration; the scopes go into the opaque options bag.
    pub fn gate_config(&self) -> GateConfig {
        let mut options = GateOptions::new();
        if !self.required_scopes.is_empty() {
            let scopes = self
                .required_scopes
                .iter()
                .cloned()
                .map(Value::String)
                .collect::<Vec<_>>();
            options = options.with(SCOPES_OPTION, scopes);
        }

        GateConfig::gated(self.gateway_enabled)
            .with_options(options)
            .with_body_limit(self.request_body_limit_bytes)
    }
}
