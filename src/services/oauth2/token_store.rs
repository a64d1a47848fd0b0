//! OAuth2 access-token storage used by the reference chain.
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// What the authorization server recorded for an issued access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub subject: String,
    pub client_id: Option<String>,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenRecord {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            client_id: None,
            scopes: Vec::new(),
            expires_at: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("token store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeedError {
    #[error("token seed entry {0} is missing '='")]
    MissingToken(usize),
    #[error("token seed entry {0} has an empty token or subject")]
    Empty(usize),
}

#[async_trait]
pub trait AccessTokenStore: Send + Sync {
    async fn find(&self, token: &str) -> Result<Option<TokenRecord>, TokenStoreError>;
}

/// Fixed set of tokens, read-only after construction.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTokenStore {
    tokens: HashMap<String, TokenRecord>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, record: TokenRecord) -> Self {
        self.tokens.insert(token.into(), record);
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Parse `token=subject[:client[:scope scope ...]]` entries separated by `;`.
    ///
    /// Seeded tokens never expire.
    pub fn from_seed(seed: &str) -> Result<Self, SeedError> {
        let mut store = Self::new();

        let entries = seed.split(';').map(str::trim).filter(|e| !e.is_empty());
        for (idx, entry) in entries.enumerate() {
            let (token, rest) = entry.split_once('=').ok_or(SeedError::MissingToken(idx))?;
            let mut fields = rest.splitn(3, ':');

            let token = token.trim();
            let subject = fields.next().unwrap_or_default().trim();
            if token.is_empty() || subject.is_empty() {
                return Err(SeedError::Empty(idx));
            }

            let client_id = fields
                .next()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_owned);
            let scopes = fields
                .next()
                .map(|s| s.split_whitespace().map(str::to_owned).collect())
                .unwrap_or_default();

            store.tokens.insert(
                token.to_owned(),
                TokenRecord {
                    subject: subject.to_owned(),
                    client_id,
                    scopes,
                    expires_at: None,
                },
            );
        }

        Ok(store)
    }
}

#[async_trait]
impl AccessTokenStore for InMemoryTokenStore {
    async fn find(&self, token: &str) -> Result<Option<TokenRecord>, TokenStoreError> {
        Ok(self.tokens.get(token).cloned())
    }
}
