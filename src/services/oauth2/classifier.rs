//! Credential classification: does a presented token belong to the OAuth2
//! namespace (run the chain) or to the application's own user-token
//! namespace (leave it to the downstream authorization layer)?
//!
//! The default [`LengthHeuristic`] never touches storage. It assumes OAuth2
//! tokens are 32 characters and user tokens 64, and calls anything longer
//! than the threshold a user token. That is an accepted approximation, not a
//! guarantee: a long OAuth2 token or a short user token is misclassified.
//! Deployments that cannot accept this plug in [`StoreLookupClassifier`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::services::cache::{CacheClient, CacheError};
use crate::services::oauth2::credential::Credential;

/// Credentials longer than this many characters are not sent to the chain.
pub const DEFAULT_BYPASS_THRESHOLD: usize = 32;
/// Nominal length of an OAuth2 access token.
pub const OAUTH_TOKEN_LEN: usize = 32;
/// Nominal length of an application user access token.
pub const USER_TOKEN_LEN: usize = 64;

/// Key prefix for the user-token index.
pub const DEFAULT_USER_TOKEN_PREFIX: &str = "user_token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    /// Issued by the OAuth2 server; the chain must validate it.
    OAuth,
    /// Belongs to another namespace; downstream validates it.
    Foreign,
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[async_trait]
pub trait CredentialClassifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn classify(&self, credential: &Credential) -> Result<CredentialKind, ClassifierError>;
}

/// Length-only classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthHeuristic {
    pub bypass_threshold: usize,
    pub oauth_token_len: usize,
    pub user_token_len: usize,
}

impl Default for LengthHeuristic {
    fn default() -> Self {
        Self {
            bypass_threshold: DEFAULT_BYPASS_THRESHOLD,
            oauth_token_len: OAUTH_TOKEN_LEN,
            user_token_len: USER_TOKEN_LEN,
        }
    }
}

impl LengthHeuristic {
    pub fn kind_of(&self, len: usize) -> CredentialKind {
        if len > self.bypass_threshold {
            CredentialKind::Foreign
        } else {
            CredentialKind::OAuth
        }
    }
}

#[async_trait]
impl CredentialClassifier for LengthHeuristic {
    fn name(&self) -> &'static str {
        "length"
    }

    async fn classify(&self, credential: &Credential) -> Result<CredentialKind, ClassifierError> {
        let len = credential.len();
        if len != self.oauth_token_len && len != self.user_token_len {
            tracing::debug!(
                len,
                oauth_token_len = self.oauth_token_len,
                user_token_len = self.user_token_len,
                "credential length matches neither token namespace"
            );
        }
        Ok(self.kind_of(len))
    }
}

/// Authoritative classification against an index of user tokens.
///
/// Tokens are stored hashed (`{prefix}:{base64url(sha256(token))}`); any hit
/// is a user token, anything else goes to the chain.
#[derive(Clone, Debug)]
pub struct StoreLookupClassifier<C: CacheClient> {
    cache: Arc<C>,
    prefix: String,
}

impl<C: CacheClient> StoreLookupClassifier<C> {
    pub fn new(cache: Arc<C>, prefix: impl Into<String>) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
        }
    }

    pub fn key(&self, token: &str) -> String {
        let digest = Sha256::digest(token.as_bytes());
        format!("{}:{}", self.prefix, URL_SAFE_NO_PAD.encode(digest))
    }

    /// Index a user token. Returns false when it was already indexed.
    pub async fn remember_user_token(
        &self,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, ClassifierError> {
        Ok(self
            .cache
            .set_if_absent_with_ttl(&self.key(token), "1", ttl)
            .await?)
    }
}

#[async_trait]
impl<C: CacheClient> CredentialClassifier for StoreLookupClassifier<C> {
    fn name(&self) -> &'static str {
        "lookup"
    }

    async fn classify(&self, credential: &Credential) -> Result<CredentialKind, ClassifierError> {
        let hit = self
            .cache
            .get_string(&self.key(credential.as_str()))
            .await?;

        tracing::debug!(
            backend = self.cache.backend_name(),
            hit = hit.is_some(),
            "user token lookup"
        );

        Ok(match hit {
            Some(_) => CredentialKind::Foreign,
            None => CredentialKind::OAuth,
        })
    }
}
