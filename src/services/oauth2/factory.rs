/// Factory: build the OAuth2 gate from application `Config`.
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ClassifierChoice, Config};
use crate::middleware::oauth2::OAuth2Gate;
use crate::services::cache::{CacheError, MemoryCache, ValkeyClient};
use crate::services::oauth2::chain::ChainFactory;
use crate::services::oauth2::classifier::{
    ClassifierError, CredentialClassifier, StoreLookupClassifier,
};
use crate::services::oauth2::handlers::ReferenceChainFactory;
use crate::services::oauth2::token_store::{InMemoryTokenStore, SeedError};

#[derive(Debug, thiserror::Error)]
pub enum GateSetupError {
    #[error("invalid OAUTH2_STATIC_TOKENS: {0}")]
    Seed(#[from] SeedError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("could not seed USER_TOKENS: {0}")]
    UserTokens(#[from] ClassifierError),
}

// Lifetime of `USER_TOKENS` entries in the in-process index.
const SEEDED_USER_TOKEN_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// The chain factory the application registers, or `None` when OAuth2 is switched off.
pub fn build_chain_factory(config: &Config) -> Result<Option<Arc<dyn ChainFactory>>, GateSetupError> {
    if config.oauth2_disabled {
        tracing::warn!("OAUTH2_DISABLED is set; gated requests will be refused");
        return Ok(None);
    }

    let store = InMemoryTokenStore::from_seed(&config.static_tokens)?;
    tracing::info!(tokens = store.len(), "oauth2 token store seeded");

    Ok(Some(Arc::new(ReferenceChainFactory::new(
        Arc::new(store),
        config.request_body_limit_bytes,
    ))))
}

pub async fn build_classifier(config: &Config) -> Result<Arc<dyn CredentialClassifier>, GateSetupError> {
    let classifier: Arc<dyn CredentialClassifier> = match &config.classifier {
        ClassifierChoice::Length => Arc::new(config.heuristic),
        ClassifierChoice::Lookup { valkey_url, prefix } => {
            let cache = ValkeyClient::new(valkey_url).await?;
            Arc::new(StoreLookupClassifier::new(Arc::new(cache), prefix.clone()))
        }
        ClassifierChoice::Memory { user_tokens, prefix } => {
            if config.app_env.is_production() {
                tracing::warn!("in-process user-token index in production; entries are not shared");
            }
            let lookup = StoreLookupClassifier::new(Arc::new(MemoryCache::new()), prefix.clone());
            for token in user_tokens {
                lookup.remember_user_token(token, SEEDED_USER_TOKEN_TTL).await?;
            }
            tracing::info!(tokens = user_tokens.len(), "user-token index seeded");
            Arc::new(lookup)
        }
    };

    Ok(classifier)
}

pub async fn build_gate(config: &Config) -> Result<Arc<OAuth2Gate>, GateSetupError> {
    let factory = build_chain_factory(config)?;
    let classifier = build_classifier(config).await?;

    let gate = OAuth2Gate::new(config.gate_config(), factory).with_classifier(classifier);
    Ok(Arc::new(gate))
}
