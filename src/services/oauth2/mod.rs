pub mod chain;
pub mod classifier;
pub mod credential;
pub mod factory;
pub mod handlers;
pub mod options;
pub mod token_store;

pub use chain::{AuthHandler, ChainError, ChainFactory, HandlerChain, Step};
pub use classifier::{CredentialClassifier, CredentialKind, LengthHeuristic, StoreLookupClassifier};
pub use credential::Credential;
pub use factory::build_gate;
pub use options::{GateConfig, GateOptions};
