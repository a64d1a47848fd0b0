/*!
 * Validated identity extractor
 *
 * Responsibility:
 * - Hand the identity attached by the OAuth2 chain to handlers
 * - axum plumbing lives in core, the type itself in types
 *
 * Public API:
 * - ValidatedIdentity
 * - IdentityExtractor / OptionalIdentity
 */

mod core;
mod types;

pub use core::{IdentityExtractor, OptionalIdentity};
pub use types::ValidatedIdentity;
