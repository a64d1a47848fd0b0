pub mod identity;

pub use identity::{IdentityExtractor, OptionalIdentity, ValidatedIdentity};
