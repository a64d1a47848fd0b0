pub mod cache;
pub mod oauth2;
