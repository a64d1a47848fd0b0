//! Access-token extraction from the request body or query string.
//!
//! Precedence: body field first, then query field. Only form and JSON bodies
//! are inspected; the body is buffered and put back unchanged.

use std::error::Error as StdError;
use std::fmt;

use axum::{
    body::{self, Body},
    http::{HeaderMap, Request, header},
};
use http_body_util::LengthLimitError;
use thiserror::Error;

/// Field name looked up in both the body and the query string.
pub const ACCESS_TOKEN_FIELD: &str = "access_token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Body,
    Query,
}

/// A presented access token.
///
/// `Debug` never prints the token itself.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    value: String,
    source: CredentialSource,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("source", &self.source)
            .field("len", &self.len())
            .finish()
    }
}

impl Credential {
    pub fn new(value: impl Into<String>, source: CredentialSource) -> Self {
        Self {
            value: value.into(),
            source,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// Length in characters (Unicode scalar values), not bytes.
    pub fn len(&self) -> usize {
        self.value.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum BodyError {
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("request body could not be read: {0}")]
    Unreadable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Form,
    Json,
}

fn body_kind(headers: &HeaderMap) -> Option<BodyKind> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())?;
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if essence == "application/x-www-form-urlencoded" {
        Some(BodyKind::Form)
    } else if essence == "application/json" || essence.ends_with("+json") {
        Some(BodyKind::Json)
    } else {
        None
    }
}

/// First `access_token` in an urlencoded string. Empty values count as absent.
fn form_field(input: &[u8]) -> Option<String> {
    url::form_urlencoded::parse(input)
        .find(|(key, _)| key == ACCESS_TOKEN_FIELD)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Top-level string `access_token` in a JSON object. Non-strings count as absent.
fn json_field(input: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(input).ok()?;
    value
        .get(ACCESS_TOKEN_FIELD)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// The limit may be hit here or by an outer `RequestBodyLimitLayer`, whose
/// error arrives wrapped in one or more `axum::Error`s.
fn exceeds_limit(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        if err.is::<LengthLimitError>() {
            return true;
        }
        current = err.source();
    }
    false
}

/// Look for `access_token` in the query string only.
pub fn from_query<B>(req: &Request<B>) -> Option<Credential> {
    req.uri()
        .query()
        .and_then(|q| form_field(q.as_bytes()))
        .map(|token| Credential::new(token, CredentialSource::Query))
}

/// Extract the credential, body field first and query second.
///
/// Returns the request with its body restored so downstream extractors still
/// see the original payload.
pub async fn extract(
    req: Request<Body>,
    limit: usize,
) -> Result<(Request<Body>, Option<Credential>), BodyError> {
    let Some(kind) = body_kind(req.headers()) else {
        let credential = from_query(&req);
        return Ok((req, credential));
    };

    let (parts, payload) = req.into_parts();
    let bytes = body::to_bytes(payload, limit).await.map_err(|err| {
        let inner = err.into_inner();
        if exceeds_limit(&*inner) {
            BodyError::TooLarge { limit }
        } else {
            BodyError::Unreadable(inner.to_string())
        }
    })?;

    let from_body = match kind {
        BodyKind::Form => form_field(&bytes),
        BodyKind::Json => json_field(&bytes),
    };

    let req = Request::from_parts(parts, Body::from(bytes));
    let credential = match from_body {
        Some(token) => Some(Credential::new(token, CredentialSource::Body)),
        None => from_query(&req),
    };

    Ok((req, credential))
}
