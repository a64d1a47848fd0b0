/*
 * Responsibility
 * - GET/POST /me: the identity downstream of the gate
 * - Bypassed requests answer with `authenticated: false`; validating their
 *   credential is left to whatever sits after the gate
 */
use axum::{Json, extract::Path};
use serde::Serialize;

use crate::api::v1::extractors::{IdentityExtractor, OptionalIdentity};

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub authenticated: bool,
    pub subject: Option<String>,
    pub client_id: Option<String>,
    pub scopes: Option<Vec<String>>,
}

pub async fn me(OptionalIdentity(identity): OptionalIdentity) -> Json<MeResponse> {
    let res = match identity {
        Some(identity) => MeResponse {
            authenticated: true,
            subject: Some(identity.subject),
            client_id: identity.client_id,
            scopes: identity.scopes,
        },
        None => MeResponse {
            authenticated: false,
            subject: None,
            client_id: None,
            scopes: None,
        },
    };

    Json(res)
}

#[derive(Debug, Serialize)]
pub struct ScopeCheckResponse {
    pub scope: String,
    pub permitted: bool,
}

/// GET /me/scopes/{scope}: downstream authorization view of one scope.
/// A cleared scope list places no OAuth restriction.
pub async fn check_scope(
    IdentityExtractor(identity): IdentityExtractor,
    Path(scope): Path<String>,
) -> Json<ScopeCheckResponse> {
    let permitted = identity.permits(&scope);
    Json(ScopeCheckResponse { scope, permitted })
}
