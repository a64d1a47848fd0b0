/*
 * Responsibility
 * - The authenticated identity that the OAuth2 chain attaches to a request
 * - Handlers and downstream authorization only ever see this type
 *
 * Notes
 * - Token verification belongs to the chain handlers (services::oauth2)
 * - `scopes == None` after the gate ran means "no OAuth-scope restriction"
 */

/// Identity attached to request extensions by the chain on successful authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedIdentity {
    pub subject: String,
    pub client_id: Option<String>,
    pub scopes: Option<Vec<String>>,
}

impl ValidatedIdentity {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            client_id: None,
            scopes: None,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_scopes<I, T>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    /// Drop the OAuth scope grant so a later authorization layer does not re-evaluate it.
    pub fn clear_scopes(&mut self) {
        self.scopes = None;
    }

    /// Downstream scope check.
    ///
    /// An empty or absent scope list places no OAuth-scope restriction; the
    /// caller should decide on other attributes.
    pub fn permits(&self, scope: &str) -> bool {
        match self.scopes.as_deref() {
            None | Some([]) => true,
            Some(granted) => granted.iter().any(|s| s == scope),
        }
    }
}
