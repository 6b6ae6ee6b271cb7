//! Credential types
//!
//! Credentials are owned exclusively by the broker: cached per scope for
//! their stated lifetime, never persisted, invalid after expiry. The token
//! value is redacted from Debug output and never serialized.

use serde::{Deserialize, Serialize};

/// A named permission scope a credential can cover
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(pub String);

impl Scope {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Short-lived access token scoped to one permission set
#[derive(Clone)]
pub struct Credential {
    /// Token value. Redacted in Debug; never logged.
    pub token: String,
    pub scope: Scope,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl Credential {
    /// Creates a credential valid for the given number of seconds from now
    pub fn new(token: impl Into<String>, scope: Scope, lifetime_secs: i64) -> Self {
        Self {
            token: token.into(),
            scope,
            expires_at: chrono::Utc::now() + chrono::Duration::seconds(lifetime_secs),
        }
    }

    /// True once the stated lifetime has elapsed
    pub fn is_expired(&self) -> bool {
        chrono::Utc::now() >= self.expires_at
    }

    /// True if this credential grants the given scope
    pub fn covers(&self, scope: &Scope) -> bool {
        self.scope == *scope
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_expiry() {
        let live = Credential::new("tok", Scope::new("coverage:write"), 3600);
        assert!(!live.is_expired());

        let dead = Credential::new("tok", Scope::new("coverage:write"), -1);
        assert!(dead.is_expired());
    }

    #[test]
    fn test_credential_covers_scope() {
        let cred = Credential::new("tok", Scope::new("coverage:write"), 60);
        assert!(cred.covers(&Scope::new("coverage:write")));
        assert!(!cred.covers(&Scope::new("artifacts:read")));
    }

    #[test]
    fn test_debug_redacts_token() {
        let cred = Credential::new("super-secret", Scope::new("coverage:write"), 60);
        let rendered = format!("{:?}", cred);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
