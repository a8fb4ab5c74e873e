//! Bearer token resolution.

use std::collections::HashMap;

use crate::auth::Identity;
use crate::config::AuthConfig;

/// Resolves a bearer token to an identity.
pub trait Authenticator: Send + Sync {
    /// `token` is the raw header value, possibly prefixed with `Bearer `.
    fn identify(&self, token: &str) -> Option<Identity>;
}

/// Static token table, with optional auto login.
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    tokens: HashMap<String, Identity>,
    auto_login: Option<Identity>,
}

impl TokenTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        let mut table = Self::new();
        for entry in &config.tokens {
            table.tokens.insert(entry.token.clone(), entry.identity());
        }
        table.auto_login = config.auto_login.as_ref().map(|t| t.identity());
        if let Some(user) = &table.auto_login {
            tracing::warn!(username = %user.username, "Auto login enabled, every request is authenticated");
        }
        table
    }

    pub fn insert(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }

    pub fn auto_login(mut self, identity: Identity) -> Self {
        self.auto_login = Some(identity);
        self
    }
}

impl Authenticator for TokenTable {
    fn identify(&self, token: &str) -> Option<Identity> {
        if let Some(user) = &self.auto_login {
            return Some(user.clone());
        }
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        if token.is_empty() {
            return None;
        }
        let found = self.tokens.get(token).cloned();
        if found.is_none() {
            tracing::debug!("Unknown bearer token");
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Group;

    fn admin() -> Identity {
        Identity {
            username: "root".into(),
            group: Group::Admin,
            dept: "ops".into(),
        }
    }

    #[test]
    fn bearer_prefix_is_optional() {
        let table = TokenTable::new().insert("secret", admin());
        assert_eq!(table.identify("Bearer secret"), Some(admin()));
        assert_eq!(table.identify("secret"), Some(admin()));
        assert_eq!(table.identify("Bearer other"), None);
        assert_eq!(table.identify(""), None);
    }

    #[test]
    fn auto_login_ignores_token() {
        let table = TokenTable::new().auto_login(admin());
        assert_eq!(table.identify(""), Some(admin()));
    }
}
