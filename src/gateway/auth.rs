//! Bearer credential resolution.

use std::collections::HashMap;

/// Resolves a bearer credential to a user id.
///
/// Token verification belongs to the identity provider; implementations
/// adapt whatever it exposes.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, credential: &str) -> Option<String>;
}

/// Fixed credential table, used by the stdin server and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityResolver {
    credentials: HashMap<String, String>,
}

impl StaticIdentityResolver {
    pub fn new(credentials: HashMap<String, String>) -> Self {
        Self { credentials }
    }

    pub fn with_user(mut self, credential: &str, user_id: &str) -> Self {
        self.credentials
            .insert(credential.to_string(), user_id.to_string());
        self
    }
}

impl IdentityResolver for StaticIdentityResolver {
    fn resolve(&self, credential: &str) -> Option<String> {
        let token = strip_bearer(credential);
        if token.is_empty() {
            return None;
        }
        self.credentials.get(token).cloned()
    }
}

/// Strip an optional `Bearer ` scheme prefix.
pub fn strip_bearer(credential: &str) -> &str {
    let trimmed = credential.trim();
    match trimmed.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest.trim(),
        _ => trimmed,
    }
}
