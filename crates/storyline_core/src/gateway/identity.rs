//! Connection identity resolution.
//!
//! Identity is attached before a connection reaches the gateway. The
//! gateway only ever sees the resolved user id, or none for readers.

use crate::model::story::{is_valid_user_id, UserId};
use std::collections::HashMap;

/// Resolves a connection credential to a writer identity.
pub trait IdentityProvider: Send + Sync {
    /// Returns the user for `credential`, or `None` for anonymous readers.
    fn resolve(&self, credential: Option<&str>) -> Option<UserId>;
}

/// Fixed credential table, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    users: HashMap<String, UserId>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a credential. Invalid user ids are ignored.
    pub fn with_user(mut self, credential: impl Into<String>, user_id: UserId) -> Self {
        if is_valid_user_id(user_id) {
            self.users.insert(credential.into(), user_id);
        }
        self
    }

    /// Parses `credential=user_id` pairs separated by commas.
    ///
    /// Malformed pairs are skipped.
    pub fn parse(table: &str) -> Self {
        table
            .split(',')
            .filter_map(|pair| {
                let (credential, user) = pair.split_once('=')?;
                let credential = credential.trim();
                let user_id = user.trim().parse::<UserId>().ok()?;
                (!credential.is_empty()).then(|| (credential.to_string(), user_id))
            })
            .fold(Self::new(), |provider, (credential, user_id)| {
                provider.with_user(credential, user_id)
            })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn resolve(&self, credential: Option<&str>) -> Option<UserId> {
        credential.and_then(|credential| self.users.get(credential.trim()).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::{IdentityProvider, StaticIdentityProvider};

    #[test]
    fn parse_skips_malformed_pairs() {
        let provider = StaticIdentityProvider::parse("alice=1, bob=2,broken,eve=x,=5,zero=0");
        assert_eq!(provider.len(), 2);
        assert_eq!(provider.resolve(Some("alice")), Some(1));
        assert_eq!(provider.resolve(Some(" bob ")), Some(2));
        assert_eq!(provider.resolve(Some("zero")), None);
    }

    #[test]
    fn missing_credential_is_anonymous() {
        let provider = StaticIdentityProvider::new().with_user("alice", 1);
        assert_eq!(provider.resolve(None), None);
        assert_eq!(provider.resolve(Some("mallory")), None);
    }
}
