use std::collections::BTreeSet;

use serde::Serialize;

use keygate_core::{AuthError, AuthResult};

use crate::permissions::WILDCARD;

/// A user's effective permissions (roles already resolved).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<String>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grants(&self, required: &str) -> bool {
        self.0.contains(WILDCARD) || self.0.contains(required)
    }

    pub fn has_wildcard(&self) -> bool {
        self.0.contains(WILDCARD)
    }

    pub fn insert(&mut self, permission: impl Into<String>) -> bool {
        self.0.insert(permission.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<T: Into<String>> FromIterator<T> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Authorize against a resolved permission set.
///
/// - No IO
/// - No panics
pub fn authorize(permissions: &PermissionSet, required: &str) -> AuthResult<()> {
    if permissions.grants(required) {
        Ok(())
    } else {
        Err(AuthError::forbidden(required))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_permission_is_granted() {
        let perms: PermissionSet = ["billing.view"].into_iter().collect();
        assert_eq!(authorize(&perms, "billing.view"), Ok(()));
    }

    #[test]
    fn missing_permission_is_forbidden() {
        let perms: PermissionSet = ["billing.view"].into_iter().collect();
        assert_eq!(
            authorize(&perms, "billing.edit"),
            Err(AuthError::Forbidden("billing.edit".to_string()))
        );
        assert!(authorize(&PermissionSet::new(), "billing.view").is_err());
    }

    #[test]
    fn wildcard_grants_everything() {
        let perms: PermissionSet = ["*"].into_iter().collect();
        assert!(perms.has_wildcard());
        assert_eq!(authorize(&perms, "anything.at.all"), Ok(()));
    }

    #[test]
    fn set_semantics() {
        let perms: PermissionSet = ["a", "b", "a"].into_iter().collect();
        assert_eq!(perms.len(), 2);
        assert_eq!(perms.iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
