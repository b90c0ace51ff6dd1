//! Credential store contract.
//!
//! The credential core owns no state of its own: every user, session, role,
//! permission and menu definition lives behind this trait. Implementations must
//! make each call atomic (one transaction or one lock scope) so that a
//! cancelled call never leaves a partial write behind.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use keygate_core::{AuthError, RoleId, SessionId, UserId};

use crate::menu::MenuDefinition;
use crate::permissions::Permission;
use crate::roles::Role;
use crate::session::Session;
use crate::user::User;

/// Store operation error.
///
/// These are infrastructure outcomes; the service layer decides how much of
/// them a caller may see (see [`StoreError::into_auth_error`]).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    /// Uniqueness violated (duplicate email, duplicate role name, ...).
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Map to the outward taxonomy for operations where existence may be disclosed.
    pub fn into_auth_error(self) -> AuthError {
        match self {
            StoreError::NotFound => AuthError::NotFound,
            StoreError::Conflict(msg) => AuthError::AlreadyExists(msg),
            StoreError::Backend(msg) => AuthError::Internal(msg),
        }
    }

    /// Map for credential paths: "no such record" must look like bad credentials.
    pub fn into_credential_error(self) -> AuthError {
        match self {
            StoreError::NotFound => AuthError::Unauthorized,
            other => other.into_auth_error(),
        }
    }
}

/// Persistence contract required by the credential core.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    // Users

    /// Look up a user by (normalized) email.
    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError>;

    async fn get_user_by_id(&self, user_id: UserId) -> Result<User, StoreError>;

    /// Insert a user. Duplicate id or email is `Conflict`.
    async fn create_user(&self, user: &User) -> Result<(), StoreError>;

    // Sessions

    /// Insert a session. With `max_active` set, first revoke the user's oldest
    /// active sessions so that at most `max_active` remain, counting the new one.
    ///
    /// Eviction and insert are one atomic step, serialized per user, so two
    /// concurrent logins cannot both slip under the cap. Returns the evicted ids.
    async fn create_session(
        &self,
        session: &Session,
        max_active: Option<usize>,
    ) -> Result<Vec<SessionId>, StoreError>;

    async fn get_session(&self, session_id: SessionId) -> Result<Session, StoreError>;

    /// Replace the refresh digest and expiry, but only while the stored digest
    /// still equals `expected_hash` and the session is not revoked.
    ///
    /// Returns `false` when the compare-and-swap lost (another refresh won).
    async fn rotate_session_refresh(
        &self,
        session_id: SessionId,
        expected_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Set the revocation marker. Revoking twice keeps the first timestamp.
    async fn revoke_session(
        &self,
        session_id: SessionId,
        revoked_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Non-revoked, non-expired sessions of a user, oldest first.
    async fn list_active_sessions(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError>;

    // RBAC

    /// Insert-or-update by permission id; `created_at` of existing rows is kept.
    async fn upsert_permissions(&self, permissions: &[Permission]) -> Result<(), StoreError>;

    /// All permissions ordered by id.
    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError>;

    /// Create a role. Duplicate name is `Conflict`.
    async fn create_role(&self, name: &str) -> Result<Role, StoreError>;

    /// All roles ordered by id.
    async fn list_roles(&self) -> Result<Vec<Role>, StoreError>;

    /// Unknown user or role is `NotFound`; assigning twice is a no-op.
    async fn assign_role_to_user(&self, user_id: UserId, role_id: RoleId) -> Result<(), StoreError>;

    /// Unknown role or permission is `NotFound`; adding twice is a no-op.
    async fn add_permission_to_role(
        &self,
        role_id: RoleId,
        permission_id: &str,
    ) -> Result<(), StoreError>;

    /// Distinct permission ids granted to the user through their roles.
    async fn get_user_permissions(&self, user_id: UserId) -> Result<Vec<String>, StoreError>;

    // Menus

    /// Insert-or-update by menu id.
    async fn upsert_menu_definitions(&self, definitions: &[MenuDefinition]) -> Result<(), StoreError>;

    /// All definitions in a stable order (sort order, then registration order).
    async fn list_menu_definitions(&self) -> Result<Vec<MenuDefinition>, StoreError>;
}

#[async_trait::async_trait]
impl<S> CredentialStore for Arc<S>
where
    S: CredentialStore + ?Sized,
{
    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        (**self).get_user_by_email(email).await
    }

    async fn get_user_by_id(&self, user_id: UserId) -> Result<User, StoreError> {
        (**self).get_user_by_id(user_id).await
    }

    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        (**self).create_user(user).await
    }

    async fn create_session(
        &self,
        session: &Session,
        max_active: Option<usize>,
    ) -> Result<Vec<SessionId>, StoreError> {
        (**self).create_session(session, max_active).await
    }

    async fn get_session(&self, session_id: SessionId) -> Result<Session, StoreError> {
        (**self).get_session(session_id).await
    }

    async fn rotate_session_refresh(
        &self,
        session_id: SessionId,
        expected_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        (**self)
            .rotate_session_refresh(session_id, expected_hash, new_hash, expires_at, updated_at)
            .await
    }

    async fn revoke_session(
        &self,
        session_id: SessionId,
        revoked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        (**self).revoke_session(session_id, revoked_at).await
    }

    async fn list_active_sessions(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError> {
        (**self).list_active_sessions(user_id, now).await
    }

    async fn upsert_permissions(&self, permissions: &[Permission]) -> Result<(), StoreError> {
        (**self).upsert_permissions(permissions).await
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        (**self).list_permissions().await
    }

    async fn create_role(&self, name: &str) -> Result<Role, StoreError> {
        (**self).create_role(name).await
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        (**self).list_roles().await
    }

    async fn assign_role_to_user(&self, user_id: UserId, role_id: RoleId) -> Result<(), StoreError> {
        (**self).assign_role_to_user(user_id, role_id).await
    }

    async fn add_permission_to_role(
        &self,
        role_id: RoleId,
        permission_id: &str,
    ) -> Result<(), StoreError> {
        (**self).add_permission_to_role(role_id, permission_id).await
    }

    async fn get_user_permissions(&self, user_id: UserId) -> Result<Vec<String>, StoreError> {
        (**self).get_user_permissions(user_id).await
    }

    async fn upsert_menu_definitions(&self, definitions: &[MenuDefinition]) -> Result<(), StoreError> {
        (**self).upsert_menu_definitions(definitions).await
    }

    async fn list_menu_definitions(&self) -> Result<Vec<MenuDefinition>, StoreError> {
        (**self).list_menu_definitions().await
    }
}
