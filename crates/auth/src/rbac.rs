//! Role-based access control on top of the credential store.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use keygate_core::{AuthError, AuthResult, RoleId, UserId};

use crate::authorize::{PermissionSet, authorize};
use crate::menu::{MenuDefinition, MenuNode, build_menu_tree};
use crate::permissions::Permission;
use crate::roles::Role;
use crate::store::{CredentialStore, StoreError};

#[derive(Debug, Clone)]
pub struct RbacEngine<S> {
    store: S,
}

impl<S> RbacEngine<S>
where
    S: CredentialStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Upsert the permissions a module declares. Idempotent.
    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    pub async fn register_module_permissions(
        &self,
        module: &str,
        ids: &[String],
        now: DateTime<Utc>,
    ) -> AuthResult<Vec<Permission>> {
        if module.trim().is_empty() {
            return Err(AuthError::validation("module must not be empty"));
        }

        let mut seen = HashSet::new();
        let mut permissions = Vec::with_capacity(ids.len());
        for id in ids {
            let id = id.trim();
            if id.is_empty() {
                return Err(AuthError::validation("permission id must not be empty"));
            }
            if seen.insert(id) {
                permissions.push(Permission::new(id, module, now));
            }
        }

        self.store
            .upsert_permissions(&permissions)
            .await
            .map_err(StoreError::into_auth_error)?;
        info!(module, count = permissions.len(), "module permissions registered");
        Ok(permissions)
    }

    /// Upsert a module's menu definitions, stamping `domain` on each. Idempotent.
    #[instrument(skip(self, definitions), fields(count = definitions.len()), err)]
    pub async fn register_module_menus(
        &self,
        domain: &str,
        definitions: Vec<MenuDefinition>,
    ) -> AuthResult<Vec<MenuDefinition>> {
        if domain.trim().is_empty() {
            return Err(AuthError::validation("menu domain must not be empty"));
        }

        let mut seen = HashSet::new();
        let mut stamped = Vec::with_capacity(definitions.len());
        for mut def in definitions {
            if def.id.trim().is_empty() {
                return Err(AuthError::validation("menu id must not be empty"));
            }
            if !seen.insert(def.id.clone()) {
                return Err(AuthError::validation(format!("duplicate menu id '{}'", def.id)));
            }
            def.domain = domain.to_string();
            stamped.push(def);
        }

        self.store
            .upsert_menu_definitions(&stamped)
            .await
            .map_err(StoreError::into_auth_error)?;
        info!(domain, count = stamped.len(), "module menus registered");
        Ok(stamped)
    }

    #[instrument(skip(self), err)]
    pub async fn create_role(&self, name: &str) -> AuthResult<Role> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::validation("role name must not be empty"));
        }
        self.store
            .create_role(name)
            .await
            .map_err(StoreError::into_auth_error)
    }

    pub async fn list_roles(&self) -> AuthResult<Vec<Role>> {
        self.store.list_roles().await.map_err(StoreError::into_auth_error)
    }

    pub async fn list_permissions(&self) -> AuthResult<Vec<Permission>> {
        self.store
            .list_permissions()
            .await
            .map_err(StoreError::into_auth_error)
    }

    #[instrument(skip(self), err)]
    pub async fn assign_role(&self, user_id: UserId, role_id: RoleId) -> AuthResult<()> {
        self.store
            .assign_role_to_user(user_id, role_id)
            .await
            .map_err(StoreError::into_auth_error)
    }

    #[instrument(skip(self), err)]
    pub async fn add_permission_to_role(&self, role_id: RoleId, permission_id: &str) -> AuthResult<()> {
        let permission_id = permission_id.trim();
        if permission_id.is_empty() {
            return Err(AuthError::validation("permission id must not be empty"));
        }
        self.store
            .add_permission_to_role(role_id, permission_id)
            .await
            .map_err(StoreError::into_auth_error)
    }

    pub async fn user_permissions(&self, user_id: UserId) -> AuthResult<PermissionSet> {
        let permissions = self
            .store
            .get_user_permissions(user_id)
            .await
            .map_err(StoreError::into_auth_error)?;
        Ok(permissions.into_iter().collect())
    }

    /// `Forbidden` unless the user holds `required` (or `*`).
    pub async fn authorize_user(&self, user_id: UserId, required: &str) -> AuthResult<()> {
        let permissions = self.user_permissions(user_id).await?;
        authorize(&permissions, required)
    }

    #[instrument(skip(self), err)]
    pub async fn my_menu(&self, user_id: UserId) -> AuthResult<Vec<MenuNode>> {
        let permissions = self.user_permissions(user_id).await?;
        let definitions = self
            .store
            .list_menu_definitions()
            .await
            .map_err(StoreError::into_auth_error)?;
        Ok(build_menu_tree(&definitions, &permissions))
    }
}
