//! Module manifests: the permissions and menu entries a module contributes.

use crate::menu::MenuDefinition;

/// Permission to manage roles and assignments.
pub const ROLES_MANAGE: &str = "auth.roles.manage";
/// Permission to view user accounts.
pub const USERS_READ: &str = "auth.users.read";

/// Everything a module registers with the RBAC engine at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleManifest {
    /// Module name; used as both permission module and menu domain.
    pub name: String,
    pub permissions: Vec<String>,
    pub menus: Vec<MenuDefinition>,
}

impl ModuleManifest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            permissions: Vec::new(),
            menus: Vec::new(),
        }
    }

    pub fn permission(mut self, id: impl Into<String>) -> Self {
        self.permissions.push(id.into());
        self
    }

    pub fn menu(mut self, definition: MenuDefinition) -> Self {
        self.menus.push(definition);
        self
    }
}

/// The auth module's own manifest.
pub fn auth_manifest() -> ModuleManifest {
    ModuleManifest::new("auth")
        .permission(ROLES_MANAGE)
        .permission(USERS_READ)
        .menu(
            MenuDefinition::new("auth.access", "Access control")
                .permission(ROLES_MANAGE)
                .icon("shield")
                .sort_order(100),
        )
        .menu(
            MenuDefinition::new("auth.access.roles", "Roles")
                .parent("auth.access")
                .permission(ROLES_MANAGE)
                .path("/backoffice/roles")
                .icon("key")
                .sort_order(1),
        )
        .menu(
            MenuDefinition::new("auth.access.users", "Users")
                .parent("auth.access")
                .permission(USERS_READ)
                .path("/backoffice/users")
                .icon("users")
                .sort_order(2),
        )
}
