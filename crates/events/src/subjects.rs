//! Subject catalogue shared with the rest of the backend.

/// Published by the auth module after an account is created.
pub const AUTH_USER_REGISTERED: &str = "auth.user.registered";

/// Consumed by the auth module: another module registering its permissions.
pub const SYSTEM_PERMISSIONS_REGISTER: &str = "system.permissions.register";
/// Consumed by the auth module: another module registering its menu entries.
pub const SYSTEM_MENUS_REGISTER: &str = "system.menus.register";
