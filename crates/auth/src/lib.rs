//! `keygate-auth` — credential and session core.
//!
//! Token codec, password hashing, session rotation, RBAC and the menu builder,
//! all on top of the [`CredentialStore`] contract. No HTTP and no concrete
//! storage live here.

pub mod authorize;
pub mod claims;
pub mod codec;
pub mod config;
pub mod menu;
pub mod module;
pub mod password;
pub mod permissions;
pub mod rbac;
pub mod registration;
pub mod roles;
pub mod service;
pub mod session;
pub mod store;
pub mod user;

pub use authorize::{PermissionSet, authorize};
pub use claims::{TokenClaims, TokenError, TokenKind, validate_claims};
pub use codec::{TokenCodec, TokenVerifier};
pub use config::{AuthConfig, ConfigError, PasswordHashCost, ttl_from_secs};
pub use menu::{MenuDefinition, MenuNode, build_menu_tree};
pub use module::{ModuleManifest, auth_manifest};
pub use password::PasswordHasher;
pub use permissions::{Permission, WILDCARD};
pub use rbac::RbacEngine;
pub use registration::{RegisterMenus, RegisterPermissions, Registration};
pub use roles::Role;
pub use service::AuthService;
pub use session::{AuthTokens, Session, SessionManager, compare_hash, hash_token, sessions_to_evict};
pub use store::{CredentialStore, StoreError};
pub use user::{NewUser, User, normalize_email};
