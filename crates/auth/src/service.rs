//! Authentication service: the operations exposed to transports.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use keygate_core::{AuthError, AuthResult, Clock, RoleId, SystemClock, UserId};
use keygate_events::{Event, EventBus, EventEnvelope, UserRegistered};

use crate::authorize::PermissionSet;
use crate::claims::TokenClaims;
use crate::codec::TokenCodec;
use crate::config::{AuthConfig, ConfigError};
use crate::menu::{MenuDefinition, MenuNode};
use crate::module::ModuleManifest;
use crate::password::PasswordHasher;
use crate::permissions::Permission;
use crate::rbac::RbacEngine;
use crate::registration::Registration;
use crate::roles::Role;
use crate::session::{AuthTokens, SessionManager};
use crate::store::{CredentialStore, StoreError};
use crate::user::{NewUser, User, normalize_email};

/// Login, registration, token refresh and RBAC entry points.
///
/// Holds no per-user state; everything goes through the store.
pub struct AuthService<S, B> {
    store: S,
    sessions: SessionManager<S>,
    rbac: RbacEngine<S>,
    hasher: PasswordHasher,
    bus: B,
    clock: Arc<dyn Clock>,
}

impl<S, B> AuthService<S, B>
where
    S: CredentialStore + Clone,
    B: EventBus<EventEnvelope>,
{
    pub fn new(config: &AuthConfig, store: S, bus: B) -> Result<Self, ConfigError> {
        config.validate()?;

        let codec = TokenCodec::new(&config.token_secret).map_err(|_| ConfigError::EmptySecret)?;
        let hasher = PasswordHasher::new(config.password_hash_cost)
            .map_err(|e| ConfigError::InvalidHashCost(e.to_string()))?;
        let sessions = SessionManager::new(store.clone(), codec, config.access_ttl, config.refresh_ttl)
            .with_max_sessions_per_user(config.max_sessions_per_user);

        Ok(Self {
            rbac: RbacEngine::new(store.clone()),
            store,
            sessions,
            hasher,
            bus,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn codec(&self) -> &TokenCodec {
        self.sessions.codec()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    #[instrument(skip(self, password), err)]
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<AuthTokens> {
        let email = normalize_email(email);
        let user = match self.store.get_user_by_email(&email).await {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                self.hasher.verify_dummy(password);
                debug!("login rejected: unknown email");
                return Err(AuthError::Unauthorized);
            }
            Err(e) => return Err(e.into_auth_error()),
        };

        if !self.hasher.verify(password, &user.password_hash) {
            debug!(user_id = %user.id, "login rejected: wrong password");
            return Err(AuthError::Unauthorized);
        }
        if user.archived_at.is_some() {
            debug!(user_id = %user.id, "login rejected: archived account");
            return Err(AuthError::Unauthorized);
        }

        let tokens = self.sessions.start(user.id, self.clock.now()).await?;
        info!(user_id = %user.id, "user logged in");
        Ok(tokens)
    }

    pub async fn refresh_tokens(&self, refresh_token: &str) -> AuthResult<AuthTokens> {
        self.sessions.rotate(refresh_token, self.clock.now()).await
    }

    #[instrument(skip(self, new_user), err)]
    pub async fn register(&self, new_user: NewUser) -> AuthResult<User> {
        let email = new_user.validate()?;
        let password_hash = self.hasher.hash(&new_user.password)?;
        let now = self.clock.now();

        let user = User {
            id: new_user.id.unwrap_or_default(),
            email,
            password_hash,
            full_name: new_user.full_name.trim().to_string(),
            created_at: now,
            updated_at: now,
            activated_at: None,
            archived_at: None,
        };
        self.store.create_user(&user).await.map_err(|e| match e {
            StoreError::Conflict(_) => AuthError::already_exists("user already exists"),
            other => other.into_auth_error(),
        })?;
        info!(user_id = %user.id, "user registered");

        self.publish(&UserRegistered {
            user_id: user.id,
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            occurred_at: now,
        });
        Ok(user)
    }

    pub async fn get_me(&self, user_id: UserId) -> AuthResult<User> {
        self.store
            .get_user_by_id(user_id)
            .await
            .map_err(StoreError::into_auth_error)
    }

    /// End the session the claims belong to.
    #[instrument(skip_all, fields(session_id = %claims.session_id), err)]
    pub async fn logout(&self, claims: &TokenClaims) -> AuthResult<()> {
        self.sessions
            .revoke(claims.session_id, claims.user_id, self.clock.now())
            .await
    }

    pub async fn register_module_permissions(
        &self,
        module: &str,
        ids: &[String],
    ) -> AuthResult<Vec<Permission>> {
        self.rbac
            .register_module_permissions(module, ids, self.clock.now())
            .await
    }

    pub async fn register_module_menus(
        &self,
        domain: &str,
        definitions: Vec<MenuDefinition>,
    ) -> AuthResult<Vec<MenuDefinition>> {
        self.rbac.register_module_menus(domain, definitions).await
    }

    /// Register a module's permissions and menus directly.
    ///
    /// Used for the auth module itself at startup; other modules register over
    /// the bus (see [`AuthService::apply_registrations`]).
    #[instrument(skip_all, fields(module = %manifest.name), err)]
    pub async fn register_module(&self, manifest: ModuleManifest) -> AuthResult<()> {
        self.register_module_permissions(&manifest.name, &manifest.permissions)
            .await?;
        self.register_module_menus(&manifest.name, manifest.menus)
            .await?;
        Ok(())
    }

    /// Apply one `system.*.register` envelope.
    ///
    /// Returns `false` when the envelope carries some other subject.
    pub async fn handle_registration(&self, envelope: &EventEnvelope) -> AuthResult<bool> {
        match Registration::decode(envelope)? {
            Some(Registration::Permissions(msg)) => {
                self.register_module_permissions(&msg.module, &msg.permissions)
                    .await?;
            }
            Some(Registration::Menus(msg)) => {
                debug!(domain = %msg.domain, version = msg.version, "menu registration received");
                self.register_module_menus(&msg.domain, msg.menu).await?;
            }
            None => return Ok(false),
        }
        Ok(true)
    }

    /// Apply a batch of registration envelopes, logging the ones that fail.
    ///
    /// Returns how many were applied.
    pub async fn apply_registrations(&self, envelopes: Vec<EventEnvelope>) -> usize {
        let mut applied = 0;
        for envelope in envelopes {
            match self.handle_registration(&envelope).await {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(e) => warn!(
                    subject = envelope.subject(),
                    event_id = %envelope.event_id(),
                    error = %e,
                    "module registration from bus failed"
                ),
            }
        }
        applied
    }

    pub async fn create_role(&self, name: &str) -> AuthResult<Role> {
        self.rbac.create_role(name).await
    }

    pub async fn get_roles(&self) -> AuthResult<Vec<Role>> {
        self.rbac.list_roles().await
    }

    pub async fn list_permissions(&self) -> AuthResult<Vec<Permission>> {
        self.rbac.list_permissions().await
    }

    pub async fn assign_role(&self, user_id: UserId, role_id: RoleId) -> AuthResult<()> {
        self.rbac.assign_role(user_id, role_id).await
    }

    pub async fn add_permission_to_role(&self, role_id: RoleId, permission_id: &str) -> AuthResult<()> {
        self.rbac.add_permission_to_role(role_id, permission_id).await
    }

    pub async fn user_permissions(&self, user_id: UserId) -> AuthResult<PermissionSet> {
        self.rbac.user_permissions(user_id).await
    }

    pub async fn authorize(&self, user_id: UserId, required: &str) -> AuthResult<()> {
        self.rbac.authorize_user(user_id, required).await
    }

    pub async fn get_my_menu(&self, user_id: UserId) -> AuthResult<Vec<MenuNode>> {
        self.rbac.my_menu(user_id).await
    }

    fn publish<E>(&self, event: &E)
    where
        E: Event + Serialize,
    {
        let envelope = match EventEnvelope::from_event(event) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(subject = event.subject(), error = %e, "failed to encode event");
                return;
            }
        };
        if let Err(e) = self.bus.publish(envelope) {
            warn!(subject = event.subject(), error = ?e, "failed to publish event");
        }
    }
}
