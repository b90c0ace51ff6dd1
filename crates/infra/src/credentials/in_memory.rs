use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use keygate_auth::{
    CredentialStore, MenuDefinition, Permission, Role, Session, StoreError, User, sessions_to_evict,
};
use keygate_core::{RoleId, SessionId, UserId};

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, User>,
    users_by_email: HashMap<String, UserId>,
    sessions: HashMap<SessionId, Session>,
    permissions: BTreeMap<String, Permission>,
    roles: BTreeMap<RoleId, Role>,
    last_role_id: i32,
    role_permissions: HashMap<RoleId, BTreeSet<String>>,
    user_roles: HashMap<UserId, BTreeSet<RoleId>>,
    /// Registration order; upserts replace in place.
    menus: Vec<MenuDefinition>,
}

/// In-memory credential store.
///
/// Intended for tests/dev. All state sits behind one lock so that every call,
/// including multi-row writes, is atomic.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    state: RwLock<State>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::backend("lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::backend("lock poisoned"))
    }
}

#[async_trait::async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let state = self.read()?;
        state
            .users_by_email
            .get(email)
            .and_then(|id| state.users.get(id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_user_by_id(&self, user_id: UserId) -> Result<User, StoreError> {
        self.read()?
            .users
            .get(&user_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.users.contains_key(&user.id) {
            return Err(StoreError::conflict(format!("user id {} already exists", user.id)));
        }
        if state.users_by_email.contains_key(&user.email) {
            return Err(StoreError::conflict("email already registered"));
        }
        state.users_by_email.insert(user.email.clone(), user.id);
        state.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn create_session(
        &self,
        session: &Session,
        max_active: Option<usize>,
    ) -> Result<Vec<SessionId>, StoreError> {
        let mut state = self.write()?;
        if !state.users.contains_key(&session.user_id) {
            return Err(StoreError::NotFound);
        }
        if state.sessions.contains_key(&session.id) {
            return Err(StoreError::conflict(format!("session {} already exists", session.id)));
        }

        let evicted = match max_active {
            Some(max) => {
                let active = active_sessions(&state, session.user_id, session.created_at);
                sessions_to_evict(&active, max)
            }
            None => Vec::new(),
        };
        for id in &evicted {
            if let Some(old) = state.sessions.get_mut(id) {
                old.revoked_at = Some(session.created_at);
                old.updated_at = session.created_at;
            }
        }
        state.sessions.insert(session.id, session.clone());
        Ok(evicted)
    }

    async fn get_session(&self, session_id: SessionId) -> Result<Session, StoreError> {
        self.read()?
            .sessions
            .get(&session_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn rotate_session_refresh(
        &self,
        session_id: SessionId,
        expected_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        let session = state.sessions.get_mut(&session_id).ok_or(StoreError::NotFound)?;
        if session.revoked_at.is_some() || session.refresh_token_hash != expected_hash {
            return Ok(false);
        }
        session.refresh_token_hash = new_hash.to_string();
        session.expires_at = expires_at;
        session.updated_at = updated_at;
        Ok(true)
    }

    async fn revoke_session(
        &self,
        session_id: SessionId,
        revoked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let session = state.sessions.get_mut(&session_id).ok_or(StoreError::NotFound)?;
        if session.revoked_at.is_none() {
            session.revoked_at = Some(revoked_at);
            session.updated_at = revoked_at;
        }
        Ok(())
    }

    async fn list_active_sessions(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError> {
        Ok(active_sessions(&*self.read()?, user_id, now))
    }

    async fn upsert_permissions(&self, permissions: &[Permission]) -> Result<(), StoreError> {
        let mut state = self.write()?;
        for permission in permissions {
            state
                .permissions
                .entry(permission.id.clone())
                .and_modify(|existing| {
                    existing.module = permission.module.clone();
                    existing.description = permission.description.clone();
                })
                .or_insert_with(|| permission.clone());
        }
        Ok(())
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        Ok(self.read()?.permissions.values().cloned().collect())
    }

    async fn create_role(&self, name: &str) -> Result<Role, StoreError> {
        let mut state = self.write()?;
        if state.roles.values().any(|r| r.name == name) {
            return Err(StoreError::conflict(format!("role '{name}' already exists")));
        }
        state.last_role_id += 1;
        let role = Role::new(RoleId::new(state.last_role_id), name);
        state.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        Ok(self.read()?.roles.values().cloned().collect())
    }

    async fn assign_role_to_user(&self, user_id: UserId, role_id: RoleId) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.users.contains_key(&user_id) || !state.roles.contains_key(&role_id) {
            return Err(StoreError::NotFound);
        }
        state.user_roles.entry(user_id).or_default().insert(role_id);
        Ok(())
    }

    async fn add_permission_to_role(
        &self,
        role_id: RoleId,
        permission_id: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.roles.contains_key(&role_id) || !state.permissions.contains_key(permission_id) {
            return Err(StoreError::NotFound);
        }
        state
            .role_permissions
            .entry(role_id)
            .or_default()
            .insert(permission_id.to_string());
        Ok(())
    }

    async fn get_user_permissions(&self, user_id: UserId) -> Result<Vec<String>, StoreError> {
        let state = self.read()?;
        let mut permissions = BTreeSet::new();
        for role_id in state.user_roles.get(&user_id).into_iter().flatten() {
            if let Some(granted) = state.role_permissions.get(role_id) {
                permissions.extend(granted.iter().cloned());
            }
        }
        Ok(permissions.into_iter().collect())
    }

    async fn upsert_menu_definitions(&self, definitions: &[MenuDefinition]) -> Result<(), StoreError> {
        let mut state = self.write()?;
        for def in definitions {
            match state.menus.iter().position(|m| m.id == def.id) {
                Some(idx) => state.menus[idx] = def.clone(),
                None => state.menus.push(def.clone()),
            }
        }
        Ok(())
    }

    async fn list_menu_definitions(&self) -> Result<Vec<MenuDefinition>, StoreError> {
        let mut menus = self.read()?.menus.clone();
        menus.sort_by_key(|m| m.sort_order);
        Ok(menus)
    }
}

/// Active sessions of a user, oldest first.
fn active_sessions(state: &State, user_id: UserId, now: DateTime<Utc>) -> Vec<Session> {
    let mut sessions: Vec<Session> = state
        .sessions
        .values()
        .filter(|s| s.user_id == user_id && s.is_active(now))
        .cloned()
        .collect();
    sessions.sort_by_key(|s| (s.created_at, s.id));
    sessions
}
