use chrono::{DateTime, Duration, TimeZone, Utc};

use keygate_auth::{
    CredentialStore, MenuDefinition, Permission, Role, Session, SessionManager, StoreError,
    TokenCodec, User,
};
use keygate_core::{AuthError, RoleId, SessionId, UserId};
use keygate_infra::InMemoryCredentialStore;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap()
}

fn codec() -> TokenCodec {
    TokenCodec::new(b"session-secret").unwrap()
}

async fn seeded<S: CredentialStore>(store: &S) -> UserId {
    let user = User {
        id: UserId::new(),
        email: "a@x.com".to_string(),
        password_hash: "$argon2id$stub".to_string(),
        full_name: String::new(),
        created_at: now(),
        updated_at: now(),
        activated_at: None,
        archived_at: None,
    };
    store.create_user(&user).await.unwrap();
    user.id
}

/// In-memory store whose refresh compare-and-swap always loses, as if another
/// refresh of the same token committed first.
#[derive(Default)]
struct RacedStore {
    inner: InMemoryCredentialStore,
}

#[async_trait::async_trait]
impl CredentialStore for RacedStore {
    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        self.inner.get_user_by_email(email).await
    }

    async fn get_user_by_id(&self, user_id: UserId) -> Result<User, StoreError> {
        self.inner.get_user_by_id(user_id).await
    }

    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        self.inner.create_user(user).await
    }

    async fn create_session(
        &self,
        session: &Session,
        max_active: Option<usize>,
    ) -> Result<Vec<SessionId>, StoreError> {
        self.inner.create_session(session, max_active).await
    }

    async fn get_session(&self, session_id: SessionId) -> Result<Session, StoreError> {
        self.inner.get_session(session_id).await
    }

    async fn rotate_session_refresh(
        &self,
        _session_id: SessionId,
        _expected_hash: &str,
        _new_hash: &str,
        _expires_at: DateTime<Utc>,
        _updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(false)
    }

    async fn revoke_session(
        &self,
        session_id: SessionId,
        revoked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.revoke_session(session_id, revoked_at).await
    }

    async fn list_active_sessions(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError> {
        self.inner.list_active_sessions(user_id, now).await
    }

    async fn upsert_permissions(&self, permissions: &[Permission]) -> Result<(), StoreError> {
        self.inner.upsert_permissions(permissions).await
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        self.inner.list_permissions().await
    }

    async fn create_role(&self, name: &str) -> Result<Role, StoreError> {
        self.inner.create_role(name).await
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        self.inner.list_roles().await
    }

    async fn assign_role_to_user(&self, user_id: UserId, role_id: RoleId) -> Result<(), StoreError> {
        self.inner.assign_role_to_user(user_id, role_id).await
    }

    async fn add_permission_to_role(
        &self,
        role_id: RoleId,
        permission_id: &str,
    ) -> Result<(), StoreError> {
        self.inner.add_permission_to_role(role_id, permission_id).await
    }

    async fn get_user_permissions(&self, user_id: UserId) -> Result<Vec<String>, StoreError> {
        self.inner.get_user_permissions(user_id).await
    }

    async fn upsert_menu_definitions(&self, definitions: &[MenuDefinition]) -> Result<(), StoreError> {
        self.inner.upsert_menu_definitions(definitions).await
    }

    async fn list_menu_definitions(&self) -> Result<Vec<MenuDefinition>, StoreError> {
        self.inner.list_menu_definitions().await
    }
}

#[tokio::test]
async fn refresh_that_loses_the_swap_is_unauthorized() {
    let store = RacedStore::default();
    let user_id = seeded(&store).await;
    let sessions = SessionManager::new(store, codec(), Duration::minutes(15), Duration::days(7));

    let tokens = sessions.start(user_id, now()).await.unwrap();

    assert_eq!(
        sessions.rotate(&tokens.refresh_token, now() + Duration::minutes(1)).await,
        Err(AuthError::Unauthorized)
    );
}

#[tokio::test]
async fn unrepresentable_expiry_is_internal_error_not_panic() {
    let store = InMemoryCredentialStore::new();
    let user_id = seeded(&store).await;
    let sessions = SessionManager::new(
        store,
        codec(),
        Duration::minutes(15),
        Duration::seconds(10_000_000_000_000),
    );

    assert!(matches!(
        sessions.start(user_id, now()).await,
        Err(AuthError::Internal(_))
    ));
}

#[tokio::test]
async fn session_cap_is_applied_by_the_store() {
    let store = std::sync::Arc::new(InMemoryCredentialStore::new());
    let user_id = seeded(&store).await;
    let sessions = SessionManager::new(store.clone(), codec(), Duration::minutes(15), Duration::days(7))
        .with_max_sessions_per_user(Some(2));

    for i in 0..4 {
        sessions.start(user_id, now() + Duration::seconds(i)).await.unwrap();
    }

    let active = store
        .list_active_sessions(user_id, now() + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(active.len(), 2);
    assert_eq!(active[0].created_at, now() + Duration::seconds(2));
}
