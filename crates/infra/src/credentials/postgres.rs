//! Postgres-backed credential store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `NotFound` |
//! | Database (other) | Any other | `Backend` |
//! | RowNotFound | N/A | `NotFound` |
//! | Other | N/A | `Backend` |
//!
//! Multi-row writes (session cap + insert, permission and menu upserts) run in
//! one transaction, so dropping the future mid-call rolls everything back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{FromRow, Row};
use tracing::instrument;
use uuid::Uuid;

use keygate_auth::{
    CredentialStore, MenuDefinition, Permission, Role, Session, StoreError, User, sessions_to_evict,
};
use keygate_core::{RoleId, SessionId, UserId};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Clone)]
pub struct PostgresCredentialStore {
    pool: Arc<PgPool>,
}

impl PostgresCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Connect with a small pool.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply embedded migrations.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        MIGRATOR
            .run(&*self.pool)
            .await
            .map_err(|e| StoreError::backend(format!("migration failed: {e}")))
    }
}

#[async_trait::async_trait]
impl CredentialStore for PostgresCredentialStore {
    #[instrument(skip(self), err)]
    async fn get_user_by_email(&self, email: &str) -> Result<User, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, email, password_hash, full_name, created_at, updated_at, activated_at, archived_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_user_by_email", e))?
        .ok_or(StoreError::NotFound)?;

        UserRow::from_row(&row)
            .map(Into::into)
            .map_err(|e| map_sqlx_error("get_user_by_email", e))
    }

    #[instrument(skip(self), err)]
    async fn get_user_by_id(&self, user_id: UserId) -> Result<User, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, email, password_hash, full_name, created_at, updated_at, activated_at, archived_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_user_by_id", e))?
        .ok_or(StoreError::NotFound)?;

        UserRow::from_row(&row)
            .map(Into::into)
            .map_err(|e| map_sqlx_error("get_user_by_id", e))
    }

    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn create_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, full_name, created_at, updated_at, activated_at, archived_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(user.id.as_uuid())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(user.created_at)
        .bind(user.updated_at)
        .bind(user.activated_at)
        .bind(user.archived_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_user", e))?;
        Ok(())
    }

    #[instrument(skip(self, session), fields(session_id = %session.id, user_id = %session.user_id), err)]
    async fn create_session(
        &self,
        session: &Session,
        max_active: Option<usize>,
    ) -> Result<Vec<SessionId>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("create_session", e))?;

        // Serialize session creation per user; concurrent logins queue here.
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(session.user_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("create_session", e))?
            .ok_or(StoreError::NotFound)?;

        let evicted = match max_active {
            Some(max) => {
                let rows = sqlx::query(
                    r#"
                    SELECT id, user_id, refresh_token_hash, expires_at, created_at, updated_at, revoked_at
                    FROM sessions
                    WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > $2
                    ORDER BY created_at ASC, id ASC
                    "#,
                )
                .bind(session.user_id.as_uuid())
                .bind(session.created_at)
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("create_session", e))?;

                let active = rows
                    .iter()
                    .map(|row| SessionRow::from_row(row).map(Session::from))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| map_sqlx_error("create_session", e))?;
                sessions_to_evict(&active, max)
            }
            None => Vec::new(),
        };

        if !evicted.is_empty() {
            let ids: Vec<Uuid> = evicted.iter().map(|id| *id.as_uuid()).collect();
            sqlx::query(
                r#"
                UPDATE sessions
                SET revoked_at = $2, updated_at = $2
                WHERE id = ANY($1) AND revoked_at IS NULL
                "#,
            )
            .bind(&ids)
            .bind(session.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("create_session", e))?;
        }

        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, refresh_token_hash, expires_at, created_at, updated_at, revoked_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(session.id.as_uuid())
        .bind(session.user_id.as_uuid())
        .bind(&session.refresh_token_hash)
        .bind(session.expires_at)
        .bind(session.created_at)
        .bind(session.updated_at)
        .bind(session.revoked_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_session", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("create_session", e))?;
        Ok(evicted)
    }

    #[instrument(skip(self), err)]
    async fn get_session(&self, session_id: SessionId) -> Result<Session, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, refresh_token_hash, expires_at, created_at, updated_at, revoked_at
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(session_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_session", e))?
        .ok_or(StoreError::NotFound)?;

        SessionRow::from_row(&row)
            .map(Into::into)
            .map_err(|e| map_sqlx_error("get_session", e))
    }

    #[instrument(skip(self, expected_hash, new_hash), err)]
    async fn rotate_session_refresh(
        &self,
        session_id: SessionId,
        expected_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET refresh_token_hash = $3, expires_at = $4, updated_at = $5
            WHERE id = $1 AND refresh_token_hash = $2 AND revoked_at IS NULL
            "#,
        )
        .bind(session_id.as_uuid())
        .bind(expected_hash)
        .bind(new_hash)
        .bind(expires_at)
        .bind(updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("rotate_session_refresh", e))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), err)]
    async fn revoke_session(
        &self,
        session_id: SessionId,
        revoked_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET revoked_at = COALESCE(revoked_at, $2), updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(session_id.as_uuid())
        .bind(revoked_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("revoke_session", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list_active_sessions(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, refresh_token_hash, expires_at, created_at, updated_at, revoked_at
            FROM sessions
            WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > $2
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(now)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_active_sessions", e))?;

        rows.iter()
            .map(|row| SessionRow::from_row(row).map(Session::from))
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("list_active_sessions", e))
    }

    #[instrument(skip(self, permissions), fields(count = permissions.len()), err)]
    async fn upsert_permissions(&self, permissions: &[Permission]) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("upsert_permissions", e))?;

        for permission in permissions {
            sqlx::query(
                r#"
                INSERT INTO permissions (id, module, description, created_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (id) DO UPDATE
                SET module = EXCLUDED.module, description = EXCLUDED.description
                "#,
            )
            .bind(&permission.id)
            .bind(&permission.module)
            .bind(&permission.description)
            .bind(permission.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("upsert_permissions", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("upsert_permissions", e))
    }

    #[instrument(skip(self), err)]
    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, module, description, created_at
            FROM permissions
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_permissions", e))?;

        rows.iter()
            .map(|row| -> Result<Permission, sqlx::Error> {
                Ok(Permission {
                    id: row.try_get("id")?,
                    module: row.try_get("module")?,
                    description: row.try_get("description")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("list_permissions", e))
    }

    #[instrument(skip(self), err)]
    async fn create_role(&self, name: &str) -> Result<Role, StoreError> {
        let row = sqlx::query("INSERT INTO roles (name) VALUES ($1) RETURNING id, name")
            .bind(name)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("create_role", e))?;

        role_from_row(&row).map_err(|e| map_sqlx_error("create_role", e))
    }

    #[instrument(skip(self), err)]
    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        let rows = sqlx::query("SELECT id, name FROM roles ORDER BY id ASC")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_roles", e))?;

        rows.iter()
            .map(role_from_row)
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("list_roles", e))
    }

    #[instrument(skip(self), err)]
    async fn assign_role_to_user(&self, user_id: UserId, role_id: RoleId) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(role_id.get())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("assign_role_to_user", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn add_permission_to_role(
        &self,
        role_id: RoleId,
        permission_id: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(role_id.get())
        .bind(permission_id)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("add_permission_to_role", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn get_user_permissions(&self, user_id: UserId) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT rp.permission_id
            FROM user_roles ur
            JOIN role_permissions rp ON rp.role_id = ur.role_id
            WHERE ur.user_id = $1
            ORDER BY rp.permission_id ASC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_user_permissions", e))?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("permission_id"))
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("get_user_permissions", e))
    }

    #[instrument(skip(self, definitions), fields(count = definitions.len()), err)]
    async fn upsert_menu_definitions(&self, definitions: &[MenuDefinition]) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("upsert_menu_definitions", e))?;

        for def in definitions {
            sqlx::query(
                r#"
                INSERT INTO menu_definitions (id, parent_id, domain, permission, label, path, icon, sort_order)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (id) DO UPDATE
                SET parent_id = EXCLUDED.parent_id,
                    domain = EXCLUDED.domain,
                    permission = EXCLUDED.permission,
                    label = EXCLUDED.label,
                    path = EXCLUDED.path,
                    icon = EXCLUDED.icon,
                    sort_order = EXCLUDED.sort_order
                "#,
            )
            .bind(&def.id)
            .bind(&def.parent_id)
            .bind(&def.domain)
            .bind(&def.permission)
            .bind(&def.label)
            .bind(&def.path)
            .bind(&def.icon)
            .bind(def.sort_order)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("upsert_menu_definitions", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("upsert_menu_definitions", e))
    }

    #[instrument(skip(self), err)]
    async fn list_menu_definitions(&self) -> Result<Vec<MenuDefinition>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, parent_id, domain, permission, label, path, icon, sort_order
            FROM menu_definitions
            ORDER BY sort_order ASC, seq ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_menu_definitions", e))?;

        rows.iter()
            .map(|row| -> Result<MenuDefinition, sqlx::Error> {
                Ok(MenuDefinition {
                    id: row.try_get("id")?,
                    parent_id: row.try_get("parent_id")?,
                    domain: row.try_get("domain")?,
                    permission: row.try_get("permission")?,
                    label: row.try_get("label")?,
                    path: row.try_get("path")?,
                    icon: row.try_get("icon")?,
                    sort_order: row.try_get("sort_order")?,
                })
            })
            .collect::<Result<_, _>>()
            .map_err(|e| map_sqlx_error("list_menu_definitions", e))
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Conflict(msg),
                Some("23503") => StoreError::NotFound,
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::PoolClosed => {
            StoreError::backend(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn role_from_row(row: &PgRow) -> Result<Role, sqlx::Error> {
    let id: i32 = row.try_get("id")?;
    let name: String = row.try_get("name")?;
    Ok(Role::new(RoleId::new(id), name))
}

struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    full_name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    activated_at: Option<DateTime<Utc>>,
    archived_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for UserRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(UserRow {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            full_name: row.try_get("full_name")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            activated_at: row.try_get("activated_at")?,
            archived_at: row.try_get("archived_at")?,
        })
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId::from_uuid(row.id),
            email: row.email,
            password_hash: row.password_hash,
            full_name: row.full_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
            activated_at: row.activated_at,
            archived_at: row.archived_at,
        }
    }
}

struct SessionRow {
    id: Uuid,
    user_id: Uuid,
    refresh_token_hash: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    revoked_at: Option<DateTime<Utc>>,
}

impl<'r> FromRow<'r, PgRow> for SessionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(SessionRow {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            refresh_token_hash: row.try_get("refresh_token_hash")?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            revoked_at: row.try_get("revoked_at")?,
        })
    }
}

impl From<SessionRow> for Session {
    fn from(row: SessionRow) -> Self {
        Session {
            id: SessionId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            refresh_token_hash: row.refresh_token_hash,
            expires_at: row.expires_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            revoked_at: row.revoked_at,
        }
    }
}
