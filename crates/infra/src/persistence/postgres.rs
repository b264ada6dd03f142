//! Postgres-backed user store.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `PersistenceError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | PersistenceError | Scenario |
//! |------------|----------------------|------------------|----------|
//! | Database (unique violation) on `users_email_key` | `23505` | `Conflict(Email)` | Email taken between availability check and write |
//! | Database (unique violation) on `users_username_key` | `23505` | `Conflict(Username)` | Username taken between availability check and write |
//! | Database (other) | Any other | `Storage` | Other database errors |
//! | RowNotFound | N/A | `NotFound` | Target row does not exist |
//! | PoolClosed / Other | N/A | `Storage` | Network errors, connection failures, etc. |
//!
//! ## Thread Safety
//!
//! `PostgresUserPersistence` is `Send + Sync` and can be shared across tasks.
//! All operations go through the SQLx connection pool.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use userhub_core::UserId;
use userhub_users::{PersistenceError, UniqueField, User, UserPersistence};

/// DDL for the `users` table. Idempotent.
pub const SCHEMA: &str = include_str!("../../migrations/0001_users.sql");

const EMAIL_CONSTRAINT: &str = "users_email_key";
const USERNAME_CONSTRAINT: &str = "users_username_key";

/// Postgres-backed user store.
///
/// Uniqueness of `email` and `username` is enforced by named constraints; a
/// violation is reported as [`PersistenceError::Conflict`] for the matching
/// field.
#[derive(Debug, Clone)]
pub struct PostgresUserPersistence {
    pool: Arc<PgPool>,
}

impl PostgresUserPersistence {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect a fresh pool to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, PersistenceError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `users` table and its constraints if missing.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait]
impl UserPersistence for PostgresUserPersistence {
    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn get(&self, id: UserId) -> Result<User, PersistenceError> {
        let row = sqlx::query(
            r#"
            SELECT id, email, username, created, modified
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get", e))?
        .ok_or(PersistenceError::NotFound)?;

        user_from_row(&row)
    }

    #[instrument(skip(self), err)]
    async fn get_all(&self) -> Result<Vec<User>, PersistenceError> {
        let rows = sqlx::query(
            r#"
            SELECT id, email, username, created, modified
            FROM users
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_all", e))?;

        rows.iter().map(user_from_row).collect()
    }

    #[instrument(skip(self, email, username), err)]
    async fn create(&self, email: &str, username: Option<&str>) -> Result<User, PersistenceError> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (email, username)
            VALUES ($1, $2)
            RETURNING id, email, username, created, modified
            "#,
        )
        .bind(email)
        .bind(username)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create", e))?;

        user_from_row(&row)
    }

    /// Writes `email` and `username` only; `modified` is bumped by at least
    /// one microsecond even if the clock has not moved.
    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn update(&self, user: &User) -> Result<User, PersistenceError> {
        let row = sqlx::query(
            r#"
            UPDATE users
            SET email = $2,
                username = $3,
                modified = GREATEST(NOW(), modified + INTERVAL '1 microsecond')
            WHERE id = $1
            RETURNING id, email, username, created, modified
            "#,
        )
        .bind(user.id.get())
        .bind(&user.email)
        .bind(user.username.as_deref())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update", e))?
        .ok_or(PersistenceError::NotFound)?;

        user_from_row(&row)
    }

    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn remove(&self, user: &User) -> Result<UserId, PersistenceError> {
        let removed: i64 = sqlx::query_scalar("DELETE FROM users WHERE id = $1 RETURNING id")
            .bind(user.id.get())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("remove", e))?
            .ok_or(PersistenceError::NotFound)?;

        UserId::new(removed).map_err(|e| PersistenceError::Storage(e.to_string()))
    }

    #[instrument(skip(self, email), err)]
    async fn email_available(&self, email: &str) -> Result<bool, PersistenceError> {
        sqlx::query_scalar("SELECT NOT EXISTS (SELECT 1 FROM users WHERE email = $1)")
            .bind(email)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("email_available", e))
    }

    #[instrument(skip(self, username), err)]
    async fn username_available(&self, username: &str) -> Result<bool, PersistenceError> {
        sqlx::query_scalar("SELECT NOT EXISTS (SELECT 1 FROM users WHERE username = $1)")
            .bind(username)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("username_available", e))
    }

    #[instrument(skip(self), err)]
    async fn ping(&self) -> Result<(), PersistenceError> {
        sqlx::query("SELECT 1")
            .execute(&*self.pool)
            .await
            .map(|_| ())
            .map_err(|e| map_sqlx_error("ping", e))
    }
}

/// Map SQLx errors to `PersistenceError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> PersistenceError {
    match err {
        sqlx::Error::Database(db_err) => {
            if db_err.code().as_deref() == Some("23505") {
                if let Some(field) = db_err.constraint().and_then(constraint_field) {
                    return PersistenceError::Conflict(field);
                }
            }
            PersistenceError::Storage(format!(
                "database error in {}: {}",
                operation,
                db_err.message()
            ))
        }
        sqlx::Error::RowNotFound => PersistenceError::NotFound,
        sqlx::Error::PoolClosed => {
            PersistenceError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => PersistenceError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

fn constraint_field(constraint: &str) -> Option<UniqueField> {
    match constraint {
        EMAIL_CONSTRAINT => Some(UniqueField::Email),
        USERNAME_CONSTRAINT => Some(UniqueField::Username),
        _ => None,
    }
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> Result<User, PersistenceError> {
    UserRow::from_row(row)
        .map_err(|e| PersistenceError::Storage(format!("failed to deserialize user row: {}", e)))?
        .try_into()
}

// SQLx row types

#[derive(Debug)]
struct UserRow {
    id: i64,
    email: String,
    username: Option<String>,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for UserRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(UserRow {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            username: row.try_get("username")?,
            created: row.try_get("created")?,
            modified: row.try_get("modified")?,
        })
    }
}

impl TryFrom<UserRow> for User {
    type Error = PersistenceError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: UserId::new(row.id).map_err(|e| PersistenceError::Storage(e.to_string()))?,
            email: row.email,
            username: row.username,
            created: row.created,
            modified: row.modified,
        })
    }
}
