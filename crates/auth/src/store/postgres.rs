//! `PostgreSQL` adapter for the verification and user stores.
//!
//! Queries are runtime-checked (`sqlx::query_as`) because the schema is
//! created by the embedded migrations rather than being available at build
//! time.

use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use papillon_core::{Email, Role, UserId};

use super::{StoreError, UserRecord, UserStore, VerificationCredential, VerificationStore};

/// Embedded migrations for the `users` and `verification_tokens` tables.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for user queries.
#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i32,
    email: String,
    name: Option<String>,
    image: Option<String>,
    role: String,
    email_verified: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email)
            .map_err(|e| StoreError::DataCorruption(format!("invalid email in database: {e}")))?;

        Ok(Self {
            id: UserId::new(row.id),
            email,
            name: row.name,
            image: row.image,
            role: Role::parse(&row.role),
            email_verified: row.email_verified,
        })
    }
}

/// Internal row type for verification credential queries.
#[derive(Debug, sqlx::FromRow)]
struct VerificationRow {
    identifier: String,
    secret: String,
    expires_at: DateTime<Utc>,
}

impl TryFrom<VerificationRow> for VerificationCredential {
    type Error = StoreError;

    fn try_from(row: VerificationRow) -> Result<Self, Self::Error> {
        let identifier = Email::parse(&row.identifier).map_err(|e| {
            StoreError::DataCorruption(format!("invalid identifier in database: {e}"))
        })?;

        Ok(Self {
            identifier,
            secret: row.secret,
            expires_at: row.expires_at,
        })
    }
}

// =============================================================================
// Store
// =============================================================================

/// `PostgreSQL`-backed implementation of [`VerificationStore`] and
/// [`UserStore`].
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl VerificationStore for PgStore {
    async fn replace_for_identifier(
        &self,
        credential: VerificationCredential,
    ) -> Result<(), StoreError> {
        // Delete-then-insert in one transaction so concurrent issuance for
        // the same identifier cannot leave two live credentials behind.
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM verification_tokens WHERE identifier = $1")
            .bind(credential.identifier.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO verification_tokens (identifier, secret, expires_at) \
             VALUES ($1, $2, $3)",
        )
        .bind(credential.identifier.as_str())
        .bind(&credential.secret)
        .bind(credential.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_secret(
        &self,
        secret: &str,
    ) -> Result<Option<VerificationCredential>, StoreError> {
        let row = sqlx::query_as::<_, VerificationRow>(
            "SELECT identifier, secret, expires_at \
             FROM verification_tokens WHERE secret = $1",
        )
        .bind(secret)
        .fetch_optional(&self.pool)
        .await?;

        row.map(VerificationCredential::try_from).transpose()
    }

    async fn list_for_identifier(
        &self,
        identifier: &Email,
    ) -> Result<Vec<VerificationCredential>, StoreError> {
        let rows = sqlx::query_as::<_, VerificationRow>(
            "SELECT identifier, secret, expires_at \
             FROM verification_tokens WHERE identifier = $1",
        )
        .bind(identifier.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(VerificationCredential::try_from)
            .collect()
    }

    async fn delete_by_secret(&self, secret: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM verification_tokens WHERE secret = $1")
            .bind(secret)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl UserStore for PgStore {
    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, name, image, role, email_verified \
             FROM users WHERE id = $1",
        )
        .bind(id.as_i32())
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRecord::try_from).transpose()
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<UserRecord>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, name, image, role, email_verified \
             FROM users WHERE email = $1",
        )
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRecord::try_from).transpose()
    }

    async fn mark_email_verified(
        &self,
        email: &Email,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        // Conditional write keeps the timestamp set-once: a concurrent or
        // repeated redemption leaves the original value untouched.
        let result = sqlx::query(
            "UPDATE users SET email_verified = $2 \
             WHERE email = $1 AND email_verified IS NULL",
        )
        .bind(email.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
