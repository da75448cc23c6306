//! Persistence abstraction for the verification and user records.
//!
//! The auth core does not own a storage engine; it talks to a keyed store
//! through the two traits below. [`memory::MemoryStore`] backs tests and
//! local development, [`postgres::PgStore`] is the production adapter.
//!
//! ## Tables (Postgres adapter)
//!
//! - `users` - identity attributes, role, and the set-once `email_verified`
//!   timestamp
//! - `verification_tokens` - live verification credentials keyed by the
//!   normalized email address
//!
//! Migrations live in `crates/auth/migrations/` and are embedded in
//! [`postgres::MIGRATOR`].

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use chrono::{DateTime, Utc};
use thiserror::Error;

use papillon_core::{Email, Role, UserId};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the store is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// A stored verification credential.
///
/// One row shape serves both redemption flows: a link credential stores the
/// opaque secret as-is, a code credential stores the composite
/// `"<code>-<correlation>"`. See `credentials::CredentialShape` for the
/// typed view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationCredential {
    /// Normalized email address the credential was issued for.
    pub identifier: Email,
    /// The stored secret (opaque string or code composite).
    pub secret: String,
    /// Absolute expiry instant.
    pub expires_at: DateTime<Utc>,
}

impl VerificationCredential {
    /// Whether the credential is past its expiry at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// A persisted user record - the source of truth for role and verification
/// state.
#[derive(Debug, Clone)]
pub struct UserRecord {
    /// Unique user ID.
    pub id: UserId,
    /// The user's email address.
    pub email: Email,
    /// Display name, if the user has set one.
    pub name: Option<String>,
    /// Avatar URL, if the user has set one.
    pub image: Option<String>,
    /// The user's durable role.
    pub role: Role,
    /// When the email was verified. Set exactly once, never cleared.
    pub email_verified: Option<DateTime<Utc>>,
}

/// Keyed store for verification credentials.
#[allow(async_fn_in_trait)]
pub trait VerificationStore {
    /// Atomically replace every credential for `credential.identifier` with
    /// `credential`. This is the issuance write: delete-all then insert, in
    /// one step, so sequential issuance leaves at most one live credential
    /// per identifier.
    async fn replace_for_identifier(
        &self,
        credential: VerificationCredential,
    ) -> Result<(), StoreError>;

    /// Look up a credential by exact secret match.
    async fn find_by_secret(
        &self,
        secret: &str,
    ) -> Result<Option<VerificationCredential>, StoreError>;

    /// Load all credentials for an identifier. Usually zero or one, but
    /// callers must tolerate transient duplicates.
    async fn list_for_identifier(
        &self,
        identifier: &Email,
    ) -> Result<Vec<VerificationCredential>, StoreError>;

    /// Delete a credential by its secret. Returns whether a row was deleted.
    async fn delete_by_secret(&self, secret: &str) -> Result<bool, StoreError>;
}

/// Keyed store for user records.
#[allow(async_fn_in_trait)]
pub trait UserStore {
    /// Look up a user by ID.
    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError>;

    /// Look up a user by (normalized) email address.
    async fn find_by_email(&self, email: &Email) -> Result<Option<UserRecord>, StoreError>;

    /// Set `email_verified = at` iff it is currently unset. Returns whether
    /// the write happened, so an already-verified user keeps their original
    /// timestamp.
    async fn mark_email_verified(
        &self,
        email: &Email,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}
