//! In-memory store used by tests and local development.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

use papillon_core::{Email, UserId};

use super::{StoreError, UserRecord, UserStore, VerificationCredential, VerificationStore};

#[derive(Debug, Default)]
struct Inner {
    credentials: Vec<VerificationCredential>,
    users: HashMap<UserId, UserRecord>,
}

/// In-memory implementation of [`VerificationStore`] and [`UserStore`].
///
/// Operations hold one mutex across the whole call, which gives this store
/// stronger atomicity than the trait contracts require. Tests that probe
/// the issuance invariant exercise sequential behavior, which is all the
/// contracts guarantee.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user record.
    pub fn insert_user(&self, user: UserRecord) {
        self.lock().users.insert(user.id, user);
    }

    /// Snapshot of a user record, if present.
    #[must_use]
    pub fn user(&self, id: UserId) -> Option<UserRecord> {
        self.lock().users.get(&id).cloned()
    }

    /// Number of live credentials stored for an identifier.
    #[must_use]
    pub fn credential_count(&self, identifier: &Email) -> usize {
        self.lock()
            .credentials
            .iter()
            .filter(|c| &c.identifier == identifier)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means another test thread panicked; the data
        // is still consistent for our single-step operations.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl VerificationStore for MemoryStore {
    async fn replace_for_identifier(
        &self,
        credential: VerificationCredential,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner
            .credentials
            .retain(|c| c.identifier != credential.identifier);
        inner.credentials.push(credential);
        Ok(())
    }

    async fn find_by_secret(
        &self,
        secret: &str,
    ) -> Result<Option<VerificationCredential>, StoreError> {
        Ok(self
            .lock()
            .credentials
            .iter()
            .find(|c| c.secret == secret)
            .cloned())
    }

    async fn list_for_identifier(
        &self,
        identifier: &Email,
    ) -> Result<Vec<VerificationCredential>, StoreError> {
        Ok(self
            .lock()
            .credentials
            .iter()
            .filter(|c| &c.identifier == identifier)
            .cloned()
            .collect())
    }

    async fn delete_by_secret(&self, secret: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        let before = inner.credentials.len();
        inner.credentials.retain(|c| c.secret != secret);
        Ok(inner.credentials.len() < before)
    }
}

impl UserStore for MemoryStore {
    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.lock().users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<UserRecord>, StoreError> {
        Ok(self
            .lock()
            .users
            .values()
            .find(|u| &u.email == email)
            .cloned())
    }

    async fn mark_email_verified(
        &self,
        email: &Email,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        match inner
            .users
            .values_mut()
            .find(|u| &u.email == email && u.email_verified.is_none())
        {
            Some(user) => {
                user.email_verified = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
