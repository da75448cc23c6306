//! Integration tests for Papillon.
//!
//! The scenarios in `tests/` run the auth services end to end against the
//! in-memory store, so they need no running database or SMTP relay.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p papillon-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `verification_flow` - credential issuance, delivery, and redemption
//! - `session_claims` - claims resolution and role defaulting

use papillon_auth::store::{MemoryStore, UserRecord};
use papillon_core::{Email, Role, UserId};

/// Build a store seeded with one unverified user.
///
/// # Panics
///
/// Panics if `email` is not a valid address; tests pass literals.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn store_with_user(id: i32, email: &str, role: Role) -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_user(UserRecord {
        id: UserId::new(id),
        email: Email::parse(email).unwrap(),
        name: Some("Test User".to_owned()),
        image: None,
        role,
        email_verified: None,
    });
    store
}
