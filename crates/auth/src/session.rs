//! Session claims resolution.
//!
//! Two entry points cover the two moments a session token is (re)built:
//! [`ClaimsResolver::resolve_on_login`] right after authentication succeeds,
//! and [`ClaimsResolver::resolve_on_refresh`] when an existing token comes
//! back without a role (older tokens, or a lookup that failed last time).
//! Both converge on the same rule: the persisted user record is the source
//! of truth for the role, and a missing or unreachable record degrades to
//! [`Role::User`] instead of blocking session issuance.

use serde::{Deserialize, Serialize};

use papillon_core::{Email, Role, UserId};

use crate::store::UserStore;

/// The identity produced by a successful authentication check.
///
/// `role` is populated when the authentication path already read the user
/// record; the resolver then skips its own lookup.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity {
    /// Persisted user id.
    pub id: UserId,
    /// Verified address.
    pub email: Email,
    /// Display name, if the record has one.
    pub name: Option<String>,
    /// Avatar URL, if the record has one.
    pub image: Option<String>,
    /// Role, when the authentication path already resolved it.
    pub role: Option<Role>,
}

/// Claims as they arrive inside an existing session token.
///
/// Every field except the id is optional: older tokens predate role
/// support, and a transient lookup failure leaves `role` unset until the
/// next refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialClaims {
    /// Persisted user id.
    pub id: UserId,
    /// Address, if the token carries one.
    pub email: Option<Email>,
    /// Display name, if the token carries one.
    pub name: Option<String>,
    /// Avatar URL, if the token carries one.
    pub image: Option<String>,
    /// Cached role copy, if present.
    pub role: Option<Role>,
}

/// The complete principal written into a signed session token.
///
/// `role` is always populated; an unset role must never reach the
/// authorization predicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Persisted user id.
    pub id: UserId,
    /// Address, kept from the freshest source that knew it.
    pub email: Option<Email>,
    /// Display name, kept from the freshest source that knew it.
    pub name: Option<String>,
    /// Avatar URL, kept from the freshest source that knew it.
    pub image: Option<String>,
    /// Durable role.
    pub role: Role,
}

/// Resolves complete session claims against a user store.
pub struct ClaimsResolver<'a, S> {
    store: &'a S,
}

impl<'a, S> ClaimsResolver<'a, S>
where
    S: UserStore,
{
    /// Create a new resolver over a store.
    #[must_use]
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Build claims right after authentication succeeded.
    ///
    /// Identity attributes come from the fresh `identity`, falling back to
    /// the `existing` token so a partial identity never nulls out fields
    /// the token already knew. The role comes from the identity when the
    /// authentication path attached one, otherwise from the store.
    pub async fn resolve_on_login(
        &self,
        identity: AuthenticatedIdentity,
        existing: Option<PartialClaims>,
    ) -> SessionClaims {
        let role = match identity.role {
            Some(role) => role,
            None => self.role_or_default(identity.id).await,
        };

        let existing = existing.unwrap_or_else(|| PartialClaims {
            id: identity.id,
            email: None,
            name: None,
            image: None,
            role: None,
        });

        SessionClaims {
            id: identity.id,
            email: Some(identity.email),
            name: identity.name.or(existing.name),
            image: identity.image.or(existing.image),
            role,
        }
    }

    /// Re-resolve an existing token.
    ///
    /// A token that already carries a role passes through unchanged. One
    /// that lacks it gets the lookup-or-default treatment, which also heals
    /// tokens issued before role support existed.
    pub async fn resolve_on_refresh(&self, existing: PartialClaims) -> SessionClaims {
        let role = match existing.role {
            Some(role) => role,
            None => self.role_or_default(existing.id).await,
        };

        SessionClaims {
            id: existing.id,
            email: existing.email,
            name: existing.name,
            image: existing.image,
            role,
        }
    }

    /// Look up the durable role, degrading to [`Role::User`] when the
    /// record is missing or the store is unreachable. The degraded path is
    /// logged for operators; it must never surface to the end user.
    async fn role_or_default(&self, id: UserId) -> Role {
        match self.store.find_by_id(id).await {
            Ok(Some(user)) => user.role,
            Ok(None) => {
                tracing::warn!(user_id = %id, "no user record during claims resolution, defaulting role");
                Role::User
            }
            Err(error) => {
                tracing::warn!(user_id = %id, %error, "role lookup failed during claims resolution, defaulting role");
                Role::User
            }
        }
    }
}
