//! Issuance, validation, and retirement of email verification credentials.
//!
//! Two flows share one storage row shape. The link flow stores an opaque
//! high-entropy secret that is embedded in a URL; the code flow stores a
//! composite `"<6-digit-code>-<correlation>"` so that a short code typed by
//! the user can be matched against credentials loaded by identifier.
//!
//! Both flows are single-use: a successful redemption marks the user's
//! email verified (set-once) and retires the credential. Re-presenting a
//! consumed code is answered with a soft `already_verified` success so a
//! double-submitted form never shows the user an error for something that
//! worked.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use rand::{Rng, RngCore};
use thiserror::Error;
use uuid::Uuid;

use papillon_core::{Email, EmailError};

use crate::store::{
    StoreError, UserStore, VerificationCredential, VerificationStore,
};

/// Lifetime of a link credential.
pub const LINK_TTL: Duration = Duration::hours(24);

/// Lifetime of a code credential.
pub const CODE_TTL: Duration = Duration::minutes(15);

/// Random bytes in a link secret (32 bytes = 256 bits of entropy).
const SECRET_BYTES: usize = 32;

/// Errors returned by credential operations.
///
/// Validation failures are local: they are produced before any store access
/// and carry a stable reason string for the route layer to translate.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// The supplied email address is malformed.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// The supplied code is not exactly six ASCII digits.
    #[error("code must be exactly 6 digits")]
    InvalidCode,

    /// The store could not be reached or misbehaved.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CredentialError {
    /// Stable machine-readable reason for user-facing translation.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::InvalidEmail(_) => "invalid_email",
            Self::InvalidCode => "invalid_code",
            Self::Store(_) => "store_error",
        }
    }
}

/// Why a redemption was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No credential matches the presented secret or code.
    NotFound,
    /// The credential existed but was past its expiry; it has been retired.
    Expired,
}

impl RejectReason {
    /// Stable machine-readable reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Expired => "expired",
        }
    }
}

/// Outcome of presenting a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redemption {
    /// The email is verified. `already_verified` marks the soft-success
    /// path where the user was verified before this call; the verification
    /// timestamp is untouched in that case.
    Verified {
        /// The verified address.
        email: Email,
        /// Whether verification predated this call.
        already_verified: bool,
    },
    /// The credential was not accepted.
    Rejected(RejectReason),
}

impl Redemption {
    /// Whether this outcome verified (or confirmed) the email.
    #[must_use]
    pub const fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }

    /// Stable machine-readable reason.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Verified {
                already_verified: false,
                ..
            } => "verified",
            Self::Verified {
                already_verified: true,
                ..
            } => "already_verified",
            Self::Rejected(reason) => reason.as_str(),
        }
    }
}

/// A freshly issued link credential.
#[derive(Debug, Clone)]
pub struct IssuedLink {
    /// The normalized address the credential was issued for.
    pub email: Email,
    /// The opaque URL-safe secret to embed in the verification link.
    pub secret: String,
    /// Absolute expiry instant.
    pub expires_at: DateTime<Utc>,
}

/// A freshly issued code credential.
#[derive(Debug, Clone)]
pub struct IssuedCode {
    /// The normalized address the credential was issued for.
    pub email: Email,
    /// The 6-digit code shown to the user.
    pub code: String,
    /// Correlation token stored alongside the code. Not needed by the
    /// simple redemption path, but kept for parity with the link flow.
    pub token: String,
    /// Absolute expiry instant.
    pub expires_at: DateTime<Utc>,
}

/// Typed view over the single stored row shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialShape {
    /// Opaque link secret.
    Link {
        /// The stored secret.
        secret: String,
    },
    /// Code composite.
    Code {
        /// The 6-digit code.
        code: String,
        /// The correlation token after the dash.
        correlation: String,
    },
}

impl CredentialShape {
    /// Classify a stored secret.
    #[must_use]
    pub fn parse(secret: &str) -> Self {
        if let Some((prefix, rest)) = secret.split_once('-')
            && is_six_digits(prefix)
        {
            return Self::Code {
                code: prefix.to_owned(),
                correlation: rest.to_owned(),
            };
        }
        Self::Link {
            secret: secret.to_owned(),
        }
    }
}

/// Credential issuance and redemption over a keyed store.
///
/// `S` provides both record kinds; redemption reads the user record to
/// decide between first-time and already-verified outcomes.
pub struct CredentialService<'a, S> {
    store: &'a S,
}

impl<'a, S> CredentialService<'a, S>
where
    S: VerificationStore + UserStore,
{
    /// Create a new service over a store.
    #[must_use]
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Issue a link credential for `email`, superseding any live credential
    /// for the same identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::InvalidEmail`] for malformed input and
    /// [`CredentialError::Store`] if the write fails. A failed write leaves
    /// the identifier with no live credential, which is a safe state.
    pub async fn issue_link_credential(&self, email: &str) -> Result<IssuedLink, CredentialError> {
        self.issue_link_credential_at(email, Utc::now()).await
    }

    /// [`Self::issue_link_credential`] with the expiry base instant
    /// supplied by the caller.
    pub async fn issue_link_credential_at(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedLink, CredentialError> {
        let email = Email::parse(email)?;
        let secret = generate_link_secret();
        let expires_at = now + LINK_TTL;

        self.store
            .replace_for_identifier(VerificationCredential {
                identifier: email.clone(),
                secret: secret.clone(),
                expires_at,
            })
            .await?;

        tracing::debug!(identifier = %email, "issued link credential");
        Ok(IssuedLink {
            email,
            secret,
            expires_at,
        })
    }

    /// Issue a code credential for `email`, superseding any live credential
    /// for the same identifier.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::issue_link_credential`].
    pub async fn issue_code_credential(&self, email: &str) -> Result<IssuedCode, CredentialError> {
        self.issue_code_credential_at(email, Utc::now()).await
    }

    /// [`Self::issue_code_credential`] with the expiry base instant
    /// supplied by the caller.
    pub async fn issue_code_credential_at(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<IssuedCode, CredentialError> {
        let email = Email::parse(email)?;
        let code = generate_verification_code();
        let token = Uuid::new_v4().to_string();
        let expires_at = now + CODE_TTL;

        self.store
            .replace_for_identifier(VerificationCredential {
                identifier: email.clone(),
                secret: format!("{code}-{token}"),
                expires_at,
            })
            .await?;

        tracing::debug!(identifier = %email, "issued code credential");
        Ok(IssuedCode {
            email,
            code,
            token,
            expires_at,
        })
    }

    /// Redeem a link credential by its exact secret.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Store`] if the store fails; every other
    /// outcome is an ordinary [`Redemption`].
    pub async fn redeem_by_link(&self, secret: &str) -> Result<Redemption, CredentialError> {
        self.redeem_by_link_at(secret, Utc::now()).await
    }

    /// [`Self::redeem_by_link`] with expiry evaluated against `now`.
    pub async fn redeem_by_link_at(
        &self,
        secret: &str,
        now: DateTime<Utc>,
    ) -> Result<Redemption, CredentialError> {
        let Some(credential) = self.store.find_by_secret(secret).await? else {
            return Ok(Redemption::Rejected(RejectReason::NotFound));
        };

        self.settle(credential, now).await
    }

    /// Redeem a code credential: `code` is matched against the credentials
    /// stored for the (normalized) `email`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::InvalidEmail`] or
    /// [`CredentialError::InvalidCode`] for malformed input - both checked
    /// before any store access - and [`CredentialError::Store`] if the
    /// store fails.
    pub async fn redeem_by_code(
        &self,
        email: &str,
        code: &str,
    ) -> Result<Redemption, CredentialError> {
        self.redeem_by_code_at(email, code, Utc::now()).await
    }

    /// [`Self::redeem_by_code`] with expiry evaluated against `now`.
    pub async fn redeem_by_code_at(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Redemption, CredentialError> {
        if !is_six_digits(code) {
            return Err(CredentialError::InvalidCode);
        }
        let email = Email::parse(email)?;

        // Load everything for the identifier and scan. There is normally at
        // most one row, but a transient duplicate must not break matching.
        let prefix = format!("{code}-");
        let matched = self
            .store
            .list_for_identifier(&email)
            .await?
            .into_iter()
            .find(|c| c.secret.starts_with(&prefix));

        match matched {
            Some(credential) => self.settle(credential, now).await,
            // The credential may have been consumed by an earlier submission
            // of the same form. The consumed row (and its code) is gone, so
            // there is nothing left to match a code against: once the user
            // is verified, ANY well-formed code lands here and gets the same
            // soft success a live already-verified credential would get.
            None => match self.store.find_by_email(&email).await? {
                Some(user) if user.email_verified.is_some() => Ok(Redemption::Verified {
                    email,
                    already_verified: true,
                }),
                _ => Ok(Redemption::Rejected(RejectReason::NotFound)),
            },
        }
    }

    /// Shared tail of both redemption flows: expiry check, then set-once
    /// verification, then retirement of the credential.
    async fn settle(
        &self,
        credential: VerificationCredential,
        now: DateTime<Utc>,
    ) -> Result<Redemption, CredentialError> {
        let identifier = credential.identifier.clone();

        if credential.is_expired(now) {
            self.store.delete_by_secret(&credential.secret).await?;
            tracing::debug!(identifier = %identifier, "credential expired at redemption");
            return Ok(Redemption::Rejected(RejectReason::Expired));
        }

        let Some(user) = self.store.find_by_email(&identifier).await? else {
            // Credential for an identity we no longer know; retire it.
            self.store.delete_by_secret(&credential.secret).await?;
            return Ok(Redemption::Rejected(RejectReason::NotFound));
        };

        if user.email_verified.is_some() {
            self.store.delete_by_secret(&credential.secret).await?;
            return Ok(Redemption::Verified {
                email: identifier,
                already_verified: true,
            });
        }

        // The conditional write keeps the timestamp set-once even if a
        // concurrent redemption slips in between the read and this write.
        let marked = self.store.mark_email_verified(&identifier, now).await?;
        self.store.delete_by_secret(&credential.secret).await?;

        tracing::debug!(identifier = %identifier, "email verified");
        Ok(Redemption::Verified {
            email: identifier,
            already_verified: !marked,
        })
    }
}

/// Generate an opaque URL-safe link secret with 256 bits of entropy.
///
/// `rand::rng()` is a CSPRNG (ChaCha-based, reseeded from the OS).
fn generate_link_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a uniformly random 6-digit verification code.
fn generate_verification_code() -> String {
    let code: u32 = rand::rng().random_range(100_000..=999_999);
    code.to_string()
}

/// Exactly six ASCII digits.
fn is_six_digits(s: &str) -> bool {
    s.len() == 6 && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use papillon_core::{Role, UserId};

    use crate::store::{MemoryStore, UserRecord};

    use super::*;

    fn store_with_user(email: &str) -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_user(UserRecord {
            id: UserId::new(1),
            email: Email::parse(email).unwrap(),
            name: Some("Jeanne".to_owned()),
            image: None,
            role: Role::User,
            email_verified: None,
        });
        store
    }

    #[test]
    fn generated_secrets_are_distinct_and_url_safe() {
        let a = generate_link_secret();
        let b = generate_link_secret();
        assert_ne!(a, b);
        // 32 bytes, base64 without padding
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn generated_codes_are_six_digits() {
        for _ in 0..64 {
            let code = generate_verification_code();
            assert!(is_six_digits(&code), "bad code: {code}");
        }
    }

    #[test]
    fn shape_classifies_stored_secrets() {
        assert_eq!(
            CredentialShape::parse("123456-abcdef"),
            CredentialShape::Code {
                code: "123456".to_owned(),
                correlation: "abcdef".to_owned(),
            }
        );
        // A dash whose prefix is not six digits is just an opaque secret.
        assert_eq!(
            CredentialShape::parse("12a456-abcdef"),
            CredentialShape::Link {
                secret: "12a456-abcdef".to_owned(),
            }
        );
        assert_eq!(
            CredentialShape::parse("opaquesecret"),
            CredentialShape::Link {
                secret: "opaquesecret".to_owned(),
            }
        );
    }

    #[tokio::test]
    async fn issue_rejects_malformed_email() {
        let store = MemoryStore::new();
        let service = CredentialService::new(&store);

        let err = service.issue_link_credential("not-an-email").await.unwrap_err();
        assert_eq!(err.reason(), "invalid_email");

        let err = service.issue_code_credential("   ").await.unwrap_err();
        assert_eq!(err.reason(), "invalid_email");
    }

    #[tokio::test]
    async fn issuance_normalizes_and_supersedes() {
        let store = store_with_user("jeanne@example.com");
        let service = CredentialService::new(&store);
        let email = Email::parse("jeanne@example.com").unwrap();

        service
            .issue_link_credential(" Jeanne@Example.COM ")
            .await
            .unwrap();
        service.issue_code_credential("jeanne@example.com").await.unwrap();
        service.issue_link_credential("jeanne@example.com").await.unwrap();

        // One live credential per identifier after any sequence of issues.
        assert_eq!(store.credential_count(&email), 1);
    }

    #[tokio::test]
    async fn link_roundtrip_verifies_once() {
        let store = store_with_user("jeanne@example.com");
        let service = CredentialService::new(&store);

        let issued = service
            .issue_link_credential("jeanne@example.com")
            .await
            .unwrap();

        let outcome = service.redeem_by_link(&issued.secret).await.unwrap();
        assert_eq!(outcome.reason(), "verified");
        assert!(
            store
                .user(UserId::new(1))
                .unwrap()
                .email_verified
                .is_some()
        );
    }

    #[tokio::test]
    async fn link_unknown_secret_is_not_found() {
        let store = store_with_user("jeanne@example.com");
        let service = CredentialService::new(&store);

        let outcome = service.redeem_by_link("no-such-secret").await.unwrap();
        assert_eq!(outcome, Redemption::Rejected(RejectReason::NotFound));
    }

    #[tokio::test]
    async fn code_format_is_rejected_before_store_access() {
        let store = store_with_user("jeanne@example.com");
        let service = CredentialService::new(&store);
        let email = Email::parse("jeanne@example.com").unwrap();

        let issued = service.issue_code_credential("jeanne@example.com").await.unwrap();

        for bad in ["12a456", "12345", "1234567", "", "12345!"] {
            let err = service
                .redeem_by_code("jeanne@example.com", bad)
                .await
                .unwrap_err();
            assert_eq!(err.reason(), "invalid_code", "accepted {bad:?}");
        }

        // The live credential is untouched by format failures.
        assert_eq!(store.credential_count(&email), 1);
        let ok = service
            .redeem_by_code("jeanne@example.com", &issued.code)
            .await
            .unwrap();
        assert_eq!(ok.reason(), "verified");
    }

    #[tokio::test]
    async fn code_expiry_is_absolute() {
        let store = store_with_user("jeanne@example.com");
        let service = CredentialService::new(&store);
        let email = Email::parse("jeanne@example.com").unwrap();

        let now = Utc::now();
        let issued = service
            .issue_code_credential_at("jeanne@example.com", now)
            .await
            .unwrap();

        // One second past expiry, with the correct code.
        let late = issued.expires_at + Duration::seconds(1);
        let outcome = service
            .redeem_by_code_at("jeanne@example.com", &issued.code, late)
            .await
            .unwrap();
        assert_eq!(outcome, Redemption::Rejected(RejectReason::Expired));

        // Expiry detection retires the credential.
        assert_eq!(store.credential_count(&email), 0);
        assert!(store.user(UserId::new(1)).unwrap().email_verified.is_none());
    }

    #[tokio::test]
    async fn second_code_redemption_is_soft_success() {
        let store = store_with_user("jeanne@example.com");
        let service = CredentialService::new(&store);

        let issued = service.issue_code_credential("jeanne@example.com").await.unwrap();

        let first = service
            .redeem_by_code("jeanne@example.com", &issued.code)
            .await
            .unwrap();
        assert_eq!(first.reason(), "verified");
        let verified_at = store.user(UserId::new(1)).unwrap().email_verified;

        let second = service
            .redeem_by_code("jeanne@example.com", &issued.code)
            .await
            .unwrap();
        assert!(second.is_verified());
        assert_eq!(second.reason(), "already_verified");

        // The original verification timestamp is untouched.
        assert_eq!(store.user(UserId::new(1)).unwrap().email_verified, verified_at);
    }

    #[tokio::test]
    async fn verified_user_soft_succeeds_for_any_well_formed_code() {
        // Once the issued code is consumed its row is gone, so there is no
        // stored secret left to compare against: a verified user gets the
        // soft success even for codes that were never issued.
        let store = store_with_user("jeanne@example.com");
        let service = CredentialService::new(&store);

        let issued = service.issue_code_credential("jeanne@example.com").await.unwrap();
        let first = service
            .redeem_by_code("jeanne@example.com", &issued.code)
            .await
            .unwrap();
        assert_eq!(first.reason(), "verified");

        for code in ["111111", "222222"] {
            let outcome = service
                .redeem_by_code("jeanne@example.com", code)
                .await
                .unwrap();
            assert_eq!(outcome.reason(), "already_verified", "code {code}");
        }
    }

    #[tokio::test]
    async fn redemption_for_unknown_user_is_not_found() {
        let store = MemoryStore::new();
        let service = CredentialService::new(&store);

        let issued = service.issue_link_credential("ghost@example.com").await.unwrap();
        let outcome = service.redeem_by_link(&issued.secret).await.unwrap();
        assert_eq!(outcome, Redemption::Rejected(RejectReason::NotFound));

        // The dangling credential was retired.
        let email = Email::parse("ghost@example.com").unwrap();
        assert_eq!(store.credential_count(&email), 0);
    }

    #[tokio::test]
    async fn link_redemption_for_verified_user_is_soft_success() {
        let store = store_with_user("jeanne@example.com");
        let service = CredentialService::new(&store);

        // Verify through a first link.
        let first = service.issue_link_credential("jeanne@example.com").await.unwrap();
        service.redeem_by_link(&first.secret).await.unwrap();

        // A fresh link for an already-verified user still resolves cleanly.
        let second = service.issue_link_credential("jeanne@example.com").await.unwrap();
        let outcome = service.redeem_by_link(&second.secret).await.unwrap();
        assert_eq!(outcome.reason(), "already_verified");
    }
}
