//! Papillon identity verification and session authority.
//!
//! This crate owns the verification-credential lifecycle (opaque link
//! tokens and short numeric codes), session-claims resolution, and the
//! persistence adapters behind both. The role predicates the claims feed
//! into live in `papillon-core` so UI code can use them without pulling in
//! the async stack.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod credentials;
pub mod email;
pub mod session;
pub mod store;

pub use config::{AuthConfig, ConfigError, Environment};
pub use credentials::{
    CredentialError, CredentialService, CredentialShape, IssuedCode, IssuedLink, Redemption,
    RejectReason,
};
pub use email::{Mailer, OutgoingEmail, RecordingMailer, SmtpMailer};
pub use session::{AuthenticatedIdentity, ClaimsResolver, PartialClaims, SessionClaims};
pub use store::{MemoryStore, PgStore, StoreError, UserRecord, UserStore, VerificationStore};
