//! End-to-end verification flows: issue a credential, deliver it, redeem
//! it, and observe the user record change.
//!
//! Everything runs against the in-memory store and recording mailer, so no
//! external services are required.

use chrono::{Duration, Utc};

use papillon_auth::credentials::{CredentialService, RejectReason, Redemption};
use papillon_auth::email::{Mailer, OutgoingEmail, RecordingMailer, verification_code_email};
use papillon_core::{Email, Role, UserId};
use papillon_integration_tests::store_with_user;

/// Mailer whose transport refuses every message, as a dead SMTP relay would.
struct RefusingMailer;

impl Mailer for RefusingMailer {
    async fn send(&self, _mail: &OutgoingEmail) -> bool {
        false
    }
}

#[tokio::test]
async fn code_flow_verifies_and_repeats_softly() {
    let store = store_with_user(1, "user@example.com", Role::User);
    let service = CredentialService::new(&store);

    let issued = service
        .issue_code_credential("user@example.com")
        .await
        .expect("issue code");

    // Redeem with the correct code well within the 15-minute window.
    let first = service
        .redeem_by_code("user@example.com", &issued.code)
        .await
        .expect("redeem");
    assert!(first.is_verified());
    assert_eq!(first.reason(), "verified");

    let verified_at = store
        .user(UserId::new(1))
        .expect("user present")
        .email_verified;
    assert!(verified_at.is_some());

    // A second attempt with the same code is a soft success, and the
    // verification timestamp is untouched.
    let second = service
        .redeem_by_code("user@example.com", &issued.code)
        .await
        .expect("redeem again");
    assert!(second.is_verified());
    assert_eq!(second.reason(), "already_verified");
    assert_eq!(
        store
            .user(UserId::new(1))
            .expect("user present")
            .email_verified,
        verified_at
    );
}

#[tokio::test]
async fn code_flow_rejects_after_expiry() {
    let store = store_with_user(1, "user@example.com", Role::User);
    let service = CredentialService::new(&store);

    let now = Utc::now();
    let issued = service
        .issue_code_credential_at("user@example.com", now)
        .await
        .expect("issue code");

    // Sixteen minutes later the correct code no longer verifies.
    let outcome = service
        .redeem_by_code_at("user@example.com", &issued.code, now + Duration::minutes(16))
        .await
        .expect("redeem");
    assert_eq!(outcome, Redemption::Rejected(RejectReason::Expired));
    assert!(
        store
            .user(UserId::new(1))
            .expect("user present")
            .email_verified
            .is_none()
    );
}

#[tokio::test]
async fn malformed_codes_never_reach_the_store() {
    let store = store_with_user(1, "user@example.com", Role::User);
    let service = CredentialService::new(&store);
    let email = Email::parse("user@example.com").expect("valid email");

    service
        .issue_code_credential("user@example.com")
        .await
        .expect("issue code");

    for bad in ["12a456", "12345"] {
        let err = service
            .redeem_by_code("user@example.com", bad)
            .await
            .expect_err("format must be rejected");
        assert_eq!(err.reason(), "invalid_code");
    }

    // The live credential was never consulted or consumed.
    assert_eq!(store.credential_count(&email), 1);
}

#[tokio::test]
async fn issuance_keeps_one_live_credential() {
    let store = store_with_user(1, "user@example.com", Role::User);
    let service = CredentialService::new(&store);
    let email = Email::parse("user@example.com").expect("valid email");

    // Mixed link/code issuance, including differently-cased input.
    service
        .issue_link_credential("user@example.com")
        .await
        .expect("issue link");
    service
        .issue_code_credential("USER@example.com")
        .await
        .expect("issue code");
    let last = service
        .issue_link_credential("  user@Example.com ")
        .await
        .expect("issue link");

    assert_eq!(store.credential_count(&email), 1);

    // Only the most recent credential redeems.
    let outcome = service
        .redeem_by_link(&last.secret)
        .await
        .expect("redeem last");
    assert!(outcome.is_verified());
}

#[tokio::test]
async fn failed_delivery_does_not_roll_back_issuance() {
    let store = store_with_user(1, "user@example.com", Role::User);
    let service = CredentialService::new(&store);
    let mailer = RefusingMailer;
    let email = Email::parse("user@example.com").expect("valid email");

    let issued = service
        .issue_code_credential("user@example.com")
        .await
        .expect("issue code");
    let mail = verification_code_email(issued.email.clone(), &issued.code).expect("compose");

    // Delivery fails, leaving the caller in "issued but not delivered".
    assert!(!mailer.send(&mail).await);

    // The credential is still live and still redeems.
    assert_eq!(store.credential_count(&email), 1);
    let outcome = service
        .redeem_by_code("user@example.com", &issued.code)
        .await
        .expect("redeem");
    assert!(outcome.is_verified());
}

#[tokio::test]
async fn link_flow_delivers_and_redeems() {
    let store = store_with_user(1, "user@example.com", Role::User);
    let service = CredentialService::new(&store);
    let mailer = RecordingMailer::new();

    let issued = service
        .issue_link_credential("user@example.com")
        .await
        .expect("issue link");

    // Compose and "deliver" the code email counterpart for the same
    // address; a recording mailer always accepts.
    let code_issued = service
        .issue_code_credential("user@example.com")
        .await
        .expect("issue code");
    let mail = verification_code_email(code_issued.email.clone(), &code_issued.code)
        .expect("compose");
    assert!(mailer.send(&mail).await);
    assert_eq!(mailer.sent().len(), 1);

    // The link was superseded by the code issuance above.
    let outcome = service
        .redeem_by_link(&issued.secret)
        .await
        .expect("redeem superseded link");
    assert_eq!(outcome, Redemption::Rejected(RejectReason::NotFound));

    // The live code still works.
    let outcome = service
        .redeem_by_code("user@example.com", &code_issued.code)
        .await
        .expect("redeem code");
    assert!(outcome.is_verified());
}
