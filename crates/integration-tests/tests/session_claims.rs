//! End-to-end session claims scenarios: verified login feeding claims
//! resolution, role defaulting, and the predicates the claims drive.

use papillon_auth::credentials::CredentialService;
use papillon_auth::session::{AuthenticatedIdentity, ClaimsResolver, PartialClaims};
use papillon_core::{Email, Role, Section, UserId};
use papillon_integration_tests::store_with_user;

#[tokio::test]
async fn verified_login_produces_full_claims() {
    let store = store_with_user(1, "admin@example.com", Role::SectionAdmin(Section::Boutique));
    let service = CredentialService::new(&store);
    let resolver = ClaimsResolver::new(&store);

    // Verify the email first, as registration would.
    let issued = service
        .issue_link_credential("admin@example.com")
        .await
        .expect("issue link");
    let outcome = service.redeem_by_link(&issued.secret).await.expect("redeem");
    assert!(outcome.is_verified());

    // Login produces a complete principal with the durable role.
    let claims = resolver
        .resolve_on_login(
            AuthenticatedIdentity {
                id: UserId::new(1),
                email: Email::parse("admin@example.com").expect("valid email"),
                name: None,
                image: None,
                role: None,
            },
            None,
        )
        .await;

    assert_eq!(claims.role, Role::SectionAdmin(Section::Boutique));
    assert!(claims.role.is_admin());
    assert!(claims.role.can_access_section(Section::Boutique));
    assert!(!claims.role.can_access_section(Section::Party));
}

#[tokio::test]
async fn unknown_user_gets_least_privilege() {
    let store = store_with_user(1, "user@example.com", Role::User);
    let resolver = ClaimsResolver::new(&store);

    // A token for an id the store has never seen.
    let claims = resolver
        .resolve_on_refresh(PartialClaims {
            id: UserId::new(999),
            email: None,
            name: None,
            image: None,
            role: None,
        })
        .await;

    assert_eq!(claims.role, Role::User);
    assert!(!claims.role.is_admin());
    assert!(claims.role.accessible_areas().is_empty());
}

#[tokio::test]
async fn refresh_heals_pre_role_tokens() {
    let store = store_with_user(7, "super@example.com", Role::SuperAdmin);
    let resolver = ClaimsResolver::new(&store);

    let claims = resolver
        .resolve_on_refresh(PartialClaims {
            id: UserId::new(7),
            email: Some(Email::parse("super@example.com").expect("valid email")),
            name: Some("Supervisor".to_owned()),
            image: None,
            role: None,
        })
        .await;

    assert_eq!(claims.role, Role::SuperAdmin);
    // Known fields survive the refresh untouched.
    assert_eq!(claims.name.as_deref(), Some("Supervisor"));

    // Super admin reaches every section and the cross-cutting areas.
    for section in papillon_core::Section::ALL {
        assert!(claims.role.can_access_section(section));
    }
    assert_eq!(
        claims.role.accessible_areas().len(),
        papillon_core::AdminArea::ALL.len()
    );
}

#[tokio::test]
async fn claims_serialize_with_wire_role_strings() {
    let store = store_with_user(3, "news@example.com", Role::SectionAdmin(Section::News));
    let resolver = ClaimsResolver::new(&store);

    let claims = resolver
        .resolve_on_refresh(PartialClaims {
            id: UserId::new(3),
            email: Some(Email::parse("news@example.com").expect("valid email")),
            name: None,
            image: None,
            role: None,
        })
        .await;

    let json = serde_json::to_value(&claims).expect("serialize claims");
    assert_eq!(json["role"], "ADMIN_NEWS");
    assert_eq!(json["id"], 3);
}
