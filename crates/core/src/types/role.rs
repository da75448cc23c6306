//! Roles, content sections, and the access predicates over them.
//!
//! Papillon's admin surface is split into five independently-administered
//! content sections plus a handful of cross-cutting operational areas
//! (users, orders, inquiries, donations). A role is either the plain
//! member role, the global super-admin role, or an admin role scoped to
//! exactly one section.
//!
//! Everything in this module is a total, pure function: unknown role
//! strings are preserved as [`Role::Unknown`] rather than rejected, and
//! every predicate gives a deterministic answer for them. Nothing here
//! panics and nothing here does I/O.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

// =============================================================================
// Sections
// =============================================================================

/// A named content section of the site.
///
/// Each section has exactly one scoped admin role; there is no partial
/// overlap between sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    News,
    Party,
    Boutique,
    Association,
    Photography,
}

impl Section {
    /// All sections, in display order.
    pub const ALL: [Self; 5] = [
        Self::News,
        Self::Party,
        Self::Boutique,
        Self::Association,
        Self::Photography,
    ];

    /// The section's stable machine name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Party => "party",
            Self::Boutique => "boutique",
            Self::Association => "association",
            Self::Photography => "photography",
        }
    }

    /// The wire string of the admin role scoped to this section.
    #[must_use]
    pub const fn admin_role_str(self) -> &'static str {
        match self {
            Self::News => "ADMIN_NEWS",
            Self::Party => "ADMIN_PARTY",
            Self::Boutique => "ADMIN_BOUTIQUE",
            Self::Association => "ADMIN_ASSOCIATION",
            Self::Photography => "ADMIN_PHOTOGRAPHY",
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Section {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "news" => Ok(Self::News),
            "party" => Ok(Self::Party),
            "boutique" => Ok(Self::Boutique),
            "association" => Ok(Self::Association),
            "photography" => Ok(Self::Photography),
            _ => Err(format!("unknown section: {s}")),
        }
    }
}

// =============================================================================
// Admin areas
// =============================================================================

/// An area of the admin surface a role can grant access to.
///
/// This is the five content sections plus the cross-cutting operational
/// areas that only a super-admin sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminArea {
    News,
    Party,
    Boutique,
    Association,
    Photography,
    Users,
    Orders,
    Inquiries,
    Donations,
}

impl AdminArea {
    /// All areas, sections first.
    pub const ALL: [Self; 9] = [
        Self::News,
        Self::Party,
        Self::Boutique,
        Self::Association,
        Self::Photography,
        Self::Users,
        Self::Orders,
        Self::Inquiries,
        Self::Donations,
    ];

    /// The area's stable machine name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::News => "news",
            Self::Party => "party",
            Self::Boutique => "boutique",
            Self::Association => "association",
            Self::Photography => "photography",
            Self::Users => "users",
            Self::Orders => "orders",
            Self::Inquiries => "inquiries",
            Self::Donations => "donations",
        }
    }
}

impl From<Section> for AdminArea {
    fn from(section: Section) -> Self {
        match section {
            Section::News => Self::News,
            Section::Party => Self::Party,
            Section::Boutique => Self::Boutique,
            Section::Association => Self::Association,
            Section::Photography => Self::Photography,
        }
    }
}

impl std::fmt::Display for AdminArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Roles
// =============================================================================

/// A user's role, as stored on the user record and cached in session claims.
///
/// Parsing is total: wire strings the current build does not know about are
/// preserved in [`Role::Unknown`] so that a newer deployment's roles survive
/// a round-trip through an older one instead of being silently downgraded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    /// Ordinary member with no admin access.
    User,
    /// Global admin with access to every area.
    SuperAdmin,
    /// Admin scoped to exactly one content section.
    SectionAdmin(Section),
    /// A role string this build does not know. Grants no section access.
    Unknown(String),
}

impl Role {
    /// Parse a role from its wire string. Total: never fails.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "USER" => Self::User,
            "SUPER_ADMIN" => Self::SuperAdmin,
            "ADMIN_NEWS" => Self::SectionAdmin(Section::News),
            "ADMIN_PARTY" => Self::SectionAdmin(Section::Party),
            "ADMIN_BOUTIQUE" => Self::SectionAdmin(Section::Boutique),
            "ADMIN_ASSOCIATION" => Self::SectionAdmin(Section::Association),
            "ADMIN_PHOTOGRAPHY" => Self::SectionAdmin(Section::Photography),
            other => Self::Unknown(other.to_owned()),
        }
    }

    /// The role's wire string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "USER",
            Self::SuperAdmin => "SUPER_ADMIN",
            Self::SectionAdmin(section) => section.admin_role_str(),
            Self::Unknown(s) => s,
        }
    }

    /// True iff this is the global super-admin role.
    #[must_use]
    pub const fn is_super_admin(&self) -> bool {
        matches!(self, Self::SuperAdmin)
    }

    /// True for any elevated role, section-scoped or global.
    ///
    /// Unknown roles count as elevated here: they are by construction not
    /// the member role, and [`Role::can_access_section`] still denies them
    /// everywhere, so the worst an unknown role gets is an empty dashboard.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        !matches!(self, Self::User)
    }

    /// Whether this role may administer `section`.
    ///
    /// Super-admins may administer every section; a section admin exactly
    /// its own section; everyone else nothing.
    #[must_use]
    pub fn can_access_section(&self, section: Section) -> bool {
        match self {
            Self::SuperAdmin => true,
            Self::SectionAdmin(own) => *own == section,
            Self::User | Self::Unknown(_) => false,
        }
    }

    /// The set of admin areas this role can reach.
    ///
    /// Super-admins get every section plus the cross-cutting operational
    /// areas; a section admin exactly one section; members and unknown
    /// roles the empty set.
    #[must_use]
    pub fn accessible_areas(&self) -> BTreeSet<AdminArea> {
        match self {
            Self::SuperAdmin => AdminArea::ALL.into_iter().collect(),
            Self::SectionAdmin(section) => std::iter::once(AdminArea::from(*section)).collect(),
            Self::User | Self::Unknown(_) => BTreeSet::new(),
        }
    }

    /// Human-readable label for the role.
    ///
    /// Falls back to the raw wire string for roles this build does not
    /// know, so newer roles still render something sensible.
    #[must_use]
    pub fn display_name(&self) -> &str {
        match self {
            Self::User => "Member",
            Self::SuperAdmin => "Super admin",
            Self::SectionAdmin(Section::News) => "News admin",
            Self::SectionAdmin(Section::Party) => "Party admin",
            Self::SectionAdmin(Section::Boutique) => "Boutique admin",
            Self::SectionAdmin(Section::Association) => "Association admin",
            Self::SectionAdmin(Section::Photography) => "Photography admin",
            Self::Unknown(s) => s,
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::User
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_owned()
    }
}

// =============================================================================
// Predicates over a possibly-absent role
// =============================================================================

/// [`Role::is_super_admin`] for callers holding a maybe-role.
#[must_use]
pub fn is_super_admin(role: Option<&Role>) -> bool {
    role.is_some_and(Role::is_super_admin)
}

/// [`Role::is_admin`] for callers holding a maybe-role. Absent means no.
#[must_use]
pub fn is_admin(role: Option<&Role>) -> bool {
    role.is_some_and(Role::is_admin)
}

/// [`Role::can_access_section`] for callers holding a maybe-role.
#[must_use]
pub fn can_access_section(role: Option<&Role>, section: Section) -> bool {
    role.is_some_and(|r| r.can_access_section(section))
}

/// [`Role::accessible_areas`] for callers holding a maybe-role.
#[must_use]
pub fn accessible_areas(role: Option<&Role>) -> BTreeSet<AdminArea> {
    role.map(Role::accessible_areas).unwrap_or_default()
}

// SQLx support (with postgres feature): roles are stored as their wire string.
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Role {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Role {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self::parse(&s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Role {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}
