use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{TenancyError, TenancyResult};

/// Authenticated principal managed by the external identity provider.
///
/// The core only ever reads this; creation and credential handling live in
/// the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: None,
            image: None,
        }
    }
}

/// Organization (tenant) - the unit of multi-tenant isolation.
///
/// The slug is immutable after creation; no operation updates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
    pub slug: String,
    #[serde(rename = "creatorId")]
    pub creator_id: String,
    pub active: bool,
    pub tier: OrganizationTier,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// Subscription tier, carrying the seat limit for the organization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrganizationTier {
    #[default]
    Free,
    Team,
    Business,
}

impl OrganizationTier {
    /// Maximum members (active + pending) for this tier, `None` = unlimited.
    pub fn member_limit(&self) -> Option<usize> {
        match self {
            Self::Free => Some(5),
            Self::Team => Some(50),
            Self::Business => None,
        }
    }
}

/// Member role within an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Agent,
}

impl Role {
    /// Roles allowed to manage memberships and invitations.
    pub fn can_manage_members(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Owner => write!(f, "owner"),
            Self::Admin => write!(f, "admin"),
            Self::Agent => write!(f, "agent"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = TenancyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "agent" => Ok(Self::Agent),
            other => Err(TenancyError::validation(format!("Unknown role: {other}"))),
        }
    }
}

/// Membership status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    #[default]
    Pending,
    Active,
}

/// The binding of an identity (or a pending invitee email) to an
/// organization with a role and status.
///
/// While pending, the row is keyed by `invited_email` and carries the
/// single-use `invite_code`. Activation attaches `user_id`, stamps
/// `joined_at`, and clears the code; the email key is never meaningful
/// again afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub id: String,
    #[serde(rename = "organizationId")]
    pub organization_id: String,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(rename = "invitedEmail")]
    pub invited_email: Option<String>,
    pub role: Role,
    pub status: MembershipStatus,
    #[serde(rename = "inviteCode", skip_serializing_if = "Option::is_none")]
    pub invite_code: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "joinedAt")]
    pub joined_at: Option<DateTime<Utc>>,
}

impl Membership {
    pub fn is_active(&self) -> bool {
        self.status == MembershipStatus::Active
    }

    pub fn is_pending(&self) -> bool {
        self.status == MembershipStatus::Pending
    }
}

/// Invitation status. Transitions are strictly forward:
/// `Pending -> Accepted` or `Pending -> Expired`, nothing else.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    #[default]
    Pending,
    Accepted,
    Expired,
}

impl std::fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Accepted => write!(f, "accepted"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Time-limited, single-use credential inviting an email to join an
/// organization with a given role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    pub id: String,
    #[serde(rename = "organizationId")]
    pub organization_id: String,
    pub email: String,
    pub role: Role,
    pub token: String,
    pub status: InvitationStatus,
    #[serde(rename = "invitedBy")]
    pub invited_by: String,
    #[serde(rename = "expiresAt")]
    pub expires_at: DateTime<Utc>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "acceptedAt")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Invitation {
    pub fn is_pending(&self) -> bool {
        self.status == InvitationStatus::Pending
    }

    pub fn is_expired(&self) -> bool {
        self.status == InvitationStatus::Expired || self.expires_at < Utc::now()
    }
}

/// The unified acceptance key: both credential shapes feed the same
/// activation operation.
///
/// `Code` is the invite code carried on a pending membership row;
/// `Token` is the credential of a standalone invitation record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptCredential {
    Code(String),
    Token(String),
}

impl AcceptCredential {
    /// Query-string fragment for the acceptance URL
    /// (`code=<invite_code>` or `token=<token>`).
    pub fn query_pair(&self) -> String {
        match self {
            Self::Code(code) => format!("code={code}"),
            Self::Token(token) => format!("token={token}"),
        }
    }
}

/// Organization creation data.
#[derive(Debug, Clone)]
pub struct CreateOrganization {
    pub id: Option<String>,
    pub name: String,
    pub slug: String,
    pub creator_id: String,
    pub tier: OrganizationTier,
}

impl CreateOrganization {
    pub fn new(
        name: impl Into<String>,
        slug: impl Into<String>,
        creator_id: impl Into<String>,
    ) -> Self {
        Self {
            id: Some(Uuid::new_v4().to_string()),
            name: name.into(),
            slug: slug.into(),
            creator_id: creator_id.into(),
            tier: OrganizationTier::default(),
        }
    }

    pub fn with_tier(mut self, tier: OrganizationTier) -> Self {
        self.tier = tier;
        self
    }
}

/// The key a new membership is created under: a resolved identity
/// (active immediately) or a not-yet-registered invitee email (pending).
#[derive(Debug, Clone)]
pub enum MembershipKey {
    Identity(String),
    InvitedEmail(String),
}

/// Membership creation data.
#[derive(Debug, Clone)]
pub struct CreateMembership {
    pub organization_id: String,
    pub key: MembershipKey,
    pub role: Role,
    pub status: MembershipStatus,
    /// Single-use acceptance code, required while status is pending.
    pub invite_code: Option<String>,
}

impl CreateMembership {
    /// An immediately-active membership for a resolved identity.
    pub fn active(
        organization_id: impl Into<String>,
        identity_id: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            key: MembershipKey::Identity(identity_id.into()),
            role,
            status: MembershipStatus::Active,
            invite_code: None,
        }
    }

    /// A pending membership keyed by invitee email with its invite code.
    pub fn pending(
        organization_id: impl Into<String>,
        invited_email: impl Into<String>,
        role: Role,
        invite_code: impl Into<String>,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            key: MembershipKey::InvitedEmail(invited_email.into().to_lowercase()),
            role,
            status: MembershipStatus::Pending,
            invite_code: Some(invite_code.into()),
        }
    }
}

/// Invitation creation data.
#[derive(Debug, Clone)]
pub struct CreateInvitation {
    pub organization_id: String,
    pub email: String,
    pub role: Role,
    pub token: String,
    pub invited_by: String,
    pub expires_at: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

/// Validate an organization slug: lowercase alphanumeric and hyphens,
/// non-empty, no leading/trailing hyphen.
pub fn validate_slug(slug: &str) -> TenancyResult<()> {
    if slug.is_empty() {
        return Err(TenancyError::validation("Slug must not be empty"));
    }
    if slug.starts_with('-') || slug.ends_with('-') {
        return Err(TenancyError::validation(
            "Slug must not start or end with a hyphen",
        ));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(TenancyError::validation(
            "Slug must be lowercase alphanumeric with hyphens",
        ));
    }
    Ok(())
}
