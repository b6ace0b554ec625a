//! Persistence-facing operations on organizations, memberships and
//! invitations.
//!
//! Implementations enforce the uniqueness invariants (slug, invite code,
//! token, one active membership per (organization, identity)) at this
//! layer, under whatever serialization primitive the backing store offers,
//! so concurrent writers cannot race past a check-then-insert.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::TenancyResult;
use crate::types::{
    AcceptCredential, CreateInvitation, CreateMembership, CreateOrganization, Invitation,
    Membership, Organization, Role,
};

/// The caller of a policy-checked store operation.
#[derive(Debug, Clone)]
pub struct Requester {
    pub identity_id: String,
    pub role: Role,
}

impl Requester {
    pub fn new(identity_id: impl Into<String>, role: Role) -> Self {
        Self {
            identity_id: identity_id.into(),
            role,
        }
    }
}

/// Membership Store operations.
#[async_trait]
pub trait MembershipStore: Send + Sync + 'static {
    /// Create an organization and its founder's owner membership atomically.
    ///
    /// Fails with `Conflict` if the slug is taken; on failure neither record
    /// exists. No observable state has the organization without exactly one
    /// active owner membership.
    async fn create_organization(
        &self,
        create: CreateOrganization,
    ) -> TenancyResult<(Organization, Membership)>;

    async fn get_organization_by_id(&self, id: &str) -> TenancyResult<Option<Organization>>;

    async fn get_organization_by_slug(&self, slug: &str) -> TenancyResult<Option<Organization>>;

    /// Create a membership keyed by identity (active) or invitee email
    /// (pending). Fails with `Conflict` if an active membership already
    /// exists for the same (organization, identity), or a pending one for
    /// the same (organization, email).
    async fn upsert_membership(&self, create: CreateMembership) -> TenancyResult<Membership>;

    /// Terminal activation for both credential shapes.
    ///
    /// Fails with `NotFound` for an unknown credential, `Expired` past
    /// expiry (token path), `Conflict` if already active/accepted. On
    /// success the membership becomes active with `joined_at` stamped, the
    /// identity id attached, and the invite credential cleared; the token
    /// path also marks its invitation accepted in the same transition.
    async fn activate_membership(
        &self,
        credential: &AcceptCredential,
        identity_id: &str,
    ) -> TenancyResult<Membership>;

    /// All active memberships for an identity. More than one means the
    /// caller must present an organization-selection step.
    async fn find_active_memberships(&self, identity_id: &str) -> TenancyResult<Vec<Membership>>;

    async fn get_membership(
        &self,
        organization_id: &str,
        identity_id: &str,
    ) -> TenancyResult<Option<Membership>>;

    async fn get_membership_by_id(&self, id: &str) -> TenancyResult<Option<Membership>>;

    async fn get_pending_membership_by_email(
        &self,
        organization_id: &str,
        email: &str,
    ) -> TenancyResult<Option<Membership>>;

    async fn list_organization_memberships(
        &self,
        organization_id: &str,
    ) -> TenancyResult<Vec<Membership>>;

    /// Remove a membership. Requires an owner/admin requester; self-removal
    /// is rejected as an invalid operation (policy, not storage), and the
    /// last owner of an organization cannot be removed.
    async fn remove_membership(
        &self,
        membership_id: &str,
        requester: &Requester,
    ) -> TenancyResult<()>;

    /// Change a member's role. Requires an owner/admin requester; the last
    /// owner cannot be demoted.
    async fn change_role(
        &self,
        membership_id: &str,
        new_role: Role,
        requester: &Requester,
    ) -> TenancyResult<Membership>;

    /// Create a token-keyed invitation. Fails with `DuplicateInvitation` if
    /// an unexpired pending invitation already exists for (organization,
    /// email) - callers should resend rather than duplicate.
    async fn create_invitation(&self, create: CreateInvitation) -> TenancyResult<Invitation>;

    async fn get_invitation_by_id(&self, id: &str) -> TenancyResult<Option<Invitation>>;

    async fn get_invitation_by_token(&self, token: &str) -> TenancyResult<Option<Invitation>>;

    async fn get_pending_invitation(
        &self,
        organization_id: &str,
        email: &str,
    ) -> TenancyResult<Option<Invitation>>;

    /// Transition a pending invitation to expired. Irreversible; fails if
    /// the invitation is not pending.
    async fn expire_invitation(&self, id: &str) -> TenancyResult<Invitation>;

    async fn list_organization_invitations(
        &self,
        organization_id: &str,
    ) -> TenancyResult<Vec<Invitation>>;
}
