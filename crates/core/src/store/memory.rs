use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::{StoreError, TenancyError, TenancyResult};
use crate::types::{
    AcceptCredential, CreateInvitation, CreateMembership, CreateOrganization, Invitation,
    InvitationStatus, Membership, MembershipKey, MembershipStatus, Organization, Role,
    validate_slug,
};

use super::{MembershipStore, Requester};

/// In-memory membership store for testing and development.
///
/// All tables live behind one mutex, so every operation is a transaction:
/// the unique indexes (slug, invite code, token, active (org, identity)
/// pair) are checked and written in the same critical section, which is
/// what a relational backend would get from unique constraints.
pub struct MemoryStore {
    inner: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    organizations: HashMap<String, Organization>,
    memberships: HashMap<String, Membership>,
    invitations: HashMap<String, Invitation>,
    /// slug -> organization id
    slug_index: HashMap<String, String>,
    /// invite code -> membership id (pending memberships only)
    code_index: HashMap<String, String>,
    /// token -> invitation id
    token_index: HashMap<String, String>,
    /// (organization id, identity id) -> membership id (active only)
    active_index: HashMap<(String, String), String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Tables::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Tables {
    /// Flip a pending membership to active inside the current transaction.
    fn activate(&mut self, membership_id: &str, identity_id: &str) -> TenancyResult<Membership> {
        let membership = self
            .memberships
            .get_mut(membership_id)
            .ok_or_else(|| TenancyError::not_found("Membership not found"))?;

        if membership.is_active() {
            return Err(TenancyError::conflict("Membership is already active"));
        }

        let org_key = (
            membership.organization_id.clone(),
            identity_id.to_string(),
        );
        if self.active_index.contains_key(&org_key) {
            return Err(TenancyError::conflict(
                "Already an active member of this organization",
            ));
        }

        if let Some(code) = membership.invite_code.take() {
            self.code_index.remove(&code);
        }
        membership.user_id = Some(identity_id.to_string());
        membership.invited_email = None;
        membership.status = MembershipStatus::Active;
        membership.joined_at = Some(Utc::now());

        self.active_index.insert(org_key, membership_id.to_string());
        Ok(membership.clone())
    }

    fn active_owner_count(&self, organization_id: &str) -> usize {
        self.memberships
            .values()
            .filter(|m| {
                m.organization_id == organization_id && m.is_active() && m.role == Role::Owner
            })
            .count()
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn create_organization(
        &self,
        create: CreateOrganization,
    ) -> TenancyResult<(Organization, Membership)> {
        validate_slug(&create.slug)?;

        let mut tables = self.inner.lock().unwrap();

        if tables.slug_index.contains_key(&create.slug) {
            return Err(TenancyError::conflict("Slug is already taken"));
        }

        let now = Utc::now();
        let org_id = create.id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let organization = Organization {
            id: org_id.clone(),
            name: create.name,
            slug: create.slug.clone(),
            creator_id: create.creator_id.clone(),
            active: true,
            tier: create.tier,
            created_at: now,
            updated_at: now,
        };

        let membership_id = Uuid::new_v4().to_string();
        let membership = Membership {
            id: membership_id.clone(),
            organization_id: org_id.clone(),
            user_id: Some(create.creator_id.clone()),
            invited_email: None,
            role: Role::Owner,
            status: MembershipStatus::Active,
            invite_code: None,
            created_at: now,
            joined_at: Some(now),
        };

        // Both writes land under the same lock; a conflict above leaves
        // neither record behind.
        tables.slug_index.insert(create.slug, org_id.clone());
        tables.organizations.insert(org_id.clone(), organization.clone());
        tables
            .active_index
            .insert((org_id, create.creator_id), membership_id.clone());
        tables.memberships.insert(membership_id, membership.clone());

        Ok((organization, membership))
    }

    async fn get_organization_by_id(&self, id: &str) -> TenancyResult<Option<Organization>> {
        let tables = self.inner.lock().unwrap();
        Ok(tables.organizations.get(id).cloned())
    }

    async fn get_organization_by_slug(&self, slug: &str) -> TenancyResult<Option<Organization>> {
        let tables = self.inner.lock().unwrap();
        let Some(org_id) = tables.slug_index.get(slug) else {
            return Ok(None);
        };
        Ok(tables.organizations.get(org_id).cloned())
    }

    async fn upsert_membership(&self, create: CreateMembership) -> TenancyResult<Membership> {
        let mut tables = self.inner.lock().unwrap();

        if !tables.organizations.contains_key(&create.organization_id) {
            return Err(TenancyError::not_found("Organization not found"));
        }

        let (user_id, invited_email) = match &create.key {
            MembershipKey::Identity(id) => {
                let key = (create.organization_id.clone(), id.clone());
                if tables.active_index.contains_key(&key) {
                    return Err(TenancyError::conflict(
                        "An active membership already exists for this identity",
                    ));
                }
                (Some(id.clone()), None)
            }
            MembershipKey::InvitedEmail(email) => {
                let duplicate = tables.memberships.values().any(|m| {
                    m.organization_id == create.organization_id
                        && m.is_pending()
                        && m.invited_email.as_deref() == Some(email.as_str())
                });
                if duplicate {
                    return Err(TenancyError::conflict(
                        "This email is already invited to this organization",
                    ));
                }
                (None, Some(email.clone()))
            }
        };

        if let Some(code) = &create.invite_code
            && tables.code_index.contains_key(code)
        {
            return Err(StoreError::Constraint("Duplicate invite code".into()).into());
        }

        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let membership = Membership {
            id: id.clone(),
            organization_id: create.organization_id.clone(),
            user_id: user_id.clone(),
            invited_email,
            role: create.role,
            status: create.status,
            invite_code: create.invite_code.clone(),
            created_at: now,
            joined_at: (create.status == MembershipStatus::Active).then_some(now),
        };

        if let Some(code) = create.invite_code {
            tables.code_index.insert(code, id.clone());
        }
        if membership.is_active()
            && let Some(uid) = user_id
        {
            tables
                .active_index
                .insert((create.organization_id, uid), id.clone());
        }
        tables.memberships.insert(id, membership.clone());

        Ok(membership)
    }

    async fn activate_membership(
        &self,
        credential: &AcceptCredential,
        identity_id: &str,
    ) -> TenancyResult<Membership> {
        let mut tables = self.inner.lock().unwrap();

        match credential {
            AcceptCredential::Code(code) => {
                let membership_id = tables
                    .code_index
                    .get(code)
                    .cloned()
                    .ok_or_else(|| TenancyError::not_found("Unknown invite code"))?;
                tables.activate(&membership_id, identity_id)
            }
            AcceptCredential::Token(token) => {
                let invitation_id = tables
                    .token_index
                    .get(token)
                    .cloned()
                    .ok_or_else(|| TenancyError::not_found("Unknown invitation token"))?;

                let invitation = tables
                    .invitations
                    .get(&invitation_id)
                    .cloned()
                    .ok_or_else(|| TenancyError::internal("Invitation index out of sync"))?;
                match invitation.status {
                    InvitationStatus::Accepted => {
                        return Err(TenancyError::conflict("Invitation was already accepted"));
                    }
                    InvitationStatus::Expired => {
                        return Err(TenancyError::expired("Invitation has expired"));
                    }
                    InvitationStatus::Pending => {}
                }
                if invitation.expires_at < Utc::now() {
                    // Record the terminal state; expiry is forward-only.
                    if let Some(stored) = tables.invitations.get_mut(&invitation_id) {
                        stored.status = InvitationStatus::Expired;
                    }
                    return Err(TenancyError::expired("Invitation has expired"));
                }

                let org_key = (invitation.organization_id.clone(), identity_id.to_string());
                if tables.active_index.contains_key(&org_key) {
                    return Err(TenancyError::conflict(
                        "Already an active member of this organization",
                    ));
                }

                // A pending code-keyed membership for the same invitee is
                // the one this invitation funds; otherwise the invitation
                // stands alone and the membership is created here.
                let pending_id = tables
                    .memberships
                    .values()
                    .find(|m| {
                        m.organization_id == invitation.organization_id
                            && m.is_pending()
                            && m.invited_email.as_deref()
                                == Some(invitation.email.to_lowercase().as_str())
                    })
                    .map(|m| m.id.clone());

                let membership = match pending_id {
                    Some(id) => tables.activate(&id, identity_id)?,
                    None => {
                        let now = Utc::now();
                        let id = Uuid::new_v4().to_string();
                        let membership = Membership {
                            id: id.clone(),
                            organization_id: invitation.organization_id.clone(),
                            user_id: Some(identity_id.to_string()),
                            invited_email: None,
                            role: invitation.role,
                            status: MembershipStatus::Active,
                            invite_code: None,
                            created_at: now,
                            joined_at: Some(now),
                        };
                        tables.active_index.insert(org_key, id.clone());
                        tables.memberships.insert(id, membership.clone());
                        membership
                    }
                };

                if let Some(stored) = tables.invitations.get_mut(&invitation_id) {
                    stored.status = InvitationStatus::Accepted;
                    stored.accepted_at = Some(Utc::now());
                    stored.user_id = Some(identity_id.to_string());
                }

                Ok(membership)
            }
        }
    }

    async fn find_active_memberships(&self, identity_id: &str) -> TenancyResult<Vec<Membership>> {
        let tables = self.inner.lock().unwrap();
        Ok(tables
            .memberships
            .values()
            .filter(|m| m.is_active() && m.user_id.as_deref() == Some(identity_id))
            .cloned()
            .collect())
    }

    async fn get_membership(
        &self,
        organization_id: &str,
        identity_id: &str,
    ) -> TenancyResult<Option<Membership>> {
        let tables = self.inner.lock().unwrap();
        let key = (organization_id.to_string(), identity_id.to_string());
        let Some(id) = tables.active_index.get(&key) else {
            return Ok(None);
        };
        Ok(tables.memberships.get(id).cloned())
    }

    async fn get_membership_by_id(&self, id: &str) -> TenancyResult<Option<Membership>> {
        let tables = self.inner.lock().unwrap();
        Ok(tables.memberships.get(id).cloned())
    }

    async fn get_pending_membership_by_email(
        &self,
        organization_id: &str,
        email: &str,
    ) -> TenancyResult<Option<Membership>> {
        let tables = self.inner.lock().unwrap();
        let email = email.to_lowercase();
        Ok(tables
            .memberships
            .values()
            .find(|m| {
                m.organization_id == organization_id
                    && m.is_pending()
                    && m.invited_email.as_deref() == Some(email.as_str())
            })
            .cloned())
    }

    async fn list_organization_memberships(
        &self,
        organization_id: &str,
    ) -> TenancyResult<Vec<Membership>> {
        let tables = self.inner.lock().unwrap();
        Ok(tables
            .memberships
            .values()
            .filter(|m| m.organization_id == organization_id)
            .cloned()
            .collect())
    }

    async fn remove_membership(
        &self,
        membership_id: &str,
        requester: &Requester,
    ) -> TenancyResult<()> {
        if !requester.role.can_manage_members() {
            return Err(TenancyError::forbidden(
                "You don't have permission to remove members",
            ));
        }

        let mut tables = self.inner.lock().unwrap();

        let target = tables
            .memberships
            .get(membership_id)
            .cloned()
            .ok_or_else(|| TenancyError::not_found("Membership not found"))?;

        if target.user_id.as_deref() == Some(requester.identity_id.as_str()) {
            return Err(TenancyError::validation(
                "Cannot remove your own membership",
            ));
        }

        if target.is_active()
            && target.role == Role::Owner
            && tables.active_owner_count(&target.organization_id) <= 1
        {
            return Err(TenancyError::validation(
                "Cannot remove the last owner from an organization",
            ));
        }

        tables.memberships.remove(membership_id);
        if let Some(code) = &target.invite_code {
            tables.code_index.remove(code);
        }
        if let Some(user_id) = &target.user_id {
            tables
                .active_index
                .remove(&(target.organization_id.clone(), user_id.clone()));
        }

        Ok(())
    }

    async fn change_role(
        &self,
        membership_id: &str,
        new_role: Role,
        requester: &Requester,
    ) -> TenancyResult<Membership> {
        if !requester.role.can_manage_members() {
            return Err(TenancyError::forbidden(
                "You don't have permission to change member roles",
            ));
        }

        let mut tables = self.inner.lock().unwrap();

        let target = tables
            .memberships
            .get(membership_id)
            .cloned()
            .ok_or_else(|| TenancyError::not_found("Membership not found"))?;

        if target.is_active()
            && target.role == Role::Owner
            && new_role != Role::Owner
            && tables.active_owner_count(&target.organization_id) <= 1
        {
            return Err(TenancyError::validation(
                "Cannot demote the last owner. Transfer ownership first.",
            ));
        }

        let membership = tables
            .memberships
            .get_mut(membership_id)
            .ok_or_else(|| TenancyError::not_found("Membership not found"))?;
        membership.role = new_role;
        Ok(membership.clone())
    }

    async fn create_invitation(&self, create: CreateInvitation) -> TenancyResult<Invitation> {
        let mut tables = self.inner.lock().unwrap();

        if !tables.organizations.contains_key(&create.organization_id) {
            return Err(TenancyError::not_found("Organization not found"));
        }

        let email = create.email.to_lowercase();
        let now = Utc::now();

        let duplicate = tables.invitations.values().any(|i| {
            i.organization_id == create.organization_id
                && i.email == email
                && i.status == InvitationStatus::Pending
                && i.expires_at > now
        });
        if duplicate {
            return Err(TenancyError::duplicate_invitation(
                "This email is already invited to this organization",
            ));
        }

        if tables.token_index.contains_key(&create.token) {
            return Err(StoreError::Constraint("Duplicate invitation token".into()).into());
        }

        let id = Uuid::new_v4().to_string();
        let invitation = Invitation {
            id: id.clone(),
            organization_id: create.organization_id,
            email,
            role: create.role,
            token: create.token.clone(),
            status: InvitationStatus::Pending,
            invited_by: create.invited_by,
            expires_at: create.expires_at,
            created_at: now,
            accepted_at: None,
            user_id: None,
            metadata: create.metadata,
        };

        tables.token_index.insert(create.token, id.clone());
        tables.invitations.insert(id, invitation.clone());

        Ok(invitation)
    }

    async fn get_invitation_by_id(&self, id: &str) -> TenancyResult<Option<Invitation>> {
        let tables = self.inner.lock().unwrap();
        Ok(tables.invitations.get(id).cloned())
    }

    async fn get_invitation_by_token(&self, token: &str) -> TenancyResult<Option<Invitation>> {
        let tables = self.inner.lock().unwrap();
        let Some(id) = tables.token_index.get(token) else {
            return Ok(None);
        };
        Ok(tables.invitations.get(id).cloned())
    }

    async fn get_pending_invitation(
        &self,
        organization_id: &str,
        email: &str,
    ) -> TenancyResult<Option<Invitation>> {
        let tables = self.inner.lock().unwrap();
        let email = email.to_lowercase();
        let now = Utc::now();
        Ok(tables
            .invitations
            .values()
            .find(|i| {
                i.organization_id == organization_id
                    && i.email == email
                    && i.status == InvitationStatus::Pending
                    && i.expires_at > now
            })
            .cloned())
    }

    async fn expire_invitation(&self, id: &str) -> TenancyResult<Invitation> {
        let mut tables = self.inner.lock().unwrap();

        let invitation = tables
            .invitations
            .get_mut(id)
            .ok_or_else(|| TenancyError::not_found("Invitation not found"))?;

        if invitation.status != InvitationStatus::Pending {
            return Err(TenancyError::validation(format!(
                "Invitation is already {}",
                invitation.status
            )));
        }

        invitation.status = InvitationStatus::Expired;
        Ok(invitation.clone())
    }

    async fn list_organization_invitations(
        &self,
        organization_id: &str,
    ) -> TenancyResult<Vec<Invitation>> {
        let tables = self.inner.lock().unwrap();
        Ok(tables
            .invitations
            .values()
            .filter(|i| i.organization_id == organization_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    fn org(slug: &str) -> CreateOrganization {
        CreateOrganization::new("Acme Support", slug, "founder-1")
    }

    fn invitation(org_id: &str, email: &str, token: &str) -> CreateInvitation {
        CreateInvitation {
            organization_id: org_id.to_string(),
            email: email.to_string(),
            role: Role::Agent,
            token: token.to_string(),
            invited_by: "founder-1".to_string(),
            expires_at: Utc::now() + Duration::days(7),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_create_organization_with_owner_membership() {
        let store = MemoryStore::new();
        let (organization, membership) = store.create_organization(org("acme")).await.unwrap();

        assert_eq!(organization.slug, "acme");
        assert_eq!(membership.role, Role::Owner);
        assert!(membership.is_active());
        assert_eq!(membership.user_id.as_deref(), Some("founder-1"));
        assert!(membership.joined_at.is_some());

        let active = store.find_active_memberships("founder-1").await.unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn test_slug_conflict_leaves_no_partial_state() {
        let store = MemoryStore::new();
        store.create_organization(org("acme")).await.unwrap();

        let mut second = CreateOrganization::new("Other", "acme", "founder-2");
        second.id = Some("org-2".to_string());
        let err = store.create_organization(second).await.unwrap_err();
        assert_eq!(err.status_code(), 409);

        assert!(store.get_organization_by_id("org-2").await.unwrap().is_none());
        assert!(
            store
                .find_active_memberships("founder-2")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_invalid_slug_rejected() {
        let store = MemoryStore::new();
        let err = store.create_organization(org("Not A Slug")).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_duplicate_active_membership_conflicts() {
        let store = MemoryStore::new();
        let (organization, _) = store.create_organization(org("acme")).await.unwrap();

        let err = store
            .upsert_membership(CreateMembership::active(
                &organization.id,
                "founder-1",
                Role::Admin,
            ))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn test_pending_membership_activation_by_code() {
        let store = MemoryStore::new();
        let (organization, _) = store.create_organization(org("acme")).await.unwrap();

        store
            .upsert_membership(CreateMembership::pending(
                &organization.id,
                "new@example.com",
                Role::Agent,
                "code-1",
            ))
            .await
            .unwrap();

        let membership = store
            .activate_membership(&AcceptCredential::Code("code-1".into()), "user-9")
            .await
            .unwrap();

        assert!(membership.is_active());
        assert_eq!(membership.user_id.as_deref(), Some("user-9"));
        assert!(membership.invite_code.is_none());
        assert!(membership.invited_email.is_none());
        assert!(membership.joined_at.is_some());

        // The code is single-use.
        let err = store
            .activate_membership(&AcceptCredential::Code("code-1".into()), "user-10")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_duplicate_pending_email_conflicts() {
        let store = MemoryStore::new();
        let (organization, _) = store.create_organization(org("acme")).await.unwrap();

        store
            .upsert_membership(CreateMembership::pending(
                &organization.id,
                "new@example.com",
                Role::Agent,
                "code-1",
            ))
            .await
            .unwrap();

        let err = store
            .upsert_membership(CreateMembership::pending(
                &organization.id,
                "NEW@example.com",
                Role::Admin,
                "code-2",
            ))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn test_duplicate_invitation_conflicts_until_expired() {
        let store = MemoryStore::new();
        let (organization, _) = store.create_organization(org("acme")).await.unwrap();

        let first = store
            .create_invitation(invitation(&organization.id, "a@b.com", "tok-1"))
            .await
            .unwrap();

        let err = store
            .create_invitation(invitation(&organization.id, "A@B.com", "tok-2"))
            .await
            .unwrap_err();
        assert!(matches!(err, TenancyError::DuplicateInvitation(_)));

        // After revocation a fresh invitation succeeds.
        store.expire_invitation(&first.id).await.unwrap();
        store
            .create_invitation(invitation(&organization.id, "a@b.com", "tok-3"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_token_activation_marks_invitation_accepted_once() {
        let store = MemoryStore::new();
        let (organization, _) = store.create_organization(org("acme")).await.unwrap();

        let created = store
            .create_invitation(invitation(&organization.id, "a@b.com", "tok-1"))
            .await
            .unwrap();

        let membership = store
            .activate_membership(&AcceptCredential::Token("tok-1".into()), "user-9")
            .await
            .unwrap();
        assert!(membership.is_active());
        assert_eq!(membership.role, Role::Agent);

        let accepted = store
            .get_invitation_by_id(&created.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(accepted.status, InvitationStatus::Accepted);
        assert_eq!(accepted.user_id.as_deref(), Some("user-9"));
        let first_accepted_at = accepted.accepted_at.unwrap();

        // Second acceptance fails and does not mutate accepted_at.
        let err = store
            .activate_membership(&AcceptCredential::Token("tok-1".into()), "user-10")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 409);

        let unchanged = store
            .get_invitation_by_id(&created.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(unchanged.accepted_at.unwrap(), first_accepted_at);
    }

    #[tokio::test]
    async fn test_revoked_invitation_cannot_be_accepted() {
        let store = MemoryStore::new();
        let (organization, _) = store.create_organization(org("acme")).await.unwrap();

        let created = store
            .create_invitation(invitation(&organization.id, "a@b.com", "tok-1"))
            .await
            .unwrap();
        store.expire_invitation(&created.id).await.unwrap();

        let err = store
            .activate_membership(&AcceptCredential::Token("tok-1".into()), "user-9")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 410);
    }

    #[tokio::test]
    async fn test_expired_by_clock_invitation_rejected() {
        let store = MemoryStore::new();
        let (organization, _) = store.create_organization(org("acme")).await.unwrap();

        let mut create = invitation(&organization.id, "a@b.com", "tok-1");
        create.expires_at = Utc::now() - Duration::minutes(1);
        let created = store.create_invitation(create).await.unwrap();

        let err = store
            .activate_membership(&AcceptCredential::Token("tok-1".into()), "user-9")
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 410);

        let stored = store
            .get_invitation_by_id(&created.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, InvitationStatus::Expired);
    }

    #[tokio::test]
    async fn test_token_activation_consumes_matching_pending_membership() {
        let store = MemoryStore::new();
        let (organization, _) = store.create_organization(org("acme")).await.unwrap();

        let pending = store
            .upsert_membership(CreateMembership::pending(
                &organization.id,
                "a@b.com",
                Role::Admin,
                "code-1",
            ))
            .await
            .unwrap();
        store
            .create_invitation(invitation(&organization.id, "a@b.com", "tok-1"))
            .await
            .unwrap();

        let membership = store
            .activate_membership(&AcceptCredential::Token("tok-1".into()), "user-9")
            .await
            .unwrap();

        // The pending row was activated, not duplicated.
        assert_eq!(membership.id, pending.id);
        assert_eq!(membership.role, Role::Admin);
        assert_eq!(
            store
                .list_organization_memberships(&organization.id)
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_remove_membership_policy() {
        let store = MemoryStore::new();
        let (organization, owner) = store.create_organization(org("acme")).await.unwrap();
        let agent = store
            .upsert_membership(CreateMembership::active(&organization.id, "user-2", Role::Agent))
            .await
            .unwrap();

        let owner_req = Requester::new("founder-1", Role::Owner);
        let agent_req = Requester::new("user-2", Role::Agent);

        // Agents cannot remove members.
        let err = store
            .remove_membership(&owner.id, &agent_req)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 403);

        // Self-removal is an invalid operation even for owners.
        let err = store
            .remove_membership(&owner.id, &owner_req)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        store.remove_membership(&agent.id, &owner_req).await.unwrap();
        assert!(store.find_active_memberships("user-2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cannot_remove_or_demote_last_owner() {
        let store = MemoryStore::new();
        let (organization, owner) = store.create_organization(org("acme")).await.unwrap();
        let admin_req = Requester::new("user-2", Role::Admin);
        store
            .upsert_membership(CreateMembership::active(&organization.id, "user-2", Role::Admin))
            .await
            .unwrap();

        let err = store
            .remove_membership(&owner.id, &admin_req)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        let err = store
            .change_role(&owner.id, Role::Agent, &admin_req)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);

        // Promoting a second owner unblocks the demotion.
        let second = store
            .upsert_membership(CreateMembership::active(&organization.id, "user-3", Role::Agent))
            .await
            .unwrap();
        store
            .change_role(&second.id, Role::Owner, &admin_req)
            .await
            .unwrap();
        let demoted = store
            .change_role(&owner.id, Role::Admin, &admin_req)
            .await
            .unwrap();
        assert_eq!(demoted.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_multiple_active_memberships_are_all_reported() {
        let store = MemoryStore::new();
        let (first, _) = store.create_organization(org("acme")).await.unwrap();
        let (second, _) = store
            .create_organization(CreateOrganization::new("Beta", "beta", "founder-2"))
            .await
            .unwrap();
        store
            .upsert_membership(CreateMembership::active(&second.id, "founder-1", Role::Agent))
            .await
            .unwrap();

        let active = store.find_active_memberships("founder-1").await.unwrap();
        assert_eq!(active.len(), 2);
        let orgs: Vec<_> = active.iter().map(|m| m.organization_id.as_str()).collect();
        assert!(orgs.contains(&first.id.as_str()));
        assert!(orgs.contains(&second.id.as_str()));
    }

    #[tokio::test]
    async fn test_concurrent_invitations_one_wins() {
        let store = Arc::new(MemoryStore::new());
        let (organization, _) = store.create_organization(org("acme")).await.unwrap();

        let a = tokio::spawn({
            let store = store.clone();
            let create = invitation(&organization.id, "race@b.com", "tok-a");
            async move { store.create_invitation(create).await }
        });
        let b = tokio::spawn({
            let store = store.clone();
            let create = invitation(&organization.id, "race@b.com", "tok-b");
            async move { store.create_invitation(create).await }
        });

        let results = [a.await.unwrap(), b.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        let failure = results.iter().find(|r| r.is_err()).unwrap();
        assert!(matches!(
            failure.as_ref().unwrap_err(),
            TenancyError::DuplicateInvitation(_)
        ));
    }
}
