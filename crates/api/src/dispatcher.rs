//! Server-side invite dispatch: authorization, idempotency, pending record
//! creation and secure-link delivery, in that order.

use std::sync::Arc;

use serde_json::json;

use tenancy_core::config::AppConfig;
use tenancy_core::error::{TenancyError, TenancyResult};
use tenancy_core::identity::{IdentityProvider, LinkKind};
use tenancy_core::notifier::Notifier;
use tenancy_core::store::MembershipStore;
use tenancy_core::types::{AcceptCredential, CreateMembership, Identity, Organization, Role};

use crate::invitations::{accept_url, generate_invite_code};

const INVITE_SUBJECT: &str = "You've been invited to join an organization";

/// A dispatch request, already validated at the HTTP boundary.
#[derive(Debug, Clone)]
pub struct InviteMember {
    pub email: String,
    pub organization_id: String,
    /// Single-use code carried on the pending membership row; generated
    /// server-side when the request omits one.
    pub invite_code: Option<String>,
    pub role: Role,
    /// Overrides the configured public base URL for the acceptance link.
    pub redirect_base_url: Option<String>,
}

/// Successful dispatch result.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub message: String,
    pub accept_url: String,
    pub link_kind: LinkKind,
}

/// Orchestrates the invite-member flow end to end.
pub struct InviteDispatcher<S, P, N> {
    store: Arc<S>,
    provider: Arc<P>,
    notifier: Arc<N>,
    config: AppConfig,
}

impl<S, P, N> InviteDispatcher<S, P, N>
where
    S: MembershipStore,
    P: IdentityProvider,
    N: Notifier,
{
    pub fn new(store: Arc<S>, provider: Arc<P>, notifier: Arc<N>, config: AppConfig) -> Self {
        Self {
            store,
            provider,
            notifier,
            config,
        }
    }

    /// Invite `request.email` into the organization on behalf of `caller`.
    ///
    /// The pending membership is committed before delivery is attempted, so
    /// a delivery failure leaves a resendable record rather than rolling
    /// back the invite.
    pub async fn dispatch(
        &self,
        request: InviteMember,
        caller: &Identity,
    ) -> TenancyResult<DispatchOutcome> {
        let email = request.email.trim().to_lowercase();

        let caller_membership = self
            .store
            .get_membership(&request.organization_id, &caller.id)
            .await?
            .ok_or_else(|| {
                TenancyError::forbidden("You are not a member of this organization")
            })?;
        if !caller_membership.role.can_manage_members() {
            return Err(TenancyError::forbidden(
                "Only owners and admins can invite members",
            ));
        }

        let organization = self
            .store
            .get_organization_by_id(&request.organization_id)
            .await?
            .ok_or_else(|| TenancyError::not_found("Organization not found"))?;

        let registered = self.provider.find_by_email(&email).await?;

        // Idempotency checks before any write.
        if let Some(existing) = &registered
            && self
                .store
                .get_membership(&organization.id, &existing.id)
                .await?
                .is_some()
        {
            return Err(TenancyError::conflict(
                "User is already a member of this organization",
            ));
        }
        if self
            .store
            .get_pending_membership_by_email(&organization.id, &email)
            .await?
            .is_some()
            || self
                .store
                .get_pending_invitation(&organization.id, &email)
                .await?
                .is_some()
        {
            return Err(TenancyError::duplicate_invitation(
                "This email has already been invited to this organization",
            ));
        }

        if let Some(limit) = organization.tier.member_limit() {
            let occupied = self
                .store
                .list_organization_memberships(&organization.id)
                .await?
                .len();
            if occupied >= limit {
                return Err(TenancyError::validation(
                    "Organization has reached its membership limit",
                ));
            }
        }

        let invite_code = request.invite_code.unwrap_or_else(generate_invite_code);
        self.store
            .upsert_membership(CreateMembership::pending(
                &organization.id,
                &email,
                request.role,
                &invite_code,
            ))
            .await?;

        let (url, kind) = self
            .deliver_code_link(
                &organization,
                &email,
                &invite_code,
                request.role,
                request.redirect_base_url.as_deref(),
            )
            .await?;

        tracing::info!(
            organization = %organization.id,
            kind = %kind,
            "invitation dispatched"
        );

        Ok(DispatchOutcome {
            message: "Invitation sent successfully".to_string(),
            accept_url: url,
            link_kind: kind,
        })
    }

    /// Retry delivery for a code-keyed pending membership whose original
    /// dispatch failed after the record was committed. Only the branch,
    /// link generation and delivery are repeated; no record is written.
    pub async fn resend(
        &self,
        membership_id: &str,
        base_url: Option<&str>,
    ) -> TenancyResult<DispatchOutcome> {
        let membership = self
            .store
            .get_membership_by_id(membership_id)
            .await?
            .ok_or_else(|| TenancyError::not_found("Pending membership not found"))?;
        if !membership.is_pending() {
            return Err(TenancyError::validation("Membership is already active"));
        }
        let (Some(email), Some(invite_code)) =
            (membership.invited_email.clone(), membership.invite_code.clone())
        else {
            return Err(TenancyError::internal(
                "Pending membership is missing its invite credential",
            ));
        };

        let organization = self
            .store
            .get_organization_by_id(&membership.organization_id)
            .await?
            .ok_or_else(|| TenancyError::not_found("Organization not found"))?;

        let (url, kind) = self
            .deliver_code_link(&organization, &email, &invite_code, membership.role, base_url)
            .await?;

        tracing::info!(
            organization = %organization.id,
            kind = %kind,
            "invitation re-dispatched"
        );

        Ok(DispatchOutcome {
            message: "Invitation re-sent successfully".to_string(),
            accept_url: url,
            link_kind: kind,
        })
    }

    async fn deliver_code_link(
        &self,
        organization: &Organization,
        email: &str,
        invite_code: &str,
        role: Role,
        base_url: Option<&str>,
    ) -> TenancyResult<(String, LinkKind)> {
        let base = base_url.unwrap_or(&self.config.public_base_url);
        let url = accept_url(base, &AcceptCredential::Code(invite_code.to_string()));

        // Existing identities must never be issued a fresh credential.
        let kind = match self.provider.find_by_email(email).await? {
            Some(_) => LinkKind::MagicLink,
            None => LinkKind::Signup,
        };
        let link = self
            .provider
            .generate_link(
                kind,
                email,
                &url,
                json!({
                    "invite_code": invite_code,
                    "organization_id": organization.id,
                    "organization_name": organization.name,
                    "role": role,
                }),
            )
            .await
            .map_err(delivery_error)?;

        self.notifier
            .deliver(email, INVITE_SUBJECT, &link.redirect_to)
            .await
            .map_err(delivery_error)?;

        Ok((url, kind))
    }
}

/// Delivery failures surface as notifier errors; the pending membership
/// committed before delivery stays in place for a later resend.
fn delivery_error(err: TenancyError) -> TenancyError {
    match err {
        err @ TenancyError::Notifier(_) => err,
        other => TenancyError::notifier(other.to_string()),
    }
}
