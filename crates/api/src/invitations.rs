//! Invitation lifecycle: issue, resend, revoke, accept.
//!
//! Tokens and invite codes come from the OS random source and are encoded
//! URL-safe so they can ride in a query string unescaped.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde_json::Value;

use tenancy_core::config::AppConfig;
use tenancy_core::error::{TenancyError, TenancyResult};
use tenancy_core::identity::{IdentityProvider, LinkKind};
use tenancy_core::notifier::Notifier;
use tenancy_core::store::MembershipStore;
use tenancy_core::types::{
    AcceptCredential, CreateInvitation, Identity, Invitation, Membership, Role,
};

const INVITE_SUBJECT: &str = "You've been invited to join an organization";

/// Generate a 256-bit invitation token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a short invite code for pending membership rows.
pub fn generate_invite_code() -> String {
    let mut bytes = [0u8; 9];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Build the acceptance URL for either credential shape.
pub fn accept_url(base_url: &str, credential: &AcceptCredential) -> String {
    format!(
        "{}/auth/accept-invite?{}",
        base_url.trim_end_matches('/'),
        credential.query_pair()
    )
}

/// Manages token-keyed invitations end to end.
pub struct InvitationService<S, P, N> {
    store: Arc<S>,
    provider: Arc<P>,
    notifier: Arc<N>,
    config: AppConfig,
}

impl<S, P, N> InvitationService<S, P, N>
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

    /// Create a pending invitation with a fresh token and the configured
    /// expiry. A live pending invitation for the same email surfaces as a
    /// duplicate conflict from the store.
    pub async fn issue(
        &self,
        organization_id: &str,
        email: &str,
        role: Role,
        invited_by: &str,
        metadata: Option<Value>,
    ) -> TenancyResult<Invitation> {
        let email = email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(TenancyError::validation("Invalid email address"));
        }

        let expires_at =
            Utc::now() + Duration::seconds(self.config.invitation_expires_in as i64);

        let invitation = self
            .store
            .create_invitation(CreateInvitation {
                organization_id: organization_id.to_string(),
                email,
                role,
                token: generate_token(),
                invited_by: invited_by.to_string(),
                expires_at,
                metadata,
            })
            .await?;

        tracing::info!(
            invitation = %invitation.id,
            organization = %invitation.organization_id,
            "invitation issued"
        );
        Ok(invitation)
    }

    /// Re-deliver an existing pending invitation's link. The token and
    /// expiry are left untouched; only delivery is retried.
    pub async fn resend(
        &self,
        invitation_id: &str,
        base_url: Option<&str>,
    ) -> TenancyResult<String> {
        let invitation = self
            .store
            .get_invitation_by_id(invitation_id)
            .await?
            .ok_or_else(|| TenancyError::not_found("Invitation not found"))?;

        if !invitation.is_pending() {
            return Err(TenancyError::validation(format!(
                "Invitation is {}",
                invitation.status
            )));
        }

        let organization = self
            .store
            .get_organization_by_id(&invitation.organization_id)
            .await?
            .ok_or_else(|| TenancyError::not_found("Organization not found"))?;

        let base = base_url.unwrap_or(&self.config.public_base_url);
        let url = accept_url(base, &AcceptCredential::Token(invitation.token.clone()));

        // Existing identities get passwordless entry; the link must never
        // mint a new credential for them.
        let kind = match self.provider.find_by_email(&invitation.email).await? {
            Some(_) => LinkKind::MagicLink,
            None => LinkKind::Signup,
        };
        let link = self
            .provider
            .generate_link(
                kind,
                &invitation.email,
                &url,
                serde_json::json!({
                    "invitation_id": invitation.id,
                    "organization_id": organization.id,
                    "organization_name": organization.name,
                    "role": invitation.role,
                }),
            )
            .await
            .map_err(into_delivery_error)?;

        self.notifier
            .deliver(&invitation.email, INVITE_SUBJECT, &link.redirect_to)
            .await
            .map_err(into_delivery_error)?;

        Ok(url)
    }

    /// Revoke a pending invitation by forcing it to the expired terminal
    /// state. Accepted or already-expired invitations cannot be revoked.
    pub async fn revoke(&self, invitation_id: &str) -> TenancyResult<Invitation> {
        let invitation = self.store.expire_invitation(invitation_id).await?;
        tracing::info!(invitation = %invitation.id, "invitation revoked");
        Ok(invitation)
    }

    /// Activate membership for the signed-in identity using either
    /// credential shape.
    pub async fn accept(
        &self,
        credential: &AcceptCredential,
        identity: &Identity,
    ) -> TenancyResult<Membership> {
        self.store.activate_membership(credential, &identity.id).await
    }

    pub async fn list(&self, organization_id: &str) -> TenancyResult<Vec<Invitation>> {
        self.store.list_organization_invitations(organization_id).await
    }
}

/// Provider and notifier failures during delivery map to the notifier
/// error class; the pending record they were delivering for stays put.
fn into_delivery_error(err: TenancyError) -> TenancyError {
    match err {
        err @ TenancyError::Notifier(_) => err,
        other => TenancyError::notifier(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingNotifier, StubProvider};
    use tenancy_core::store::MemoryStore;
    use tenancy_core::types::CreateOrganization;

    fn config() -> AppConfig {
        AppConfig::new("https://id.example.com", "service-key", "https://app.example.com")
    }

    async fn service() -> (
        InvitationService<MemoryStore, StubProvider, RecordingNotifier>,
        String,
    ) {
        let store = Arc::new(MemoryStore::new());
        let (organization, _) = store
            .create_organization(CreateOrganization::new("Acme", "acme", "u1"))
            .await
            .unwrap();
        let service = InvitationService::new(
            store,
            Arc::new(StubProvider::default()),
            Arc::new(RecordingNotifier::default()),
            config(),
        );
        (service, organization.id)
    }

    #[tokio::test]
    async fn test_issue_creates_pending_invitation_with_expiry() {
        let (service, org) = service().await;

        let invitation = service
            .issue(&org, "New@Example.com", Role::Agent, "u1", None)
            .await
            .unwrap();
        assert!(invitation.is_pending());
        assert_eq!(invitation.email, "new@example.com");
        assert!(invitation.expires_at > Utc::now() + Duration::days(6));
        assert!(invitation.expires_at <= Utc::now() + Duration::days(7));
    }

    #[tokio::test]
    async fn test_duplicate_pending_invitation_conflicts() {
        let (service, org) = service().await;

        service
            .issue(&org, "a@example.com", Role::Agent, "u1", None)
            .await
            .unwrap();
        let err = service
            .issue(&org, "a@example.com", Role::Admin, "u1", None)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn test_revoked_invitation_cannot_be_accepted() {
        let (service, org) = service().await;
        let invitation = service
            .issue(&org, "a@example.com", Role::Agent, "u1", None)
            .await
            .unwrap();

        service.revoke(&invitation.id).await.unwrap();

        let err = service
            .accept(
                &AcceptCredential::Token(invitation.token),
                &Identity::new("u2", "a@example.com"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 410);
    }

    #[tokio::test]
    async fn test_accept_activates_membership() {
        let (service, org) = service().await;
        let invitation = service
            .issue(&org, "a@example.com", Role::Admin, "u1", None)
            .await
            .unwrap();

        let membership = service
            .accept(
                &AcceptCredential::Token(invitation.token),
                &Identity::new("u2", "a@example.com"),
            )
            .await
            .unwrap();
        assert!(membership.is_active());
        assert_eq!(membership.role, Role::Admin);
        assert_eq!(membership.user_id.as_deref(), Some("u2"));
    }

    #[tokio::test]
    async fn test_resend_keeps_token_and_expiry() {
        let (service, org) = service().await;
        let invitation = service
            .issue(&org, "a@example.com", Role::Agent, "u1", None)
            .await
            .unwrap();

        let url = service.resend(&invitation.id, None).await.unwrap();
        assert_eq!(
            url,
            format!(
                "https://app.example.com/auth/accept-invite?token={}",
                invitation.token
            )
        );

        let after = service
            .store
            .get_invitation_by_id(&invitation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.token, invitation.token);
        assert_eq!(after.expires_at, invitation.expires_at);
    }

    #[tokio::test]
    async fn test_resend_non_pending_is_rejected() {
        let (service, org) = service().await;
        let invitation = service
            .issue(&org, "a@example.com", Role::Agent, "u1", None)
            .await
            .unwrap();
        service.revoke(&invitation.id).await.unwrap();

        let err = service.resend(&invitation.id, None).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn test_resend_unknown_invitation_is_not_found() {
        let (service, _) = service().await;
        let err = service.resend("missing", None).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_generated_tokens_are_unique_and_url_safe() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(a.len(), 43);
    }

    #[test]
    fn test_accept_url_shapes() {
        assert_eq!(
            accept_url("https://app.example.com/", &AcceptCredential::Code("c0de".into())),
            "https://app.example.com/auth/accept-invite?code=c0de"
        );
        assert_eq!(
            accept_url("https://app.example.com", &AcceptCredential::Token("tok".into())),
            "https://app.example.com/auth/accept-invite?token=tok"
        );
    }
}
