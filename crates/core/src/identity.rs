//! External identity provider collaborator.
//!
//! The core never touches credentials itself; it calls the provider through
//! these abstract operations and reads back [`Identity`] snapshots.

use async_trait::async_trait;

use crate::error::TenancyResult;
use crate::types::Identity;

/// Class of secure link the provider generates for an invitee.
///
/// `Signup` creates a credential for a brand-new identity; `MagicLink` is
/// passwordless entry for an already-registered one, so no new credential
/// is ever created for an existing identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Signup,
    MagicLink,
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signup => write!(f, "signup"),
            Self::MagicLink => write!(f, "magiclink"),
        }
    }
}

/// A provider-generated secure link.
#[derive(Debug, Clone)]
pub struct GeneratedLink {
    pub kind: LinkKind,
    pub email: String,
    /// The acceptance URL the link redirects to after verification.
    pub redirect_to: String,
    /// Metadata embedded in the link (invite code, organization, role).
    pub metadata: serde_json::Value,
}

/// Operations delegated to the external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Register a new identity.
    async fn sign_up(&self, email: &str, password: &str) -> TenancyResult<Identity>;

    /// Authenticate an existing identity.
    async fn sign_in(&self, email: &str, password: &str) -> TenancyResult<Identity>;

    /// Resolve the identity behind an access token, if any.
    async fn get_current_identity(&self, access_token: &str) -> TenancyResult<Option<Identity>>;

    /// Ask the provider to deliver a credential-recovery link.
    async fn send_recovery_link(&self, email: &str) -> TenancyResult<()>;

    /// Look up a registered identity by email. Drives the
    /// new-identity/existing-identity branch in the dispatcher.
    async fn find_by_email(&self, email: &str) -> TenancyResult<Option<Identity>>;

    /// Generate a secure link of the given kind, redirecting to
    /// `redirect_to` and carrying `metadata` through verification.
    async fn generate_link(
        &self,
        kind: LinkKind,
        email: &str,
        redirect_to: &str,
        metadata: serde_json::Value,
    ) -> TenancyResult<GeneratedLink>;
}
