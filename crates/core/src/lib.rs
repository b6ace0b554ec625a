//! # Tenancy Core
//!
//! Core abstractions for the organization membership and invitation
//! lifecycle: entities, the typed error taxonomy, the membership store
//! trait with its in-memory adapter, and the external collaborator traits
//! (identity provider, notifier).

pub mod config;
pub mod error;
pub mod identity;
pub mod notifier;
pub mod store;
pub mod types;

// Re-export commonly used items
pub use config::AppConfig;
pub use error::{StoreError, TenancyError, TenancyResult};
pub use identity::{GeneratedLink, IdentityProvider, LinkKind};
pub use notifier::{ConsoleNotifier, Notifier};
pub use store::{MembershipStore, MemoryStore, Requester};
pub use types::{
    AcceptCredential, CreateInvitation, CreateMembership, CreateOrganization, Identity,
    Invitation, InvitationStatus, Membership, MembershipKey, MembershipStatus, Organization,
    OrganizationTier, Role, validate_slug,
};
