//! Session resolution: from a raw authenticated identity to the caller's
//! active organization and role.
//!
//! The resolver is the single writer of [`OrgState`]; the route guard and
//! any other readers get snapshots. A monotonic epoch ties each resolution
//! to the identity-change event that triggered it, so a slow lookup started
//! for an earlier identity can never overwrite state written for a later
//! one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use tenancy_core::store::MembershipStore;
use tenancy_core::types::{Identity, Membership, Organization, Role};

/// An organization the identity could act under, with the role it holds.
#[derive(Debug, Clone)]
pub struct OrgCandidate {
    pub organization: Organization,
    pub role: Role,
}

/// Resolution state for the current identity.
#[derive(Debug, Clone, Default)]
pub enum OrgState {
    /// Resolution has not completed; only a neutral loading view may render.
    #[default]
    Unresolved,
    /// No identity is signed in.
    Unauthenticated,
    /// Identity resolved but no single organization selected. Zero
    /// candidates means the identity belongs nowhere yet; more than one
    /// means an organization-selection step is required.
    NoOrganization { candidates: Vec<OrgCandidate> },
    /// Identity resolved to exactly one organization membership.
    Active { organization: Organization, role: Role },
}

impl OrgState {
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved)
    }

    pub fn active_organization(&self) -> Option<&Organization> {
        match self {
            Self::Active { organization, .. } => Some(organization),
            _ => None,
        }
    }
}

/// Resolves membership state on every identity change.
pub struct SessionResolver<S> {
    store: Arc<S>,
    state: RwLock<OrgState>,
    epoch: AtomicU64,
}

impl<S: MembershipStore> SessionResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            state: RwLock::new(OrgState::Unresolved),
            epoch: AtomicU64::new(0),
        }
    }

    /// Snapshot of the current state.
    pub async fn state(&self) -> OrgState {
        self.state.read().await.clone()
    }

    /// Handle an identity change event: re-resolve and publish the result,
    /// unless a newer event superseded this one while the lookup was in
    /// flight.
    pub async fn resolve(&self, identity: Option<&Identity>) -> OrgState {
        let epoch = self.begin().await;

        let next = match identity {
            None => OrgState::Unauthenticated,
            Some(identity) => self.lookup(identity).await,
        };

        self.apply(epoch, next.clone()).await;
        next
    }

    /// Pick one organization out of a multi-membership candidate set.
    pub async fn select_organization(
        &self,
        identity: &Identity,
        organization_id: &str,
    ) -> OrgState {
        let epoch = self.begin().await;

        let next = match self.store.get_membership(organization_id, &identity.id).await {
            Ok(Some(membership)) => self.state_for(&[membership]).await,
            Ok(None) => {
                tracing::warn!(
                    identity = %identity.id,
                    organization = %organization_id,
                    "selected organization without an active membership"
                );
                OrgState::NoOrganization { candidates: vec![] }
            }
            Err(err) => self.degrade(&identity.id, err),
        };

        self.apply(epoch, next.clone()).await;
        next
    }

    /// Start a new resolution epoch. The published state drops back to
    /// `Unresolved` so readers render the neutral loading view until the
    /// matching `apply`.
    async fn begin(&self) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.write().await = OrgState::Unresolved;
        epoch
    }

    /// Publish `next` only if no newer epoch has started. Returns whether
    /// the state was applied.
    async fn apply(&self, epoch: u64, next: OrgState) -> bool {
        let mut state = self.state.write().await;
        if self.epoch.load(Ordering::SeqCst) != epoch {
            // Superseded by a later identity change; drop the stale result.
            return false;
        }
        *state = next;
        true
    }

    async fn lookup(&self, identity: &Identity) -> OrgState {
        match self.store.find_active_memberships(&identity.id).await {
            Ok(memberships) => self.state_for(&memberships).await,
            Err(err) => self.degrade(&identity.id, err),
        }
    }

    async fn state_for(&self, memberships: &[Membership]) -> OrgState {
        let mut candidates = Vec::with_capacity(memberships.len());
        for membership in memberships {
            match self
                .store
                .get_organization_by_id(&membership.organization_id)
                .await
            {
                Ok(Some(organization)) if organization.active => candidates.push(OrgCandidate {
                    organization,
                    role: membership.role,
                }),
                Ok(_) => {}
                Err(err) => {
                    return self.degrade(membership.user_id.as_deref().unwrap_or("?"), err);
                }
            }
        }

        if candidates.len() == 1 {
            let candidate = candidates.remove(0);
            OrgState::Active {
                organization: candidate.organization,
                role: candidate.role,
            }
        } else {
            OrgState::NoOrganization { candidates }
        }
    }

    /// A failed lookup under-privileges to the safe default instead of
    /// blocking the UI; the caller may retry on the next identity event.
    fn degrade(&self, identity_id: &str, err: tenancy_core::TenancyError) -> OrgState {
        tracing::warn!(identity = %identity_id, error = %err, "membership lookup failed; degrading to no-organization");
        OrgState::NoOrganization { candidates: vec![] }
    }
}
