//! Route guarding: a pure decision over (identity, organization state,
//! requested route) that the HTTP layer and any frontend shell can apply
//! uniformly.

use tenancy_core::types::Identity;

use crate::session::OrgState;

/// Well-known application routes.
pub mod routes {
    pub const ROOT: &str = "/";
    pub const DASHBOARD: &str = "/dashboard";
    pub const SIGN_IN: &str = "/auth/sign-in";
    pub const SIGN_UP: &str = "/auth/sign-up";
    pub const RESET_PASSWORD: &str = "/auth/reset-password";
    pub const CALLBACK: &str = "/auth/callback";
    pub const CREATE_ORG: &str = "/auth/create-org";
    pub const JOIN: &str = "/auth/join";
    pub const ACCEPT_INVITE: &str = "/auth/accept-invite";
    pub const SELECT_ORG: &str = "/auth/select-org";
}

/// Outcome of a guard evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Resolution in flight; render only a neutral loading view.
    Loading,
    /// The requested route may render.
    Allow,
    /// Navigate elsewhere. `return_to` carries the originally requested
    /// route when it should be resumed after the redirect completes.
    RedirectTo {
        path: &'static str,
        return_to: Option<String>,
    },
}

impl Decision {
    fn redirect(path: &'static str) -> Self {
        Self::RedirectTo {
            path,
            return_to: None,
        }
    }

    fn redirect_with_return(path: &'static str, return_to: &str) -> Self {
        Self::RedirectTo {
            path,
            return_to: Some(return_to.to_string()),
        }
    }
}

/// Routes reachable without a signed-in identity.
fn is_public(route: &str) -> bool {
    matches!(
        route,
        routes::SIGN_IN
            | routes::SIGN_UP
            | routes::RESET_PASSWORD
            | routes::CALLBACK
            | routes::ACCEPT_INVITE
    )
}

/// Routes a signed-in identity without an organization may use to get one.
fn is_onboarding(route: &str) -> bool {
    matches!(
        route,
        routes::CREATE_ORG | routes::JOIN | routes::ACCEPT_INVITE | routes::SELECT_ORG
    )
}

/// Decide what happens when `route` is requested.
///
/// `pending_invite_token` is set while an acceptance flow is mid-flight;
/// it suppresses the create-org redirect so the flow is not torn down.
pub fn decide(
    identity: Option<&Identity>,
    org_state: &OrgState,
    route: &str,
    pending_invite_token: Option<&str>,
) -> Decision {
    if identity.is_none() {
        if is_public(route) {
            return Decision::Allow;
        }
        return Decision::redirect_with_return(routes::SIGN_IN, route);
    }

    match org_state {
        // Identity present but resolution not landed yet (including the
        // transient window where the resolver still reports the previous
        // unauthenticated state).
        OrgState::Unresolved | OrgState::Unauthenticated => Decision::Loading,
        OrgState::NoOrganization { candidates } => {
            if is_onboarding(route) || pending_invite_token.is_some() {
                return Decision::Allow;
            }
            if candidates.len() > 1 {
                return Decision::redirect(routes::SELECT_ORG);
            }
            Decision::redirect(routes::CREATE_ORG)
        }
        OrgState::Active { .. } => {
            if route == routes::ROOT {
                return Decision::redirect(routes::DASHBOARD);
            }
            Decision::Allow
        }
    }
}
