//! # Tenancy API
//!
//! Application-facing services over `tenancy-core`: session resolution,
//! route guarding, the invitation lifecycle and the server-side invite
//! dispatch flow, plus the axum HTTP surface for the dispatch endpoints.

pub mod dispatcher;
pub mod guard;
pub mod http;
pub mod invitations;
pub mod session;
pub mod testing;

pub use dispatcher::{DispatchOutcome, InviteDispatcher, InviteMember};
pub use guard::{Decision, decide, routes};
pub use http::{ApiError, AppState, router};
pub use invitations::{InvitationService, accept_url, generate_invite_code, generate_token};
pub use session::{OrgCandidate, OrgState, SessionResolver};
