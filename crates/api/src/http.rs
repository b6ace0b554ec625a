//! HTTP surface for the dispatch endpoints.
//!
//! Both endpoints are browser-called, so every response carries permissive
//! CORS headers and `OPTIONS` preflights are answered unconditionally.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{FromRequest, FromRequestParts, Request, State};
use axum::http::HeaderValue;
use axum::http::request::Parts;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use validator::Validate;

use tenancy_core::config::AppConfig;
use tenancy_core::error::TenancyError;
use tenancy_core::identity::IdentityProvider;
use tenancy_core::notifier::Notifier;
use tenancy_core::store::MembershipStore;
use tenancy_core::types::{Identity, Role};

use crate::dispatcher::{InviteDispatcher, InviteMember};
use crate::invitations::InvitationService;

// -----------------------------------------------------------------------
// State
// -----------------------------------------------------------------------

/// Shared state behind the dispatch endpoints.
pub struct AppState<S, P, N> {
    pub dispatcher: Arc<InviteDispatcher<S, P, N>>,
    pub invitations: Arc<InvitationService<S, P, N>>,
    pub provider: Arc<P>,
}

impl<S, P, N> AppState<S, P, N>
where
    S: MembershipStore,
    P: IdentityProvider,
    N: Notifier,
{
    pub fn new(store: Arc<S>, provider: Arc<P>, notifier: Arc<N>, config: AppConfig) -> Self {
        Self {
            dispatcher: Arc::new(InviteDispatcher::new(
                store.clone(),
                provider.clone(),
                notifier.clone(),
                config.clone(),
            )),
            invitations: Arc::new(InvitationService::new(store, provider.clone(), notifier, config)),
            provider,
        }
    }
}

impl<S, P, N> Clone for AppState<S, P, N> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            invitations: self.invitations.clone(),
            provider: self.provider.clone(),
        }
    }
}

// -----------------------------------------------------------------------
// Error mapping
// -----------------------------------------------------------------------

/// HTTP wrapper for [`TenancyError`]: status from the error taxonomy, body
/// from its standardized JSON shape.
#[derive(Debug)]
pub struct ApiError(pub TenancyError);

impl From<TenancyError> for ApiError {
    fn from(err: TenancyError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.0.status_code() >= 500 {
            tracing::error!(error = %self.0, "request failed");
        }
        let status = axum::http::StatusCode::from_u16(self.0.status_code())
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.0.to_body())).into_response()
    }
}

// -----------------------------------------------------------------------
// Extractors
// -----------------------------------------------------------------------

/// Deserialize JSON and run `validator::Validate` on it.
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| TenancyError::validation(format!("Invalid JSON: {e}")))?;

        value
            .validate()
            .map_err(|e| TenancyError::validation(e.to_string()))?;

        Ok(ValidatedJson(value))
    }
}

/// The identity behind the `Authorization: Bearer <token>` header, resolved
/// through the identity provider.
pub struct Caller(pub Identity);

impl<S, P, N> FromRequestParts<AppState<S, P, N>> for Caller
where
    S: MembershipStore,
    P: IdentityProvider,
    N: Notifier,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S, P, N>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(TenancyError::Unauthenticated)?;

        let identity = state
            .provider
            .get_current_identity(token)
            .await?
            .ok_or(TenancyError::Unauthenticated)?;

        Ok(Caller(identity))
    }
}

// -----------------------------------------------------------------------
// Wire types
// -----------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct InviteMemberBody {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub organization_id: String,
    /// Generated server-side when omitted.
    #[validate(length(min = 1))]
    pub invite_code: Option<String>,
    pub role: Role,
    #[serde(rename = "redirectBaseUrl")]
    pub redirect_base_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InviteMemberResponse {
    pub message: String,
    pub url: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendInvitationBody {
    #[validate(length(min = 1))]
    pub invitation_id: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendInvitationResponse {
    pub success: bool,
    pub url: String,
}

// -----------------------------------------------------------------------
// Handlers
// -----------------------------------------------------------------------

async fn invite_member<S, P, N>(
    State(state): State<AppState<S, P, N>>,
    Caller(caller): Caller,
    ValidatedJson(body): ValidatedJson<InviteMemberBody>,
) -> Result<Json<InviteMemberResponse>, ApiError>
where
    S: MembershipStore,
    P: IdentityProvider,
    N: Notifier,
{
    let outcome = state
        .dispatcher
        .dispatch(
            InviteMember {
                email: body.email,
                organization_id: body.organization_id,
                invite_code: body.invite_code,
                role: body.role,
                redirect_base_url: body.redirect_base_url,
            },
            &caller,
        )
        .await?;

    Ok(Json(InviteMemberResponse {
        message: outcome.message,
        url: outcome.accept_url,
    }))
}

async fn send_invitation<S, P, N>(
    State(state): State<AppState<S, P, N>>,
    ValidatedJson(body): ValidatedJson<SendInvitationBody>,
) -> Result<Json<SendInvitationResponse>, ApiError>
where
    S: MembershipStore,
    P: IdentityProvider,
    N: Notifier,
{
    let url = state
        .invitations
        .resend(&body.invitation_id, body.base_url.as_deref())
        .await?;

    Ok(Json(SendInvitationResponse { success: true, url }))
}

/// Preflights are answered 200 before any auth or validation runs.
async fn preflight() -> Response {
    axum::http::StatusCode::OK.into_response()
}

/// Permissive CORS headers, applied to every response including errors.
async fn with_cors_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "access-control-allow-origin",
        HeaderValue::from_static("*"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("authorization, x-client-info, apikey, content-type"),
    );
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("POST, OPTIONS"),
    );
    response
}

/// Build the dispatch router.
pub fn router<S, P, N>(state: AppState<S, P, N>) -> Router
where
    S: MembershipStore,
    P: IdentityProvider,
    N: Notifier,
{
    Router::new()
        .route(
            "/functions/invite-member",
            post(invite_member::<S, P, N>).options(preflight),
        )
        .route(
            "/functions/send-invitation",
            post(send_invitation::<S, P, N>).options(preflight),
        )
        .layer(middleware::from_fn(with_cors_headers))
        .with_state(state)
}
