use thiserror::Error;

/// Tenancy error types.
///
/// Each variant maps to an HTTP status code via [`TenancyError::status_code`].
/// Use [`TenancyError::to_body`] to produce the standardized JSON error body
/// returned by the dispatch endpoints: `{ "error": "...", "details": ... }`.
#[derive(Error, Debug)]
pub enum TenancyError {
    // --- 400 Bad Request ---
    #[error("{0}")]
    Validation(String),

    // --- 401 Unauthorized ---
    #[error("Authentication required")]
    Unauthenticated,

    // --- 403 Forbidden ---
    #[error("{0}")]
    Forbidden(String),

    // --- 404 Not Found ---
    #[error("{0}")]
    NotFound(String),

    // --- 409 Conflict ---
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    DuplicateInvitation(String),

    // --- 410 Gone ---
    #[error("{0}")]
    Expired(String),

    // --- 502 Bad Gateway ---
    #[error("Delivery failed: {0}")]
    Notifier(String),

    // --- 500 Internal Server Error ---
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TenancyError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Unauthenticated => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) | Self::DuplicateInvitation(_) => 409,
            Self::Expired(_) => 410,
            // Unique-constraint violations surface as conflicts, not 500s.
            Self::Store(StoreError::Constraint(_)) => 409,
            Self::Notifier(_) => 502,
            Self::Config(_) | Self::Store(_) | Self::Serialization(_) | Self::Internal(_) => 500,
        }
    }

    /// Standardized JSON error body: `{ "error": "...", "details": ... }`.
    ///
    /// Internal errors (500) use a generic message to avoid leaking details.
    pub fn to_body(&self) -> serde_json::Value {
        let message = match self.status_code() {
            500 => "Internal server error".to_string(),
            _ => self.to_string(),
        };
        match self {
            Self::DuplicateInvitation(_) => serde_json::json!({
                "error": message,
                "details": "already_invited",
            }),
            _ => serde_json::json!({ "error": message }),
        }
    }

    /// Whether the caller can recover by resending the existing invitation.
    pub fn is_recoverable_by_resend(&self) -> bool {
        matches!(
            self,
            Self::DuplicateInvitation(_) | Self::Conflict(_) | Self::Notifier(_)
        )
    }

    // --- Constructors ---

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn duplicate_invitation(message: impl Into<String>) -> Self {
        Self::DuplicateInvitation(message.into())
    }

    pub fn expired(message: impl Into<String>) -> Self {
        Self::Expired(message.into())
    }

    pub fn notifier(message: impl Into<String>) -> Self {
        Self::Notifier(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// Persistence-layer errors raised by [`MembershipStore`](crate::store::MembershipStore)
/// implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    /// Unique-constraint violation. The store enforces slug, invite code,
    /// token and (organization, identity) uniqueness at this level so that
    /// concurrent writers cannot race past an application-side check.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Transaction error: {0}")]
    Transaction(String),
}

pub type TenancyResult<T> = Result<T, TenancyError>;
