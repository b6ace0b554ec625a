use crate::error::{TenancyError, TenancyResult};

/// Application configuration, read once at process start.
///
/// Missing values are a fatal startup error, never a per-request one.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the external identity provider.
    pub provider_url: String,
    /// Service credential used for privileged provider calls.
    pub service_key: String,
    /// Public application base URL used when building acceptance links.
    pub public_base_url: String,
    /// Invitation lifetime in seconds (default: 7 days).
    pub invitation_expires_in: u64,
}

impl AppConfig {
    pub fn new(
        provider_url: impl Into<String>,
        service_key: impl Into<String>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            provider_url: provider_url.into(),
            service_key: service_key.into(),
            public_base_url: public_base_url.into(),
            invitation_expires_in: 60 * 60 * 24 * 7,
        }
    }

    /// Read configuration from the environment:
    /// `PROVIDER_URL`, `PROVIDER_SERVICE_KEY`, `PUBLIC_BASE_URL`, and the
    /// optional `INVITATION_EXPIRES_IN` (seconds).
    pub fn from_env() -> TenancyResult<Self> {
        let mut config = Self::new(
            require_env("PROVIDER_URL")?,
            require_env("PROVIDER_SERVICE_KEY")?,
            require_env("PUBLIC_BASE_URL")?,
        );

        if let Ok(raw) = std::env::var("INVITATION_EXPIRES_IN") {
            config.invitation_expires_in = raw.parse().map_err(|_| {
                TenancyError::config(format!("INVITATION_EXPIRES_IN is not a number: {raw}"))
            })?;
        }

        Ok(config)
    }

    pub fn invitation_expires_in(mut self, seconds: u64) -> Self {
        self.invitation_expires_in = seconds;
        self
    }
}

fn require_env(name: &str) -> TenancyResult<String> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(TenancyError::config(format!(
            "Missing environment variable: {name}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_seven_days() {
        let config = AppConfig::new("https://id.example.com", "service-key", "https://app.example.com");
        assert_eq!(config.invitation_expires_in, 60 * 60 * 24 * 7);
    }

    #[test]
    fn test_builder_override() {
        let config = AppConfig::new("https://id.example.com", "k", "https://app.example.com")
            .invitation_expires_in(3600);
        assert_eq!(config.invitation_expires_in, 3600);
    }

    #[test]
    fn test_missing_env_is_fatal() {
        // Not set in the test environment.
        let err = require_env("TENANCY_TEST_UNSET_VARIABLE").unwrap_err();
        assert_eq!(err.status_code(), 500);
    }
}
