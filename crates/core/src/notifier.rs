use async_trait::async_trait;

use crate::error::TenancyResult;

/// External collaborator that delivers acceptance links (email or an
/// equivalent channel). Failures map to `TenancyError::Notifier` and never
/// roll back the pending record they were delivering for - resend retries
/// delivery only.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn deliver(&self, to: &str, subject: &str, link: &str) -> TenancyResult<()>;
}

/// Development notifier that logs deliveries instead of sending them.
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn deliver(&self, to: &str, subject: &str, link: &str) -> TenancyResult<()> {
        tracing::info!("[NOTIFY] To: {to} | Subject: {subject} | Link: {link}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_console_notifier_delivers() {
        let notifier = ConsoleNotifier;
        let result = notifier
            .deliver(
                "user@example.com",
                "You've been invited",
                "https://app.example.com/auth/accept-invite?code=abc",
            )
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_trait_object_works() {
        let notifier: Box<dyn Notifier> = Box::new(ConsoleNotifier);
        assert!(notifier.deliver("a@b.com", "Hi", "link").await.is_ok());
    }
}
