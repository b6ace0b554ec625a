//! Test doubles for the external collaborators. Exported so integration
//! tests and embedders' test suites can drive the dispatch flows without a
//! live identity provider or delivery channel.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use tenancy_core::error::{TenancyError, TenancyResult};
use tenancy_core::identity::{GeneratedLink, IdentityProvider, LinkKind};
use tenancy_core::notifier::Notifier;
use tenancy_core::types::Identity;

/// In-memory identity provider. Identities registered via
/// [`StubProvider::register`] are findable by email; access tokens added
/// via [`StubProvider::authenticate`] resolve to their identity.
#[derive(Default)]
pub struct StubProvider {
    identities: Mutex<HashMap<String, Identity>>,
    tokens: Mutex<HashMap<String, Identity>>,
    links: Mutex<Vec<GeneratedLink>>,
    fail_links: Mutex<bool>,
}

impl StubProvider {
    pub fn register(&self, identity: Identity) {
        self.identities
            .lock()
            .unwrap()
            .insert(identity.email.to_lowercase(), identity);
    }

    pub fn authenticate(&self, token: impl Into<String>, identity: Identity) {
        self.tokens.lock().unwrap().insert(token.into(), identity);
    }

    /// Make every subsequent `generate_link` call fail.
    pub fn break_links(&self) {
        *self.fail_links.lock().unwrap() = true;
    }

    pub fn generated_links(&self) -> Vec<GeneratedLink> {
        self.links.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityProvider for StubProvider {
    async fn sign_up(&self, email: &str, _password: &str) -> TenancyResult<Identity> {
        let identity = Identity::new(uuid::Uuid::new_v4().to_string(), email);
        self.register(identity.clone());
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, _password: &str) -> TenancyResult<Identity> {
        self.identities
            .lock()
            .unwrap()
            .get(&email.to_lowercase())
            .cloned()
            .ok_or(TenancyError::Unauthenticated)
    }

    async fn get_current_identity(&self, access_token: &str) -> TenancyResult<Option<Identity>> {
        Ok(self.tokens.lock().unwrap().get(access_token).cloned())
    }

    async fn send_recovery_link(&self, _email: &str) -> TenancyResult<()> {
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> TenancyResult<Option<Identity>> {
        Ok(self
            .identities
            .lock()
            .unwrap()
            .get(&email.to_lowercase())
            .cloned())
    }

    async fn generate_link(
        &self,
        kind: LinkKind,
        email: &str,
        redirect_to: &str,
        metadata: serde_json::Value,
    ) -> TenancyResult<GeneratedLink> {
        if *self.fail_links.lock().unwrap() {
            return Err(TenancyError::notifier("link generation unavailable"));
        }
        let link = GeneratedLink {
            kind,
            email: email.to_string(),
            redirect_to: redirect_to.to_string(),
            metadata,
        };
        self.links.lock().unwrap().push(link.clone());
        Ok(link)
    }
}

/// Notifier that records deliveries instead of sending them.
#[derive(Default)]
pub struct RecordingNotifier {
    deliveries: Mutex<Vec<RecordedDelivery>>,
    fail: Mutex<bool>,
}

#[derive(Debug, Clone)]
pub struct RecordedDelivery {
    pub to: String,
    pub subject: String,
    pub link: String,
}

impl RecordingNotifier {
    /// Make every subsequent delivery fail.
    pub fn break_delivery(&self) {
        *self.fail.lock().unwrap() = true;
    }

    /// Undo [`RecordingNotifier::break_delivery`].
    pub fn restore_delivery(&self) {
        *self.fail.lock().unwrap() = false;
    }

    pub fn deliveries(&self) -> Vec<RecordedDelivery> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, to: &str, subject: &str, link: &str) -> TenancyResult<()> {
        if *self.fail.lock().unwrap() {
            return Err(TenancyError::notifier("delivery channel down"));
        }
        self.deliveries.lock().unwrap().push(RecordedDelivery {
            to: to.to_string(),
            subject: subject.to_string(),
            link: link.to_string(),
        });
        Ok(())
    }
}
