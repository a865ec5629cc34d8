//! Shared harness for the service integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum_test::TestServer;

use dockpay_core::MerchantConfig;
use dockpay_service::{
    create_router, AppState, EmailMessage, MerchantRegistry, Notifier, NotifyError,
    PaymentsApi, ServiceConfig, SmsMessage,
};
use dockpay_store::MemoryStore;

pub const MERCHANTS: &str = r#"[
    {
        "id": "harbor",
        "email_name": "Harbor Cruises",
        "email_from": "tickets@harbor.test",
        "email_content": "<p>See you on board.</p>",
        "stripe_account": "acct_harbor",
        "paypal_merchant_id": "HARBORPP"
    },
    {
        "id": "lake",
        "email_name": "Lake Ferries",
        "email_from": "tickets@lake.test"
    }
]"#;

/// Notifier that records every message.
#[derive(Default)]
pub struct RecordingNotifier {
    pub emails: Mutex<Vec<EmailMessage>>,
    pub sms: Mutex<Vec<SmsMessage>>,
    email_outages: Mutex<usize>,
}

impl RecordingNotifier {
    /// Reject the next `count` emails as if `SendGrid` were down.
    pub fn fail_next_emails(&self, count: usize) {
        *self.email_outages.lock().unwrap() = count;
    }

    pub fn email_count(&self) -> usize {
        self.emails.lock().unwrap().len()
    }

    pub fn recipients(&self) -> Vec<String> {
        self.emails
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.to.email.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_email(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        let mut outages = self.email_outages.lock().unwrap();
        if *outages > 0 {
            *outages -= 1;
            return Err(NotifyError::Rejected {
                service: "sendgrid",
                status: 503,
                body: "down".into(),
            });
        }
        self.emails.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn send_sms(&self, message: &SmsMessage) -> Result<(), NotifyError> {
        self.sms.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub struct TestHarness {
    pub server: TestServer,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn merchants() -> MerchantRegistry {
    let merchants: Vec<MerchantConfig> = serde_json::from_str(MERCHANTS).unwrap();
    MerchantRegistry::new(merchants).unwrap()
}

pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        listen_addr: "127.0.0.1:0".into(),
        public_base_url: "https://dock.test".into(),
        upstream_timeout_seconds: 5,
        ..ServiceConfig::default()
    }
}

/// Build a harness. `payments` replaces the Stripe client built from `config`.
pub fn harness(config: ServiceConfig, payments: Option<Arc<dyn PaymentsApi>>) -> TestHarness {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(RecordingNotifier::default());

    let mut state = AppState::new(store.clone(), config, merchants())
        .unwrap()
        .with_notifier(notifier.clone());
    if let Some(payments) = payments {
        state = state.with_payments(payments);
    }

    let server = TestServer::new(create_router(state)).unwrap();
    TestHarness {
        server,
        store,
        notifier,
    }
}
