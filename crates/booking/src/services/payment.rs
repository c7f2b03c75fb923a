//! Payment service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::SubjectId;

use crate::error::ServiceError;

/// Result of a successful payment authorization.
#[derive(Debug, Clone)]
pub struct PaymentAuthorization {
    /// The authorization ID assigned by the payment provider.
    pub authorization_id: String,
}

/// Trait for payment operations.
///
/// `authorize` only initiates the charge; the provider confirms capture
/// asynchronously through a webhook that arrives as a run signal.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Authorizes a charge for a booking subject.
    async fn authorize(
        &self,
        subject_id: SubjectId,
        amount_cents: i64,
    ) -> Result<PaymentAuthorization, ServiceError>;

    /// Refunds a previously authorized charge. Refunding an unknown
    /// authorization is a no-op.
    async fn refund(&self, authorization_id: &str) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    authorizations: HashMap<String, (SubjectId, i64)>,
    next_id: u32,
    fail_on_authorize: bool,
}

/// In-memory payment service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentService {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to decline the next authorization.
    pub fn set_fail_on_authorize(&self, fail: bool) {
        self.state.write().unwrap().fail_on_authorize = fail;
    }

    /// Returns the number of active authorizations.
    pub fn authorization_count(&self) -> usize {
        self.state.read().unwrap().authorizations.len()
    }

    /// Returns true if an authorization exists with the given ID.
    pub fn has_authorization(&self, authorization_id: &str) -> bool {
        self.state
            .read()
            .unwrap()
            .authorizations
            .contains_key(authorization_id)
    }
}

#[async_trait]
impl PaymentService for InMemoryPaymentService {
    async fn authorize(
        &self,
        subject_id: SubjectId,
        amount_cents: i64,
    ) -> Result<PaymentAuthorization, ServiceError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_authorize {
            return Err(ServiceError::PaymentDeclined(
                "card declined by issuer".to_string(),
            ));
        }

        state.next_id += 1;
        let authorization_id = format!("AUTH-{:04}", state.next_id);
        state
            .authorizations
            .insert(authorization_id.clone(), (subject_id, amount_cents));

        Ok(PaymentAuthorization { authorization_id })
    }

    async fn refund(&self, authorization_id: &str) -> Result<(), ServiceError> {
        let mut state = self.state.write().unwrap();
        state.authorizations.remove(authorization_id);
        Ok(())
    }
}
