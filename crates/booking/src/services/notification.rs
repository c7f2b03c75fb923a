//! Notification service trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::SubjectId;

use crate::error::ServiceError;

/// Trait for outbound customer notifications.
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Sends the booking confirmation.
    async fn send_confirmation(
        &self,
        subject_id: SubjectId,
        booking_id: &str,
    ) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryNotificationState {
    sent: Vec<(SubjectId, String)>,
    fail_on_send: bool,
}

/// In-memory notification service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationService {
    state: Arc<RwLock<InMemoryNotificationState>>,
}

impl InMemoryNotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail sends with a transient error.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    /// Returns the number of confirmations sent.
    pub fn sent_count(&self) -> usize {
        self.state.read().unwrap().sent.len()
    }
}

#[async_trait]
impl NotificationService for InMemoryNotificationService {
    async fn send_confirmation(
        &self,
        subject_id: SubjectId,
        booking_id: &str,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_send {
            return Err(ServiceError::unavailable("notifications", "smtp timeout"));
        }

        state.sent.push((subject_id, booking_id.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_confirmation() {
        let service = InMemoryNotificationService::new();
        service
            .send_confirmation(SubjectId::new(), "BOOK-0001")
            .await
            .unwrap();
        assert_eq!(service.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_on_send() {
        let service = InMemoryNotificationService::new();
        service.set_fail_on_send(true);

        let err = service
            .send_confirmation(SubjectId::new(), "BOOK-0001")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable { .. }));
        assert_eq!(service.sent_count(), 0);
    }
}
