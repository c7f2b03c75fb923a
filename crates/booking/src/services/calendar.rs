//! Calendar service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::SubjectId;

use crate::error::ServiceError;

/// Result of a successful slot reservation.
#[derive(Debug, Clone)]
pub struct SlotHold {
    /// The hold ID assigned by the calendar service.
    pub hold_id: String,
}

/// Trait for calendar slot operations.
#[async_trait]
pub trait CalendarService: Send + Sync {
    /// Places a hold on the requested slot for a booking subject.
    async fn reserve_slot(&self, subject_id: SubjectId, slot: &str)
    -> Result<SlotHold, ServiceError>;

    /// Releases a previously placed hold. Releasing an unknown hold is
    /// a no-op.
    async fn release_slot(&self, hold_id: &str) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryCalendarState {
    /// slot -> hold_id
    holds_by_slot: HashMap<String, String>,
    /// hold_id -> slot
    slots_by_hold: HashMap<String, String>,
    next_id: u32,
    fail_on_reserve: bool,
}

/// In-memory calendar service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCalendarService {
    state: Arc<RwLock<InMemoryCalendarState>>,
}

impl InMemoryCalendarService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail reservations with a transient
    /// error.
    pub fn set_fail_on_reserve(&self, fail: bool) {
        self.state.write().unwrap().fail_on_reserve = fail;
    }

    /// Returns the number of active holds.
    pub fn hold_count(&self) -> usize {
        self.state.read().unwrap().slots_by_hold.len()
    }

    /// Returns true if a hold exists with the given ID.
    pub fn has_hold(&self, hold_id: &str) -> bool {
        self.state.read().unwrap().slots_by_hold.contains_key(hold_id)
    }
}

#[async_trait]
impl CalendarService for InMemoryCalendarService {
    async fn reserve_slot(
        &self,
        _subject_id: SubjectId,
        slot: &str,
    ) -> Result<SlotHold, ServiceError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_reserve {
            return Err(ServiceError::unavailable("calendar", "connection reset"));
        }
        if state.holds_by_slot.contains_key(slot) {
            return Err(ServiceError::SlotConflict(slot.to_string()));
        }

        state.next_id += 1;
        let hold_id = format!("HOLD-{:04}", state.next_id);
        state.holds_by_slot.insert(slot.to_string(), hold_id.clone());
        state.slots_by_hold.insert(hold_id.clone(), slot.to_string());

        Ok(SlotHold { hold_id })
    }

    async fn release_slot(&self, hold_id: &str) -> Result<(), ServiceError> {
        let mut state = self.state.write().unwrap();
        if let Some(slot) = state.slots_by_hold.remove(hold_id) {
            state.holds_by_slot.remove(&slot);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reserve_and_release() {
        let service = InMemoryCalendarService::new();
        let hold = service
            .reserve_slot(SubjectId::new(), "2026-09-01T10:00")
            .await
            .unwrap();
        assert_eq!(hold.hold_id, "HOLD-0001");
        assert_eq!(service.hold_count(), 1);

        service.release_slot(&hold.hold_id).await.unwrap();
        assert_eq!(service.hold_count(), 0);
    }

    #[tokio::test]
    async fn test_double_booking_conflicts() {
        let service = InMemoryCalendarService::new();
        service
            .reserve_slot(SubjectId::new(), "2026-09-01T10:00")
            .await
            .unwrap();

        let err = service
            .reserve_slot(SubjectId::new(), "2026-09-01T10:00")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::SlotConflict(_)));
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let service = InMemoryCalendarService::new();
        let hold = service
            .reserve_slot(SubjectId::new(), "2026-09-01T10:00")
            .await
            .unwrap();
        service.release_slot(&hold.hold_id).await.unwrap();
        service.release_slot(&hold.hold_id).await.unwrap();
        assert_eq!(service.hold_count(), 0);
    }
}
