//! Booking record repository trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::SubjectId;

use crate::error::ServiceError;

/// A persisted booking record.
#[derive(Debug, Clone)]
pub struct BookingRecord {
    pub booking_id: String,
    pub subject_id: SubjectId,
    pub hold_id: String,
    pub authorization_id: String,
}

/// Trait for the booking system of record.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Creates the durable booking record.
    async fn create(
        &self,
        subject_id: SubjectId,
        hold_id: &str,
        authorization_id: &str,
    ) -> Result<BookingRecord, ServiceError>;

    /// Deletes a booking record. Deleting an unknown record is a no-op.
    async fn delete(&self, booking_id: &str) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryBookingState {
    bookings: HashMap<String, BookingRecord>,
    next_id: u32,
    fail_on_create: bool,
}

/// In-memory booking repository for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBookingRepository {
    state: Arc<RwLock<InMemoryBookingState>>,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the repository to fail creates with a transient
    /// error.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state.write().unwrap().fail_on_create = fail;
    }

    /// Returns the number of stored bookings.
    pub fn booking_count(&self) -> usize {
        self.state.read().unwrap().bookings.len()
    }

    /// Returns true if a booking exists with the given ID.
    pub fn has_booking(&self, booking_id: &str) -> bool {
        self.state.read().unwrap().bookings.contains_key(booking_id)
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn create(
        &self,
        subject_id: SubjectId,
        hold_id: &str,
        authorization_id: &str,
    ) -> Result<BookingRecord, ServiceError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_create {
            return Err(ServiceError::unavailable("records", "database unavailable"));
        }

        state.next_id += 1;
        let booking_id = format!("BOOK-{:04}", state.next_id);
        let record = BookingRecord {
            booking_id: booking_id.clone(),
            subject_id,
            hold_id: hold_id.to_string(),
            authorization_id: authorization_id.to_string(),
        };
        state.bookings.insert(booking_id, record.clone());

        Ok(record)
    }

    async fn delete(&self, booking_id: &str) -> Result<(), ServiceError> {
        let mut state = self.state.write().unwrap();
        state.bookings.remove(booking_id);
        Ok(())
    }
}
