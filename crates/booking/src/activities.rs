//! Activity and compensation handlers for booking fulfillment.
//!
//! Handlers communicate through the run context: each one reads the
//! keys written by its predecessors and records the external IDs it
//! obtained, so its compensation can find them later. Compensations
//! are idempotent; re-running one against an already-undone effect is
//! a no-op.

use std::sync::Arc;

use async_trait::async_trait;
use common::{ContextEnvelope, SubjectId};
use engine::{Activity, ActivityError};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::services::{BookingRepository, CalendarService, NotificationService, PaymentService};

/// Default charge when the caller did not set `amount_cents`.
const DEFAULT_AMOUNT_CENTS: i64 = 5000;

fn subject_id_from(context: &ContextEnvelope) -> Result<SubjectId, ActivityError> {
    let raw = context
        .get_str("subject_id")
        .ok_or_else(|| ActivityError::Validation("subject_id missing from context".to_string()))?;
    let uuid = Uuid::parse_str(raw)
        .map_err(|_| ActivityError::Validation(format!("subject_id is not a uuid: {raw}")))?;
    Ok(SubjectId::from_uuid(uuid))
}

fn required_str(context: &ContextEnvelope, key: &str) -> Result<String, ActivityError> {
    context
        .get_str(key)
        .map(str::to_string)
        .ok_or_else(|| ActivityError::Validation(format!("{key} missing from context")))
}

/// Places a calendar hold for the subject's requested slot.
pub struct ReserveSlot {
    calendar: Arc<dyn CalendarService>,
}

impl ReserveSlot {
    pub fn new(calendar: Arc<dyn CalendarService>) -> Self {
        Self { calendar }
    }
}

#[async_trait]
impl Activity for ReserveSlot {
    async fn execute(&self, context: &mut ContextEnvelope) -> Result<Value, ActivityError> {
        let subject_id = subject_id_from(context)?;
        let slot = context
            .get_str("slot")
            .map(str::to_string)
            .unwrap_or_else(|| format!("slot-{subject_id}"));

        let hold = self.calendar.reserve_slot(subject_id, &slot).await?;
        context.set("slot", json!(slot));
        context.set("hold_id", json!(hold.hold_id));

        Ok(json!({ "hold_id": hold.hold_id, "slot": slot }))
    }
}

/// Releases the calendar hold placed by [`ReserveSlot`].
pub struct ReleaseSlot {
    calendar: Arc<dyn CalendarService>,
}

impl ReleaseSlot {
    pub fn new(calendar: Arc<dyn CalendarService>) -> Self {
        Self { calendar }
    }
}

#[async_trait]
impl Activity for ReleaseSlot {
    async fn execute(&self, context: &mut ContextEnvelope) -> Result<Value, ActivityError> {
        let hold_id = required_str(context, "hold_id")?;
        self.calendar.release_slot(&hold_id).await?;
        Ok(json!({ "released": hold_id }))
    }
}

/// Initiates the payment authorization.
///
/// The provider confirms capture out of band; success here only means
/// the charge was accepted for processing, so the run suspends for the
/// `payment_completed` signal afterwards.
pub struct AuthorizePayment {
    payments: Arc<dyn PaymentService>,
}

impl AuthorizePayment {
    pub fn new(payments: Arc<dyn PaymentService>) -> Self {
        Self { payments }
    }
}

#[async_trait]
impl Activity for AuthorizePayment {
    async fn execute(&self, context: &mut ContextEnvelope) -> Result<Value, ActivityError> {
        let subject_id = subject_id_from(context)?;
        let amount_cents = context
            .get("amount_cents")
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_AMOUNT_CENTS);
        if amount_cents <= 0 {
            return Err(ActivityError::Validation(format!(
                "amount_cents must be positive, got {amount_cents}"
            )));
        }

        let auth = self.payments.authorize(subject_id, amount_cents).await?;
        context.set("authorization_id", json!(auth.authorization_id));

        Ok(json!({
            "authorization_id": auth.authorization_id,
            "amount_cents": amount_cents,
        }))
    }
}

/// Refunds the authorization obtained by [`AuthorizePayment`].
pub struct RefundPayment {
    payments: Arc<dyn PaymentService>,
}

impl RefundPayment {
    pub fn new(payments: Arc<dyn PaymentService>) -> Self {
        Self { payments }
    }
}

#[async_trait]
impl Activity for RefundPayment {
    async fn execute(&self, context: &mut ContextEnvelope) -> Result<Value, ActivityError> {
        let authorization_id = required_str(context, "authorization_id")?;
        self.payments.refund(&authorization_id).await?;
        Ok(json!({ "refunded": authorization_id }))
    }
}

/// Writes the durable booking record once the hold and payment exist.
pub struct CreateBookingRecord {
    records: Arc<dyn BookingRepository>,
}

impl CreateBookingRecord {
    pub fn new(records: Arc<dyn BookingRepository>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl Activity for CreateBookingRecord {
    async fn execute(&self, context: &mut ContextEnvelope) -> Result<Value, ActivityError> {
        let subject_id = subject_id_from(context)?;
        let hold_id = required_str(context, "hold_id")?;
        let authorization_id = required_str(context, "authorization_id")?;

        let record = self
            .records
            .create(subject_id, &hold_id, &authorization_id)
            .await?;
        context.set("booking_id", json!(record.booking_id));

        Ok(json!({ "booking_id": record.booking_id }))
    }
}

/// Deletes the record written by [`CreateBookingRecord`].
pub struct DeleteBookingRecord {
    records: Arc<dyn BookingRepository>,
}

impl DeleteBookingRecord {
    pub fn new(records: Arc<dyn BookingRepository>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl Activity for DeleteBookingRecord {
    async fn execute(&self, context: &mut ContextEnvelope) -> Result<Value, ActivityError> {
        let booking_id = required_str(context, "booking_id")?;
        self.records.delete(&booking_id).await?;
        Ok(json!({ "deleted": booking_id }))
    }
}

/// Sends the customer confirmation. Has no compensation.
pub struct SendConfirmation {
    notifications: Arc<dyn NotificationService>,
}

impl SendConfirmation {
    pub fn new(notifications: Arc<dyn NotificationService>) -> Self {
        Self { notifications }
    }
}

#[async_trait]
impl Activity for SendConfirmation {
    async fn execute(&self, context: &mut ContextEnvelope) -> Result<Value, ActivityError> {
        let subject_id = subject_id_from(context)?;
        let booking_id = required_str(context, "booking_id")?;

        self.notifications
            .send_confirmation(subject_id, &booking_id)
            .await?;

        Ok(json!({ "notified": booking_id }))
    }
}
