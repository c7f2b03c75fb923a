//! The booking fulfillment workflow definition and handler wiring.

use std::sync::Arc;

use engine::{ActivityRegistry, ActivityStep, WorkflowDefinition};
use run_store::RetryPolicy;

use crate::activities::{
    AuthorizePayment, CreateBookingRecord, DeleteBookingRecord, RefundPayment, ReleaseSlot,
    ReserveSlot, SendConfirmation,
};
use crate::services::{
    BookingRepository, CalendarService, InMemoryBookingRepository, InMemoryCalendarService,
    InMemoryNotificationService, InMemoryPaymentService, NotificationService, PaymentService,
};

pub const DEFINITION_ID: &str = "booking_fulfillment";

pub const RESERVE_SLOT: &str = "reserve_slot";
pub const RELEASE_SLOT: &str = "release_slot";
pub const AUTHORIZE_PAYMENT: &str = "authorize_payment";
pub const REFUND_PAYMENT: &str = "refund_payment";
pub const CREATE_BOOKING_RECORD: &str = "create_booking_record";
pub const DELETE_BOOKING_RECORD: &str = "delete_booking_record";
pub const SEND_CONFIRMATION: &str = "send_confirmation";

/// Signal delivered by the payment provider's webhook.
pub const PAYMENT_COMPLETED_SIGNAL: &str = "payment_completed";

/// The four-step fulfillment sequence.
///
/// Payment authorization suspends the run until the provider's capture
/// webhook arrives; confirmation has no compensation because a sent
/// notification cannot be unsent.
pub fn definition() -> WorkflowDefinition {
    WorkflowDefinition::new(
        DEFINITION_ID,
        vec![
            ActivityStep::new(RESERVE_SLOT).with_compensation(RELEASE_SLOT),
            ActivityStep::new(AUTHORIZE_PAYMENT)
                .with_compensation(REFUND_PAYMENT)
                .awaiting_signal(PAYMENT_COMPLETED_SIGNAL),
            ActivityStep::new(CREATE_BOOKING_RECORD).with_compensation(DELETE_BOOKING_RECORD),
            ActivityStep::new(SEND_CONFIRMATION),
        ],
        RetryPolicy::exponential(2000, 3),
    )
    .expect("static definition is valid")
}

/// The downstream services the workflow's handlers call.
#[derive(Clone)]
pub struct BookingServices {
    pub calendar: Arc<dyn CalendarService>,
    pub payments: Arc<dyn PaymentService>,
    pub records: Arc<dyn BookingRepository>,
    pub notifications: Arc<dyn NotificationService>,
}

impl BookingServices {
    /// Wires all four services to their in-memory implementations.
    pub fn in_memory() -> Self {
        Self {
            calendar: Arc::new(InMemoryCalendarService::new()),
            payments: Arc::new(InMemoryPaymentService::new()),
            records: Arc::new(InMemoryBookingRepository::new()),
            notifications: Arc::new(InMemoryNotificationService::new()),
        }
    }
}

/// Builds the handler registry for [`definition`].
pub fn registry(services: BookingServices) -> ActivityRegistry {
    ActivityRegistry::builder()
        .register(RESERVE_SLOT, Arc::new(ReserveSlot::new(services.calendar.clone())))
        .register(RELEASE_SLOT, Arc::new(ReleaseSlot::new(services.calendar)))
        .register(
            AUTHORIZE_PAYMENT,
            Arc::new(AuthorizePayment::new(services.payments.clone())),
        )
        .register(REFUND_PAYMENT, Arc::new(RefundPayment::new(services.payments)))
        .register(
            CREATE_BOOKING_RECORD,
            Arc::new(CreateBookingRecord::new(services.records.clone())),
        )
        .register(
            DELETE_BOOKING_RECORD,
            Arc::new(DeleteBookingRecord::new(services.records)),
        )
        .register(
            SEND_CONFIRMATION,
            Arc::new(SendConfirmation::new(services.notifications)),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_shape() {
        let def = definition();
        assert_eq!(def.id(), DEFINITION_ID);
        assert_eq!(def.steps().len(), 4);

        let authorize = &def.steps()[1];
        assert!(authorize.is_async);
        assert_eq!(authorize.signal_name.as_deref(), Some(PAYMENT_COMPLETED_SIGNAL));

        assert!(def.steps()[3].compensation.is_none());
    }

    #[test]
    fn registry_covers_every_handler_name() {
        let registry = registry(BookingServices::in_memory());
        let def = definition();
        for step in def.steps() {
            assert!(registry.contains(&step.name));
            if let Some(comp) = &step.compensation {
                assert!(registry.contains(comp));
            }
        }
    }
}
