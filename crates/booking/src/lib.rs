//! Booking fulfillment workflow built on the workflow engine.
//!
//! Reserves a calendar slot, authorizes payment (confirmed
//! asynchronously by the provider), writes the booking record and
//! sends the confirmation, compensating already-completed steps in
//! reverse order when a later step fails terminally.

pub mod activities;
pub mod error;
pub mod services;
pub mod workflow;

pub use error::ServiceError;
pub use workflow::{BookingServices, DEFINITION_ID, PAYMENT_COMPLETED_SIGNAL, definition, registry};
