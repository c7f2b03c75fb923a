//! Downstream service traits and in-memory fakes.

pub mod calendar;
pub mod notification;
pub mod payment;
pub mod records;

pub use calendar::{CalendarService, InMemoryCalendarService, SlotHold};
pub use notification::{InMemoryNotificationService, NotificationService};
pub use payment::{InMemoryPaymentService, PaymentAuthorization, PaymentService};
pub use records::{BookingRecord, BookingRepository, InMemoryBookingRepository};
