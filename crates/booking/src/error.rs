//! Failures reported by downstream booking services.

use engine::ActivityError;
use thiserror::Error;

/// Error from a downstream service call.
///
/// Conflicts and declines are business outcomes that waiting cannot
/// fix; `Unavailable` is transient and worth retrying.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("slot conflict: {0}")]
    SlotConflict(String),

    #[error("payment declined: {0}")]
    PaymentDeclined(String),

    #[error("booking not found: {0}")]
    BookingNotFound(String),

    #[error("{service} unavailable: {message}")]
    Unavailable {
        service: &'static str,
        message: String,
    },
}

impl ServiceError {
    pub fn unavailable(service: &'static str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            service,
            message: message.into(),
        }
    }
}

impl From<ServiceError> for ActivityError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable { .. } => ActivityError::Retryable(err.to_string()),
            _ => ActivityError::Fatal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_maps_to_retryable() {
        let err: ActivityError = ServiceError::unavailable("records", "connection reset").into();
        assert!(err.is_retryable());
    }

    #[test]
    fn decline_maps_to_fatal() {
        let err: ActivityError =
            ServiceError::PaymentDeclined("insufficient funds".to_string()).into();
        assert!(!err.is_retryable());
        assert_eq!(err.failure_reason(), "fatal_error");
    }
}
