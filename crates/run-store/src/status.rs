//! Run lifecycle state machine.

use serde::{Deserialize, Serialize};

/// The status of a workflow run in its lifecycle.
///
/// State transitions:
/// ```text
/// Running ──┬──► AwaitingSignal ──► Running
///           ├──► Retrying ───────► Running
///           ├──► Paused ─────────► Running
///           ├──► Completed
///           └──► Failed ──► DeadLettered ──► Running (manual retry)
///
/// Running | AwaitingSignal | Paused | Failed ──► Cancelled
/// ```
///
/// `Failed` is normally transient: the engine moves through it to
/// `DeadLettered` in the same invocation. A process crash between the
/// two writes strands the run in `Failed`, so cancel accepts it as an
/// operator escape hatch (compensations are idempotent, re-running the
/// stack is safe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The executor is advancing through the activity list.
    #[default]
    Running,

    /// Suspended at an async step, waiting for an external signal.
    AwaitingSignal,

    /// A retryable failure occurred; waiting for the scheduler to
    /// re-invoke once `next_retry_at` has passed.
    Retrying,

    /// Operator hold; no compensation has run.
    Paused,

    /// All activities completed (terminal state).
    Completed,

    /// Terminal activity failure; compensation is in progress.
    Failed,

    /// Compensation ran after an operator cancel (terminal state).
    Cancelled,

    /// Parked in the dead-letter sink awaiting operator intervention.
    /// Terminal until reopened by a manual retry.
    DeadLettered,
}

impl RunStatus {
    /// Returns true if a signal can resume the run in this status.
    pub fn can_receive_signal(&self) -> bool {
        matches!(self, RunStatus::AwaitingSignal)
    }

    /// Returns true if `retry_now` is valid in this status.
    pub fn can_retry_now(&self) -> bool {
        matches!(self, RunStatus::Retrying | RunStatus::DeadLettered)
    }

    /// Returns true if the run can be cancelled in this status.
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            RunStatus::Running | RunStatus::AwaitingSignal | RunStatus::Paused | RunStatus::Failed
        )
    }

    /// Returns true if the run can be paused in this status.
    pub fn can_pause(&self) -> bool {
        matches!(self, RunStatus::Running)
    }

    /// Returns true if the run can be unpaused in this status.
    pub fn can_unpause(&self) -> bool {
        matches!(self, RunStatus::Paused)
    }

    /// Returns true if the compensation stack can be manually re-run.
    pub fn can_compensate_manually(&self) -> bool {
        matches!(
            self,
            RunStatus::Failed | RunStatus::Cancelled | RunStatus::DeadLettered
        )
    }

    /// Returns true if this is a terminal status.
    ///
    /// `DeadLettered` is terminal until reopened by an explicit operator
    /// retry, which is the only mutation permitted on a terminal record.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Cancelled | RunStatus::DeadLettered
        )
    }

    /// Returns the status name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::AwaitingSignal => "awaiting_signal",
            RunStatus::Retrying => "retrying",
            RunStatus::Paused => "paused",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::DeadLettered => "dead_lettered",
        }
    }

    /// Parses a status from its string name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "awaiting_signal" => Some(RunStatus::AwaitingSignal),
            "retrying" => Some(RunStatus::Retrying),
            "paused" => Some(RunStatus::Paused),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            "cancelled" => Some(RunStatus::Cancelled),
            "dead_lettered" => Some(RunStatus::DeadLettered),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [RunStatus; 8] = [
        RunStatus::Running,
        RunStatus::AwaitingSignal,
        RunStatus::Retrying,
        RunStatus::Paused,
        RunStatus::Completed,
        RunStatus::Failed,
        RunStatus::Cancelled,
        RunStatus::DeadLettered,
    ];

    #[test]
    fn test_default_status_is_running() {
        assert_eq!(RunStatus::default(), RunStatus::Running);
    }

    #[test]
    fn test_can_receive_signal() {
        for status in ALL {
            assert_eq!(
                status.can_receive_signal(),
                status == RunStatus::AwaitingSignal
            );
        }
    }

    #[test]
    fn test_can_retry_now() {
        assert!(RunStatus::Retrying.can_retry_now());
        assert!(RunStatus::DeadLettered.can_retry_now());
        assert!(!RunStatus::Running.can_retry_now());
        assert!(!RunStatus::Completed.can_retry_now());
        assert!(!RunStatus::Failed.can_retry_now());
    }

    #[test]
    fn test_can_cancel() {
        assert!(RunStatus::Running.can_cancel());
        assert!(RunStatus::AwaitingSignal.can_cancel());
        assert!(RunStatus::Paused.can_cancel());
        assert!(RunStatus::Failed.can_cancel());
        assert!(!RunStatus::Retrying.can_cancel());
        assert!(!RunStatus::Completed.can_cancel());
        assert!(!RunStatus::Cancelled.can_cancel());
        assert!(!RunStatus::DeadLettered.can_cancel());
    }

    #[test]
    fn test_pause_unpause() {
        assert!(RunStatus::Running.can_pause());
        assert!(!RunStatus::Paused.can_pause());
        assert!(RunStatus::Paused.can_unpause());
        assert!(!RunStatus::Running.can_unpause());
    }

    #[test]
    fn test_terminal_states() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(RunStatus::DeadLettered.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::AwaitingSignal.is_terminal());
        assert!(!RunStatus::Retrying.is_terminal());
        assert!(!RunStatus::Paused.is_terminal());
        assert!(!RunStatus::Failed.is_terminal());
    }

    #[test]
    fn test_as_str_parse_roundtrip() {
        for status in ALL {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("bogus"), None);
    }

    #[test]
    fn test_serde_uses_snake_case() {
        let json = serde_json::to_string(&RunStatus::AwaitingSignal).unwrap();
        assert_eq!(json, "\"awaiting_signal\"");
        let back: RunStatus = serde_json::from_str("\"dead_lettered\"").unwrap();
        assert_eq!(back, RunStatus::DeadLettered);
    }
}
