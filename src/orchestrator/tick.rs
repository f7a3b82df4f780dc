//! Tick and run result types.

use crate::phase::Phase;
use chrono::{DateTime, Utc};
use std::fmt;

/// Why the loop stopped, surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Complete,
    Blocked,
    Failed,
    NoValidTransition,
    ExternalError,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Complete => "COMPLETE",
            StopReason::Blocked => "BLOCKED",
            StopReason::Failed => "FAILED",
            StopReason::NoValidTransition => "NO_VALID_TRANSITION",
            StopReason::ExternalError => "EXTERNAL_ERROR",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of a single tick. At most one transition fires per tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickResult {
    pub transitioned: bool,
    pub should_continue: bool,
    pub stop_reason: Option<StopReason>,
    pub error: Option<String>,
}

impl TickResult {
    /// Nothing to do and nothing will change: terminal, blocked, or dead end.
    pub fn stopped(reason: StopReason) -> Self {
        Self {
            transitioned: false,
            should_continue: false,
            stop_reason: Some(reason),
            error: None,
        }
    }

    /// The loop halts on a failed substate (pre-existing or produced this
    /// tick).
    pub fn failed(error: impl Into<String>, transitioned: bool) -> Self {
        Self {
            transitioned,
            should_continue: false,
            stop_reason: Some(StopReason::Failed),
            error: Some(error.into()),
        }
    }

    /// A transition fired; the loop continues unless the target is terminal.
    pub fn advanced(target: Phase) -> Self {
        Self {
            transitioned: true,
            should_continue: !target.is_terminal(),
            stop_reason: target.is_terminal().then_some(StopReason::Complete),
            error: None,
        }
    }

    /// No transition fired, but artifacts may still arrive.
    pub fn waiting() -> Self {
        Self {
            transitioned: false,
            should_continue: true,
            stop_reason: None,
            error: None,
        }
    }

    /// A pending resolution was consumed and the substate is Active again.
    pub fn resolved() -> Self {
        Self {
            transitioned: true,
            should_continue: true,
            stop_reason: None,
            error: None,
        }
    }
}

/// Summary of a full `run()` loop.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub stop_reason: StopReason,
    pub ticks: u64,
    pub transitions: u64,
    pub error: Option<String>,
}

/// A response submitted for the live blocking query, waiting for the next
/// tick to consume it.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingResolution {
    pub response: String,
    pub resolved_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_reason_wire_names() {
        assert_eq!(StopReason::Complete.to_string(), "COMPLETE");
        assert_eq!(StopReason::NoValidTransition.to_string(), "NO_VALID_TRANSITION");
        assert_eq!(StopReason::ExternalError.to_string(), "EXTERNAL_ERROR");
    }

    #[test]
    fn test_advanced_to_terminal_phase_stops() {
        let result = TickResult::advanced(Phase::Complete);
        assert!(result.transitioned);
        assert!(!result.should_continue);
        assert_eq!(result.stop_reason, Some(StopReason::Complete));
    }

    #[test]
    fn test_advanced_to_working_phase_continues() {
        let result = TickResult::advanced(Phase::Lattice);
        assert!(result.transitioned);
        assert!(result.should_continue);
        assert_eq!(result.stop_reason, None);
    }

    #[test]
    fn test_waiting_keeps_looping() {
        let result = TickResult::waiting();
        assert!(!result.transitioned);
        assert!(result.should_continue);
    }
}
