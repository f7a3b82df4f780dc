//! Core state types: substates, protocol state, snapshot, blocking records.

use crate::clock::Clock;
use crate::phase::{Artifact, Phase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The operational condition inside a phase.
///
/// Serialized with a `kind` tag so the state file reads as
/// `{"kind": "Blocking", "query": ..., "blockedAt": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Substate {
    /// Normal forward progress.
    Active {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        operation: Option<String>,
    },
    /// Waiting on an externally answered question.
    #[serde(rename_all = "camelCase")]
    Blocking {
        query: String,
        blocked_at: DateTime<Utc>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },
    /// A failure that halts the tick loop.
    #[serde(rename_all = "camelCase")]
    Failed {
        error: String,
        failed_at: DateTime<Utc>,
        recoverable: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<serde_json::Map<String, serde_json::Value>>,
    },
}

impl Substate {
    /// A plain active substate with no task annotation.
    pub fn active() -> Self {
        Substate::Active {
            task: None,
            operation: None,
        }
    }

    /// An active substate annotated with the current task and operation.
    pub fn active_with(task: impl Into<String>, operation: impl Into<String>) -> Self {
        Substate::Active {
            task: Some(task.into()),
            operation: Some(operation.into()),
        }
    }

    /// A blocking substate stamped through the injected clock.
    pub fn blocking(
        query: impl Into<String>,
        options: Option<Vec<String>>,
        timeout_ms: Option<u64>,
        clock: &dyn Clock,
    ) -> Self {
        Substate::Blocking {
            query: query.into(),
            blocked_at: clock.now(),
            options,
            timeout_ms,
        }
    }

    /// A failed substate stamped through the injected clock.
    pub fn failed(
        error: impl Into<String>,
        recoverable: bool,
        code: Option<String>,
        clock: &dyn Clock,
    ) -> Self {
        Substate::Failed {
            error: error.into(),
            failed_at: clock.now(),
            recoverable,
            code,
            context: None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Substate::Active { .. })
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self, Substate::Blocking { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Substate::Failed { .. })
    }
}

/// The pair of phase and substate the orchestrator classifies over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolState {
    pub phase: Phase,
    pub substate: Substate,
}

impl ProtocolState {
    pub fn new(phase: Phase, substate: Substate) -> Self {
        Self { phase, substate }
    }

    /// The state a fresh protocol session starts in.
    pub fn initial() -> Self {
        Self::new(Phase::Ignition, Substate::active())
    }

    pub fn is_active(&self) -> bool {
        self.substate.is_active()
    }

    pub fn is_blocking(&self) -> bool {
        self.substate.is_blocking()
    }

    pub fn is_failed(&self) -> bool {
        self.substate.is_failed()
    }

    /// Terminal for the tick loop: the terminal phase, or any failed substate.
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal() || self.substate.is_failed()
    }

    /// Whether `transition()` could legally fire from here.
    pub fn can_transition(&self) -> bool {
        self.is_active() && !self.is_terminal()
    }
}

/// One blocking query, kept in the snapshot for history even after
/// resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockingRecord {
    pub id: String,
    pub phase: Phase,
    pub query: String,
    pub blocked_at: DateTime<Utc>,
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
}

/// Everything the orchestrator persists between ticks: the state pair, the
/// accumulated artifact set, and the blocking-query history.
///
/// The artifact set only ever grows within a session; workers that roll back
/// never emit artifacts in the first place.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolStateSnapshot {
    pub state: ProtocolState,
    pub artifacts: BTreeSet<Artifact>,
    pub blocking_queries: Vec<BlockingRecord>,
}

impl ProtocolStateSnapshot {
    pub fn new(state: ProtocolState) -> Self {
        Self {
            state,
            artifacts: BTreeSet::new(),
            blocking_queries: Vec::new(),
        }
    }

    /// A snapshot at Ignition/Active with no artifacts and no history.
    pub fn initial() -> Self {
        Self::new(ProtocolState::initial())
    }

    /// Record produced artifacts. Adding an artifact twice is a no-op.
    pub fn add_artifacts(&mut self, artifacts: impl IntoIterator<Item = Artifact>) {
        self.artifacts.extend(artifacts);
    }

    pub fn has_artifact(&self, artifact: Artifact) -> bool {
        self.artifacts.contains(&artifact)
    }

    /// The unresolved blocking record the current Blocking substate refers
    /// to, if any. Records are appended in order, so the last unresolved one
    /// is the live query.
    pub fn active_blocking_record(&self) -> Option<&BlockingRecord> {
        self.blocking_queries.iter().rev().find(|r| !r.resolved)
    }

    /// Mutable access to the live blocking record.
    pub fn active_blocking_record_mut(&mut self) -> Option<&mut BlockingRecord> {
        self.blocking_queries.iter_mut().rev().find(|r| !r.resolved)
    }

    /// Allocate a unique blocking-record id for the given phase.
    ///
    /// The first query in a phase gets `blocking-<phase>`; repeat queries get
    /// a numeric suffix so ids stay unique across the session.
    pub fn next_blocking_id(&self, phase: Phase) -> String {
        let base = format!("blocking-{}", phase.tag());
        let existing = self
            .blocking_queries
            .iter()
            .filter(|r| r.id == base || r.id.starts_with(&format!("{base}-")))
            .count();
        if existing == 0 {
            base
        } else {
            format!("{base}-{}", existing + 1)
        }
    }
}
