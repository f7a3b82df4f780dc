//! Blocking-query lifecycle: enter, time out, resolve.
//!
//! A blocking query pauses forward progress until an external resolver
//! answers it or its timeout elapses. Resolution is the one place the core
//! writes to the decision ledger on its own: every human answer becomes a
//! canonical decision before the substate reverts to Active, so a crash
//! between the two leaves an audit-trail decision, never a lost answer.

use crate::clock::Clock;
use crate::errors::BlockingError;
use crate::ledger::{Category, Confidence, DecisionInput, DecisionLedger, Source};
use crate::state::model::{BlockingRecord, ProtocolState, ProtocolStateSnapshot, Substate};

/// What the caller wants to ask.
#[derive(Debug, Clone)]
pub struct BlockingRequest {
    pub query: String,
    pub options: Option<Vec<String>>,
    pub timeout_ms: Option<u64>,
}

impl BlockingRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            options: None,
            timeout_ms: None,
        }
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Timeout classification for a blocking record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutStatus {
    NotTimedOut,
    TimedOut { elapsed_ms: u64 },
}

/// An answer offered for the live blocking query.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub response: String,
    pub allow_custom_response: bool,
}

/// Swap the Active substate for a Blocking one and append the matching
/// record to the snapshot. The phase is unchanged.
pub fn enter_blocking(
    snapshot: &mut ProtocolStateSnapshot,
    request: BlockingRequest,
    clock: &dyn Clock,
) -> Result<(), BlockingError> {
    if !snapshot.state.can_transition() {
        return Err(BlockingError::NotActive);
    }

    let blocked_at = clock.now();
    let id = snapshot.next_blocking_id(snapshot.state.phase);
    snapshot.blocking_queries.push(BlockingRecord {
        id,
        phase: snapshot.state.phase,
        query: request.query.clone(),
        blocked_at,
        resolved: false,
        timeout_ms: request.timeout_ms,
        resolved_at: None,
        response: None,
    });
    snapshot.state.substate = Substate::Blocking {
        query: request.query,
        blocked_at,
        options: request.options,
        timeout_ms: request.timeout_ms,
    };
    Ok(())
}

/// Classify whether a blocking record has exceeded its timeout.
///
/// The boundary is inclusive: at exactly `blockedAt + timeoutMs` the record
/// counts as timed out. Records without a timeout never time out.
pub fn check_timeout(record: &BlockingRecord, clock: &dyn Clock) -> TimeoutStatus {
    let Some(timeout_ms) = record.timeout_ms else {
        return TimeoutStatus::NotTimedOut;
    };
    let elapsed_ms = (clock.now() - record.blocked_at).num_milliseconds().max(0) as u64;
    if elapsed_ms >= timeout_ms {
        TimeoutStatus::TimedOut { elapsed_ms }
    } else {
        TimeoutStatus::NotTimedOut
    }
}

/// Resolve the live blocking query.
///
/// The response must be one of the recorded options, or any non-empty string
/// when custom responses are allowed. The ledger decision is appended before
/// the record is marked resolved; if the append fails the record stays
/// unresolved. Returns the state with the substate reverted to Active.
pub fn resolve_blocking(
    state: &ProtocolState,
    record: &mut BlockingRecord,
    resolution: &Resolution,
    ledger: &mut DecisionLedger,
    clock: &dyn Clock,
) -> Result<ProtocolState, BlockingError> {
    if record.resolved {
        return Err(BlockingError::AlreadyResolved {
            id: record.id.clone(),
        });
    }

    let options = match &state.substate {
        Substate::Blocking { options, .. } => options.as_deref(),
        _ => None,
    };
    let response = resolution.response.as_str();
    let listed = options.is_some_and(|opts| opts.iter().any(|o| o.as_str() == response));
    if !listed {
        if !resolution.allow_custom_response {
            if options.is_some() {
                return Err(BlockingError::InvalidOption {
                    response: response.to_string(),
                });
            }
            return Err(BlockingError::CustomNotAllowed);
        }
        if response.trim().is_empty() {
            return Err(BlockingError::InvalidOption {
                response: response.to_string(),
            });
        }
    }

    let decision = DecisionInput::new(
        Category::Blocking,
        response,
        Source::HumanResolution,
        Confidence::Canonical,
        record.phase.into(),
    )
    .with_human_query_id(record.id.clone());
    ledger.append(decision, clock)?;

    record.resolved = true;
    record.resolved_at = Some(clock.now());
    record.response = Some(response.to_string());

    Ok(ProtocolState::new(state.phase, Substate::active()))
}
