//! Tick-loop orchestration.
//!
//! This module owns the single-threaded execution path: one tick at a time,
//! at most one transition per tick, one persistence write whenever state
//! changed. Parallelism, if any, lives behind the operations port and is
//! invisible here.
//!
//! ## Persistence Ownership
//!
//! Two files carry durable state, each with a distinct concern:
//!
//! | File          | What it persists                                        |
//! |---------------|---------------------------------------------------------|
//! | state file    | Phase, substate, artifact set, blocking-query history   |
//! | ledger file   | Append-only decisions with confidence tiers and links   |
//!
//! The state file is the canonical source of truth for resume: a restarted
//! session loads the last snapshot and continues ticking. The ledger is an
//! audit trail; during a blocking resolve its decision is written *before*
//! the substate reverts to Active, so a crash between the two writes leaves
//! an unreferenced decision rather than a lost answer.

pub mod ops;
pub mod rules;
pub mod runner;
pub mod tick;

pub use ops::{ActionResult, ExternalOperations, LoggingOperations, OperationFailure};
pub use rules::{Action, Guard, GuardContext, TransitionRule};
pub use runner::{CancelHandle, DEFAULT_MAX_TICKS, Orchestrator};
pub use tick::{PendingResolution, RunOutcome, StopReason, TickResult};
