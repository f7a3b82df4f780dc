//! Protocol state machine.
//!
//! This module owns the pure, synchronous heart of the orchestrator:
//!
//! | Layer            | What it defines                                          |
//! |------------------|----------------------------------------------------------|
//! | `model.rs`       | `Substate`, `ProtocolState`, snapshot and blocking record|
//! | `transitions.rs` | Static phase graph, required-artifact sets, `transition` |
//!
//! Nothing here performs I/O or reads the wall clock; timestamps come in
//! through the [`crate::clock::Clock`] port and persistence lives in
//! [`crate::persistence`].

pub mod model;
pub mod transitions;

pub use model::{BlockingRecord, ProtocolState, ProtocolStateSnapshot, Substate};
pub use transitions::{failure_targets, forward_targets, required_artifacts, transition};
