//! Typed error hierarchy for the Criticality orchestrator.
//!
//! Four enums cover the four subsystems:
//! - `TransitionError` — rejected phase transitions; never leaks out of the
//!   tick classifier
//! - `BlockingError` — blocking-query lifecycle failures
//! - `LedgerError` — decision ledger append/supersede failures
//! - `PersistenceError` — state and ledger file I/O, parsing and validation

use crate::phase::{Artifact, Phase};
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors from `transition()` in the state machine.
#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("cannot transition from a non-active substate")]
    InactiveSubstate,

    #[error("no edge from {from} to {to} in the transition graph")]
    InvalidEdge { from: Phase, to: Phase },

    #[error("missing required artifacts for {target}: {}", format_artifacts(.missing))]
    MissingArtifacts {
        target: Phase,
        missing: BTreeSet<Artifact>,
    },

    #[error("protocol is in a terminal state")]
    TerminalState,
}

fn format_artifacts(artifacts: &BTreeSet<Artifact>) -> String {
    artifacts
        .iter()
        .map(|a| a.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors from the blocking-query lifecycle.
#[derive(Debug, Error)]
pub enum BlockingError {
    #[error("blocking query {id} is already resolved")]
    AlreadyResolved { id: String },

    #[error("response {response:?} is not one of the offered options")]
    InvalidOption { response: String },

    #[error("custom responses are not allowed for this query")]
    CustomNotAllowed,

    #[error("cannot enter a blocking substate from a non-active substate")]
    NotActive,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Errors from decision ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("invalid decision: {}", errors.join("; "))]
    Validation { errors: Vec<String> },

    #[error("duplicate decision id {id}")]
    DuplicateDecisionId { id: String },

    #[error("decision {id} is canonical and requires an explicit override to supersede")]
    CanonicalOverride { id: String },

    #[error("decision {id} not found")]
    DecisionNotFound { id: String },

    #[error("cannot supersede decision {id}: {reason}")]
    InvalidSupersede { id: String, reason: String },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Errors from state and ledger file persistence.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("file error at {path}: {source}")]
    File {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corruption error: {0}")]
    Corruption(String),
}

impl PersistenceError {
    /// The flat error-kind tag surfaced to callers and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PersistenceError::Parse(_) => "parse_error",
            PersistenceError::Schema(_) => "schema_error",
            PersistenceError::Validation(_) => "validation_error",
            PersistenceError::File { .. } => "file_error",
            PersistenceError::Corruption(_) => "corruption_error",
        }
    }
}
