//! Phase and artifact enumerations for the Criticality protocol.
//!
//! This module provides:
//! - `Phase` — the seven stages of the protocol graph, ordered by execution
//!   sequence, with `Complete` as the terminal stage
//! - `Artifact` — the named output tokens whose presence gates transitions
//!
//! Both are closed enums serialized as the wire strings the state file uses;
//! parsing from free strings happens only at the persistence boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named stage in the protocol graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Module decomposition and type synthesis from the input specification
    Ignition,
    /// Type lattice, contracts and witness generation
    Lattice,
    /// Cross-module contradiction audit
    CompositionAudit,
    /// Function-body implementation loop
    Injection,
    /// Test generation and verification
    Mesoscopic,
    /// Complexity reduction and final packaging
    MassDefect,
    /// Terminal stage; nothing executes past this point
    Complete,
}

impl Phase {
    /// All phases in execution order.
    pub const ALL: [Phase; 7] = [
        Phase::Ignition,
        Phase::Lattice,
        Phase::CompositionAudit,
        Phase::Injection,
        Phase::Mesoscopic,
        Phase::MassDefect,
        Phase::Complete,
    ];

    /// The wire name of this phase, as it appears in the state file.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Ignition => "Ignition",
            Phase::Lattice => "Lattice",
            Phase::CompositionAudit => "CompositionAudit",
            Phase::Injection => "Injection",
            Phase::Mesoscopic => "Mesoscopic",
            Phase::MassDefect => "MassDefect",
            Phase::Complete => "Complete",
        }
    }

    /// Kebab-case tag used in blocking-record ids (`blocking-<phase>`).
    pub fn tag(&self) -> &'static str {
        match self {
            Phase::Ignition => "ignition",
            Phase::Lattice => "lattice",
            Phase::CompositionAudit => "composition-audit",
            Phase::Injection => "injection",
            Phase::Mesoscopic => "mesoscopic",
            Phase::MassDefect => "mass-defect",
            Phase::Complete => "complete",
        }
    }

    /// Check if this is the terminal phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .iter()
            .find(|p| p.as_str() == s || p.tag() == s)
            .copied()
            .ok_or_else(|| format!("unknown phase: {s}"))
    }
}

/// An opaque named output token. The orchestrator tracks which artifacts
/// exist, never their contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Artifact {
    /// The input specification
    Spec,
    /// Generated module and type skeletons
    LatticeCode,
    /// Type witnesses
    Witnesses,
    /// Function contracts
    Contracts,
    /// Composition audit report
    AuditReport,
    /// Implemented function bodies
    Implementation,
    /// Generated test suite
    Tests,
    /// The packaged final deliverable
    FinalArtifact,
}

impl Artifact {
    /// All artifact kinds, in production order.
    pub const ALL: [Artifact; 8] = [
        Artifact::Spec,
        Artifact::LatticeCode,
        Artifact::Witnesses,
        Artifact::Contracts,
        Artifact::AuditReport,
        Artifact::Implementation,
        Artifact::Tests,
        Artifact::FinalArtifact,
    ];

    /// The wire name of this artifact, as it appears in the state file.
    pub fn as_str(&self) -> &'static str {
        match self {
            Artifact::Spec => "spec",
            Artifact::LatticeCode => "latticeCode",
            Artifact::Witnesses => "witnesses",
            Artifact::Contracts => "contracts",
            Artifact::AuditReport => "auditReport",
            Artifact::Implementation => "implementation",
            Artifact::Tests => "tests",
            Artifact::FinalArtifact => "finalArtifact",
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Artifact {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Artifact::ALL
            .iter()
            .find(|a| a.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown artifact: {s}"))
    }
}
