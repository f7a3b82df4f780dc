//! Decision records and their closed enums.
//!
//! All five enums are sum types internally and snake_case strings on the
//! wire; parsing from free strings happens only at the persistence boundary.

use crate::phase::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What area of the system a decision constrains. The category also scopes
/// the monotonic id counter (`architectural_001`, `blocking_001`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Architectural,
    PhaseStructure,
    Injection,
    Ledger,
    TypeWitnesses,
    Contracts,
    Models,
    Blocking,
    Testing,
    Orchestrator,
    LanguageSupport,
    DataModel,
    Interface,
    Constraint,
    Security,
}

impl Category {
    /// The snake_case wire name, also used as the id prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Architectural => "architectural",
            Category::PhaseStructure => "phase_structure",
            Category::Injection => "injection",
            Category::Ledger => "ledger",
            Category::TypeWitnesses => "type_witnesses",
            Category::Contracts => "contracts",
            Category::Models => "models",
            Category::Blocking => "blocking",
            Category::Testing => "testing",
            Category::Orchestrator => "orchestrator",
            Category::LanguageSupport => "language_support",
            Category::DataModel => "data_model",
            Category::Interface => "interface",
            Category::Constraint => "constraint",
            Category::Security => "security",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    UserExplicit,
    DesignPrinciple,
    OriginalDesign,
    Discussion,
    DesignChoice,
    DesignReview,
    InjectionFailure,
    AuditorContradiction,
    CompositionAudit,
    MesoscopicFailure,
    HumanResolution,
}

/// Confidence tier. `Canonical` is the strongest and cannot be superseded
/// without an explicit override flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Canonical,
    Delegated,
    Inferred,
    Provisional,
    Suspended,
    Blocking,
}

impl Confidence {
    pub fn is_canonical(&self) -> bool {
        matches!(self, Confidence::Canonical)
    }

    /// The snake_case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Canonical => "canonical",
            Confidence::Delegated => "delegated",
            Confidence::Inferred => "inferred",
            Confidence::Provisional => "provisional",
            Confidence::Suspended => "suspended",
            Confidence::Blocking => "blocking",
        }
    }
}

/// Lifecycle status. A decision starts `Active` and may move exactly once to
/// `Superseded` or `Invalidated`; it is never removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Active,
    Superseded,
    Invalidated,
}

/// The protocol phase a decision was made in. Unlike [`Phase`] this includes
/// the up-front `design` phase and excludes the terminal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPhase {
    Design,
    Ignition,
    Lattice,
    CompositionAudit,
    Injection,
    Mesoscopic,
    MassDefect,
}

impl From<Phase> for DecisionPhase {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Ignition => DecisionPhase::Ignition,
            Phase::Lattice => DecisionPhase::Lattice,
            Phase::CompositionAudit => DecisionPhase::CompositionAudit,
            Phase::Injection => DecisionPhase::Injection,
            Phase::Mesoscopic => DecisionPhase::Mesoscopic,
            // Complete never hosts decisions (it only pairs with Active);
            // map it to the last working phase to stay total.
            Phase::MassDefect | Phase::Complete => DecisionPhase::MassDefect,
        }
    }
}

/// An immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub category: Category,
    pub constraint: String,
    pub source: Source,
    pub confidence: Confidence,
    pub status: DecisionStatus,
    pub phase: DecisionPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supersedes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superseded_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contradiction_resolved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_query_id: Option<String>,
}

/// The caller-supplied part of a decision; id, timestamp and status are
/// stamped by the ledger on append.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionInput {
    pub category: Category,
    pub constraint: String,
    pub source: Source,
    pub confidence: Confidence,
    pub phase: DecisionPhase,
    pub rationale: Option<String>,
    pub dependencies: Vec<String>,
    pub supersedes: Vec<String>,
    pub failure_context: Option<String>,
    pub contradiction_resolved: Option<bool>,
    pub human_query_id: Option<String>,
}

impl DecisionInput {
    pub fn new(
        category: Category,
        constraint: impl Into<String>,
        source: Source,
        confidence: Confidence,
        phase: DecisionPhase,
    ) -> Self {
        Self {
            category,
            constraint: constraint.into(),
            source,
            confidence,
            phase,
            rationale: None,
            dependencies: Vec::new(),
            supersedes: Vec::new(),
            failure_context: None,
            contradiction_resolved: None,
            human_query_id: None,
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_human_query_id(mut self, id: impl Into<String>) -> Self {
        self.human_query_id = Some(id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_wire_names_are_snake_case() {
        assert_eq!(Category::PhaseStructure.as_str(), "phase_structure");
        assert_eq!(Category::TypeWitnesses.as_str(), "type_witnesses");
        let json = serde_json::to_string(&Category::LanguageSupport).unwrap();
        assert_eq!(json, "\"language_support\"");
    }

    #[test]
    fn test_source_serialization() {
        let json = serde_json::to_string(&Source::HumanResolution).unwrap();
        assert_eq!(json, "\"human_resolution\"");
        let parsed: Source = serde_json::from_str("\"auditor_contradiction\"").unwrap();
        assert_eq!(parsed, Source::AuditorContradiction);
    }

    #[test]
    fn test_confidence_canonical_is_strongest() {
        assert!(Confidence::Canonical.is_canonical());
        assert!(!Confidence::Delegated.is_canonical());
        assert!(Confidence::Canonical < Confidence::Delegated);
    }

    #[test]
    fn test_decision_phase_from_phase() {
        assert_eq!(
            DecisionPhase::from(Phase::CompositionAudit),
            DecisionPhase::CompositionAudit
        );
        assert_eq!(DecisionPhase::from(Phase::Complete), DecisionPhase::MassDefect);
    }

    #[test]
    fn test_decision_optional_fields_omitted_on_wire() {
        let decision = Decision {
            id: "architectural_001".into(),
            timestamp: Utc::now(),
            category: Category::Architectural,
            constraint: "Single-threaded tick loop".into(),
            source: Source::DesignPrinciple,
            confidence: Confidence::Canonical,
            status: DecisionStatus::Active,
            phase: DecisionPhase::Design,
            rationale: None,
            dependencies: Vec::new(),
            supersedes: Vec::new(),
            superseded_by: None,
            failure_context: None,
            contradiction_resolved: None,
            human_query_id: None,
        };
        let json = serde_json::to_value(&decision).unwrap();
        assert!(json.get("rationale").is_none());
        assert!(json.get("supersedes").is_none());
        assert!(json.get("superseded_by").is_none());
        assert_eq!(json["status"], "active");
        assert_eq!(json["confidence"], "canonical");
    }

    #[test]
    fn test_decision_round_trip() {
        let decision = Decision {
            id: "blocking_007".into(),
            timestamp: Utc::now(),
            category: Category::Blocking,
            constraint: "oauth".into(),
            source: Source::HumanResolution,
            confidence: Confidence::Canonical,
            status: DecisionStatus::Active,
            phase: DecisionPhase::Lattice,
            rationale: Some("operator picked oauth".into()),
            dependencies: vec!["architectural_001".into()],
            supersedes: Vec::new(),
            superseded_by: None,
            failure_context: None,
            contradiction_resolved: None,
            human_query_id: Some("blocking-lattice".into()),
        };
        let json = serde_json::to_string(&decision).unwrap();
        let parsed: Decision = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, decision);
    }
}
