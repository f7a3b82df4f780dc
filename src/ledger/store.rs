//! The decision ledger store: append, supersede, invalidate, file I/O.

use crate::clock::Clock;
use crate::errors::{LedgerError, PersistenceError};
use crate::ledger::decision::{Confidence, Decision, DecisionInput, DecisionStatus};
use crate::persistence::{read_json_document, validate_semver, write_atomic};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

/// Ledger file format version.
pub const LEDGER_FORMAT_VERSION: &str = "1.0.0";

/// Decision ids look like `architectural_001` or `phase_structure_012`.
fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z_]+_\d{3}$").expect("id pattern is valid"))
}

/// Envelope metadata persisted alongside the decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerMeta {
    pub version: String,
    pub created: DateTime<Utc>,
    pub project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// Wire shape of the ledger file.
#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    meta: LedgerMeta,
    decisions: Vec<Decision>,
}

/// Summary counts for `ledger stats`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerStats {
    pub total: usize,
    pub active: usize,
    pub superseded: usize,
    pub invalidated: usize,
    pub by_category: BTreeMap<&'static str, usize>,
    pub by_confidence: BTreeMap<&'static str, usize>,
}

/// Append-only store of decisions with category-scoped monotonic ids.
///
/// The decision vector is private: the status/`superseded_by` rewrite inside
/// [`supersede`](DecisionLedger::supersede) and
/// [`invalidate`](DecisionLedger::invalidate) is the only mutation path, so
/// no caller can construct a partially updated ledger.
#[derive(Debug, Clone)]
pub struct DecisionLedger {
    meta: LedgerMeta,
    decisions: Vec<Decision>,
    counters: HashMap<&'static str, u32>,
}

impl DecisionLedger {
    /// A fresh ledger for `project`, created-at stamped through the clock.
    pub fn new(project: impl Into<String>, clock: &dyn Clock) -> Self {
        Self {
            meta: LedgerMeta {
                version: LEDGER_FORMAT_VERSION.to_string(),
                created: clock.now(),
                project: project.into(),
                last_modified: None,
            },
            decisions: Vec::new(),
            counters: HashMap::new(),
        }
    }

    pub fn meta(&self) -> &LedgerMeta {
        &self.meta
    }

    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Decision> {
        self.decisions.iter().find(|d| d.id == id)
    }

    /// Validate the caller-supplied fields of an input.
    fn validate_input(input: &DecisionInput) -> Result<(), LedgerError> {
        let mut errors = Vec::new();
        if input.constraint.trim().is_empty() {
            errors.push("constraint must not be empty".to_string());
        }
        for dep in input.dependencies.iter().chain(input.supersedes.iter()) {
            if !id_pattern().is_match(dep) {
                errors.push(format!("referenced id {dep:?} is not a valid decision id"));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(LedgerError::Validation { errors })
        }
    }

    /// Append a new decision. The ledger stamps the id (`<category>_<NNN>`),
    /// the timestamp and the `active` status.
    pub fn append(
        &mut self,
        input: DecisionInput,
        clock: &dyn Clock,
    ) -> Result<&Decision, LedgerError> {
        Self::validate_input(&input)?;

        let counter = self.counters.entry(input.category.as_str()).or_insert(0);
        let id = format!("{}_{:03}", input.category.as_str(), *counter + 1);
        if self.decisions.iter().any(|d| d.id == id) {
            return Err(LedgerError::DuplicateDecisionId { id });
        }
        *counter += 1;

        let decision = Decision {
            id,
            timestamp: clock.now(),
            category: input.category,
            constraint: input.constraint,
            source: input.source,
            confidence: input.confidence,
            status: DecisionStatus::Active,
            phase: input.phase,
            rationale: input.rationale,
            dependencies: input.dependencies,
            supersedes: input.supersedes,
            superseded_by: None,
            failure_context: input.failure_context,
            contradiction_resolved: input.contradiction_resolved,
            human_query_id: input.human_query_id,
        };
        debug!(id = %decision.id, category = %decision.category, "appended decision");
        self.decisions.push(decision);
        Ok(self.decisions.last().expect("just pushed"))
    }

    /// Append a fully formed decision, keeping its id. Used when loading a
    /// persisted ledger; per-category counters are refreshed to the maximum
    /// sequence number seen.
    pub fn append_with_id(&mut self, decision: Decision) -> Result<(), LedgerError> {
        if !id_pattern().is_match(&decision.id) {
            return Err(LedgerError::Validation {
                errors: vec![format!(
                    "decision id {:?} does not match <category>_<NNN>",
                    decision.id
                )],
            });
        }
        if decision.constraint.trim().is_empty() {
            return Err(LedgerError::Validation {
                errors: vec!["constraint must not be empty".to_string()],
            });
        }
        if self.decisions.iter().any(|d| d.id == decision.id) {
            return Err(LedgerError::DuplicateDecisionId { id: decision.id });
        }

        let sequence: u32 = decision.id[decision.id.rfind('_').expect("matched pattern") + 1..]
            .parse()
            .expect("matched pattern ends in digits");
        let counter = self.counters.entry(decision.category.as_str()).or_insert(0);
        *counter = (*counter).max(sequence);

        self.decisions.push(decision);
        Ok(())
    }

    /// Supersede `old_id` with a new decision built from `input`.
    ///
    /// Canonical decisions refuse to be superseded unless
    /// `force_override_canonical` is set. On success the new decision's
    /// `supersedes` contains `old_id`, and the old decision is rewritten in
    /// place with `status = superseded` and a back-link, the sole exception
    /// to append-only.
    pub fn supersede(
        &mut self,
        old_id: &str,
        mut input: DecisionInput,
        force_override_canonical: bool,
        clock: &dyn Clock,
    ) -> Result<String, LedgerError> {
        let old_index = self
            .decisions
            .iter()
            .position(|d| d.id == old_id)
            .ok_or_else(|| LedgerError::DecisionNotFound { id: old_id.to_string() })?;

        match self.decisions[old_index].status {
            DecisionStatus::Active => {}
            DecisionStatus::Superseded => {
                return Err(LedgerError::InvalidSupersede {
                    id: old_id.to_string(),
                    reason: "already superseded".to_string(),
                });
            }
            DecisionStatus::Invalidated => {
                return Err(LedgerError::InvalidSupersede {
                    id: old_id.to_string(),
                    reason: "already invalidated".to_string(),
                });
            }
        }

        if self.decisions[old_index].confidence == Confidence::Canonical
            && !force_override_canonical
        {
            return Err(LedgerError::CanonicalOverride {
                id: old_id.to_string(),
            });
        }

        if !input.supersedes.iter().any(|id| id == old_id) {
            input.supersedes.push(old_id.to_string());
        }

        let new_id = self.append(input, clock)?.id.clone();
        let old = &mut self.decisions[old_index];
        old.status = DecisionStatus::Superseded;
        old.superseded_by = Some(new_id.clone());
        debug!(old = %old_id, new = %new_id, "superseded decision");
        Ok(new_id)
    }

    /// Mark an active decision invalidated. Like supersession this preserves
    /// the entry and only rewrites its status.
    pub fn invalidate(&mut self, id: &str) -> Result<(), LedgerError> {
        let decision = self
            .decisions
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| LedgerError::DecisionNotFound { id: id.to_string() })?;
        if decision.status != DecisionStatus::Active {
            return Err(LedgerError::InvalidSupersede {
                id: id.to_string(),
                reason: "status is no longer active".to_string(),
            });
        }
        decision.status = DecisionStatus::Invalidated;
        Ok(())
    }

    pub fn stats(&self) -> LedgerStats {
        let mut stats = LedgerStats {
            total: self.decisions.len(),
            ..Default::default()
        };
        for decision in &self.decisions {
            match decision.status {
                DecisionStatus::Active => stats.active += 1,
                DecisionStatus::Superseded => stats.superseded += 1,
                DecisionStatus::Invalidated => stats.invalidated += 1,
            }
            *stats.by_category.entry(decision.category.as_str()).or_insert(0) += 1;
            *stats
                .by_confidence
                .entry(decision.confidence.as_str())
                .or_insert(0) += 1;
        }
        stats
    }

    /// Persist the ledger with the write-temp-then-rename discipline,
    /// updating `meta.last_modified`.
    pub fn save(&mut self, path: &Path, clock: &dyn Clock) -> Result<(), LedgerError> {
        self.meta.last_modified = Some(clock.now());
        let file = LedgerFile {
            meta: self.meta.clone(),
            decisions: self.decisions.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| PersistenceError::Schema(format!("failed to serialize ledger: {e}")))?;
        write_atomic(path, &json)?;
        Ok(())
    }

    /// Load a persisted ledger, validating the envelope and every decision.
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let value = read_json_document(path)?;

        let object = value
            .as_object()
            .ok_or_else(|| PersistenceError::Schema("ledger file must be a JSON object".into()))?;
        let meta_value = object
            .get("meta")
            .ok_or_else(|| PersistenceError::Schema("missing required key: meta".into()))?;
        let meta_object = meta_value
            .as_object()
            .ok_or_else(|| PersistenceError::Schema("meta must be an object".into()))?;
        for key in ["version", "created", "project"] {
            if !meta_object.contains_key(key) {
                return Err(
                    PersistenceError::Schema(format!("missing required key: meta.{key}")).into(),
                );
            }
        }
        let version = meta_object["version"]
            .as_str()
            .ok_or_else(|| PersistenceError::Schema("meta.version must be a string".into()))?;
        validate_semver(version)?;

        let decisions_value = object
            .get("decisions")
            .ok_or_else(|| PersistenceError::Schema("missing required key: decisions".into()))?;
        if !decisions_value.is_array() {
            return Err(PersistenceError::Schema("decisions must be an array".into()).into());
        }

        let meta: LedgerMeta = serde_json::from_value(meta_value.clone())
            .map_err(|e| PersistenceError::Schema(format!("invalid meta: {e}")))?;

        let mut ledger = Self {
            meta,
            decisions: Vec::new(),
            counters: HashMap::new(),
        };
        for (index, entry) in decisions_value.as_array().expect("checked").iter().enumerate() {
            let decision: Decision = serde_json::from_value(entry.clone()).map_err(|e| {
                PersistenceError::Validation(format!("decision at index {index}: {e}"))
            })?;
            ledger.append_with_id(decision)?;
        }
        Ok(ledger)
    }

    /// Load the ledger at `path`, or start a fresh one when the file does
    /// not exist yet.
    pub fn load_or_new(
        path: &Path,
        project: impl Into<String>,
        clock: &dyn Clock,
    ) -> Result<Self, LedgerError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new(project, clock))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::ledger::decision::{Category, DecisionPhase, Source};
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn test_clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap())
    }

    fn input(category: Category, constraint: &str, confidence: Confidence) -> DecisionInput {
        DecisionInput::new(
            category,
            constraint,
            Source::DesignChoice,
            confidence,
            DecisionPhase::Design,
        )
    }

    #[test]
    fn test_append_generates_dense_monotonic_ids() {
        let clock = test_clock();
        let mut ledger = DecisionLedger::new("proj", &clock);

        let a = ledger
            .append(
                input(Category::Architectural, "one", Confidence::Inferred),
                &clock,
            )
            .unwrap()
            .id
            .clone();
        let b = ledger
            .append(
                input(Category::Architectural, "two", Confidence::Inferred),
                &clock,
            )
            .unwrap()
            .id
            .clone();
        let c = ledger
            .append(input(Category::Blocking, "three", Confidence::Canonical), &clock)
            .unwrap()
            .id
            .clone();

        assert_eq!(a, "architectural_001");
        assert_eq!(b, "architectural_002");
        assert_eq!(c, "blocking_001");
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn test_append_rejects_empty_constraint() {
        let clock = test_clock();
        let mut ledger = DecisionLedger::new("proj", &clock);
        let err = ledger
            .append(input(Category::Testing, "   ", Confidence::Inferred), &clock)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Validation { .. }));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_append_with_id_refreshes_counters() {
        let clock = test_clock();
        let mut ledger = DecisionLedger::new("proj", &clock);
        let mut decision = Decision {
            id: "models_007".into(),
            timestamp: clock.now(),
            category: Category::Models,
            constraint: "seeded".into(),
            source: Source::OriginalDesign,
            confidence: Confidence::Delegated,
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
        ledger.append_with_id(decision.clone()).unwrap();

        // A later append continues from the max seen.
        let next = ledger
            .append(input(Category::Models, "next", Confidence::Inferred), &clock)
            .unwrap();
        assert_eq!(next.id, "models_008");

        // Duplicates are rejected.
        decision.constraint = "dup".into();
        let err = ledger.append_with_id(decision).unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateDecisionId { .. }));
    }

    #[test]
    fn test_append_with_id_rejects_bad_format() {
        let clock = test_clock();
        let mut ledger = DecisionLedger::new("proj", &clock);
        let decision = Decision {
            id: "Models-7".into(),
            timestamp: clock.now(),
            category: Category::Models,
            constraint: "x".into(),
            source: Source::Discussion,
            confidence: Confidence::Inferred,
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
        assert!(matches!(
            ledger.append_with_id(decision),
            Err(LedgerError::Validation { .. })
        ));
    }

    #[test]
    fn test_supersede_links_both_directions() {
        let clock = test_clock();
        let mut ledger = DecisionLedger::new("proj", &clock);
        ledger
            .append(
                input(Category::Interface, "use REST", Confidence::Inferred),
                &clock,
            )
            .unwrap();

        let new_id = ledger
            .supersede(
                "interface_001",
                input(Category::Interface, "use gRPC", Confidence::Inferred),
                false,
                &clock,
            )
            .unwrap();

        assert_eq!(new_id, "interface_002");
        let old = ledger.get("interface_001").unwrap();
        assert_eq!(old.status, DecisionStatus::Superseded);
        assert_eq!(old.superseded_by.as_deref(), Some("interface_002"));
        let new = ledger.get("interface_002").unwrap();
        assert!(new.supersedes.contains(&"interface_001".to_string()));
        assert_eq!(new.status, DecisionStatus::Active);
        // Count only grows.
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_supersede_canonical_requires_override() {
        let clock = test_clock();
        let mut ledger = DecisionLedger::new("proj", &clock);
        ledger
            .append(
                input(Category::Architectural, "locked in", Confidence::Canonical),
                &clock,
            )
            .unwrap();

        let err = ledger
            .supersede(
                "architectural_001",
                input(Category::Architectural, "changed", Confidence::Inferred),
                false,
                &clock,
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::CanonicalOverride { .. }));

        let new_id = ledger
            .supersede(
                "architectural_001",
                input(Category::Architectural, "changed", Confidence::Inferred),
                true,
                &clock,
            )
            .unwrap();
        assert_eq!(new_id, "architectural_002");
        assert_eq!(
            ledger.get("architectural_001").unwrap().status,
            DecisionStatus::Superseded
        );
    }

    #[test]
    fn test_supersede_twice_is_rejected() {
        let clock = test_clock();
        let mut ledger = DecisionLedger::new("proj", &clock);
        ledger
            .append(input(Category::Testing, "v1", Confidence::Inferred), &clock)
            .unwrap();
        ledger
            .supersede(
                "testing_001",
                input(Category::Testing, "v2", Confidence::Inferred),
                false,
                &clock,
            )
            .unwrap();

        let err = ledger
            .supersede(
                "testing_001",
                input(Category::Testing, "v3", Confidence::Inferred),
                false,
                &clock,
            )
            .unwrap_err();
        match err {
            LedgerError::InvalidSupersede { id, reason } => {
                assert_eq!(id, "testing_001");
                assert!(reason.contains("superseded"));
            }
            other => panic!("Expected InvalidSupersede, got {other:?}"),
        }
    }

    #[test]
    fn test_supersede_missing_decision() {
        let clock = test_clock();
        let mut ledger = DecisionLedger::new("proj", &clock);
        let err = ledger
            .supersede(
                "ghost_001",
                input(Category::Testing, "x", Confidence::Inferred),
                false,
                &clock,
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::DecisionNotFound { .. }));
    }

    #[test]
    fn test_invalidate_preserves_entry() {
        let clock = test_clock();
        let mut ledger = DecisionLedger::new("proj", &clock);
        ledger
            .append(input(Category::Security, "tls only", Confidence::Provisional), &clock)
            .unwrap();

        ledger.invalidate("security_001").unwrap();
        assert_eq!(
            ledger.get("security_001").unwrap().status,
            DecisionStatus::Invalidated
        );
        assert_eq!(ledger.len(), 1);

        // A second status change is refused.
        assert!(matches!(
            ledger.invalidate("security_001"),
            Err(LedgerError::InvalidSupersede { .. })
        ));
    }

    #[test]
    fn test_save_load_round_trip() {
        let clock = test_clock();
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");

        let mut ledger = DecisionLedger::new("round-trip", &clock);
        ledger
            .append(
                input(Category::DataModel, "artifacts are opaque", Confidence::Canonical),
                &clock,
            )
            .unwrap();
        ledger
            .supersede(
                "data_model_001",
                input(Category::DataModel, "artifacts are tokens", Confidence::Canonical),
                true,
                &clock,
            )
            .unwrap();
        ledger.save(&path, &clock).unwrap();

        let loaded = DecisionLedger::load(&path).unwrap();
        assert_eq!(loaded.meta().project, "round-trip");
        assert_eq!(loaded.meta().last_modified, Some(clock.now()));
        assert_eq!(loaded.decisions(), ledger.decisions());

        // Counters survive the round trip: the next data_model id is 003.
        let mut loaded = loaded;
        let next = loaded
            .append(input(Category::DataModel, "next", Confidence::Inferred), &clock)
            .unwrap();
        assert_eq!(next.id, "data_model_003");
    }

    #[test]
    fn test_load_rejects_missing_meta() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, r#"{"decisions": []}"#).unwrap();
        let err = DecisionLedger::load(&path).unwrap_err();
        match err {
            LedgerError::Persistence(p) => assert_eq!(p.kind(), "schema_error"),
            other => panic!("Expected persistence error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_rejects_bad_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(
            &path,
            r#"{"meta": {"version": "one", "created": "2026-03-01T09:00:00Z", "project": "p"}, "decisions": []}"#,
        )
        .unwrap();
        let err = DecisionLedger::load(&path).unwrap_err();
        match err {
            LedgerError::Persistence(p) => assert_eq!(p.kind(), "validation_error"),
            other => panic!("Expected persistence error, got {other:?}"),
        }
    }

    #[test]
    fn test_stats() {
        let clock = test_clock();
        let mut ledger = DecisionLedger::new("proj", &clock);
        ledger
            .append(input(Category::Testing, "a", Confidence::Inferred), &clock)
            .unwrap();
        ledger
            .append(input(Category::Testing, "b", Confidence::Canonical), &clock)
            .unwrap();
        ledger
            .append(input(Category::Models, "c", Confidence::Inferred), &clock)
            .unwrap();
        ledger.invalidate("models_001").unwrap();

        let stats = ledger.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.active, 2);
        assert_eq!(stats.invalidated, 1);
        assert_eq!(stats.by_category["testing"], 2);
        assert_eq!(stats.by_category["models"], 1);
        assert_eq!(stats.by_confidence["canonical"], 1);
    }
}
