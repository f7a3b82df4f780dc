//! Crash-safe persistence for protocol state.
//!
//! Both the state file and the decision ledger use the same discipline:
//! serialize to pretty JSON, write a sibling temp file with a random name,
//! then atomically rename over the destination. A reader therefore always
//! sees a complete document, never a torn write.
//!
//! Loading is staged so every failure maps onto the flat error taxonomy:
//! empty file → `corruption_error`, unparseable JSON → `parse_error`,
//! missing or ill-typed keys → `schema_error`, enum or semver mismatch →
//! `validation_error`. Unknown extra keys are tolerated for forward
//! compatibility; writers emit only the specified keys.

use crate::clock::Clock;
use crate::errors::PersistenceError;
use crate::phase::{Artifact, Phase};
use crate::state::model::{BlockingRecord, ProtocolState, ProtocolStateSnapshot, Substate};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;
use uuid::Uuid;

/// State file format version.
pub const STATE_FORMAT_VERSION: &str = "1.0.0";

fn semver_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("semver pattern is valid"))
}

/// Check that a version string is `X.Y.Z` semver.
pub(crate) fn validate_semver(version: &str) -> Result<(), PersistenceError> {
    if semver_pattern().is_match(version) {
        Ok(())
    } else {
        Err(PersistenceError::Validation(format!(
            "version {version:?} does not match X.Y.Z"
        )))
    }
}

/// Write `contents` to `path` via a sibling temp file and an atomic rename.
///
/// The temp name carries a random UUID so racing write attempts within one
/// process never collide. On any failure the temp file is unlinked and the
/// destination is left untouched.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), PersistenceError> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("state");
    let temp_name = format!(".{stem}-{}.tmp", Uuid::new_v4());
    let temp = match dir {
        Some(dir) => dir.join(&temp_name),
        None => temp_name.into(),
    };

    fs::write(&temp, contents).map_err(|source| PersistenceError::File {
        path: temp.clone(),
        source,
    })?;

    if let Err(source) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(PersistenceError::File {
            path: path.to_path_buf(),
            source,
        });
    }

    debug!(path = %path.display(), "persisted");
    Ok(())
}

/// Read a whole JSON document, classifying emptiness and parse failures.
pub(crate) fn read_json_document(path: &Path) -> Result<Value, PersistenceError> {
    let raw = fs::read_to_string(path).map_err(|source| PersistenceError::File {
        path: path.to_path_buf(),
        source,
    })?;
    if raw.trim().is_empty() {
        return Err(PersistenceError::Corruption(format!(
            "{} is empty",
            path.display()
        )));
    }
    serde_json::from_str(&raw).map_err(|e| PersistenceError::Parse(e.to_string()))
}

/// Wire shape of the state file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StateFile {
    version: String,
    persisted_at: DateTime<Utc>,
    phase: Phase,
    substate: Substate,
    artifacts: Vec<Artifact>,
    blocking_queries: Vec<BlockingRecord>,
}

/// Persist a snapshot to `path` atomically.
pub fn save_state(
    snapshot: &ProtocolStateSnapshot,
    path: &Path,
    clock: &dyn Clock,
) -> Result<(), PersistenceError> {
    let file = StateFile {
        version: STATE_FORMAT_VERSION.to_string(),
        persisted_at: clock.now(),
        phase: snapshot.state.phase,
        substate: snapshot.state.substate.clone(),
        artifacts: snapshot.artifacts.iter().copied().collect(),
        blocking_queries: snapshot.blocking_queries.clone(),
    };
    let json = serde_json::to_string_pretty(&file)
        .map_err(|e| PersistenceError::Schema(format!("failed to serialize state: {e}")))?;
    write_atomic(path, &json)
}

fn require_key<'a>(object: &'a serde_json::Map<String, Value>, key: &str) -> Result<&'a Value, PersistenceError> {
    object
        .get(key)
        .ok_or_else(|| PersistenceError::Schema(format!("missing required key: {key}")))
}

fn require_str<'a>(value: &'a Value, name: &str) -> Result<&'a str, PersistenceError> {
    value
        .as_str()
        .ok_or_else(|| PersistenceError::Schema(format!("{name} must be a string")))
}

fn require_bool(value: &Value, name: &str) -> Result<bool, PersistenceError> {
    value
        .as_bool()
        .ok_or_else(|| PersistenceError::Schema(format!("{name} must be a boolean")))
}

fn validate_phase_name(name: &str) -> Result<(), PersistenceError> {
    name.parse::<Phase>()
        .map(|_| ())
        .map_err(PersistenceError::Validation)
}

fn validate_substate(value: &Value) -> Result<(), PersistenceError> {
    let object = value
        .as_object()
        .ok_or_else(|| PersistenceError::Schema("substate must be an object".into()))?;
    let kind = require_str(require_key(object, "kind")?, "substate.kind")?;
    match kind {
        "Active" => Ok(()),
        "Blocking" => {
            require_str(require_key(object, "query")?, "substate.query")?;
            require_str(require_key(object, "blockedAt")?, "substate.blockedAt")?;
            Ok(())
        }
        "Failed" => {
            require_str(require_key(object, "error")?, "substate.error")?;
            require_str(require_key(object, "failedAt")?, "substate.failedAt")?;
            require_bool(require_key(object, "recoverable")?, "substate.recoverable")?;
            Ok(())
        }
        other => Err(PersistenceError::Validation(format!(
            "unknown substate kind: {other}"
        ))),
    }
}

fn validate_blocking_queries(value: &Value) -> Result<(), PersistenceError> {
    let entries = value
        .as_array()
        .ok_or_else(|| PersistenceError::Schema("blockingQueries must be an array".into()))?;
    for (index, entry) in entries.iter().enumerate() {
        let object = entry.as_object().ok_or_else(|| {
            PersistenceError::Schema(format!("blockingQueries[{index}] must be an object"))
        })?;
        let context = format!("blockingQueries[{index}]");
        require_str(require_key(object, "id")?, &format!("{context}.id"))?;
        let phase = require_str(require_key(object, "phase")?, &format!("{context}.phase"))?;
        validate_phase_name(phase)?;
        require_str(require_key(object, "query")?, &format!("{context}.query"))?;
        require_str(
            require_key(object, "blockedAt")?,
            &format!("{context}.blockedAt"),
        )?;
        require_bool(
            require_key(object, "resolved")?,
            &format!("{context}.resolved"),
        )?;
    }
    Ok(())
}

/// Load and validate a snapshot from `path`.
pub fn load_state(path: &Path) -> Result<ProtocolStateSnapshot, PersistenceError> {
    let value = read_json_document(path)?;
    let object = value
        .as_object()
        .ok_or_else(|| PersistenceError::Schema("state file must be a JSON object".into()))?;

    for key in [
        "version",
        "persistedAt",
        "phase",
        "substate",
        "artifacts",
        "blockingQueries",
    ] {
        require_key(object, key)?;
    }

    let version = require_str(&object["version"], "version")?;
    validate_semver(version)?;
    require_str(&object["persistedAt"], "persistedAt")?;

    let phase_name = require_str(&object["phase"], "phase")?;
    validate_phase_name(phase_name)?;

    validate_substate(&object["substate"])?;

    let artifacts = object["artifacts"]
        .as_array()
        .ok_or_else(|| PersistenceError::Schema("artifacts must be an array".into()))?;
    for (index, entry) in artifacts.iter().enumerate() {
        let name = require_str(entry, &format!("artifacts[{index}]"))?;
        name.parse::<Artifact>()
            .map_err(PersistenceError::Validation)?;
    }

    validate_blocking_queries(&object["blockingQueries"])?;

    let file: StateFile = serde_json::from_value(value.clone())
        .map_err(|e| PersistenceError::Schema(format!("invalid state file: {e}")))?;

    Ok(ProtocolStateSnapshot {
        state: ProtocolState::new(file.phase, file.substate),
        artifacts: file.artifacts.into_iter().collect(),
        blocking_queries: file.blocking_queries,
    })
}
