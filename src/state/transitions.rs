//! Static transition graph and the `transition` operation.
//!
//! The protocol graph is linear in practice, but the API admits branching:
//! forward targets are an ordered list per source phase, and the first target
//! whose artifact requirement is satisfied wins. Failure edges point backward
//! and enable rollback after a recoverable failure.

use crate::errors::TransitionError;
use crate::phase::{Artifact, Phase};
use crate::state::model::{ProtocolState, Substate};
use std::collections::BTreeSet;

/// Forward edges, in tie-break order.
pub fn forward_targets(phase: Phase) -> &'static [Phase] {
    match phase {
        Phase::Ignition => &[Phase::Lattice],
        Phase::Lattice => &[Phase::CompositionAudit],
        Phase::CompositionAudit => &[Phase::Injection],
        Phase::Injection => &[Phase::Mesoscopic],
        Phase::Mesoscopic => &[Phase::MassDefect],
        Phase::MassDefect => &[Phase::Complete],
        Phase::Complete => &[],
    }
}

/// Failure edges: where a phase can roll back to after a recoverable
/// failure. Injection rolls back to Lattice when its circuit breaker trips;
/// CompositionAudit rolls back to Lattice on contradiction.
pub fn failure_targets(phase: Phase) -> &'static [Phase] {
    match phase {
        Phase::Injection => &[Phase::Lattice],
        Phase::CompositionAudit => &[Phase::Lattice],
        _ => &[],
    }
}

/// The artifact set that must be present to legally arrive at `target`.
pub fn required_artifacts(target: Phase) -> &'static [Artifact] {
    match target {
        Phase::Ignition => &[],
        Phase::Lattice => &[Artifact::Spec],
        Phase::CompositionAudit => &[
            Artifact::LatticeCode,
            Artifact::Witnesses,
            Artifact::Contracts,
        ],
        // Injection re-checks Lattice's requirement on top of the audit
        // report, so a rollback-and-retry cannot skip past a missing spec.
        Phase::Injection => &[Artifact::AuditReport, Artifact::Spec],
        Phase::Mesoscopic => &[Artifact::Implementation],
        Phase::MassDefect => &[Artifact::Tests],
        Phase::Complete => &[Artifact::FinalArtifact],
    }
}

/// Whether the edge `from -> to` exists in either the forward or the failure
/// graph.
fn edge_exists(from: Phase, to: Phase) -> bool {
    forward_targets(from).contains(&to) || failure_targets(from).contains(&to)
}

/// Attempt the transition `state.phase -> target`.
///
/// Succeeds iff the substate is Active, the edge exists, and every required
/// artifact for `target` is available. The new state arrives at `target`
/// with a fresh Active substate; transient per-phase context is shed and
/// only the artifact set carries across.
pub fn transition(
    state: &ProtocolState,
    target: Phase,
    available: &BTreeSet<Artifact>,
) -> Result<ProtocolState, TransitionError> {
    if state.is_terminal() {
        return Err(TransitionError::TerminalState);
    }
    if !state.is_active() {
        return Err(TransitionError::InactiveSubstate);
    }
    if !edge_exists(state.phase, target) {
        return Err(TransitionError::InvalidEdge {
            from: state.phase,
            to: target,
        });
    }

    let missing: BTreeSet<Artifact> = required_artifacts(target)
        .iter()
        .filter(|a| !available.contains(a))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(TransitionError::MissingArtifacts { target, missing });
    }

    Ok(ProtocolState::new(target, Substate::active()))
}

/// The first forward target reachable from `state` given `available`
/// artifacts, following the tie-break order.
pub fn first_satisfied_target(state: &ProtocolState, available: &BTreeSet<Artifact>) -> Option<Phase> {
    forward_targets(state.phase)
        .iter()
        .copied()
        .find(|target| transition(state, *target, available).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use chrono::{TimeZone, Utc};

    fn artifacts(list: &[Artifact]) -> BTreeSet<Artifact> {
        list.iter().copied().collect()
    }

    fn active(phase: Phase) -> ProtocolState {
        ProtocolState::new(phase, Substate::active())
    }

    #[test]
    fn test_forward_graph_is_linear() {
        assert_eq!(forward_targets(Phase::Ignition), &[Phase::Lattice]);
        assert_eq!(forward_targets(Phase::Lattice), &[Phase::CompositionAudit]);
        assert_eq!(forward_targets(Phase::CompositionAudit), &[Phase::Injection]);
        assert_eq!(forward_targets(Phase::Injection), &[Phase::Mesoscopic]);
        assert_eq!(forward_targets(Phase::Mesoscopic), &[Phase::MassDefect]);
        assert_eq!(forward_targets(Phase::MassDefect), &[Phase::Complete]);
        assert!(forward_targets(Phase::Complete).is_empty());
    }

    #[test]
    fn test_required_artifact_sets() {
        assert_eq!(required_artifacts(Phase::Lattice), &[Artifact::Spec]);
        assert_eq!(
            required_artifacts(Phase::CompositionAudit),
            &[
                Artifact::LatticeCode,
                Artifact::Witnesses,
                Artifact::Contracts
            ]
        );
        assert_eq!(
            required_artifacts(Phase::Injection),
            &[Artifact::AuditReport, Artifact::Spec]
        );
        assert_eq!(
            required_artifacts(Phase::Mesoscopic),
            &[Artifact::Implementation]
        );
        assert_eq!(required_artifacts(Phase::MassDefect), &[Artifact::Tests]);
        assert_eq!(
            required_artifacts(Phase::Complete),
            &[Artifact::FinalArtifact]
        );
    }

    #[test]
    fn test_transition_happy_path() {
        let state = active(Phase::Ignition);
        let next = transition(&state, Phase::Lattice, &artifacts(&[Artifact::Spec])).unwrap();
        assert_eq!(next.phase, Phase::Lattice);
        assert!(next.is_active());
    }

    #[test]
    fn test_transition_missing_artifacts() {
        let state = active(Phase::MassDefect);
        let err = transition(&state, Phase::Complete, &BTreeSet::new()).unwrap_err();
        match err {
            TransitionError::MissingArtifacts { target, missing } => {
                assert_eq!(target, Phase::Complete);
                assert_eq!(missing, artifacts(&[Artifact::FinalArtifact]));
            }
            other => panic!("Expected MissingArtifacts, got {other:?}"),
        }
    }

    #[test]
    fn test_transition_invalid_edge() {
        let state = active(Phase::Ignition);
        let err = transition(
            &state,
            Phase::Injection,
            &artifacts(&[Artifact::AuditReport, Artifact::Spec]),
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::InvalidEdge { .. }));
    }

    #[test]
    fn test_transition_rejects_blocking_substate() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        let state = ProtocolState::new(
            Phase::Ignition,
            Substate::blocking("q", None, None, &clock),
        );
        let err = transition(&state, Phase::Lattice, &artifacts(&[Artifact::Spec])).unwrap_err();
        assert!(matches!(err, TransitionError::InactiveSubstate));
    }

    #[test]
    fn test_transition_rejects_terminal_states() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());

        let complete = active(Phase::Complete);
        assert!(matches!(
            transition(&complete, Phase::Lattice, &BTreeSet::new()),
            Err(TransitionError::TerminalState)
        ));

        let failed = ProtocolState::new(
            Phase::Injection,
            Substate::failed("boom", true, None, &clock),
        );
        assert!(matches!(
            transition(&failed, Phase::Mesoscopic, &BTreeSet::new()),
            Err(TransitionError::TerminalState)
        ));
    }

    #[test]
    fn test_failure_edge_rolls_back_with_artifacts_preserved() {
        let available = artifacts(&[
            Artifact::Spec,
            Artifact::LatticeCode,
            Artifact::Witnesses,
            Artifact::Contracts,
            Artifact::AuditReport,
        ]);
        let state = active(Phase::Injection);
        let next = transition(&state, Phase::Lattice, &available).unwrap();
        assert_eq!(next.phase, Phase::Lattice);
        assert!(next.is_active());
    }

    #[test]
    fn test_failure_edges_limited_to_rollback_sources() {
        assert_eq!(failure_targets(Phase::Injection), &[Phase::Lattice]);
        assert_eq!(failure_targets(Phase::CompositionAudit), &[Phase::Lattice]);
        assert!(failure_targets(Phase::Ignition).is_empty());
        assert!(failure_targets(Phase::Complete).is_empty());
    }

    #[test]
    fn test_first_satisfied_target() {
        let state = active(Phase::Ignition);
        assert_eq!(first_satisfied_target(&state, &BTreeSet::new()), None);
        assert_eq!(
            first_satisfied_target(&state, &artifacts(&[Artifact::Spec])),
            Some(Phase::Lattice)
        );
    }

    #[test]
    fn test_clock_not_consulted_by_transition() {
        // transition() is pure; this pins that the Active substate it
        // produces carries no timestamp to begin with.
        let state = active(Phase::Ignition);
        let next = transition(&state, Phase::Lattice, &artifacts(&[Artifact::Spec])).unwrap();
        assert_eq!(
            next.substate,
            Substate::Active {
                task: None,
                operation: None
            }
        );
        let _ = ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()).now();
    }
}
