//! Composable guards, actions and transition rules.
//!
//! Guards are pure predicates over the tick context; actions are the only
//! things allowed to touch the operations port. Both are data, not closures,
//! so rule sets stay cloneable, comparable and exhaustively matched. New
//! transition definitions compose from these without touching the tick loop.

use crate::orchestrator::ops::{ActionResult, ExternalOperations};
use crate::phase::{Artifact, Phase};
use crate::state::model::ProtocolStateSnapshot;
use crate::state::transitions::{forward_targets, required_artifacts};
use std::future::Future;
use std::pin::Pin;

/// Read-only view of the tick inputs a guard may inspect.
#[derive(Debug, Clone, Copy)]
pub struct GuardContext<'a> {
    pub snapshot: &'a ProtocolStateSnapshot,
    pub pending_resolutions: usize,
}

/// A pure predicate over the tick context.
#[derive(Debug, Clone, PartialEq)]
pub enum Guard {
    Always,
    Never,
    IsActive,
    BlockingResolved,
    HasArtifacts(Vec<Artifact>),
    Not(Box<Guard>),
    All(Vec<Guard>),
    Any(Vec<Guard>),
}

impl Guard {
    pub fn eval(&self, cx: &GuardContext<'_>) -> bool {
        match self {
            Guard::Always => true,
            Guard::Never => false,
            Guard::IsActive => cx.snapshot.state.is_active(),
            Guard::BlockingResolved => cx.snapshot.active_blocking_record().is_none(),
            Guard::HasArtifacts(artifacts) => {
                artifacts.iter().all(|a| cx.snapshot.has_artifact(*a))
            }
            Guard::Not(inner) => !inner.eval(cx),
            Guard::All(guards) => guards.iter().all(|g| g.eval(cx)),
            Guard::Any(guards) => guards.iter().any(|g| g.eval(cx)),
        }
    }
}

pub fn always() -> Guard {
    Guard::Always
}

pub fn never() -> Guard {
    Guard::Never
}

pub fn is_active() -> Guard {
    Guard::IsActive
}

/// True once no blocking query is left unresolved.
pub fn blocking_resolved() -> Guard {
    Guard::BlockingResolved
}

pub fn has_artifacts(artifacts: impl IntoIterator<Item = Artifact>) -> Guard {
    Guard::HasArtifacts(artifacts.into_iter().collect())
}

pub fn not(guard: Guard) -> Guard {
    Guard::Not(Box::new(guard))
}

pub fn and(guards: impl IntoIterator<Item = Guard>) -> Guard {
    Guard::All(guards.into_iter().collect())
}

pub fn or(guards: impl IntoIterator<Item = Guard>) -> Guard {
    Guard::Any(guards.into_iter().collect())
}

/// An effect to run through the operations port when a rule fires.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Noop,
    ProduceArtifacts(Vec<Artifact>),
    CallModel(Phase),
    Compile,
    RunTests,
    Archive(Phase),
    Sequence(Vec<Action>),
}

impl Action {
    /// Execute the action against the port. `Sequence` stops on the first
    /// failure and concatenates the artifacts produced so far.
    pub fn run<'a>(
        &'a self,
        ops: &'a dyn ExternalOperations,
    ) -> Pin<Box<dyn Future<Output = ActionResult> + Send + 'a>> {
        Box::pin(async move {
            match self {
                Action::Noop => Ok(Vec::new()),
                Action::ProduceArtifacts(artifacts) => Ok(artifacts.clone()),
                Action::CallModel(phase) => ops.execute_model_call(*phase).await,
                Action::Compile => ops.run_compilation().await,
                Action::RunTests => ops.run_tests().await,
                Action::Archive(phase) => ops.archive_phase_artifacts(*phase).await,
                Action::Sequence(actions) => {
                    let mut produced = Vec::new();
                    for action in actions {
                        produced.extend(action.run(ops).await?);
                    }
                    Ok(produced)
                }
            }
        })
    }
}

pub fn noop() -> Action {
    Action::Noop
}

pub fn produce_artifacts(artifacts: impl IntoIterator<Item = Artifact>) -> Action {
    Action::ProduceArtifacts(artifacts.into_iter().collect())
}

pub fn call_model(phase: Phase) -> Action {
    Action::CallModel(phase)
}

pub fn compile() -> Action {
    Action::Compile
}

pub fn run_tests() -> Action {
    Action::RunTests
}

pub fn archive(phase: Phase) -> Action {
    Action::Archive(phase)
}

pub fn sequence(actions: impl IntoIterator<Item = Action>) -> Action {
    Action::Sequence(actions.into_iter().collect())
}

/// One candidate transition: fire `action` and move to `target` when `guard`
/// holds and the target's artifact requirement is met.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRule {
    pub target: Phase,
    pub guard: Guard,
    pub action: Action,
}

impl TransitionRule {
    pub fn new(target: Phase, guard: Guard, action: Action) -> Self {
        Self {
            target,
            guard,
            action,
        }
    }

    /// The default rule set for a phase: one rule per forward target, gated
    /// on that target's required artifacts, with no action. This reproduces
    /// the static transition table exactly.
    pub fn forward_defaults(phase: Phase) -> Vec<TransitionRule> {
        forward_targets(phase)
            .iter()
            .map(|target| {
                TransitionRule::new(
                    *target,
                    and([is_active(), has_artifacts(required_artifacts(*target).iter().copied())]),
                    noop(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::ops::OperationFailure;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Port that records which calls were made and fails on request.
    #[derive(Default)]
    struct RecordingOperations {
        calls: Mutex<Vec<String>>,
        fail_compilation: bool,
    }

    #[async_trait]
    impl ExternalOperations for RecordingOperations {
        async fn execute_model_call(&self, phase: Phase) -> ActionResult {
            self.calls.lock().unwrap().push(format!("model:{phase}"));
            Ok(vec![Artifact::Spec])
        }

        async fn run_compilation(&self) -> ActionResult {
            self.calls.lock().unwrap().push("compile".into());
            if self.fail_compilation {
                Err(OperationFailure::recoverable("type error"))
            } else {
                Ok(Vec::new())
            }
        }

        async fn run_tests(&self) -> ActionResult {
            self.calls.lock().unwrap().push("tests".into());
            Ok(vec![Artifact::Tests])
        }

        async fn archive_phase_artifacts(&self, phase: Phase) -> ActionResult {
            self.calls.lock().unwrap().push(format!("archive:{phase}"));
            Ok(Vec::new())
        }

        async fn send_blocking_notification(&self, query: &str) {
            self.calls.lock().unwrap().push(format!("notify:{query}"));
        }
    }

    fn cx_with<'a>(snapshot: &'a ProtocolStateSnapshot, pending: usize) -> GuardContext<'a> {
        GuardContext {
            snapshot,
            pending_resolutions: pending,
        }
    }

    #[test]
    fn test_guard_combinators() {
        let mut snapshot = ProtocolStateSnapshot::initial();
        snapshot.add_artifacts([Artifact::Spec]);
        let cx = cx_with(&snapshot, 0);

        assert!(always().eval(&cx));
        assert!(!never().eval(&cx));
        assert!(is_active().eval(&cx));
        assert!(has_artifacts([Artifact::Spec]).eval(&cx));
        assert!(!has_artifacts([Artifact::Spec, Artifact::Tests]).eval(&cx));
        assert!(not(never()).eval(&cx));
        assert!(and([always(), is_active()]).eval(&cx));
        assert!(!and([always(), never()]).eval(&cx));
        assert!(or([never(), always()]).eval(&cx));
        assert!(!or([never(), never()]).eval(&cx));
    }

    #[test]
    fn test_blocking_resolved_guard() {
        use crate::blocking::{BlockingRequest, enter_blocking};
        use crate::clock::ManualClock;
        use chrono::{TimeZone, Utc};

        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());
        let mut snapshot = ProtocolStateSnapshot::initial();
        assert!(blocking_resolved().eval(&cx_with(&snapshot, 0)));

        enter_blocking(&mut snapshot, BlockingRequest::new("q"), &clock).unwrap();
        assert!(!blocking_resolved().eval(&cx_with(&snapshot, 0)));

        snapshot.active_blocking_record_mut().unwrap().resolved = true;
        assert!(blocking_resolved().eval(&cx_with(&snapshot, 0)));
    }

    #[tokio::test]
    async fn test_action_primitives() {
        let ops = RecordingOperations::default();

        assert_eq!(noop().run(&ops).await, Ok(Vec::new()));
        assert_eq!(
            produce_artifacts([Artifact::Contracts]).run(&ops).await,
            Ok(vec![Artifact::Contracts])
        );
        assert_eq!(
            call_model(Phase::Ignition).run(&ops).await,
            Ok(vec![Artifact::Spec])
        );
        assert_eq!(run_tests().run(&ops).await, Ok(vec![Artifact::Tests]));
        archive(Phase::Lattice).run(&ops).await.unwrap();

        let calls = ops.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec!["model:Ignition", "tests", "archive:Lattice"]
        );
    }

    #[tokio::test]
    async fn test_sequence_concatenates_artifacts() {
        let ops = RecordingOperations::default();
        let action = sequence([
            call_model(Phase::Mesoscopic),
            run_tests(),
            produce_artifacts([Artifact::FinalArtifact]),
        ]);
        let produced = action.run(&ops).await.unwrap();
        assert_eq!(
            produced,
            vec![Artifact::Spec, Artifact::Tests, Artifact::FinalArtifact]
        );
    }

    #[tokio::test]
    async fn test_sequence_stops_on_first_failure() {
        let ops = RecordingOperations {
            fail_compilation: true,
            ..Default::default()
        };
        let action = sequence([compile(), run_tests()]);
        let err = action.run(&ops).await.unwrap_err();
        assert_eq!(err.error, "type error");
        assert!(err.recoverable);

        let calls = ops.calls.lock().unwrap();
        assert_eq!(*calls, vec!["compile"], "tests must not run after failure");
    }

    #[test]
    fn test_forward_defaults_mirror_transition_table() {
        let rules = TransitionRule::forward_defaults(Phase::Ignition);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].target, Phase::Lattice);
        assert_eq!(rules[0].action, Action::Noop);

        let mut snapshot = ProtocolStateSnapshot::initial();
        assert!(!rules[0].guard.eval(&cx_with(&snapshot, 0)));
        snapshot.add_artifacts([Artifact::Spec]);
        assert!(rules[0].guard.eval(&cx_with(&snapshot, 0)));

        assert!(TransitionRule::forward_defaults(Phase::Complete).is_empty());
    }
}
