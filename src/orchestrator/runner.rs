//! The tick-loop engine.
//!
//! `Orchestrator` owns the whole tick context: the snapshot, the artifact
//! set, the ordered pending resolutions and the operations port, plus the
//! clock and the persistence paths. One tick classifies the current state,
//! fires at most one transition, and persists the snapshot whenever it
//! changed.

use crate::blocking::{self, BlockingRequest, Resolution, TimeoutStatus};
use crate::clock::Clock;
use crate::errors::{BlockingError, TransitionError};
use crate::ledger::DecisionLedger;
use crate::orchestrator::ops::ExternalOperations;
use crate::orchestrator::rules::{GuardContext, TransitionRule};
use crate::orchestrator::tick::{PendingResolution, RunOutcome, StopReason, TickResult};
use crate::persistence::save_state;
use crate::phase::{Artifact, Phase};
use crate::state::model::{ProtocolStateSnapshot, Substate};
use crate::state::transitions::{failure_targets, transition};
use anyhow::{Context, Result, bail};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Default ceiling on ticks per `run()` loop. Idle ticks count: they consume
/// work even when no transition fires.
pub const DEFAULT_MAX_TICKS: u64 = 1000;

/// Cooperative cancellation for `run()`. Cancellation lands between ticks,
/// never mid-tick; in-flight port calls are the port's problem.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The protocol orchestrator.
pub struct Orchestrator {
    snapshot: ProtocolStateSnapshot,
    ledger: DecisionLedger,
    ops: Arc<dyn ExternalOperations>,
    clock: Arc<dyn Clock>,
    state_path: PathBuf,
    ledger_path: PathBuf,
    rules: HashMap<Phase, Vec<TransitionRule>>,
    pending_resolutions: VecDeque<PendingResolution>,
    ticks: u64,
    max_ticks: u64,
    allow_custom_response: bool,
    cancel: CancelHandle,
}

impl Orchestrator {
    pub fn new(
        snapshot: ProtocolStateSnapshot,
        ledger: DecisionLedger,
        ops: Arc<dyn ExternalOperations>,
        clock: Arc<dyn Clock>,
        state_path: PathBuf,
        ledger_path: PathBuf,
    ) -> Self {
        let rules = Phase::ALL
            .iter()
            .map(|phase| (*phase, TransitionRule::forward_defaults(*phase)))
            .collect();
        Self {
            snapshot,
            ledger,
            ops,
            clock,
            state_path,
            ledger_path,
            rules,
            pending_resolutions: VecDeque::new(),
            ticks: 0,
            max_ticks: DEFAULT_MAX_TICKS,
            allow_custom_response: true,
            cancel: CancelHandle::default(),
        }
    }

    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    pub fn with_allow_custom_response(mut self, allow: bool) -> Self {
        self.allow_custom_response = allow;
        self
    }

    /// Replace the transition rules for one phase. The defaults reproduce
    /// the static transition table with no actions.
    pub fn with_rules(mut self, phase: Phase, rules: Vec<TransitionRule>) -> Self {
        self.rules.insert(phase, rules);
        self
    }

    pub fn snapshot(&self) -> &ProtocolStateSnapshot {
        &self.snapshot
    }

    pub fn ledger(&self) -> &DecisionLedger {
        &self.ledger
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    fn persist_state(&self) -> Result<()> {
        save_state(&self.snapshot, &self.state_path, self.clock.as_ref())
            .context("failed to persist protocol state")
    }

    fn persist_ledger(&mut self) -> Result<()> {
        let clock = Arc::clone(&self.clock);
        self.ledger
            .save(&self.ledger_path, clock.as_ref())
            .context("failed to persist decision ledger")
    }

    /// Record artifacts produced by out-of-process workers and persist.
    pub fn record_artifacts(&mut self, artifacts: Vec<Artifact>) -> Result<()> {
        self.snapshot.add_artifacts(artifacts);
        self.persist_state()
    }

    /// Enter a blocking substate for the current phase, notify the external
    /// resolver (fire-and-forget) and persist.
    pub async fn request_input(&mut self, request: BlockingRequest) -> Result<()> {
        let query = request.query.clone();
        blocking::enter_blocking(&mut self.snapshot, request, self.clock.as_ref())?;
        self.ops.send_blocking_notification(&query).await;
        self.persist_state()
    }

    /// Queue a response for the live blocking query; the next tick consumes
    /// it.
    pub fn submit_resolution(&mut self, response: impl Into<String>) {
        self.pending_resolutions.push_back(PendingResolution {
            response: response.into(),
            resolved_at: self.clock.now(),
        });
    }

    /// Invoke the model worker for the current phase and apply the result:
    /// produced artifacts are recorded, a failure drives the substate to
    /// Failed with the port's recoverability verdict.
    pub async fn dispatch_worker(&mut self) -> Result<()> {
        let phase = self.snapshot.state.phase;
        let ops = Arc::clone(&self.ops);
        let result = ops.execute_model_call(phase).await;
        match result {
            Ok(artifacts) => {
                if !artifacts.is_empty() {
                    info!(%phase, count = artifacts.len(), "worker produced artifacts");
                }
                self.record_artifacts(artifacts)
            }
            Err(failure) => {
                warn!(%phase, error = %failure.error, recoverable = failure.recoverable, "worker failed");
                self.snapshot.state.substate = Substate::failed(
                    failure.error,
                    failure.recoverable,
                    None,
                    self.clock.as_ref(),
                );
                self.persist_state()
            }
        }
    }

    /// Caller-driven rollback along a failure edge after a recoverable
    /// failure. The artifact set is preserved; the substate reverts to
    /// Active at the rollback target.
    pub fn recover(&mut self, target: Phase) -> Result<()> {
        let from = self.snapshot.state.phase;
        match &self.snapshot.state.substate {
            Substate::Failed {
                recoverable: true, ..
            } => {}
            Substate::Failed { .. } => bail!("failure at {from} is not recoverable"),
            _ => bail!("recover requires a failed substate"),
        }
        if !failure_targets(from).contains(&target) {
            return Err(TransitionError::InvalidEdge { from, to: target }.into());
        }

        let staged = crate::state::model::ProtocolState::new(from, Substate::active());
        self.snapshot.state = transition(&staged, target, &self.snapshot.artifacts)?;
        info!(%from, to = %target, "rolled back along failure edge");
        self.persist_state()
    }

    /// One tick: classify, fire at most one transition, persist on change.
    pub async fn tick(&mut self) -> Result<TickResult> {
        self.ticks += 1;

        if self.snapshot.state.phase.is_terminal() {
            return Ok(TickResult::stopped(StopReason::Complete));
        }
        if let Substate::Failed { error, .. } = &self.snapshot.state.substate {
            return Ok(TickResult::failed(error.clone(), false));
        }
        if self.snapshot.state.is_blocking() {
            return self.tick_blocking();
        }
        self.tick_active().await
    }

    fn tick_blocking(&mut self) -> Result<TickResult> {
        let Some(record) = self.snapshot.active_blocking_record() else {
            warn!("blocking substate with no unresolved record; staying blocked");
            return Ok(TickResult::stopped(StopReason::Blocked));
        };

        if let TimeoutStatus::TimedOut { elapsed_ms } =
            blocking::check_timeout(record, self.clock.as_ref())
        {
            let message = format!(
                "blocking query {} timed out after {elapsed_ms}ms",
                record.id
            );
            warn!(%message);
            self.snapshot.state.substate = Substate::failed(
                message.clone(),
                true,
                Some("TIMEOUT".to_string()),
                self.clock.as_ref(),
            );
            self.persist_state()?;
            return Ok(TickResult::failed(message, true));
        }

        let Some(resolution) = self.pending_resolutions.pop_front() else {
            return Ok(TickResult::stopped(StopReason::Blocked));
        };

        let state = self.snapshot.state.clone();
        let resolution = Resolution {
            response: resolution.response,
            allow_custom_response: self.allow_custom_response,
        };
        let clock = Arc::clone(&self.clock);
        let record = self
            .snapshot
            .active_blocking_record_mut()
            .context("blocking record disappeared during tick")?;
        match blocking::resolve_blocking(
            &state,
            &mut *record,
            &resolution,
            &mut self.ledger,
            clock.as_ref(),
        ) {
            Ok(new_state) => {
                let query_id = record.id.clone();
                self.snapshot.state = new_state;
                // Ledger first: the decision must land before the substate
                // reverts on disk.
                self.persist_ledger()?;
                self.persist_state()?;
                info!(query = %query_id, response = %resolution.response, "blocking query resolved");
                Ok(TickResult::resolved())
            }
            Err(BlockingError::Ledger(e)) => Err(e.into()),
            Err(e) => {
                warn!(error = %e, response = %resolution.response, "discarding invalid resolution");
                Ok(TickResult::stopped(StopReason::Blocked))
            }
        }
    }

    async fn tick_active(&mut self) -> Result<TickResult> {
        let phase = self.snapshot.state.phase;
        let rules = self.rules.get(&phase).cloned().unwrap_or_default();
        if rules.is_empty() {
            return Ok(TickResult::stopped(StopReason::NoValidTransition));
        }

        for rule in &rules {
            let satisfied = {
                let cx = GuardContext {
                    snapshot: &self.snapshot,
                    pending_resolutions: self.pending_resolutions.len(),
                };
                rule.guard.eval(&cx)
            };
            if !satisfied {
                continue;
            }

            let ops = Arc::clone(&self.ops);
            let action_result = rule.action.run(ops.as_ref()).await;
            match action_result {
                Err(failure) => {
                    warn!(target = %rule.target, error = %failure.error, "transition action failed");
                    self.snapshot.state.substate = Substate::failed(
                        failure.error.clone(),
                        failure.recoverable,
                        None,
                        self.clock.as_ref(),
                    );
                    self.persist_state()?;
                    return Ok(TickResult::failed(failure.error, true));
                }
                Ok(produced) => {
                    self.snapshot.add_artifacts(produced);
                    match transition(&self.snapshot.state, rule.target, &self.snapshot.artifacts) {
                        Ok(new_state) => {
                            info!(from = %phase, to = %rule.target, "transition fired");
                            self.snapshot.state = new_state;
                            self.persist_state()?;
                            return Ok(TickResult::advanced(rule.target));
                        }
                        Err(e) => {
                            debug!(target = %rule.target, error = %e, "transition not taken");
                        }
                    }
                }
            }
        }

        Ok(TickResult::waiting())
    }

    /// Tick until the loop stops or the tick cap is hit.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        let mut transitions = 0u64;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(RunOutcome {
                    stop_reason: StopReason::ExternalError,
                    ticks: self.ticks,
                    transitions,
                    error: Some("cancellation requested".to_string()),
                });
            }
            if self.ticks >= self.max_ticks {
                return Ok(RunOutcome {
                    stop_reason: StopReason::ExternalError,
                    ticks: self.ticks,
                    transitions,
                    error: Some(format!("tick cap of {} exceeded", self.max_ticks)),
                });
            }

            let result = self.tick().await?;
            if result.transitioned {
                transitions += 1;
            }
            if !result.should_continue {
                return Ok(RunOutcome {
                    stop_reason: result.stop_reason.unwrap_or(StopReason::ExternalError),
                    ticks: self.ticks,
                    transitions,
                    error: result.error,
                });
            }
        }
    }
}
