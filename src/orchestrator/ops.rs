//! The operations port: the sole boundary between the core and the workers.
//!
//! Phase workers, the model router, compilers and test runners all live
//! behind [`ExternalOperations`]. The core observes them only as
//! [`ActionResult`]s; worker-internal parallelism and timeouts are invisible
//! here.

use crate::phase::{Artifact, Phase};
use async_trait::async_trait;
use tracing::info;

/// A failed operation, with the port's judgement on recoverability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationFailure {
    pub error: String,
    pub recoverable: bool,
}

impl OperationFailure {
    pub fn recoverable(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            recoverable: true,
        }
    }

    pub fn fatal(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            recoverable: false,
        }
    }
}

/// What an operation produced: artifacts on success, a classified failure
/// otherwise.
pub type ActionResult = Result<Vec<Artifact>, OperationFailure>;

/// Abstract worker operations consumed by the tick loop.
///
/// Calls into this trait are the orchestrator's only suspension points
/// besides file I/O. `send_blocking_notification` is fire-and-forget and may
/// fail silently.
#[async_trait]
pub trait ExternalOperations: Send + Sync {
    /// Drive the model used to produce the given phase's artifacts.
    async fn execute_model_call(&self, phase: Phase) -> ActionResult;

    /// External typecheck of the generated code.
    async fn run_compilation(&self) -> ActionResult;

    /// External test runner.
    async fn run_tests(&self) -> ActionResult;

    /// Snapshot a phase's outputs on completion.
    async fn archive_phase_artifacts(&self, phase: Phase) -> ActionResult;

    /// Notify an external resolver that a blocking query is waiting.
    async fn send_blocking_notification(&self, query: &str);
}

/// Default port for the CLI: every worker call is a logged no-op. Real
/// workers are wired in by library consumers.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingOperations;

#[async_trait]
impl ExternalOperations for LoggingOperations {
    async fn execute_model_call(&self, phase: Phase) -> ActionResult {
        info!(%phase, "model call requested; no worker attached");
        Ok(Vec::new())
    }

    async fn run_compilation(&self) -> ActionResult {
        info!("compilation requested; no worker attached");
        Ok(Vec::new())
    }

    async fn run_tests(&self) -> ActionResult {
        info!("test run requested; no worker attached");
        Ok(Vec::new())
    }

    async fn archive_phase_artifacts(&self, phase: Phase) -> ActionResult {
        info!(%phase, "archive requested; no worker attached");
        Ok(Vec::new())
    }

    async fn send_blocking_notification(&self, query: &str) {
        info!(query, "blocking query waiting for resolution");
    }
}
