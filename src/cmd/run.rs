//! Tick-loop commands: `run` and `recover`.

use crate::clock::SystemClock;
use crate::config::Config;
use crate::ledger::DecisionLedger;
use crate::orchestrator::{LoggingOperations, Orchestrator, RunOutcome};
use crate::persistence::load_state;
use crate::phase::Phase;
use crate::ui::ProtocolUi;
use anyhow::{Result, anyhow};
use std::sync::Arc;
use tracing::info;

fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let clock = Arc::new(SystemClock);
    let snapshot = load_state(&config.state_file)?;
    let ledger = DecisionLedger::load_or_new(
        &config.ledger_file,
        config.project_name.clone(),
        clock.as_ref(),
    )?;
    Ok(Orchestrator::new(
        snapshot,
        ledger,
        Arc::new(LoggingOperations),
        clock,
        config.state_file.clone(),
        config.ledger_file.clone(),
    )
    .with_max_ticks(config.max_ticks)
    .with_allow_custom_response(config.allow_custom_response))
}

/// Drive the tick loop until an exit reason is produced or Ctrl-C lands
/// between ticks.
pub async fn cmd_run(config: &Config, max_ticks: Option<u64>, ui: &ProtocolUi) -> Result<RunOutcome> {
    let mut orchestrator = build_orchestrator(config)?;
    if let Some(max_ticks) = max_ticks {
        orchestrator = orchestrator.with_max_ticks(max_ticks);
    }

    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    info!(
        phase = %orchestrator.snapshot().state.phase,
        "starting tick loop"
    );
    let spinner = ui.spinner(&format!(
        "Running protocol from {}...",
        orchestrator.snapshot().state.phase
    ));
    let outcome = orchestrator.run().await;
    spinner.finish_and_clear();

    let outcome = outcome?;
    ui.print_run_summary(&outcome);
    Ok(outcome)
}

/// Roll back along a failure edge after a recoverable failure.
pub fn cmd_recover(config: &Config, target: &str, ui: &ProtocolUi) -> Result<()> {
    let target: Phase = target.parse().map_err(|e: String| anyhow!(e))?;
    let mut orchestrator = build_orchestrator(config)?;
    orchestrator.recover(target)?;
    ui.log_step("State persisted");
    println!(
        "Recovered to {} with {} artifact(s) preserved",
        target,
        orchestrator.snapshot().artifacts.len()
    );
    Ok(())
}
