//! Terminal output for the CLI commands.
//!
//! All human-facing printing goes through `ProtocolUi` so command logic
//! stays free of formatting concerns. Library consumers never see this.

use crate::ledger::LedgerStats;
use crate::orchestrator::{RunOutcome, StopReason};
use crate::state::model::{BlockingRecord, ProtocolStateSnapshot, Substate};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub struct ProtocolUi {
    verbose: bool,
}

impl ProtocolUi {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Dim step log, only shown with --verbose.
    pub fn log_step(&self, message: &str) {
        if self.verbose {
            println!("  {}", style(message).dim());
        }
    }

    pub fn print_header(&self, title: &str) {
        println!("{}", style(title).bold());
    }

    pub fn print_status(&self, snapshot: &ProtocolStateSnapshot, stats: &LedgerStats) {
        println!(
            "Phase:     {}",
            style(snapshot.state.phase.as_str()).cyan().bold()
        );
        let substate = match &snapshot.state.substate {
            Substate::Active { task, .. } => match task {
                Some(task) => format!("Active ({task})"),
                None => "Active".to_string(),
            },
            Substate::Blocking { query, .. } => format!("Blocking ({query})"),
            Substate::Failed { error, code, .. } => match code {
                Some(code) => format!("Failed [{code}] ({error})"),
                None => format!("Failed ({error})"),
            },
        };
        println!("Substate:  {substate}");

        let artifacts: Vec<&str> = snapshot.artifacts.iter().map(|a| a.as_str()).collect();
        println!(
            "Artifacts: {}",
            if artifacts.is_empty() {
                style("none".to_string()).dim()
            } else {
                style(artifacts.join(", "))
            }
        );

        let open = snapshot
            .blocking_queries
            .iter()
            .filter(|r| !r.resolved)
            .count();
        println!(
            "Queries:   {} total, {} open",
            snapshot.blocking_queries.len(),
            open
        );
        println!("Decisions: {} ({} active)", stats.total, stats.active);
    }

    pub fn print_blocking(&self, record: &BlockingRecord) {
        println!(
            "{} {}",
            style("Blocked on:").yellow().bold(),
            record.query
        );
        println!("  id: {}", style(&record.id).dim());
        if let Some(timeout) = record.timeout_ms {
            println!("  timeout: {timeout}ms");
        }
    }

    pub fn print_run_summary(&self, outcome: &RunOutcome) {
        let reason = match outcome.stop_reason {
            StopReason::Complete => style(outcome.stop_reason.as_str()).green().bold(),
            StopReason::Blocked => style(outcome.stop_reason.as_str()).yellow().bold(),
            _ => style(outcome.stop_reason.as_str()).red().bold(),
        };
        println!(
            "{reason} after {} tick{} ({} transition{})",
            outcome.ticks,
            if outcome.ticks == 1 { "" } else { "s" },
            outcome.transitions,
            if outcome.transitions == 1 { "" } else { "s" },
        );
        if let Some(error) = &outcome.error {
            println!("  {}", style(error).red());
        }
    }

    /// Spinner shown while the tick loop runs.
    pub fn spinner(&self, message: &str) -> ProgressBar {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg}").expect("template is valid"),
        );
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    }
}
