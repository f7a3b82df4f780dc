//! Ledger inspection commands.

use crate::clock::SystemClock;
use crate::config::Config;
use crate::ledger::{DecisionLedger, DecisionStatus};
use crate::ui::ProtocolUi;
use anyhow::Result;
use console::style;

/// Subcommands of `criticality ledger`.
#[derive(Debug, Clone, Copy)]
pub enum LedgerView {
    Show,
    Stats,
}

pub fn cmd_ledger(config: &Config, view: LedgerView, ui: &ProtocolUi) -> Result<()> {
    let ledger = DecisionLedger::load_or_new(
        &config.ledger_file,
        config.project_name.clone(),
        &SystemClock,
    )?;

    if ledger.is_empty() {
        println!("No decisions recorded");
        return Ok(());
    }

    match view {
        LedgerView::Show => show(&ledger, ui),
        LedgerView::Stats => stats(&ledger, ui),
    }
    Ok(())
}

fn show(ledger: &DecisionLedger, ui: &ProtocolUi) {
    ui.print_header(&format!("Decisions for {}", ledger.meta().project));
    for decision in ledger.decisions() {
        let marker = match decision.status {
            DecisionStatus::Active => style("●").green(),
            DecisionStatus::Superseded => style("○").dim(),
            DecisionStatus::Invalidated => style("✗").red(),
        };
        println!(
            "{marker} {} [{}] {}",
            style(&decision.id).cyan(),
            decision.confidence.as_str(),
            decision.constraint
        );
        if let Some(superseded_by) = &decision.superseded_by {
            println!("    superseded by {superseded_by}");
        }
        if let Some(query_id) = &decision.human_query_id {
            println!("    answers {query_id}");
        }
    }
}

fn stats(ledger: &DecisionLedger, ui: &ProtocolUi) {
    let stats = ledger.stats();
    ui.print_header(&format!("Ledger stats for {}", ledger.meta().project));
    println!(
        "Total: {} ({} active, {} superseded, {} invalidated)",
        stats.total, stats.active, stats.superseded, stats.invalidated
    );
    println!("By category:");
    for (category, count) in &stats.by_category {
        println!("  {category}: {count}");
    }
    println!("By confidence:");
    for (confidence, count) in &stats.by_confidence {
        println!("  {confidence}: {count}");
    }
}
