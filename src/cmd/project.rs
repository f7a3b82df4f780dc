//! Project lifecycle commands: `init` and `reset`.

use crate::clock::SystemClock;
use crate::config::Config;
use crate::ledger::DecisionLedger;
use crate::persistence::save_state;
use crate::state::model::ProtocolStateSnapshot;
use crate::ui::ProtocolUi;
use anyhow::{Context, Result};
use dialoguer::Confirm;

/// Scaffold `.criticality/` with a fresh state file and ledger. Idempotent:
/// existing files are left alone.
pub fn cmd_init(config: &Config, ui: &ProtocolUi) -> Result<()> {
    let clock = SystemClock;
    let already = config.state_file.exists();

    config.ensure_directories()?;

    if already {
        println!("Protocol already initialized at {}", config.protocol_dir.display());
        return Ok(());
    }

    ui.log_step("Writing initial state...");
    save_state(&ProtocolStateSnapshot::initial(), &config.state_file, &clock)?;

    if !config.ledger_file.exists() {
        ui.log_step("Writing empty ledger...");
        let mut ledger = DecisionLedger::new(config.project_name.clone(), &clock);
        ledger.save(&config.ledger_file, &clock)?;
    }

    println!(
        "Initialized criticality protocol for {} at {}",
        config.project_name,
        config.protocol_dir.display()
    );
    Ok(())
}

/// Delete the protocol state, keeping the decision ledger as history.
pub fn cmd_reset(config: &Config, force: bool, ui: &ProtocolUi) -> Result<()> {
    if !config.state_file.exists() {
        println!("Nothing to reset");
        return Ok(());
    }

    if !force {
        let confirmed = Confirm::new()
            .with_prompt("Delete protocol state? The decision ledger is kept")
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            println!("Aborted");
            return Ok(());
        }
    }

    std::fs::remove_file(&config.state_file).context("Failed to remove state file")?;
    ui.log_step("State file removed");
    println!("Reset complete (ledger retained)");
    Ok(())
}
