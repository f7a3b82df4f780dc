//! State inspection and mutation commands: `status`, `artifact`, `block`,
//! `resolve`.

use crate::blocking::{self, BlockingRequest, Resolution};
use crate::clock::SystemClock;
use crate::config::Config;
use crate::ledger::DecisionLedger;
use crate::persistence::{load_state, save_state};
use crate::phase::Artifact;
use crate::state::model::Substate;
use crate::ui::ProtocolUi;
use anyhow::{Context, Result, anyhow, bail};
use dialoguer::{Input, Select, theme::ColorfulTheme};

/// Show the current snapshot and ledger summary.
pub fn cmd_status(config: &Config, ui: &ProtocolUi) -> Result<()> {
    if !config.state_file.exists() {
        println!("Not initialized (run `criticality init`)");
        return Ok(());
    }

    let snapshot = load_state(&config.state_file)?;
    let clock = SystemClock;
    let ledger = DecisionLedger::load_or_new(&config.ledger_file, config.project_name.clone(), &clock)?;

    ui.print_header(&format!("{} — Criticality protocol", config.project_name));
    ui.print_status(&snapshot, &ledger.stats());
    if let Some(record) = snapshot.active_blocking_record() {
        ui.print_blocking(record);
    }
    Ok(())
}

/// Record a produced artifact into the snapshot.
pub fn cmd_artifact(config: &Config, kind: &str, ui: &ProtocolUi) -> Result<()> {
    let artifact: Artifact = kind.parse().map_err(|e: String| anyhow!(e))?;
    let mut snapshot = load_state(&config.state_file)?;

    if snapshot.has_artifact(artifact) {
        println!("Artifact {artifact} already recorded");
        return Ok(());
    }
    snapshot.add_artifacts([artifact]);
    save_state(&snapshot, &config.state_file, &SystemClock)?;
    ui.log_step("State persisted");
    println!("Recorded artifact {artifact}");
    Ok(())
}

/// Enter a blocking substate with the given query.
pub fn cmd_block(
    config: &Config,
    query: &str,
    options: Vec<String>,
    timeout_ms: Option<u64>,
    ui: &ProtocolUi,
) -> Result<()> {
    let clock = SystemClock;
    let mut snapshot = load_state(&config.state_file)?;

    let mut request = BlockingRequest::new(query);
    if !options.is_empty() {
        request = request.with_options(options);
    }
    if let Some(timeout) = timeout_ms.or(config.default_timeout_ms) {
        request = request.with_timeout_ms(timeout);
    }

    blocking::enter_blocking(&mut snapshot, request, &clock)?;
    save_state(&snapshot, &config.state_file, &clock)?;

    if let Some(record) = snapshot.active_blocking_record() {
        ui.print_blocking(record);
    }
    Ok(())
}

/// Resolve the live blocking query, prompting interactively when no
/// response was given on the command line.
pub fn cmd_resolve(config: &Config, response: Option<String>, ui: &ProtocolUi) -> Result<()> {
    let clock = SystemClock;
    let mut snapshot = load_state(&config.state_file)?;
    let mut ledger =
        DecisionLedger::load_or_new(&config.ledger_file, config.project_name.clone(), &clock)?;

    let Some(query) = snapshot.active_blocking_record().map(|r| r.query.clone()) else {
        println!("No blocking query to resolve");
        return Ok(());
    };

    let options = match &snapshot.state.substate {
        Substate::Blocking { options, .. } => options.clone(),
        _ => None,
    };

    let response = match response {
        Some(response) => response,
        None => prompt_for_response(&query, options.as_deref(), config.allow_custom_response)?,
    };

    let state = snapshot.state.clone();
    let record = snapshot
        .active_blocking_record_mut()
        .context("blocking record disappeared")?;
    let record_id = record.id.clone();
    let new_state = blocking::resolve_blocking(
        &state,
        record,
        &Resolution {
            response: response.clone(),
            allow_custom_response: config.allow_custom_response,
        },
        &mut ledger,
        &clock,
    )?;
    snapshot.state = new_state;

    // Ledger first, then state: the decision must land before the substate
    // reverts on disk.
    ledger.save(&config.ledger_file, &clock)?;
    save_state(&snapshot, &config.state_file, &clock)?;

    ui.log_step("Ledger and state persisted");
    println!("Resolved {record_id} with {response:?}");
    Ok(())
}

fn prompt_for_response(
    query: &str,
    options: Option<&[String]>,
    allow_custom: bool,
) -> Result<String> {
    match options {
        Some(options) if !options.is_empty() => {
            let mut items: Vec<&str> = options.iter().map(|s| s.as_str()).collect();
            if allow_custom {
                items.push("(custom answer)");
            }
            let selection = Select::with_theme(&ColorfulTheme::default())
                .with_prompt(query)
                .items(&items)
                .default(0)
                .interact()
                .context("Failed to read selection")?;
            if selection < options.len() {
                Ok(options[selection].clone())
            } else {
                prompt_custom(query)
            }
        }
        _ if allow_custom => prompt_custom(query),
        _ => bail!("query has no options and custom responses are disabled"),
    }
}

fn prompt_custom(query: &str) -> Result<String> {
    Input::with_theme(&ColorfulTheme::default())
        .with_prompt(query)
        .interact_text()
        .context("Failed to read response")
}
