use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use criticality::cmd::{
    self, ledger::LedgerView,
};
use criticality::config::Config;
use criticality::ui::ProtocolUi;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "criticality")]
#[command(version, about = "Deterministic protocol orchestrator")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Assume yes for confirmation prompts
    #[arg(long, global = true)]
    pub yes: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the protocol state and ledger
    Init,
    /// Drive the tick loop until it stops
    Run {
        /// Cap on ticks for this run (overrides configuration)
        #[arg(long)]
        max_ticks: Option<u64>,
    },
    /// Show the current phase, substate, artifacts and ledger summary
    Status,
    /// Record a produced artifact (e.g. spec, latticeCode, finalArtifact)
    Artifact { kind: String },
    /// Pause on a blocking query
    Block {
        query: String,
        /// Offered answers; repeat for multiple options
        #[arg(long = "option")]
        options: Vec<String>,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Resolve the pending blocking query
    Resolve { response: Option<String> },
    /// Roll back along a failure edge after a recoverable failure
    Recover { phase: String },
    /// Inspect the decision ledger
    Ledger {
        #[command(subcommand)]
        command: LedgerCommands,
    },
    /// Delete the protocol state (the ledger is kept)
    Reset {
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
pub enum LedgerCommands {
    /// List all decisions
    Show,
    /// Per-category and per-confidence counts
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let config = Config::new(project_dir, cli.verbose, None)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose {
            "criticality=debug"
        } else {
            "criticality=warn"
        })
    });
    let (file_layer, _guard) = if matches!(&cli.command, Commands::Run { .. })
        && config.log_dir.exists()
    {
        let appender = tracing_appender::rolling::daily(&config.log_dir, "criticality.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (
            Some(fmt::layer().with_ansi(false).with_writer(writer)),
            Some(guard),
        )
    } else {
        (None, None)
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    let ui = ProtocolUi::new(cli.verbose);

    match &cli.command {
        Commands::Init => {
            cmd::cmd_init(&config, &ui)?;
        }
        Commands::Run { max_ticks } => {
            cmd::cmd_run(&config, *max_ticks, &ui).await?;
        }
        Commands::Status => {
            cmd::cmd_status(&config, &ui)?;
        }
        Commands::Artifact { kind } => {
            cmd::cmd_artifact(&config, kind, &ui)?;
        }
        Commands::Block {
            query,
            options,
            timeout_ms,
        } => {
            cmd::cmd_block(&config, query, options.clone(), *timeout_ms, &ui)?;
        }
        Commands::Resolve { response } => {
            cmd::cmd_resolve(&config, response.clone(), &ui)?;
        }
        Commands::Recover { phase } => {
            cmd::cmd_recover(&config, phase, &ui)?;
        }
        Commands::Ledger { command } => {
            let view = match command {
                LedgerCommands::Show => LedgerView::Show,
                LedgerCommands::Stats => LedgerView::Stats,
            };
            cmd::cmd_ledger(&config, view, &ui)?;
        }
        Commands::Reset { force } => {
            cmd::cmd_reset(&config, *force || cli.yes, &ui)?;
        }
    }

    Ok(())
}
