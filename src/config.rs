//! Runtime configuration.
//!
//! Settings come from `.criticality/criticality.toml` when present, with CLI
//! flags layered on top. A missing file means defaults.
//!
//! ```toml
//! [project]
//! name = "my-project"
//!
//! [orchestrator]
//! max_ticks = 1000
//! allow_custom_response = true
//!
//! [blocking]
//! default_timeout_ms = 86400000
//! ```

use crate::orchestrator::DEFAULT_MAX_TICKS;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding all protocol state, relative to the project dir.
pub const PROTOCOL_DIR: &str = ".criticality";
/// Config file name inside the protocol directory.
pub const CONFIG_FILE: &str = "criticality.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectSection {
    pub name: Option<String>,
}

fn default_max_ticks() -> u64 {
    DEFAULT_MAX_TICKS
}

fn default_allow_custom() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSection {
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,
    #[serde(default = "default_allow_custom")]
    pub allow_custom_response: bool,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_ticks: default_max_ticks(),
            allow_custom_response: default_allow_custom(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockingSection {
    pub default_timeout_ms: Option<u64>,
}

/// The on-disk configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CriticalityConfig {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    #[serde(default)]
    pub blocking: BlockingSection,
}

impl CriticalityConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

/// Resolved runtime configuration: paths plus effective settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub protocol_dir: PathBuf,
    pub state_file: PathBuf,
    pub ledger_file: PathBuf,
    pub log_dir: PathBuf,
    pub project_name: String,
    pub max_ticks: u64,
    pub allow_custom_response: bool,
    pub default_timeout_ms: Option<u64>,
    pub verbose: bool,
}

impl Config {
    pub fn new(project_dir: PathBuf, verbose: bool, max_ticks: Option<u64>) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let protocol_dir = project_dir.join(PROTOCOL_DIR);

        let config_path = protocol_dir.join(CONFIG_FILE);
        let file_config = if config_path.exists() {
            CriticalityConfig::load(&config_path)?
        } else {
            CriticalityConfig::default()
        };

        let project_name = file_config.project.name.clone().unwrap_or_else(|| {
            project_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "criticality".to_string())
        });

        Ok(Self {
            state_file: protocol_dir.join("state.json"),
            ledger_file: protocol_dir.join("ledger.json"),
            log_dir: protocol_dir.join("logs"),
            protocol_dir,
            project_dir,
            project_name,
            max_ticks: max_ticks.unwrap_or(file_config.orchestrator.max_ticks),
            allow_custom_response: file_config.orchestrator.allow_custom_response,
            default_timeout_ms: file_config.blocking.default_timeout_ms,
            verbose,
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.protocol_dir)
            .context("Failed to create protocol directory")?;
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.protocol_dir.exists()
    }
}
