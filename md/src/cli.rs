//! CLI command definitions and subcommands

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::debug;

use crate::config::{Config, PhasesConfig};

/// Mordred - collection, identities, enrichment and dashboard scheduler
#[derive(Parser)]
#[command(
    name = "mordred",
    about = "Schedules collection, identity, enrichment and dashboard tasks per backend",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the pipeline (the default when no subcommand is given)
    Run {
        /// Only run these phases (comma separated); defaults to the config
        #[arg(short, long, value_delimiter = ',')]
        phases: Vec<Phase>,

        /// Run continuously
        #[arg(short, long, conflicts_with = "once")]
        update: bool,

        /// Run a single batch round, even if the config says continuous
        #[arg(long)]
        once: bool,

        /// Skip the external service checks
        #[arg(long)]
        skip_checks: bool,
    },

    /// Check that the external services are reachable
    Check,

    /// List backend sections and their current repositories
    Backends,
}

/// Pipeline phases selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Phase {
    Collection,
    Identities,
    Enrichment,
    Panels,
    TrackItems,
    Report,
}

/// Phase flags with only the listed phases enabled
///
/// An empty list keeps the configured phases.
pub fn phases_from(phases: &[Phase], configured: &PhasesConfig) -> PhasesConfig {
    debug!(?phases, "phases_from: called");
    if phases.is_empty() {
        return configured.clone();
    }
    let mut selected = PhasesConfig::none();
    for phase in phases {
        match phase {
            Phase::Collection => selected.collection = true,
            Phase::Identities => selected.identities = true,
            Phase::Enrichment => selected.enrichment = true,
            Phase::Panels => selected.panels = true,
            Phase::TrackItems => selected.track_items = true,
            Phase::Report => selected.report = true,
        }
    }
    selected
}

/// Apply `run` flags on top of the loaded configuration
pub fn apply_run_flags(config: &mut Config, phases: &[Phase], update: bool, once: bool) {
    config.phases = phases_from(phases, &config.phases);
    if update {
        config.general.update = true;
    }
    if once {
        config.general.update = false;
    }
    debug!(phases = ?config.phases, update = config.general.update, "apply_run_flags: applied");
}

/// Parse a log level name, case-insensitive; `WARNING` is accepted for `WARN`
pub fn parse_log_level(level: &str) -> Option<tracing::Level> {
    match level.to_uppercase().as_str() {
        "TRACE" => Some(tracing::Level::TRACE),
        "DEBUG" => Some(tracing::Level::DEBUG),
        "INFO" => Some(tracing::Level::INFO),
        "WARN" | "WARNING" => Some(tracing::Level::WARN),
        "ERROR" => Some(tracing::Level::ERROR),
        _ => None,
    }
}

/// Default location of the log file
pub fn get_log_path(logs_dir: Option<&PathBuf>) -> PathBuf {
    debug!(?logs_dir, "get_log_path: called");
    let dir = match logs_dir {
        Some(dir) => dir.clone(),
        None => dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mordred")
            .join("logs"),
    };
    dir.join("mordred.log")
}
