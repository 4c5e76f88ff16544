//! Mordred - pipeline scheduler
//!
//! CLI entry point: loads configuration, runs pre-flight checks and drives
//! the orchestrator until the pipeline finishes or a signal arrives.

use std::fs;
use std::path::Path;
use std::process;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, error, info, warn};

use mordred::cli::{Cli, Command, Phase, apply_run_flags, get_log_path, parse_log_level};
use mordred::config::Config;
use mordred::projects::ProjectsStore;
use mordred::scheduler::{Orchestrator, StopSignal};
use mordred::services::{Services, preflight, preflight_checks};

fn setup_logging(log_path: &Path, cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    if let Some(dir) = log_path.parent() {
        fs::create_dir_all(dir).context("Failed to create log directory")?;
    }

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => parse_log_level(s).unwrap_or_else(|| {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
            tracing::Level::INFO
        }),
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Parse the config once; its log settings are needed before logging is up
    // and a load error is reported after
    let loaded = Config::load(cli.config.as_ref());
    let log_settings = loaded.as_ref().map(Config::log_settings).unwrap_or_default();
    let log_path = get_log_path(log_settings.logs_dir.as_ref());

    setup_logging(&log_path, cli.log_level.as_deref(), log_settings.level.as_deref())
        .context("Failed to setup logging")?;

    let config = loaded.context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    info!(short_name = %config.general.short_name, backends = config.backends.len(), "Mordred loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Run {
            phases,
            update,
            once,
            skip_checks,
        }) => {
            debug!(?phases, update, once, skip_checks, "main: matched Run command");
            cmd_run(config, &phases, update, once, skip_checks).await
        }
        Some(Command::Check) => {
            debug!("main: matched Check command");
            cmd_check(&config).await
        }
        Some(Command::Backends) => {
            debug!("main: matched Backends command");
            cmd_backends(&config)
        }
        None => {
            debug!("main: no command specified, running with configured phases");
            cmd_run(config, &[], false, false, false).await
        }
    }
}

/// Run the pipeline
async fn cmd_run(mut config: Config, phases: &[Phase], update: bool, once: bool, skip_checks: bool) -> Result<()> {
    apply_run_flags(&mut config, phases, update, once);

    if skip_checks {
        warn!("Skipping pre-flight checks");
    } else if let Err(e) = preflight(&preflight_checks(&config)?).await {
        error!(error = %e, "Pre-flight check failed");
        eprintln!("{}. Exiting...", e);
        process::exit(1);
    }

    let config = Arc::new(config);
    let services = Services::from_config(&config).context("Failed to compile command hooks")?;
    let orchestrator = Orchestrator::new(config.clone(), ProjectsStore::new(), services);

    spawn_signal_handler(orchestrator.shutdown_signal())?;

    info!(update = config.general.update, "Mordred starting");
    orchestrator.run().await.context("Pipeline failed")?;
    info!("Mordred finished");
    Ok(())
}

/// Set the shutdown signal on SIGINT or SIGTERM
fn spawn_signal_handler(shutdown: StopSignal) -> Result<()> {
    debug!("spawn_signal_handler: called");
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => warn!("SIGINT received"),
                _ = sigterm.recv() => warn!("SIGTERM received"),
            }
            info!("Stopping after the current cycle");
            shutdown.set();
        });
    }

    #[cfg(not(unix))]
    {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl+C received");
                shutdown.set();
            }
        });
    }

    Ok(())
}

/// Report reachability of every external service
async fn cmd_check(config: &Config) -> Result<()> {
    debug!("cmd_check: called");
    let checks = preflight_checks(config)?;
    let mut failed = 0;
    for check in &checks {
        if check.check().await {
            println!("  {} {:<18} {}", "\u{2713}".green(), check.service(), check.target());
        } else {
            println!("  {} {:<18} {}", "\u{2717}".red(), check.service(), check.target());
            failed += 1;
        }
    }

    if failed > 0 {
        eprintln!("{} of {} services unreachable", failed, checks.len());
        process::exit(1);
    }
    println!("All {} services reachable", checks.len());
    Ok(())
}

/// Print each configured backend section with its current repositories
fn cmd_backends(config: &Config) -> Result<()> {
    debug!("cmd_backends: called");
    let store = ProjectsStore::new();
    store
        .load_file(&config.projects.projects_file)
        .context("Failed to load projects")?;
    let repos = store.repos_by_backend(|section| config.backends.contains_key(section));

    for section in config.backends.keys() {
        let section_repos = repos.get(section).map(Vec::as_slice).unwrap_or_default();
        println!("{} ({} repositories)", section.bold(), section_repos.len());
        for repo in section_repos {
            println!("  {}", repo);
        }
    }
    Ok(())
}
