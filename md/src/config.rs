//! Mordred configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::scheduler::SchedulerConfig;

/// Main Mordred configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Global run options
    pub general: GeneralConfig,

    /// Where the project/repository list lives
    pub projects: ProjectsConfig,

    /// Raw data store
    #[serde(rename = "es-collection")]
    pub es_collection: CollectionStoreConfig,

    /// Enriched data store
    #[serde(rename = "es-enrichment")]
    pub es_enrichment: EnrichmentStoreConfig,

    /// Identity store
    pub sortinghat: IdentitiesConfig,

    /// Dashboard publishing
    pub panels: PanelsConfig,

    /// Enabled pipeline phases
    pub phases: PhasesConfig,

    /// Scheduler timing
    pub scheduler: SchedulerConfig,

    /// Command templates backing the external capabilities
    pub hooks: HooksConfig,

    /// Backend sections keyed by name (`git`, `github:issues`, ...)
    pub backends: BTreeMap<String, BackendSection>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        for (name, section) in &self.backends {
            if section.raw_index.trim().is_empty() {
                return Err(eyre::eyre!("Backend section [{}] is missing raw-index", name));
            }
            if section.enriched_index.trim().is_empty() {
                return Err(eyre::eyre!("Backend section [{}] is missing enriched-index", name));
            }
        }
        if self.scheduler.poll_interval_ms == 0 {
            return Err(eyre::eyre!("scheduler.poll-interval-ms must be greater than zero"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: ./mordred.yml
        let local_config = PathBuf::from("mordred.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/mordred/mordred.yml
        if let Some(user_config) = user_config_path().filter(|p| p.exists()) {
            match Self::load_from_file(&user_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Settings needed to start logging
    pub fn log_settings(&self) -> LogSettings {
        LogSettings {
            level: self.general.log_level.clone(),
            logs_dir: self.general.logs_dir.clone(),
        }
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Backend kinds (section names without their `:tag`), deduplicated and sorted
    pub fn backend_kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.backends.keys().map(|name| backend_kind(name).to_string()).collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    /// Cadence for per-backend managers in continuous mode
    pub fn backend_cadence(&self) -> Duration {
        Duration::from_secs(self.general.min_update_delay)
    }

    /// Cadence for the global manager in continuous mode
    pub fn global_cadence(&self) -> Duration {
        Duration::from_secs(self.sortinghat.sleep_for)
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mordred").join("mordred.yml"))
}

/// Strip the optional `:tag` suffix from a backend section name
pub fn backend_kind(section: &str) -> &str {
    section.split_once(':').map(|(kind, _)| kind).unwrap_or(section)
}

/// Log level and directory, read before logging is initialized
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    pub level: Option<String>,
    pub logs_dir: Option<PathBuf>,
}

/// Global run options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Short name of the deployment, used in dashboards and hook templates
    #[serde(rename = "short-name")]
    pub short_name: String,

    /// Run continuously instead of a single batch round
    pub update: bool,

    /// Seconds between cycles of each backend manager in continuous mode
    #[serde(rename = "min-update-delay")]
    pub min_update_delay: u64,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// Directory for the log file
    #[serde(rename = "logs-dir")]
    pub logs_dir: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            short_name: "mordred".to_string(),
            update: false,
            min_update_delay: 60,
            log_level: None,
            logs_dir: None,
        }
    }
}

/// Project list location
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectsConfig {
    /// JSON file mapping project -> backend section -> repositories
    #[serde(rename = "projects-file")]
    pub projects_file: PathBuf,
}

impl Default for ProjectsConfig {
    fn default() -> Self {
        Self {
            projects_file: PathBuf::from("projects.json"),
        }
    }
}

/// Raw data store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionStoreConfig {
    pub url: String,

    /// Optional external queue service; checked at startup when set
    #[serde(rename = "queue-url")]
    pub queue_url: Option<String>,
}

impl Default for CollectionStoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            queue_url: None,
        }
    }
}

/// Enriched data store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentStoreConfig {
    pub url: String,

    /// Refresh identities of already enriched items after each merge
    pub autorefresh: bool,
}

impl Default for EnrichmentStoreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            autorefresh: true,
        }
    }
}

/// Identity store options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentitiesConfig {
    /// Identity store endpoint; checked at startup when set
    pub url: Option<String>,

    /// Seconds between cycles of the global manager in continuous mode
    #[serde(rename = "sleep-for")]
    pub sleep_for: u64,

    /// Matching criteria for the merge
    pub matching: Vec<String>,

    /// Affiliate identities to organizations after the merge
    pub affiliate: bool,
}

impl Default for IdentitiesConfig {
    fn default() -> Self {
        Self {
            url: None,
            sleep_for: 3600,
            matching: vec!["email".to_string()],
            affiliate: true,
        }
    }
}

/// Dashboard publishing options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelsConfig {
    #[serde(rename = "kibiter-url")]
    pub kibiter_url: String,

    #[serde(rename = "time-from")]
    pub time_from: String,
}

impl Default for PanelsConfig {
    fn default() -> Self {
        Self {
            kibiter_url: "http://localhost:5601".to_string(),
            time_from: "now-90d".to_string(),
        }
    }
}

/// Enabled pipeline phases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhasesConfig {
    pub collection: bool,
    pub identities: bool,
    pub enrichment: bool,
    pub panels: bool,
    #[serde(rename = "track-items")]
    pub track_items: bool,
    pub report: bool,
}

impl Default for PhasesConfig {
    fn default() -> Self {
        Self {
            collection: true,
            identities: true,
            enrichment: true,
            panels: true,
            track_items: false,
            report: false,
        }
    }
}

impl PhasesConfig {
    /// All phases disabled
    pub fn none() -> Self {
        Self {
            collection: false,
            identities: false,
            enrichment: false,
            panels: false,
            track_items: false,
            report: false,
        }
    }
}

/// Command templates for the external capabilities
///
/// Templates are rendered with handlebars; see `services::command` for the
/// variables available. A missing template makes that capability a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    pub collect: Option<String>,
    pub enrich: Option<String>,
    pub aliases: Option<String>,
    #[serde(rename = "identities-init")]
    pub identities_init: Option<String>,
    #[serde(rename = "identities-load")]
    pub identities_load: Option<String>,
    #[serde(rename = "identities-merge")]
    pub identities_merge: Option<String>,
    pub panels: Option<String>,
    pub menu: Option<String>,
    #[serde(rename = "track-items")]
    pub track_items: Option<String>,
    pub report: Option<String>,

    /// Per-command timeout in seconds
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            collect: None,
            enrich: None,
            aliases: None,
            identities_init: None,
            identities_load: None,
            identities_merge: None,
            panels: None,
            menu: None,
            track_items: None,
            report: None,
            timeout_secs: 3600,
        }
    }
}

impl HooksConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// One backend section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendSection {
    #[serde(rename = "raw-index", default)]
    pub raw_index: String,

    #[serde(rename = "enriched-index", default)]
    pub enriched_index: String,

    /// Overrides `hooks.collect` for this section
    #[serde(default)]
    pub collect: Option<String>,

    /// Overrides `hooks.enrich` for this section
    #[serde(default)]
    pub enrich: Option<String>,

    /// Backend-specific options, passed through to hook templates
    #[serde(flatten)]
    pub options: BTreeMap<String, serde_yaml::Value>,
}

impl BackendSection {
    pub fn new(raw_index: impl Into<String>, enriched_index: impl Into<String>) -> Self {
        Self {
            raw_index: raw_index.into(),
            enriched_index: enriched_index.into(),
            ..Default::default()
        }
    }
}
