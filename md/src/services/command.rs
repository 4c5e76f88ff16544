//! Shell command hooks - the default capability implementation
//!
//! Each capability is a handlebars template from the `hooks` config section
//! (backend sections may override `collect` and `enrich`). Templates are
//! compiled up front so a typo fails at startup, not hours into a run.
//!
//! Template variables: `section`, `kind`, `repo`, `raw_index`,
//! `enriched_index`, `es_collection`, `es_enrichment`, `short_name`, `kinds`
//! and `options.<key>` for backend-specific options.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use eyre::{Context, Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::{debug, info};

use super::{Collector, Dashboard, Enricher, IdentityStore, ItemTracker, Reporter};
use crate::config::{BackendSection, Config, backend_kind};

/// Longest stderr tail kept in a hook failure
const STDERR_TAIL: usize = 2000;

/// Variables available to hook templates
#[derive(Debug, Clone, Default, Serialize)]
pub struct HookContext {
    pub section: String,
    pub kind: String,
    pub repo: String,
    pub raw_index: String,
    pub enriched_index: String,
    pub es_collection: String,
    pub es_enrichment: String,
    pub short_name: String,
    pub kinds: String,
    pub options: BTreeMap<String, serde_yaml::Value>,
}

/// Runs configured shell commands for each capability
pub struct CommandHooks {
    hbs: Handlebars<'static>,
    base: HookContext,
    timeout: Duration,
}

impl CommandHooks {
    /// Compile every configured template
    pub fn new(config: &Config) -> Result<Self> {
        debug!("CommandHooks::new: called");
        let mut hbs = Handlebars::new();
        hbs.register_escape_fn(handlebars::no_escape);
        hbs.set_strict_mode(true);

        let hooks = &config.hooks;
        let globals = [
            ("collect", &hooks.collect),
            ("enrich", &hooks.enrich),
            ("aliases", &hooks.aliases),
            ("identities-init", &hooks.identities_init),
            ("identities-load", &hooks.identities_load),
            ("identities-merge", &hooks.identities_merge),
            ("panels", &hooks.panels),
            ("menu", &hooks.menu),
            ("track-items", &hooks.track_items),
            ("report", &hooks.report),
        ];
        for (name, template) in globals {
            if let Some(template) = template {
                hbs.register_template_string(name, template)
                    .map_err(|e| eyre!("Invalid {} hook template: {}", name, e))?;
            }
        }
        for (section, backend) in &config.backends {
            for (name, template) in [("collect", &backend.collect), ("enrich", &backend.enrich)] {
                if let Some(template) = template {
                    hbs.register_template_string(&section_template(name, section), template)
                        .map_err(|e| eyre!("Invalid {} hook template in [{}]: {}", name, section, e))?;
                }
            }
        }
        debug!(templates = hbs.get_templates().len(), "CommandHooks::new: templates compiled");

        let base = HookContext {
            es_collection: config.es_collection.url.clone(),
            es_enrichment: config.es_enrichment.url.clone(),
            short_name: config.general.short_name.clone(),
            kinds: config.backend_kinds().join(","),
            ..Default::default()
        };

        Ok(Self {
            hbs,
            base,
            timeout: hooks.timeout(),
        })
    }

    /// Context for a hook that is not tied to a backend section
    pub fn global_context(&self) -> HookContext {
        self.base.clone()
    }

    /// Context for a backend-section hook
    pub fn backend_context(&self, section: &str, backend: &BackendSection, repo: Option<&str>) -> HookContext {
        HookContext {
            section: section.to_string(),
            kind: backend_kind(section).to_string(),
            repo: repo.unwrap_or_default().to_string(),
            raw_index: backend.raw_index.clone(),
            enriched_index: backend.enriched_index.clone(),
            options: backend.options.clone(),
            ..self.base.clone()
        }
    }

    /// Template name to use for a capability, preferring a section override
    fn resolve(&self, name: &str, section: Option<&str>) -> Option<String> {
        if let Some(section) = section {
            let overridden = section_template(name, section);
            if self.hbs.has_template(&overridden) {
                return Some(overridden);
            }
        }
        self.hbs.has_template(name).then(|| name.to_string())
    }

    /// Render the command line for a capability, `None` if no hook is configured
    pub fn render(&self, name: &str, ctx: &HookContext) -> Result<Option<String>> {
        let section = (!ctx.section.is_empty()).then_some(ctx.section.as_str());
        let Some(template) = self.resolve(name, section) else {
            return Ok(None);
        };
        let command = self
            .hbs
            .render(&template, ctx)
            .map_err(|e| eyre!("Failed to render {} hook: {}", name, e))?;
        Ok(Some(command))
    }

    /// Render and run a capability's hook
    pub async fn run(&self, name: &str, ctx: &HookContext) -> Result<()> {
        debug!(hook = %name, section = %ctx.section, repo = %ctx.repo, "CommandHooks::run: called");
        let Some(command) = self.render(name, ctx)? else {
            debug!(hook = %name, "CommandHooks::run: no hook configured, skipping");
            return Ok(());
        };

        info!(hook = %name, section = %ctx.section, repo = %ctx.repo, "Running hook");
        let output = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new("sh")
                .arg("-c")
                .arg(&command)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| eyre!("{} hook timed out after {:?}", name, self.timeout))?
        .context(format!("Failed to execute {} hook", name))?;

        if output.status.success() {
            debug!(hook = %name, "CommandHooks::run: hook succeeded");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail = tail_chars(stderr.trim(), STDERR_TAIL);
        debug!(hook = %name, exit_code = ?output.status.code(), "CommandHooks::run: hook failed");
        Err(eyre!(
            "{} hook exited with code {}: {}",
            name,
            output.status.code().unwrap_or(-1),
            tail
        ))
    }
}

fn section_template(name: &str, section: &str) -> String {
    format!("{}@{}", name, section)
}

/// Last `max` characters of `s`, on a char boundary
fn tail_chars(s: &str, max: usize) -> &str {
    let count = s.chars().count();
    if count <= max {
        return s;
    }
    let skip = count - max;
    let start = s.char_indices().nth(skip).map(|(i, _)| i).unwrap_or(0);
    &s[start..]
}

#[async_trait]
impl Collector for CommandHooks {
    async fn collect(&self, section: &str, backend: &BackendSection, repo: &str) -> Result<()> {
        self.run("collect", &self.backend_context(section, backend, Some(repo))).await
    }
}

#[async_trait]
impl Enricher for CommandHooks {
    async fn enrich(&self, section: &str, backend: &BackendSection, repo: &str) -> Result<()> {
        self.run("enrich", &self.backend_context(section, backend, Some(repo))).await
    }

    async fn create_aliases(&self, section: &str, backend: &BackendSection) -> Result<()> {
        self.run("aliases", &self.backend_context(section, backend, None)).await
    }
}

#[async_trait]
impl IdentityStore for CommandHooks {
    async fn init(&self) -> Result<()> {
        self.run("identities-init", &self.global_context()).await
    }

    async fn load(&self) -> Result<()> {
        self.run("identities-load", &self.global_context()).await
    }

    async fn merge(&self) -> Result<()> {
        self.run("identities-merge", &self.global_context()).await
    }
}

#[async_trait]
impl Dashboard for CommandHooks {
    async fn upload_panels(&self, kinds: &[String]) -> Result<()> {
        let ctx = HookContext {
            kinds: kinds.join(","),
            ..self.global_context()
        };
        self.run("panels", &ctx).await
    }

    async fn upload_menu(&self, kinds: &[String]) -> Result<()> {
        let ctx = HookContext {
            kinds: kinds.join(","),
            ..self.global_context()
        };
        self.run("menu", &ctx).await
    }
}

#[async_trait]
impl ItemTracker for CommandHooks {
    async fn track(&self) -> Result<()> {
        self.run("track-items", &self.global_context()).await
    }
}

#[async_trait]
impl Reporter for CommandHooks {
    async fn report(&self) -> Result<()> {
        self.run("report", &self.global_context()).await
    }
}
