//! Enrichment and alias creation for one backend section

use async_trait::async_trait;
use tracing::{debug, error, info};

use super::{Task, TaskContext, TaskDef, TaskScope};
use crate::error::TaskError;

/// Enriches every repository of its backend section
///
/// Holds an enrichment permit for the whole run, so no identity merge can
/// start until every repository is done.
pub struct EnrichTask {
    ctx: TaskContext,
    section: String,
}

impl TaskDef for EnrichTask {
    const NAME: &'static str = "enrich";
    const SCOPE: TaskScope = TaskScope::PerBackend;

    fn create(ctx: &TaskContext) -> Self {
        Self {
            ctx: ctx.clone(),
            section: String::new(),
        }
    }
}

#[async_trait]
impl Task for EnrichTask {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn set_backend_section(&mut self, section: &str) {
        self.section = section.to_string();
    }

    async fn execute(&mut self) -> Result<(), TaskError> {
        let section = self.section.as_str();
        let backend = self
            .ctx
            .backend(section)
            .map_err(|e| TaskError::enrichment(section, &e))?;

        let _permit = self.ctx.gate.begin_enrichment().await;
        let repos = self.ctx.projects.repos_for(section);
        info!(%section, repos = repos.len(), index = %backend.enriched_index, "Enrichment starting");

        let mut failed = Vec::new();
        for repo in &repos {
            debug!(%section, %repo, "EnrichTask::execute: enriching");
            if let Err(e) = self.ctx.services.enricher.enrich(section, backend, repo).await {
                error!(%section, %repo, error = %e, "Enrichment failed for repository");
                failed.push(format!("{} ({})", repo, e));
            }
        }

        if !failed.is_empty() {
            return Err(TaskError::DataEnrichment {
                section: section.to_string(),
                message: format!("{} of {} repositories failed: {}", failed.len(), repos.len(), failed.join("; ")),
            });
        }
        info!(%section, repos = repos.len(), "Enrichment finished");
        Ok(())
    }
}

/// Points the public aliases at the section's indices
pub struct AliasesTask {
    ctx: TaskContext,
    section: String,
}

impl TaskDef for AliasesTask {
    const NAME: &'static str = "aliases";
    const SCOPE: TaskScope = TaskScope::PerBackend;

    fn create(ctx: &TaskContext) -> Self {
        Self {
            ctx: ctx.clone(),
            section: String::new(),
        }
    }
}

#[async_trait]
impl Task for AliasesTask {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn set_backend_section(&mut self, section: &str) {
        self.section = section.to_string();
    }

    async fn execute(&mut self) -> Result<(), TaskError> {
        let section = self.section.as_str();
        let backend = self
            .ctx
            .backend(section)
            .map_err(|e| TaskError::task(Self::NAME, section, &e))?;

        self.ctx
            .services
            .enricher
            .create_aliases(section, backend)
            .await
            .map_err(|e| TaskError::task(Self::NAME, section, &e))?;
        info!(%section, "Aliases created");
        Ok(())
    }
}
