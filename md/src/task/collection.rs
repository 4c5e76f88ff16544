//! Raw data collection for one backend section

use async_trait::async_trait;
use tracing::{debug, error, info};

use super::{Task, TaskContext, TaskDef, TaskScope};
use crate::error::TaskError;

/// Collects every repository of its backend section
///
/// A failing repository does not stop the others; the task fails once all
/// repositories were tried.
pub struct CollectTask {
    ctx: TaskContext,
    section: String,
}

impl TaskDef for CollectTask {
    const NAME: &'static str = "collect";
    const SCOPE: TaskScope = TaskScope::PerBackend;

    fn create(ctx: &TaskContext) -> Self {
        Self {
            ctx: ctx.clone(),
            section: String::new(),
        }
    }
}

#[async_trait]
impl Task for CollectTask {
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
            .map_err(|e| TaskError::collection(section, &e))?;

        let repos = self.ctx.projects.repos_for(section);
        info!(%section, repos = repos.len(), index = %backend.raw_index, "Collection starting");

        let mut failed = Vec::new();
        for repo in &repos {
            debug!(%section, %repo, "CollectTask::execute: collecting");
            if let Err(e) = self.ctx.services.collector.collect(section, backend, repo).await {
                error!(%section, %repo, error = %e, "Collection failed for repository");
                failed.push(format!("{} ({})", repo, e));
            }
        }

        if !failed.is_empty() {
            return Err(TaskError::DataCollection {
                section: section.to_string(),
                message: format!("{} of {} repositories failed: {}", failed.len(), repos.len(), failed.join("; ")),
            });
        }
        info!(%section, repos = repos.len(), "Collection finished");
        Ok(())
    }
}
