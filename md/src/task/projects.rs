//! Reload of the projects file into the shared store

use async_trait::async_trait;
use tracing::debug;

use super::{Task, TaskContext, TaskDef, TaskScope};
use crate::error::TaskError;
use crate::scheduler::GLOBAL_MANAGER;

/// Re-reads the projects file so the next round sees the current repositories
pub struct ProjectsTask {
    ctx: TaskContext,
}

impl TaskDef for ProjectsTask {
    const NAME: &'static str = "projects";
    const SCOPE: TaskScope = TaskScope::Global;

    fn create(ctx: &TaskContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait]
impl Task for ProjectsTask {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&mut self) -> Result<(), TaskError> {
        let path = &self.ctx.config.projects.projects_file;
        debug!(path = %path.display(), "ProjectsTask::execute: called");
        self.ctx
            .projects
            .load_file(path)
            .map_err(|e| TaskError::task(Self::NAME, GLOBAL_MANAGER, &e))?;
        Ok(())
    }
}
