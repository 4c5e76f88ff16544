//! Item tracking and report generation

use async_trait::async_trait;
use tracing::info;

use super::{Task, TaskContext, TaskDef, TaskScope};
use crate::error::TaskError;
use crate::scheduler::GLOBAL_MANAGER;

pub struct TrackItemsTask {
    ctx: TaskContext,
}

impl TaskDef for TrackItemsTask {
    const NAME: &'static str = "track-items";
    const SCOPE: TaskScope = TaskScope::Global;

    fn create(ctx: &TaskContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait]
impl Task for TrackItemsTask {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&mut self) -> Result<(), TaskError> {
        self.ctx
            .services
            .tracker
            .track()
            .await
            .map_err(|e| TaskError::task(Self::NAME, GLOBAL_MANAGER, &e))?;
        info!("Items tracked");
        Ok(())
    }
}

pub struct ReportTask {
    ctx: TaskContext,
}

impl TaskDef for ReportTask {
    const NAME: &'static str = "report";
    const SCOPE: TaskScope = TaskScope::Global;

    fn create(ctx: &TaskContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait]
impl Task for ReportTask {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&mut self) -> Result<(), TaskError> {
        self.ctx
            .services
            .reporter
            .report()
            .await
            .map_err(|e| TaskError::task(Self::NAME, GLOBAL_MANAGER, &e))?;
        info!("Report generated");
        Ok(())
    }
}
