//! Dashboard publishing

use async_trait::async_trait;
use tracing::info;

use super::{Task, TaskContext, TaskDef, TaskScope};
use crate::error::TaskError;
use crate::scheduler::GLOBAL_MANAGER;

/// Uploads the panels for every configured backend kind
pub struct PanelsTask {
    ctx: TaskContext,
}

impl TaskDef for PanelsTask {
    const NAME: &'static str = "panels";
    const SCOPE: TaskScope = TaskScope::Global;

    fn create(ctx: &TaskContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait]
impl Task for PanelsTask {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&mut self) -> Result<(), TaskError> {
        let kinds = self.ctx.config.backend_kinds();
        self.ctx
            .services
            .dashboard
            .upload_panels(&kinds)
            .await
            .map_err(|e| TaskError::task(Self::NAME, GLOBAL_MANAGER, &e))?;
        info!(kinds = %kinds.join(","), url = %self.ctx.config.panels.kibiter_url, "Panels uploaded");
        Ok(())
    }
}

/// Uploads the dashboard menu
pub struct PanelsMenuTask {
    ctx: TaskContext,
}

impl TaskDef for PanelsMenuTask {
    const NAME: &'static str = "menu";
    const SCOPE: TaskScope = TaskScope::Global;

    fn create(ctx: &TaskContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait]
impl Task for PanelsMenuTask {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&mut self) -> Result<(), TaskError> {
        let kinds = self.ctx.config.backend_kinds();
        self.ctx
            .services
            .dashboard
            .upload_menu(&kinds)
            .await
            .map_err(|e| TaskError::task(Self::NAME, GLOBAL_MANAGER, &e))?;
        info!("Menu uploaded");
        Ok(())
    }
}
