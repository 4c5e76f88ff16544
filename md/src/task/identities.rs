//! Identity store tasks: initialization, loading and merging

use async_trait::async_trait;
use tracing::info;

use super::{Task, TaskContext, TaskDef, TaskScope};
use crate::error::TaskError;
use crate::scheduler::GLOBAL_MANAGER;

/// Prepares the identity store; part of the initial load
pub struct IdentitiesInitTask {
    ctx: TaskContext,
}

impl TaskDef for IdentitiesInitTask {
    const NAME: &'static str = "identities-init";
    const SCOPE: TaskScope = TaskScope::Global;

    fn create(ctx: &TaskContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait]
impl Task for IdentitiesInitTask {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&mut self) -> Result<(), TaskError> {
        self.ctx
            .services
            .identities
            .init()
            .await
            .map_err(|e| TaskError::task(Self::NAME, GLOBAL_MANAGER, &e))?;
        info!("Identity store initialized");
        Ok(())
    }
}

/// Loads identities and organizations into the store
pub struct IdentitiesLoadTask {
    ctx: TaskContext,
}

impl TaskDef for IdentitiesLoadTask {
    const NAME: &'static str = "identities-load";
    const SCOPE: TaskScope = TaskScope::Global;

    fn create(ctx: &TaskContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait]
impl Task for IdentitiesLoadTask {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&mut self) -> Result<(), TaskError> {
        self.ctx
            .services
            .identities
            .load()
            .await
            .map_err(|e| TaskError::task(Self::NAME, GLOBAL_MANAGER, &e))?;
        info!("Identities loaded");
        Ok(())
    }
}

/// Merges identities; never overlaps an enrichment
pub struct IdentitiesMergeTask {
    ctx: TaskContext,
}

impl TaskDef for IdentitiesMergeTask {
    const NAME: &'static str = "identities-merge";
    const SCOPE: TaskScope = TaskScope::Global;

    fn create(ctx: &TaskContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait]
impl Task for IdentitiesMergeTask {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn execute(&mut self) -> Result<(), TaskError> {
        let _permit = self.ctx.gate.begin_identities().await;
        let matching = self.ctx.config.sortinghat.matching.join(",");
        info!(%matching, "Identities merge starting");
        self.ctx
            .services
            .identities
            .merge()
            .await
            .map_err(|e| TaskError::task(Self::NAME, GLOBAL_MANAGER, &e))?;
        info!("Identities merge finished");
        Ok(())
    }
}
