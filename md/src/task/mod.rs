//! Tasks - the units of work a task manager runs
//!
//! A task is one phase of the pipeline. Its scope decides whether the
//! orchestrator runs one instance per backend section or a single global one.
//! Task managers build their tasks from `TaskClass` descriptors when they
//! start and drive them serially on their own tokio task.

mod collection;
mod enrich;
mod identities;
mod panels;
mod projects;
mod report;

pub use collection::CollectTask;
pub use enrich::{AliasesTask, EnrichTask};
pub use identities::{IdentitiesInitTask, IdentitiesLoadTask, IdentitiesMergeTask};
pub use panels::{PanelsMenuTask, PanelsTask};
pub use projects::ProjectsTask;
pub use report::{ReportTask, TrackItemsTask};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use eyre::eyre;

use crate::config::{BackendSection, Config};
use crate::error::TaskError;
use crate::projects::ProjectsStore;
use crate::scheduler::IdentitiesGate;
use crate::services::Services;

/// Where a task runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskScope {
    /// One instance per backend section
    PerBackend,
    /// Exactly one instance for the whole round
    Global,
}

/// A unit of work
///
/// Instances are owned by one task manager and never shared across managers.
#[async_trait]
pub trait Task: Send {
    /// Name used in logs and relayed errors
    fn name(&self) -> &str;

    /// Bind the backend section; called once, before the first `execute()`,
    /// and only for per-backend tasks
    fn set_backend_section(&mut self, _section: &str) {}

    /// Run the unit of work once
    async fn execute(&mut self) -> Result<(), TaskError>;
}

/// A task type with a statically known name and scope
pub trait TaskDef: Task + Sized + 'static {
    const NAME: &'static str;
    const SCOPE: TaskScope;

    fn create(ctx: &TaskContext) -> Self;
}

type TaskCtor = dyn Fn(&TaskContext) -> Box<dyn Task> + Send + Sync;

/// Descriptor the orchestrator hands to task managers
///
/// Cheap to clone; every manager instantiates its own task from it.
#[derive(Clone)]
pub struct TaskClass {
    name: String,
    scope: TaskScope,
    ctor: Arc<TaskCtor>,
}

impl TaskClass {
    /// Descriptor for a `TaskDef` type
    pub fn of<T: TaskDef>() -> Self {
        Self {
            name: T::NAME.to_string(),
            scope: T::SCOPE,
            ctor: Arc::new(|ctx| Box::new(T::create(ctx))),
        }
    }

    /// Descriptor backed by a closure
    pub fn from_fn<F>(name: impl Into<String>, scope: TaskScope, ctor: F) -> Self
    where
        F: Fn(&TaskContext) -> Box<dyn Task> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            scope,
            ctor: Arc::new(ctor),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> TaskScope {
        self.scope
    }

    pub fn is_backend_task(&self) -> bool {
        self.scope == TaskScope::PerBackend
    }

    /// Build a fresh task instance
    pub fn instantiate(&self, ctx: &TaskContext) -> Box<dyn Task> {
        (self.ctor)(ctx)
    }
}

impl fmt::Debug for TaskClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskClass")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Shared handles every task is constructed with
#[derive(Clone)]
pub struct TaskContext {
    /// Immutable configuration
    pub config: Arc<Config>,

    /// Identities/enrichment mutual exclusion
    pub gate: Arc<IdentitiesGate>,

    /// Live project list
    pub projects: ProjectsStore,

    /// External capabilities
    pub services: Services,
}

impl TaskContext {
    pub fn new(config: Arc<Config>, gate: Arc<IdentitiesGate>, projects: ProjectsStore, services: Services) -> Self {
        Self {
            config,
            gate,
            projects,
            services,
        }
    }
}

impl TaskContext {
    /// Configuration of the backend section a task is bound to
    pub fn backend(&self, section: &str) -> eyre::Result<&BackendSection> {
        if section.is_empty() {
            return Err(eyre!("Task is not bound to a backend section"));
        }
        self.config
            .backends
            .get(section)
            .ok_or_else(|| eyre!("No configuration for backend section [{}]", section))
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext").field("gate", &self.gate).finish_non_exhaustive()
    }
}

/// Context over a fixed config and project list, for unit tests
#[cfg(test)]
pub(crate) fn test_context(config: Config, projects: ProjectsStore, services: Services) -> TaskContext {
    let gate = Arc::new(IdentitiesGate::new(std::time::Duration::from_millis(5)));
    TaskContext::new(Arc::new(config), gate, projects, services)
}
