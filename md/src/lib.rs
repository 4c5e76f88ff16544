//! Mordred - concurrent scheduler for a data pipeline
//!
//! Mordred drives a recurring pipeline of collection, identity resolution,
//! enrichment and dashboard publishing against the repositories of a set of
//! projects. Work is partitioned by backend section: every section gets its
//! own task manager running its chain serially, while sections run
//! concurrently.
//!
//! # Core Concepts
//!
//! - **Task managers**: one tokio task per backend section, plus one for
//!   global tasks, spawned fresh every round
//! - **Identities gate**: identity merges and enrichments never overlap
//! - **Error relay**: the first task failure of a round reaches the orchestrator
//! - **Batch or continuous**: one cycle per manager, or free-running cadences
//!
//! # Modules
//!
//! - [`scheduler`] - Orchestrator, task managers and coordination primitives
//! - [`task`] - Task trait and the pipeline tasks
//! - [`services`] - Capability traits and the command hook implementation
//! - [`projects`] - Live project/repository store
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod error;
pub mod projects;
pub mod scheduler;
pub mod services;
pub mod task;

// Re-export commonly used types
pub use config::{BackendSection, Config, PhasesConfig};
pub use error::{PreflightError, TaskError};
pub use projects::{Project, Projects, ProjectsStore};
pub use scheduler::{
    ErrorRelay, IdentitiesGate, ManagerExit, ManagerScope, Orchestrator, RoundReport, SchedulerConfig, StopSignal,
    TaskManager,
};
pub use services::{CommandHooks, HealthCheck, HttpHealthCheck, Services};
pub use task::{Task, TaskClass, TaskContext, TaskDef, TaskScope};
