//! Scheduler - task managers, the orchestrator and their coordination primitives
//!
//! One orchestrator per process. Each round it spawns a task manager per
//! backend section plus one for the global tasks; managers share a stop
//! signal, an error relay and the identities/enrichment gate.

mod config;
mod gate;
mod manager;
mod orchestrator;
mod relay;
mod signal;

pub use config::SchedulerConfig;
pub use gate::{EnrichmentPermit, IdentitiesGate, IdentitiesPermit};
pub use manager::{GLOBAL_MANAGER, ManagerExit, ManagerScope, TaskManager};
pub use orchestrator::{Orchestrator, RoundReport};
pub use relay::{ErrorRelay, RelayedError};
pub use signal::StopSignal;
