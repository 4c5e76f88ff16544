//! TaskManager - runs one backend section's task chain (or the global chain)
//!
//! A manager owns its task instances and runs them serially, in class order,
//! once per cycle:
//! - sleep the poll interval, then the cadence (if any)
//! - execute every task; the first failure is relayed and ends the manager
//! - repeat until the stop signal is seen between cycles, or until a bounded
//!   manager has run its cycles

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::relay::{ErrorRelay, RelayedError};
use super::signal::StopSignal;
use crate::task::{Task, TaskClass, TaskContext};

/// Label used for the manager of global tasks
pub const GLOBAL_MANAGER: &str = "Global tasks";

/// What a manager is responsible for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ManagerScope {
    /// One backend section
    Backend(String),
    /// All global tasks
    Global,
}

impl fmt::Display for ManagerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerScope::Backend(section) => write!(f, "{}", section),
            ManagerScope::Global => write!(f, "{}", GLOBAL_MANAGER),
        }
    }
}

/// How a manager ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerExit {
    /// Stop signal observed between cycles
    Stopped { cycles: u64 },
    /// A task failed; its error was relayed
    Failed { task: String, cycles: u64 },
}

impl ManagerExit {
    pub fn cycles(&self) -> u64 {
        match self {
            ManagerExit::Stopped { cycles } | ManagerExit::Failed { cycles, .. } => *cycles,
        }
    }
}

/// Serial executor for one task chain
pub struct TaskManager {
    scope: ManagerScope,
    classes: Vec<TaskClass>,
    ctx: TaskContext,
    stop: StopSignal,
    relay: ErrorRelay,
    cadence: Duration,
    poll_interval: Duration,
    max_cycles: Option<u64>,
}

impl TaskManager {
    pub fn new(
        scope: ManagerScope,
        classes: Vec<TaskClass>,
        ctx: TaskContext,
        stop: StopSignal,
        relay: ErrorRelay,
    ) -> Self {
        let poll_interval = ctx.config.scheduler.poll_interval();
        Self {
            scope,
            classes,
            ctx,
            stop,
            relay,
            cadence: Duration::ZERO,
            poll_interval,
            max_cycles: None,
        }
    }

    /// Extra delay between cycles
    pub fn with_cadence(mut self, cadence: Duration) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    /// Run exactly `max` cycles (fewer only on failure)
    ///
    /// A bounded manager ignores a stop signal that lands before its cycles
    /// are done; only the cadence sleep stays interruptible.
    pub fn with_max_cycles(mut self, max: u64) -> Self {
        self.max_cycles = Some(max);
        self
    }

    pub fn scope(&self) -> &ManagerScope {
        &self.scope
    }

    /// Run on its own tokio task
    pub fn spawn(self) -> JoinHandle<ManagerExit> {
        tokio::spawn(self.run())
    }

    /// Build one task per class, in class order
    fn instantiate(&self) -> Vec<Box<dyn Task>> {
        self.classes
            .iter()
            .map(|class| {
                let mut task = class.instantiate(&self.ctx);
                if let ManagerScope::Backend(section) = &self.scope {
                    task.set_backend_section(section);
                }
                task
            })
            .collect()
    }

    /// The manager loop
    pub async fn run(self) -> ManagerExit {
        debug!(manager = %self.scope, classes = self.classes.len(), "TaskManager::run: called");
        let mut tasks = self.instantiate();
        if tasks.is_empty() {
            debug!(manager = %self.scope, "TaskManager::run: no tasks");
        }

        let mut cycles = 0;
        while self.wants_cycle(cycles) {
            // Unconditional: gives the stop signal time to land before a
            // cycle starts, even with a zero cadence
            tokio::time::sleep(self.poll_interval).await;

            if !self.cadence.is_zero() {
                let next = chrono::Duration::from_std(self.cadence)
                    .ok()
                    .and_then(|cadence| Utc::now().checked_add_signed(cadence));
                info!(manager = %self.scope, ?next, "Next cycle scheduled");
                tokio::select! {
                    _ = tokio::time::sleep(self.cadence) => {}
                    _ = self.stop.wait() => {
                        debug!(manager = %self.scope, "TaskManager::run: stopped during cadence");
                        break;
                    }
                }
            }

            if let Err(task) = self.run_cycle(&mut tasks).await {
                info!(manager = %self.scope, %task, cycles, "Task manager exiting after failure");
                return ManagerExit::Failed { task, cycles };
            }
            cycles += 1;
        }

        debug!(manager = %self.scope, cycles, "TaskManager::run: done");
        ManagerExit::Stopped { cycles }
    }

    fn wants_cycle(&self, cycles: u64) -> bool {
        match self.max_cycles {
            Some(max) => cycles < max,
            None => !self.stop.is_set(),
        }
    }

    /// Execute every task once, stopping at the first failure
    ///
    /// Returns the failing task's name; its error is already relayed.
    async fn run_cycle(&self, tasks: &mut [Box<dyn Task>]) -> Result<(), String> {
        for task in tasks.iter_mut() {
            debug!(manager = %self.scope, task = %task.name(), "Task manager starting task");
            if let Err(e) = task.execute().await {
                error!(manager = %self.scope, task = %task.name(), error = %e, "Task failed");
                self.relay
                    .push(RelayedError::new(self.scope.to_string(), task.name(), e));
                return Err(task.name().to_string());
            }
            debug!(manager = %self.scope, task = %task.name(), "Task manager finished task");
        }
        Ok(())
    }
}
