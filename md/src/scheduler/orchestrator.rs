//! Orchestrator - fans task chains out to task managers and supervises rounds
//!
//! Every round recomputes the backend sections from the project store, spawns
//! one manager per section for the per-backend tasks and one manager for the
//! global tasks, then either:
//! - batch: lets every manager run exactly one cycle and joins them
//! - continuous: lets managers free-run on their cadence until one fails or
//!   the process is asked to shut down
//!
//! The first relayed error of a round is surfaced to the caller.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use futures::future::join_all;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::gate::IdentitiesGate;
use super::manager::{ManagerExit, ManagerScope, TaskManager};
use super::relay::{ErrorRelay, RelayedError};
use super::signal::StopSignal;
use crate::config::Config;
use crate::error::TaskError;
use crate::projects::ProjectsStore;
use crate::services::Services;
use crate::task::{
    AliasesTask, CollectTask, EnrichTask, IdentitiesInitTask, IdentitiesLoadTask, IdentitiesMergeTask, PanelsMenuTask,
    PanelsTask, ProjectsTask, ReportTask, TaskClass, TaskContext, TrackItemsTask,
};

/// Outcome of one orchestration round
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub round_id: Uuid,
    pub managers: Vec<(ManagerScope, ManagerExit)>,
}

impl RoundReport {
    fn new(round_id: Uuid) -> Self {
        Self {
            round_id,
            managers: Vec::new(),
        }
    }

    /// Backend sections that had a manager this round
    pub fn sections(&self) -> Vec<&str> {
        self.managers
            .iter()
            .filter_map(|(scope, _)| match scope {
                ManagerScope::Backend(section) => Some(section.as_str()),
                ManagerScope::Global => None,
            })
            .collect()
    }
}

type Spawned = Vec<(ManagerScope, JoinHandle<ManagerExit>)>;

/// Supervises task managers across rounds
pub struct Orchestrator {
    config: Arc<Config>,
    projects: ProjectsStore,
    services: Services,
    gate: Arc<IdentitiesGate>,
    relay: ErrorRelay,
    shutdown: StopSignal,
}

impl Orchestrator {
    pub fn new(config: Arc<Config>, projects: ProjectsStore, services: Services) -> Self {
        debug!("Orchestrator::new: called");
        let gate = Arc::new(IdentitiesGate::new(config.scheduler.gate_poll_interval()));
        Self {
            config,
            projects,
            services,
            gate,
            relay: ErrorRelay::new(),
            shutdown: StopSignal::new(),
        }
    }

    /// Shared handles for task construction
    pub fn context(&self) -> TaskContext {
        TaskContext::new(
            self.config.clone(),
            self.gate.clone(),
            self.projects.clone(),
            self.services.clone(),
        )
    }

    pub fn gate(&self) -> &Arc<IdentitiesGate> {
        &self.gate
    }

    /// Process-wide shutdown flag; setting it ends a continuous run
    pub fn shutdown_signal(&self) -> StopSignal {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        info!("Shutdown requested");
        self.shutdown.set();
    }

    /// Split classes into (per-backend, global), keeping their relative order
    pub fn split_tasks(classes: &[TaskClass]) -> (Vec<TaskClass>, Vec<TaskClass>) {
        classes.iter().cloned().partition(|class| class.is_backend_task())
    }

    /// Current backend section -> repositories mapping
    ///
    /// Read from the project store every call; only sections with a
    /// configured backend are kept.
    pub fn repos_by_backend(&self) -> BTreeMap<String, Vec<String>> {
        self.projects
            .repos_by_backend(|section| self.config.backends.contains_key(section))
    }

    /// The task chain for the enabled phases
    pub fn build_task_classes(&self) -> Vec<TaskClass> {
        let phases = &self.config.phases;
        let mut classes = vec![TaskClass::of::<ProjectsTask>()];
        if phases.collection {
            classes.push(TaskClass::of::<CollectTask>());
        }
        if phases.identities {
            classes.push(TaskClass::of::<IdentitiesLoadTask>());
            classes.push(TaskClass::of::<IdentitiesMergeTask>());
        }
        if phases.enrichment {
            classes.push(TaskClass::of::<EnrichTask>());
        }
        if phases.panels && phases.enrichment {
            classes.push(TaskClass::of::<AliasesTask>());
        }
        if phases.track_items {
            classes.push(TaskClass::of::<TrackItemsTask>());
        }
        if phases.report {
            classes.push(TaskClass::of::<ReportTask>());
        }
        classes
    }

    /// One-time setup before the main loop
    pub async fn initial_load(&self) -> Result<(), TaskError> {
        info!("Loading initial data");
        let mut rounds = Vec::new();
        if self.config.phases.panels {
            rounds.push(vec![TaskClass::of::<PanelsTask>(), TaskClass::of::<PanelsMenuTask>()]);
        }
        if self.config.phases.identities {
            rounds.push(vec![TaskClass::of::<IdentitiesInitTask>()]);
        }
        rounds.push(vec![TaskClass::of::<ProjectsTask>()]);

        for classes in rounds {
            self.execute_batch_tasks(&classes).await?;
        }
        info!("Initial data loaded");
        Ok(())
    }

    /// One round in the configured mode
    pub async fn execute_tasks(&self, classes: &[TaskClass]) -> Result<RoundReport, TaskError> {
        if self.config.general.update {
            self.execute_nonstop_tasks(classes).await
        } else {
            self.execute_batch_tasks(classes).await
        }
    }

    /// Run every manager for exactly one cycle
    pub async fn execute_batch_tasks(&self, classes: &[TaskClass]) -> Result<RoundReport, TaskError> {
        let round_id = Uuid::now_v7();
        info!(%round_id, tasks = classes.len(), "Starting batch round");
        let stop = StopSignal::new();
        let barrier = tokio::time::Instant::now() + self.config.scheduler.batch_barrier();
        let spawned = self.spawn_managers(classes, &stop, Duration::ZERO, Duration::ZERO, Some(1));

        // Batch managers are bounded to one cycle; the stop signal only marks
        // the end of the round for anything that watches it
        tokio::time::sleep_until(barrier).await;
        stop.set();

        let results = join_managers(spawned).await;
        warn_unexpected_cycles(&results, 1);
        let first = self.relay.take_first().await;
        finish_round(RoundReport::new(round_id), results, first)
    }

    /// Run managers on their cadence until a failure or a shutdown request
    pub async fn execute_nonstop_tasks(&self, classes: &[TaskClass]) -> Result<RoundReport, TaskError> {
        let round_id = Uuid::now_v7();
        info!(%round_id, tasks = classes.len(), "Starting continuous round");
        let stop = StopSignal::new();
        let spawned = self.spawn_managers(
            classes,
            &stop,
            self.config.backend_cadence(),
            self.config.global_cadence(),
            None,
        );

        if spawned.is_empty() {
            warn!(%round_id, "No task managers to run, waiting for the next round");
            tokio::select! {
                _ = tokio::time::sleep(self.config.backend_cadence()) => {}
                _ = self.shutdown.wait() => {}
            }
            return Ok(RoundReport::new(round_id));
        }

        let scopes: Vec<ManagerScope> = spawned.iter().map(|(scope, _)| scope.clone()).collect();
        let mut joined = Box::pin(join_all(spawned.into_iter().map(|(_, handle)| handle)));

        let (results, first) = tokio::select! {
            relayed = self.relay.recv() => {
                info!(%round_id, "Task failure relayed, stopping round");
                stop.set();
                let results = (&mut joined).await;
                (results, relayed)
            }
            results = &mut joined => (results, None),
            _ = self.shutdown.wait() => {
                info!(%round_id, "Stopping task managers for shutdown");
                stop.set();
                let results = (&mut joined).await;
                (results, None)
            }
        };

        let results = scopes.into_iter().zip(results).collect();
        let first = match first {
            Some(first) => {
                self.relay.discard().await;
                Some(first)
            }
            None => self.relay.take_first().await,
        };
        finish_round(RoundReport::new(round_id), results, first)
    }

    /// Initial load, then batch once or loop continuously
    pub async fn run(&self) -> Result<()> {
        debug!(update = self.config.general.update, "Orchestrator::run: called");
        self.initial_load().await?;

        let classes = self.build_task_classes();
        if !self.config.general.update {
            let report = self.execute_batch_tasks(&classes).await?;
            info!(round_id = %report.round_id, managers = report.managers.len(), "Batch run finished");
            return Ok(());
        }

        while !self.shutdown.is_set() {
            match self.execute_nonstop_tasks(&classes).await {
                Ok(report) => {
                    debug!(round_id = %report.round_id, "Orchestrator::run: round ended");
                }
                Err(e) if e.is_recoverable() => {
                    error!(error = %e, section = %e.section(), "Round failed, starting the next one");
                }
                Err(e) => return Err(e.into()),
            }
        }
        info!("Continuous run stopped");
        Ok(())
    }

    fn spawn_managers(
        &self,
        classes: &[TaskClass],
        stop: &StopSignal,
        backend_cadence: Duration,
        global_cadence: Duration,
        max_cycles: Option<u64>,
    ) -> Spawned {
        let (backend_tasks, global_tasks) = Self::split_tasks(classes);
        let mut spawned = Vec::new();

        if !backend_tasks.is_empty() {
            let repos = self.repos_by_backend();
            if repos.is_empty() {
                warn!("No backend sections with repositories, skipping backend tasks");
            }
            for (section, repos) in repos {
                debug!(%section, repos = repos.len(), "Spawning backend task manager");
                let scope = ManagerScope::Backend(section);
                let handle = self
                    .manager(scope.clone(), backend_tasks.clone(), stop, max_cycles)
                    .with_cadence(backend_cadence)
                    .spawn();
                spawned.push((scope, handle));
            }
        }

        if !global_tasks.is_empty() {
            debug!(tasks = global_tasks.len(), "Spawning global task manager");
            let handle = self
                .manager(ManagerScope::Global, global_tasks, stop, max_cycles)
                .with_cadence(global_cadence)
                .spawn();
            spawned.push((ManagerScope::Global, handle));
        }

        info!(managers = spawned.len(), "Task managers started");
        spawned
    }

    fn manager(
        &self,
        scope: ManagerScope,
        classes: Vec<TaskClass>,
        stop: &StopSignal,
        max_cycles: Option<u64>,
    ) -> TaskManager {
        let manager = TaskManager::new(scope, classes, self.context(), stop.clone(), self.relay.clone());
        match max_cycles {
            Some(max) => manager.with_max_cycles(max),
            None => manager,
        }
    }
}

/// Flag managers that stopped after a different number of cycles than expected
fn warn_unexpected_cycles(results: &[(ManagerScope, Result<ManagerExit, JoinError>)], expected: u64) -> usize {
    let mut unexpected = 0;
    for (scope, result) in results {
        if let Ok(ManagerExit::Stopped { cycles }) = result {
            if *cycles != expected {
                warn!(manager = %scope, cycles, expected, "Task manager ran an unexpected number of cycles");
                unexpected += 1;
            }
        }
    }
    unexpected
}

async fn join_managers(spawned: Spawned) -> Vec<(ManagerScope, Result<ManagerExit, JoinError>)> {
    let (scopes, handles): (Vec<_>, Vec<_>) = spawned.into_iter().unzip();
    scopes.into_iter().zip(join_all(handles).await).collect()
}

/// Fold joined managers and the first relayed error into the round outcome
fn finish_round(
    mut report: RoundReport,
    results: Vec<(ManagerScope, Result<ManagerExit, JoinError>)>,
    first: Option<RelayedError>,
) -> Result<RoundReport, TaskError> {
    let mut panicked = None;
    for (scope, result) in results {
        match result {
            Ok(exit) => {
                debug!(manager = %scope, ?exit, "Task manager joined");
                report.managers.push((scope, exit));
            }
            Err(e) => {
                error!(manager = %scope, error = %e, "Task manager aborted");
                panicked.get_or_insert(TaskError::Panicked {
                    section: scope.to_string(),
                });
            }
        }
    }

    if let Some(relayed) = first {
        error!(
            round_id = %report.round_id,
            manager = %relayed.manager,
            task = %relayed.task,
            at = %relayed.at,
            error = %relayed.error,
            "Round failed"
        );
        return Err(relayed.error);
    }
    if let Some(e) = panicked {
        return Err(e);
    }
    info!(round_id = %report.round_id, managers = report.managers.len(), "Round finished");
    Ok(report)
}
