//! Integration tests for the orchestrator and task managers
//!
//! Stub tasks record what ran where; the orchestrator runs them against a
//! fixed project list with short poll intervals.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mordred::config::{BackendSection, Config, PhasesConfig};
use mordred::error::TaskError;
use mordred::projects::{Projects, ProjectsStore};
use mordred::scheduler::{IdentitiesGate, ManagerExit, ManagerScope, Orchestrator};
use mordred::services::Services;
use mordred::task::{Task, TaskClass, TaskScope};
use tempfile::TempDir;

const POLL_MS: u64 = 40;

type Calls = Arc<Mutex<Vec<String>>>;

// =============================================================================
// Helpers
// =============================================================================

fn test_config() -> Config {
    let mut config = Config::default();
    config.phases = PhasesConfig::none();
    config.scheduler.poll_interval_ms = POLL_MS;
    config.scheduler.gate_poll_interval_ms = 5;
    config.general.min_update_delay = 0;
    config.sortinghat.sleep_for = 0;
    for section in ["git", "github", "gerrit"] {
        config.backends.insert(
            section.to_string(),
            BackendSection::new(format!("{}_raw", section), format!("{}_enriched", section)),
        );
    }
    config
}

fn projects(json: &str) -> Projects {
    serde_json::from_str(json).unwrap()
}

fn orchestrator_with(config: Config, store: ProjectsStore) -> Orchestrator {
    let config = Arc::new(config);
    let services = Services::from_config(&config).unwrap();
    Orchestrator::new(config, store, services)
}

fn two_backends() -> ProjectsStore {
    ProjectsStore::with_projects(projects(r#"{"demo": {"git": ["repoA"], "github": ["repoB"]}}"#))
}

/// Records `name@section` and optionally fails on a given section
struct Recorder {
    name: String,
    section: String,
    calls: Calls,
    fail_on: Option<String>,
}

#[async_trait]
impl Task for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_backend_section(&mut self, section: &str) {
        self.section = section.to_string();
    }

    async fn execute(&mut self) -> Result<(), TaskError> {
        let section = if self.section.is_empty() { "global" } else { self.section.as_str() };
        self.calls.lock().unwrap().push(format!("{}@{}", self.name, section));
        if self.fail_on.as_deref() == Some(section) {
            return Err(TaskError::Task {
                task: self.name.clone(),
                section: section.to_string(),
                message: "RuntimeError: boom".to_string(),
            });
        }
        Ok(())
    }
}

fn recorder(name: &str, scope: TaskScope, calls: &Calls, fail_on: Option<&str>) -> TaskClass {
    let name = name.to_string();
    let calls = calls.clone();
    let fail_on = fail_on.map(str::to_string);
    TaskClass::from_fn(name.clone(), scope, move |_| {
        Box::new(Recorder {
            name: name.clone(),
            section: String::new(),
            calls: calls.clone(),
            fail_on: fail_on.clone(),
        })
    })
}

fn calls_for(calls: &Calls, section: &str) -> Vec<String> {
    let suffix = format!("@{}", section);
    calls
        .lock()
        .unwrap()
        .iter()
        .filter(|c| c.ends_with(&suffix))
        .cloned()
        .collect()
}

// =============================================================================
// Batch rounds
// =============================================================================

#[tokio::test]
async fn test_batch_runs_collection_once_per_backend() {
    let calls = Calls::default();
    let orch = orchestrator_with(test_config(), two_backends());

    let report = orch
        .execute_batch_tasks(&[recorder("collect", TaskScope::PerBackend, &calls, None)])
        .await
        .unwrap();

    let mut recorded = calls.lock().unwrap().clone();
    recorded.sort();
    assert_eq!(recorded, vec!["collect@git", "collect@github"]);
    assert_eq!(report.sections(), vec!["git", "github"]);
}

#[tokio::test]
async fn test_backend_chain_runs_in_class_order() {
    let calls = Calls::default();
    let orch = orchestrator_with(test_config(), two_backends());
    let classes = vec![
        recorder("a", TaskScope::PerBackend, &calls, None),
        recorder("b", TaskScope::PerBackend, &calls, None),
        recorder("c", TaskScope::PerBackend, &calls, None),
    ];

    orch.execute_batch_tasks(&classes).await.unwrap();

    assert_eq!(calls_for(&calls, "git"), vec!["a@git", "b@git", "c@git"]);
    assert_eq!(calls_for(&calls, "github"), vec!["a@github", "b@github", "c@github"]);
}

#[tokio::test]
async fn test_global_tasks_get_one_manager() {
    let calls = Calls::default();
    let orch = orchestrator_with(test_config(), two_backends());
    let classes = vec![
        recorder("collect", TaskScope::PerBackend, &calls, None),
        recorder("merge", TaskScope::Global, &calls, None),
    ];

    let report = orch.execute_batch_tasks(&classes).await.unwrap();

    assert_eq!(calls_for(&calls, "global"), vec!["merge@global"]);
    let globals = report
        .managers
        .iter()
        .filter(|(scope, _)| *scope == ManagerScope::Global)
        .count();
    assert_eq!(globals, 1);
    assert_eq!(report.managers.len(), 3);
}

#[tokio::test]
async fn test_failing_backend_does_not_block_others() {
    let calls = Calls::default();
    let orch = orchestrator_with(test_config(), two_backends());
    let classes = vec![
        recorder("collect", TaskScope::PerBackend, &calls, Some("git")),
        recorder("enrich", TaskScope::PerBackend, &calls, None),
    ];

    let err = orch.execute_batch_tasks(&classes).await.unwrap_err();

    assert_eq!(err.section(), "git");
    assert_eq!(calls_for(&calls, "git"), vec!["collect@git"]);
    assert_eq!(calls_for(&calls, "github"), vec!["collect@github", "enrich@github"]);
}

#[tokio::test]
async fn test_single_error_is_reraised_after_join() {
    let calls = Calls::default();
    let orch = orchestrator_with(test_config(), two_backends());

    let err = orch
        .execute_batch_tasks(&[recorder("collect", TaskScope::PerBackend, &calls, Some("github"))])
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::Task { .. }));
    assert!(err.to_string().contains("boom"));
    // Both managers were joined before the error surfaced
    assert_eq!(calls.lock().unwrap().len(), 2);

    // The relay was drained: the next round starts clean
    let report = orch
        .execute_batch_tasks(&[recorder("collect", TaskScope::PerBackend, &calls, None)])
        .await
        .unwrap();
    assert_eq!(report.managers.len(), 2);
}

#[tokio::test]
async fn test_no_new_cycle_after_stop() {
    let calls = Calls::default();
    let orch = orchestrator_with(test_config(), two_backends());

    let report = orch
        .execute_batch_tasks(&[recorder("collect", TaskScope::PerBackend, &calls, None)])
        .await
        .unwrap();
    for (_, exit) in &report.managers {
        assert_eq!(*exit, ManagerExit::Stopped { cycles: 1 });
    }

    tokio::time::sleep(Duration::from_millis(POLL_MS * 3)).await;
    assert_eq!(calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_each_round_sees_current_repositories() {
    let calls = Calls::default();
    let store = two_backends();
    let orch = orchestrator_with(test_config(), store.clone());
    let classes = vec![recorder("collect", TaskScope::PerBackend, &calls, None)];

    let first = orch.execute_batch_tasks(&classes).await.unwrap();
    assert_eq!(first.sections(), vec!["git", "github"]);

    store.replace(projects(r#"{"demo": {"gerrit": ["review"]}}"#));
    let second = orch.execute_batch_tasks(&classes).await.unwrap();
    assert_eq!(second.sections(), vec!["gerrit"]);
    assert_eq!(calls_for(&calls, "gerrit"), vec!["collect@gerrit"]);
}

#[tokio::test]
async fn test_unconfigured_sections_get_no_manager() {
    let calls = Calls::default();
    let store = ProjectsStore::with_projects(projects(r#"{"demo": {"git": ["a"], "jira": ["b"]}}"#));
    let orch = orchestrator_with(test_config(), store);

    let report = orch
        .execute_batch_tasks(&[recorder("collect", TaskScope::PerBackend, &calls, None)])
        .await
        .unwrap();
    assert_eq!(report.sections(), vec!["git"]);
}

#[tokio::test]
async fn test_section_with_empty_repository_list_still_gets_manager() {
    let calls = Calls::default();
    let store = ProjectsStore::with_projects(projects(r#"{"demo": {"git": [], "github": ["b"]}}"#));
    let orch = orchestrator_with(test_config(), store);

    let report = orch
        .execute_batch_tasks(&[recorder("collect", TaskScope::PerBackend, &calls, None)])
        .await
        .unwrap();
    assert_eq!(report.sections(), vec!["git", "github"]);
    assert_eq!(calls_for(&calls, "git"), vec!["collect@git"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_batch_runs_every_manager_once_at_scale() {
    const SECTIONS: usize = 2000;

    let mut config = test_config();
    config.backends.clear();
    config.scheduler.poll_interval_ms = 2;
    let mut repos = serde_json::Map::new();
    for i in 0..SECTIONS {
        let section = format!("backend{:04}", i);
        config.backends.insert(
            section.clone(),
            BackendSection::new(format!("{}_raw", section), format!("{}_enriched", section)),
        );
        repos.insert(section, serde_json::json!(["repo"]));
    }
    let store = ProjectsStore::with_projects(projects(&serde_json::json!({ "demo": repos }).to_string()));
    let calls = Calls::default();
    let orch = orchestrator_with(config, store);

    let report = orch
        .execute_batch_tasks(&[recorder("collect", TaskScope::PerBackend, &calls, None)])
        .await
        .unwrap();

    assert_eq!(report.managers.len(), SECTIONS);
    for (scope, exit) in &report.managers {
        assert_eq!(*exit, ManagerExit::Stopped { cycles: 1 }, "manager {}", scope);
    }
    let mut recorded = calls.lock().unwrap().clone();
    assert_eq!(recorded.len(), SECTIONS);
    recorded.sort();
    recorded.dedup();
    assert_eq!(recorded.len(), SECTIONS);
}

// =============================================================================
// Identities gate across managers
// =============================================================================

struct SlowEnrich {
    gate: Arc<IdentitiesGate>,
    events: Calls,
    hold: Duration,
}

#[async_trait]
impl Task for SlowEnrich {
    fn name(&self) -> &str {
        "slow-enrich"
    }

    async fn execute(&mut self) -> Result<(), TaskError> {
        let _permit = self.gate.begin_enrichment().await;
        self.events.lock().unwrap().push("enrich-start".to_string());
        tokio::time::sleep(self.hold).await;
        self.events.lock().unwrap().push("enrich-end".to_string());
        Ok(())
    }
}

struct LateMerge {
    gate: Arc<IdentitiesGate>,
    events: Calls,
    delay: Duration,
    enrichments_seen: Arc<Mutex<Option<usize>>>,
}

#[async_trait]
impl Task for LateMerge {
    fn name(&self) -> &str {
        "late-merge"
    }

    async fn execute(&mut self) -> Result<(), TaskError> {
        tokio::time::sleep(self.delay).await;
        let _permit = self.gate.begin_identities().await;
        *self.enrichments_seen.lock().unwrap() = Some(self.gate.enrichment_count());
        self.events.lock().unwrap().push("merge-start".to_string());
        Ok(())
    }
}

#[tokio::test]
async fn test_merge_never_overlaps_enrichment() {
    let interval = Duration::from_millis(30);
    let events = Calls::default();
    let seen = Arc::new(Mutex::new(None));
    let store = ProjectsStore::with_projects(projects(r#"{"demo": {"git": ["a"]}}"#));
    let orch = orchestrator_with(test_config(), store);

    let enrich = {
        let events = events.clone();
        TaskClass::from_fn("slow-enrich", TaskScope::PerBackend, move |ctx| {
            Box::new(SlowEnrich {
                gate: ctx.gate.clone(),
                events: events.clone(),
                hold: interval * 2,
            })
        })
    };
    let merge = {
        let events = events.clone();
        let seen = seen.clone();
        TaskClass::from_fn("late-merge", TaskScope::Global, move |ctx| {
            Box::new(LateMerge {
                gate: ctx.gate.clone(),
                events: events.clone(),
                delay: interval,
                enrichments_seen: seen.clone(),
            })
        })
    };

    orch.execute_batch_tasks(&[enrich, merge]).await.unwrap();

    assert_eq!(*events.lock().unwrap(), vec!["enrich-start", "enrich-end", "merge-start"]);
    assert_eq!(*seen.lock().unwrap(), Some(0));
    assert!(!orch.gate().is_identities_active());
    assert_eq!(orch.gate().enrichment_count(), 0);
}

// =============================================================================
// Continuous rounds
// =============================================================================

#[tokio::test]
async fn test_continuous_round_ends_on_first_failure() {
    let calls = Calls::default();
    let mut config = test_config();
    config.general.update = true;
    let orch = orchestrator_with(config, two_backends());

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        orch.execute_tasks(&[recorder("collect", TaskScope::PerBackend, &calls, Some("github"))]),
    )
    .await
    .expect("round should end once a manager fails")
    .unwrap_err();

    assert_eq!(err.section(), "github");
    assert!(!calls_for(&calls, "git").is_empty());
}

#[tokio::test]
async fn test_continuous_round_free_runs_until_shutdown() {
    let calls = Calls::default();
    let mut config = test_config();
    config.general.update = true;
    let orch = Arc::new(orchestrator_with(config, two_backends()));

    let round = {
        let orch = orch.clone();
        let calls = calls.clone();
        tokio::spawn(async move {
            orch.execute_nonstop_tasks(&[recorder("collect", TaskScope::PerBackend, &calls, None)])
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(POLL_MS * 5)).await;
    orch.shutdown();
    let report = tokio::time::timeout(Duration::from_secs(5), round)
        .await
        .expect("round should stop on shutdown")
        .unwrap()
        .unwrap();

    assert!(calls_for(&calls, "git").len() >= 2, "managers should cycle repeatedly");
    for (_, exit) in &report.managers {
        assert!(matches!(exit, ManagerExit::Stopped { .. }));
    }
}

// =============================================================================
// Full runs through command hooks
// =============================================================================

fn hooked_config(dir: &TempDir, collect_hook: &str) -> Config {
    let projects_file = dir.path().join("projects.json");
    std::fs::write(&projects_file, r#"{"demo": {"git": ["repoA"], "github": ["repoB"]}}"#).unwrap();

    let mut config = test_config();
    config.phases.collection = true;
    config.projects.projects_file = projects_file;
    config.hooks.collect = Some(collect_hook.to_string());
    config
}

#[tokio::test]
async fn test_batch_run_collects_through_hooks() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("collected.txt");
    let config = hooked_config(&dir, &format!("echo {{{{section}}}} {{{{repo}}}} >> {}", out.display()));
    let orch = orchestrator_with(config, ProjectsStore::new());

    orch.run().await.unwrap();

    let mut lines: Vec<String> = std::fs::read_to_string(&out)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    lines.sort();
    assert_eq!(lines, vec!["git repoA", "github repoB"]);
}

#[tokio::test]
async fn test_batch_run_propagates_collection_failure() {
    let dir = TempDir::new().unwrap();
    let config = hooked_config(&dir, "exit 3");
    let orch = orchestrator_with(config, ProjectsStore::new());

    let err = orch.run().await.unwrap_err();
    let err = err.downcast_ref::<TaskError>().expect("task error");
    assert!(matches!(err, TaskError::DataCollection { .. }));
}

#[tokio::test]
async fn test_continuous_run_survives_collection_failures() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("attempts.txt");
    let mut config = hooked_config(&dir, &format!("echo {{{{repo}}}} >> {} && exit 1", out.display()));
    config.general.update = true;
    let orch = Arc::new(orchestrator_with(config, ProjectsStore::new()));

    let run = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.run().await })
    };

    tokio::time::sleep(Duration::from_millis(POLL_MS * 12)).await;
    assert!(!run.is_finished(), "recoverable failures must not end the run");
    orch.shutdown();

    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run should stop on shutdown")
        .unwrap()
        .unwrap();

    let attempts = std::fs::read_to_string(&out).unwrap();
    assert!(attempts.lines().filter(|l| *l == "repoA").count() >= 2);
}
