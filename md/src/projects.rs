//! Project store - the live repository list per backend section
//!
//! The projects file is reloaded by `ProjectsTask` while the scheduler runs,
//! so readers always go through the lock and never keep a copy across cycles.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One project: optional metadata plus repositories per backend section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,

    #[serde(flatten)]
    pub sections: BTreeMap<String, Vec<String>>,
}

/// All projects keyed by project name
pub type Projects = BTreeMap<String, Project>;

/// Shared, lock-guarded project list
#[derive(Debug, Clone, Default)]
pub struct ProjectsStore {
    inner: Arc<RwLock<Projects>>,
}

impl ProjectsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with projects
    pub fn with_projects(projects: Projects) -> Self {
        Self {
            inner: Arc::new(RwLock::new(projects)),
        }
    }

    /// Parse a projects file and swap it in, returning the project count
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        debug!(path = %path.display(), "ProjectsStore::load_file: called");
        let content = fs::read_to_string(path).context(format!("Failed to read projects file {}", path.display()))?;
        let projects: Projects =
            serde_json::from_str(&content).context(format!("Failed to parse projects file {}", path.display()))?;
        let count = projects.len();
        self.replace(projects);
        info!(path = %path.display(), count, "Projects loaded");
        Ok(count)
    }

    /// Replace the whole project list atomically
    pub fn replace(&self, projects: Projects) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = projects;
    }

    /// Copy of the current project list
    pub fn snapshot(&self) -> Projects {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Current repositories for one backend section, across all projects
    ///
    /// Concatenated in project order; a repository listed by several
    /// projects appears once.
    pub fn repos_for(&self, section: &str) -> Vec<String> {
        let projects = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        repos_in(&projects, section)
    }

    /// Current repositories grouped by backend section
    ///
    /// Only sections accepted by `enabled` are returned; a section can be in
    /// the projects file without being configured. Computed under one read
    /// lock so a concurrent reload is seen entirely or not at all.
    pub fn repos_by_backend(&self, enabled: impl Fn(&str) -> bool) -> BTreeMap<String, Vec<String>> {
        let projects = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let output: BTreeMap<String, Vec<String>> = projects
            .values()
            .flat_map(|project| project.sections.keys())
            .filter(|section| enabled(section))
            .map(|section| (section.clone(), repos_in(&projects, section)))
            .collect();
        debug!(sections = output.len(), "ProjectsStore::repos_by_backend: computed");
        output
    }
}

fn repos_in(projects: &Projects, section: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    projects
        .values()
        .filter_map(|project| project.sections.get(section))
        .flatten()
        .filter(|repo| seen.insert(*repo))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROJECTS: &str = r#"{
        "grimoire": {
            "meta": {"title": "Grimoire"},
            "git": ["https://example.com/a.git", "https://example.com/b.git"],
            "github:issues": ["https://github.com/org/a"]
        },
        "chaoss": {
            "git": ["https://example.com/b.git", "https://example.com/c.git"],
            "mbox": ["list /var/mbox"]
        }
    }"#;

    fn store() -> ProjectsStore {
        let projects: Projects = serde_json::from_str(PROJECTS).unwrap();
        ProjectsStore::with_projects(projects)
    }

    #[test]
    fn test_parse_meta_is_not_a_section() {
        let projects: Projects = serde_json::from_str(PROJECTS).unwrap();
        let grimoire = &projects["grimoire"];
        assert!(grimoire.meta.is_some());
        assert!(!grimoire.sections.contains_key("meta"));
        assert_eq!(grimoire.sections.len(), 2);
    }

    #[test]
    fn test_repos_for_concatenates_without_duplicates() {
        // BTreeMap order: "chaoss" before "grimoire"
        assert_eq!(
            store().repos_for("git"),
            vec![
                "https://example.com/b.git",
                "https://example.com/c.git",
                "https://example.com/a.git",
            ]
        );
        assert!(store().repos_for("gerrit").is_empty());
    }

    #[test]
    fn test_repos_by_backend_filters_unconfigured_sections() {
        let map = store().repos_by_backend(|section| section != "mbox");
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["git", "github:issues"]);
        assert_eq!(map["github:issues"], vec!["https://github.com/org/a"]);
    }

    #[test]
    fn test_replace_is_seen_by_next_read() {
        let store = store();
        let before = store.repos_by_backend(|_| true);
        assert!(before.contains_key("mbox"));

        let mut projects = Projects::new();
        projects.insert(
            "solo".to_string(),
            Project {
                meta: None,
                sections: BTreeMap::from([("gerrit".to_string(), vec!["review.example.com".to_string()])]),
            },
        );
        store.replace(projects);

        let after = store.repos_by_backend(|_| true);
        assert_eq!(after.keys().collect::<Vec<_>>(), vec!["gerrit"]);
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("projects.json");
        fs::write(&path, PROJECTS).unwrap();

        let store = ProjectsStore::new();
        assert_eq!(store.load_file(&path).unwrap(), 2);
        assert_eq!(store.snapshot().len(), 2);
    }

    #[test]
    fn test_load_file_bad_json_keeps_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("projects.json");
        fs::write(&path, "{ not json").unwrap();

        let store = store();
        assert!(store.load_file(&path).is_err());
        assert_eq!(store.snapshot().len(), 2);
    }
}
