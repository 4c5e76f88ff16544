//! External capabilities the tasks call into
//!
//! Data stores, the identity store and the dashboard are outside the
//! scheduler. Tasks only see these traits; `CommandHooks` is the default
//! implementation and runs configured shell commands.

mod command;
#[cfg(test)]
pub(crate) mod fake;
mod health;

pub use command::{CommandHooks, HookContext};
pub use health::{HealthCheck, HttpHealthCheck, preflight, preflight_checks};

use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;

use crate::config::{BackendSection, Config};

/// Raw data collection for one repository
#[async_trait]
pub trait Collector: Send + Sync {
    async fn collect(&self, section: &str, backend: &BackendSection, repo: &str) -> Result<()>;
}

/// Enrichment of collected data
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, section: &str, backend: &BackendSection, repo: &str) -> Result<()>;

    /// Point the public aliases at this section's indices
    async fn create_aliases(&self, section: &str, backend: &BackendSection) -> Result<()>;
}

/// Identity resolution store
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn init(&self) -> Result<()>;
    async fn load(&self) -> Result<()>;
    async fn merge(&self) -> Result<()>;
}

/// Dashboard publishing
#[async_trait]
pub trait Dashboard: Send + Sync {
    async fn upload_panels(&self, kinds: &[String]) -> Result<()>;
    async fn upload_menu(&self, kinds: &[String]) -> Result<()>;
}

/// Tracking of selected items
#[async_trait]
pub trait ItemTracker: Send + Sync {
    async fn track(&self) -> Result<()>;
}

/// Report generation
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self) -> Result<()>;
}

/// Bundle of capability handles shared by every task
#[derive(Clone)]
pub struct Services {
    pub collector: Arc<dyn Collector>,
    pub enricher: Arc<dyn Enricher>,
    pub identities: Arc<dyn IdentityStore>,
    pub dashboard: Arc<dyn Dashboard>,
    pub tracker: Arc<dyn ItemTracker>,
    pub reporter: Arc<dyn Reporter>,
}

impl Services {
    /// Every capability served by one implementation
    pub fn uniform<T>(provider: Arc<T>) -> Self
    where
        T: Collector + Enricher + IdentityStore + Dashboard + ItemTracker + Reporter + 'static,
    {
        Self {
            collector: provider.clone(),
            enricher: provider.clone(),
            identities: provider.clone(),
            dashboard: provider.clone(),
            tracker: provider.clone(),
            reporter: provider,
        }
    }

    /// Command hooks built from the configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::uniform(Arc::new(CommandHooks::new(config)?)))
    }
}
