//! Recording fake for every capability, used by unit tests

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use eyre::{Result, eyre};

use super::{Collector, Dashboard, Enricher, IdentityStore, ItemTracker, Reporter, Services};
use crate::config::BackendSection;

/// Records calls as `op` or `op:section:repo` and fails the ones listed
#[derive(Debug, Default)]
pub struct FakeServices {
    pub calls: Mutex<Vec<String>>,
    fail: HashSet<String>,
}

impl FakeServices {
    pub fn failing(calls: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail: calls.iter().map(|c| c.to_string()).collect(),
        })
    }

    pub fn ok() -> Arc<Self> {
        Self::failing(&[])
    }

    pub fn services(self: &Arc<Self>) -> Services {
        Services::uniform(self.clone())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call.clone());
        if self.fail.contains(&call) {
            return Err(eyre!("{} refused", call));
        }
        Ok(())
    }
}

#[async_trait]
impl Collector for FakeServices {
    async fn collect(&self, section: &str, _backend: &BackendSection, repo: &str) -> Result<()> {
        self.record(format!("collect:{}:{}", section, repo))
    }
}

#[async_trait]
impl Enricher for FakeServices {
    async fn enrich(&self, section: &str, _backend: &BackendSection, repo: &str) -> Result<()> {
        self.record(format!("enrich:{}:{}", section, repo))
    }

    async fn create_aliases(&self, section: &str, _backend: &BackendSection) -> Result<()> {
        self.record(format!("aliases:{}", section))
    }
}

#[async_trait]
impl IdentityStore for FakeServices {
    async fn init(&self) -> Result<()> {
        self.record("identities-init".to_string())
    }

    async fn load(&self) -> Result<()> {
        self.record("identities-load".to_string())
    }

    async fn merge(&self) -> Result<()> {
        self.record("identities-merge".to_string())
    }
}

#[async_trait]
impl Dashboard for FakeServices {
    async fn upload_panels(&self, kinds: &[String]) -> Result<()> {
        self.record(format!("panels:{}", kinds.join(",")))
    }

    async fn upload_menu(&self, kinds: &[String]) -> Result<()> {
        self.record(format!("menu:{}", kinds.join(",")))
    }
}

#[async_trait]
impl ItemTracker for FakeServices {
    async fn track(&self) -> Result<()> {
        self.record("track-items".to_string())
    }
}

#[async_trait]
impl Reporter for FakeServices {
    async fn report(&self) -> Result<()> {
        self.record("report".to_string())
    }
}
