//! Pre-flight reachability checks for external services

use std::time::Duration;

use async_trait::async_trait;
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::PreflightError;

/// A boolean reachability probe
#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Human readable service name
    fn service(&self) -> &str;

    /// Where the service lives, for error messages
    fn target(&self) -> &str;

    async fn check(&self) -> bool;
}

/// Probe that issues a GET and accepts any 2xx
pub struct HttpHealthCheck {
    service: String,
    url: String,
    client: reqwest::Client,
}

impl HttpHealthCheck {
    pub fn new(service: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        let service = service.into();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("mordred/", env!("CARGO_PKG_VERSION")))
            .build()
            .context(format!("Failed to build HTTP client for {}", service))?;
        Ok(Self {
            service,
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl HealthCheck for HttpHealthCheck {
    fn service(&self) -> &str {
        &self.service
    }

    fn target(&self) -> &str {
        &self.url
    }

    async fn check(&self) -> bool {
        debug!(service = %self.service, url = %self.url, "HttpHealthCheck::check: called");
        match self.client.get(&self.url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(service = %self.service, status = %response.status(), "HttpHealthCheck::check: reachable");
                true
            }
            Ok(response) => {
                warn!(service = %self.service, status = %response.status(), "Service answered with an error status");
                false
            }
            Err(e) => {
                warn!(service = %self.service, error = %e, "Service unreachable");
                false
            }
        }
    }
}

/// The mandatory checks for a configuration
///
/// Both data stores always; the queue service and identity store only when
/// their URLs are configured.
pub fn preflight_checks(config: &Config) -> Result<Vec<Box<dyn HealthCheck>>> {
    let mut checks: Vec<Box<dyn HealthCheck>> = vec![
        Box::new(HttpHealthCheck::new("collection store", &config.es_collection.url)?),
        Box::new(HttpHealthCheck::new("enrichment store", &config.es_enrichment.url)?),
    ];
    if let Some(url) = &config.es_collection.queue_url {
        checks.push(Box::new(HttpHealthCheck::new("queue service", url)?));
    }
    if let Some(url) = &config.sortinghat.url {
        checks.push(Box::new(HttpHealthCheck::new("identity store", url)?));
    }
    Ok(checks)
}

/// Run checks in order, failing on the first unreachable service
pub async fn preflight(checks: &[Box<dyn HealthCheck>]) -> Result<(), PreflightError> {
    debug!(count = checks.len(), "preflight: called");
    for check in checks {
        if !check.check().await {
            return Err(PreflightError::Unreachable {
                service: check.service().to_string(),
                url: check.target().to_string(),
            });
        }
    }
    info!(count = checks.len(), "Pre-flight checks passed");
    Ok(())
}
