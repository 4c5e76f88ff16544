//! Mutual exclusion between identity merging and enrichment
//!
//! Enrichment reads identity data that a merge rewrites, so the two never
//! overlap. Any number of enrichments may run together; a merge runs alone.
//! Neither side has priority: both poll until the other side is idle.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

/// The identities flag and the in-flight enrichment counter
///
/// Locks are always taken identities first, then enrichment.
#[derive(Debug)]
pub struct IdentitiesGate {
    identities_active: Mutex<bool>,
    enrichment_active: Mutex<usize>,
    poll_interval: Duration,
}

impl IdentitiesGate {
    pub fn new(poll_interval: Duration) -> Self {
        debug!(?poll_interval, "IdentitiesGate::new: called");
        Self {
            identities_active: Mutex::new(false),
            enrichment_active: Mutex::new(0),
            poll_interval,
        }
    }

    /// Register an enrichment if no merge is running
    pub fn try_begin_enrichment(self: &Arc<Self>) -> Option<EnrichmentPermit> {
        let identities = self.identities_active.lock().unwrap_or_else(PoisonError::into_inner);
        let mut enrichments = self.enrichment_active.lock().unwrap_or_else(PoisonError::into_inner);
        if *identities {
            return None;
        }
        *enrichments += 1;
        debug!(active = *enrichments, "IdentitiesGate::try_begin_enrichment: granted");
        Some(EnrichmentPermit { gate: self.clone() })
    }

    /// Wait until no merge is running, then register an enrichment
    pub async fn begin_enrichment(self: &Arc<Self>) -> EnrichmentPermit {
        let mut logged = false;
        loop {
            if let Some(permit) = self.try_begin_enrichment() {
                return permit;
            }
            if !logged {
                info!("Waiting for identities tasks to finish");
                logged = true;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Mark a merge as running if no enrichment is in flight
    pub fn try_begin_identities(self: &Arc<Self>) -> Option<IdentitiesPermit> {
        let mut identities = self.identities_active.lock().unwrap_or_else(PoisonError::into_inner);
        let enrichments = self.enrichment_active.lock().unwrap_or_else(PoisonError::into_inner);
        if *enrichments > 0 || *identities {
            return None;
        }
        *identities = true;
        debug!("IdentitiesGate::try_begin_identities: granted");
        Some(IdentitiesPermit { gate: self.clone() })
    }

    /// Wait until no enrichment is in flight, then mark a merge as running
    pub async fn begin_identities(self: &Arc<Self>) -> IdentitiesPermit {
        let mut logged = false;
        loop {
            if let Some(permit) = self.try_begin_identities() {
                return permit;
            }
            if !logged {
                info!(active = self.enrichment_count(), "Waiting for enrichment tasks to finish");
                logged = true;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    pub fn is_identities_active(&self) -> bool {
        *self.identities_active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enrichment_count(&self) -> usize {
        *self.enrichment_active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Held while an enrichment runs; dropping it deregisters the enrichment
#[derive(Debug)]
pub struct EnrichmentPermit {
    gate: Arc<IdentitiesGate>,
}

impl Drop for EnrichmentPermit {
    fn drop(&mut self) {
        let mut enrichments = self.gate.enrichment_active.lock().unwrap_or_else(PoisonError::into_inner);
        *enrichments = enrichments.saturating_sub(1);
        debug!(active = *enrichments, "EnrichmentPermit::drop: released");
    }
}

/// Held while a merge runs; dropping it clears the identities flag
#[derive(Debug)]
pub struct IdentitiesPermit {
    gate: Arc<IdentitiesGate>,
}

impl Drop for IdentitiesPermit {
    fn drop(&mut self) {
        *self.gate.identities_active.lock().unwrap_or_else(PoisonError::into_inner) = false;
        debug!("IdentitiesPermit::drop: released");
    }
}
