//! Error relay - carries task failures from managers to the orchestrator

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::error::TaskError;

/// A task failure captured by a manager
#[derive(Debug, Clone)]
pub struct RelayedError {
    /// Backend section or global manager label
    pub manager: String,
    /// Name of the task that failed
    pub task: String,
    pub error: TaskError,
    pub at: DateTime<Utc>,
}

impl RelayedError {
    pub fn new(manager: impl Into<String>, task: impl Into<String>, error: TaskError) -> Self {
        Self {
            manager: manager.into(),
            task: task.into(),
            error,
            at: Utc::now(),
        }
    }
}

/// FIFO of relayed errors
///
/// Clones share one queue: managers push, the orchestrator drains.
#[derive(Debug, Clone)]
pub struct ErrorRelay {
    tx: mpsc::UnboundedSender<RelayedError>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<RelayedError>>>,
}

impl ErrorRelay {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Enqueue a failure
    pub fn push(&self, relayed: RelayedError) {
        debug!(manager = %relayed.manager, task = %relayed.task, "ErrorRelay::push: called");
        // The receiver lives in self, so the send cannot fail
        let _ = self.tx.send(relayed);
    }

    /// Wait for the next failure
    pub async fn recv(&self) -> Option<RelayedError> {
        self.rx.lock().await.recv().await
    }

    /// Drain the queue without blocking and return the first entry
    ///
    /// Later entries from the same round are logged and dropped so they
    /// cannot leak into the next round.
    pub async fn take_first(&self) -> Option<RelayedError> {
        let mut rx = self.rx.lock().await;
        let first = rx.try_recv().ok();
        discard_queued(&mut rx);
        first
    }

    /// Drop every queued entry, logging each one
    pub async fn discard(&self) -> usize {
        discard_queued(&mut *self.rx.lock().await)
    }
}

fn discard_queued(rx: &mut mpsc::UnboundedReceiver<RelayedError>) -> usize {
    let mut dropped = 0;
    while let Ok(extra) = rx.try_recv() {
        warn!(
            manager = %extra.manager,
            task = %extra.task,
            error = %extra.error,
            "Additional task failure in the same round"
        );
        dropped += 1;
    }
    dropped
}

impl Default for ErrorRelay {
    fn default() -> Self {
        Self::new()
    }
}
