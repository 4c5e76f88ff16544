//! Error types surfaced by tasks and the scheduler

use thiserror::Error;

/// Errors a task can raise from `execute()`
///
/// The two data categories are recoverable at the control loop: a continuous
/// run logs them and starts the next round. Everything else terminates.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error("Data collection failed for {section}: {message}")]
    DataCollection { section: String, message: String },

    #[error("Data enrichment failed for {section}: {message}")]
    DataEnrichment { section: String, message: String },

    #[error("Task {task} failed for {section}: {message}")]
    Task {
        task: String,
        section: String,
        message: String,
    },

    #[error("Task manager for {section} aborted abnormally")]
    Panicked { section: String },
}

impl TaskError {
    /// Build a collection error from an eyre report, keeping its cause chain
    pub fn collection(section: impl Into<String>, err: &eyre::Report) -> Self {
        Self::DataCollection {
            section: section.into(),
            message: flatten_chain(err),
        }
    }

    /// Build an enrichment error from an eyre report, keeping its cause chain
    pub fn enrichment(section: impl Into<String>, err: &eyre::Report) -> Self {
        Self::DataEnrichment {
            section: section.into(),
            message: flatten_chain(err),
        }
    }

    /// Build an unclassified task error
    pub fn task(task: impl Into<String>, section: impl Into<String>, err: &eyre::Report) -> Self {
        Self::Task {
            task: task.into(),
            section: section.into(),
            message: flatten_chain(err),
        }
    }

    /// Whether the control loop may log this error and keep running
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TaskError::DataCollection { .. } | TaskError::DataEnrichment { .. })
    }

    /// The backend section (or manager label) the error was raised in
    pub fn section(&self) -> &str {
        match self {
            TaskError::DataCollection { section, .. }
            | TaskError::DataEnrichment { section, .. }
            | TaskError::Task { section, .. }
            | TaskError::Panicked { section } => section,
        }
    }
}

/// Errors from the pre-flight service checks
#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("Can not access {service} at {url}")]
    Unreachable { service: String, url: String },
}

/// Join an eyre report and its causes into one line
fn flatten_chain(err: &eyre::Report) -> String {
    err.chain().map(|cause| cause.to_string()).collect::<Vec<_>>().join(": ")
}
