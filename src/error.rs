//! Errors reported to submitters.
use std::io;

/// Everything that can go wrong between submitting a task and collecting its
/// result.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The executor has been shut down. The task was not run.
    #[error("executor is closed")]
    ClosedExecutor,

    /// The task panicked while running. Only the submitter of that task sees
    /// this; the worker carries on with the next task.
    #[error("task failed: {0}")]
    TaskFailure(String),

    /// The worker thread or its runtime could not be created, or the runtime
    /// failed while running. Fatal for the whole executor.
    #[error("executor out of resources: {0}")]
    ResourceExhaustion(#[source] io::Error),

    /// The task was cancelled before the worker got to it.
    #[error("task was cancelled before it started")]
    Cancelled,

    /// A blocking wait was attempted on the executor's own worker thread.
    #[error("waiting for a task from inside its own executor would deadlock")]
    WouldDeadlock,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
