//! Ports describing refresh job dispatch and execution semantics.

use async_trait::async_trait;

use crate::domain::Error;
use crate::domain::refresh::RefreshJob;

use super::define_port_error;

define_port_error! {
    /// Errors surfaced by the queue adapter.
    pub enum JobDispatchError {
        /// Queue infrastructure is unavailable.
        Unavailable { message: String } =>
            "refresh queue is unavailable: {message}",
        /// The job could not be acknowledged or persisted.
        Rejected { message: String } =>
            "refresh job was rejected: {message}",
    }
}

/// Port for publishing refresh jobs onto the work queue.
///
/// `enqueue` returns once the job is durably accepted by the queue, not once
/// it executes. The queue is a disposable coordination mechanism: losing it
/// leaves aggregates stale but never incorrect.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RefreshQueue: Send + Sync {
    /// Enqueue a refresh job for downstream processing.
    async fn enqueue(&self, job: RefreshJob) -> Result<(), JobDispatchError>;
}

/// Port implemented by whatever executes dequeued refresh jobs.
///
/// Workers treat any error as retryable up to the queue's bounded retry
/// policy; exhausted jobs become terminal dead jobs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RefreshJobHandler: Send + Sync {
    /// Execute one refresh job to completion.
    async fn execute(&self, job: &RefreshJob) -> Result<(), Error>;
}
