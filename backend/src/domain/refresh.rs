//! Scheduling of aggregate refresh work.
//!
//! Periodic and operator-initiated refreshes do not rebuild views inline:
//! they describe the work as a [`RefreshJob`] and hand it to the queue port.
//! The queue is coordination only; losing it leaves views stale until the
//! next refresh, never incorrect, because every job recomputes from the
//! ledger.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::Error;
use crate::domain::aggregates::{
    PeriodGranularity, RebuildCoordinator, RebuildReport, RebuildScope, ViewName,
};
use crate::domain::ports::{
    AggregateStore, JobDispatchError, RefreshQueue, SessionRepository,
};

/// What initiated a refresh job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSource {
    /// Operator-initiated refresh.
    Manual,
    /// Periodic scheduler tick.
    Cron,
    /// Historical backfill after a ledger correction.
    Backfill,
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Manual => "manual",
            Self::Cron => "cron",
            Self::Backfill => "backfill",
        })
    }
}

/// Auditing payload carried alongside a refresh job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshJobPayload {
    /// Granularity of the period being refreshed.
    pub period: PeriodGranularity,
    /// What initiated the job.
    pub triggered_by: TriggerSource,
    /// When the job was handed to the queue.
    pub enqueued_at: DateTime<Utc>,
}

/// One unit of aggregate refresh work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshJob {
    /// The view to rebuild.
    pub view: ViewName,
    /// The scope to swap.
    pub scope: RebuildScope,
    /// Auditing payload.
    pub payload: RefreshJobPayload,
}

impl RefreshJob {
    /// Job family name used in queue tables and logs.
    pub const NAME: &'static str = "aggregate-refresh";

    /// Ordering lane for this job; jobs sharing a lane execute in enqueue
    /// order.
    pub fn lane_key(&self) -> String {
        self.scope.lane_key(self.view)
    }
}

/// Enqueues periodic refresh jobs and drives full rebuilds.
pub struct RefreshScheduler<Q, R, S> {
    queue: Arc<Q>,
    coordinator: Arc<RebuildCoordinator<R, S>>,
    clock: Arc<dyn Clock>,
}

impl<Q, R, S> RefreshScheduler<Q, R, S>
where
    Q: RefreshQueue,
    R: SessionRepository,
    S: AggregateStore,
{
    /// Create a scheduler over the given queue and rebuild coordinator.
    pub fn new(
        queue: Arc<Q>,
        coordinator: Arc<RebuildCoordinator<R, S>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            queue,
            coordinator,
            clock,
        }
    }

    /// Enqueue a leaderboard refresh for the current period of `period`,
    /// attributed to a manual trigger.
    pub async fn schedule_refresh(&self, period: PeriodGranularity) -> Result<RefreshJob, Error> {
        self.schedule_refresh_from(period, TriggerSource::Manual)
            .await
    }

    /// Enqueue a leaderboard refresh for the current period of `period`.
    ///
    /// The full job descriptor is logged before the job is handed over, so an
    /// operator can replay it even if the queue loses the job afterwards.
    /// Exactly one job is enqueued per call.
    pub async fn schedule_refresh_from(
        &self,
        period: PeriodGranularity,
        triggered_by: TriggerSource,
    ) -> Result<RefreshJob, Error> {
        let now = self.clock.utc();
        let job = RefreshJob {
            view: ViewName::Leaderboard,
            scope: RebuildScope::Period {
                granularity: period,
                start: period.period_start(now),
            },
            payload: RefreshJobPayload {
                period,
                triggered_by,
                enqueued_at: now,
            },
        };

        let descriptor = serde_json::to_string(&job)
            .map_err(|err| Error::internal(format!("refresh job not serializable: {err}")))?;
        info!(
            name = RefreshJob::NAME,
            lane = %job.lane_key(),
            job = %descriptor,
            "refresh job scheduled"
        );

        self.queue.enqueue(job).await.map_err(map_dispatch_error)?;
        Ok(job)
    }

    /// Rebuild every view for the full ledger, bypassing the queue.
    ///
    /// Used at bootstrap and after ledger corrections, when waiting on queue
    /// throughput is not acceptable.
    pub async fn refresh_all(&self, concurrent: bool) -> Result<Vec<RebuildReport>, Error> {
        self.coordinator
            .rebuild_all(&RebuildScope::All, concurrent)
            .await
    }
}

fn map_dispatch_error(err: JobDispatchError) -> Error {
    match err {
        JobDispatchError::Unavailable { message } => Error::scheduling_unavailable(format!(
            "refresh queue unavailable: {message}"
        )),
        JobDispatchError::Rejected { message } => {
            Error::internal(format!("refresh job rejected: {message}"))
        }
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
