//! Coordinated aggregate view rebuilds.
//!
//! A rebuild reads the completed-session ledger, recomputes one view for one
//! scope, and atomically swaps the stored rows through the aggregate store
//! port. Rebuilds targeting the same (view, scope) lane are serialized here,
//! so a rebuild never observes a half-applied predecessor; disjoint lanes run
//! concurrently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use mockable::Clock;
use tracing::{error, info};

use crate::domain::Error;
use crate::domain::ports::{
    AggregateStore, AggregateStoreError, RefreshJobHandler, SessionRepository,
    SessionRepositoryError, TimeRange,
};
use crate::domain::refresh::RefreshJob;
use crate::domain::sessions::CompletedSessionRecord;

use super::compute;
use super::views::{PeriodGranularity, RebuildScope, ViewName};

/// Outcome of one completed rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    /// The view that was rebuilt.
    pub view: ViewName,
    /// The scope that was swapped.
    pub scope: RebuildScope,
    /// Number of rows written into the view.
    pub rows_written: usize,
    /// Timestamp stamped onto every written row.
    pub refreshed_at: DateTime<Utc>,
}

/// Rebuilds derived views from the session ledger.
pub struct RebuildCoordinator<R, S> {
    ledger: Arc<R>,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    lanes: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<R, S> RebuildCoordinator<R, S> {
    /// Create a coordinator over the given ledger and aggregate store.
    pub fn new(ledger: Arc<R>, store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            store,
            clock,
            lanes: Mutex::new(HashMap::new()),
        }
    }

    fn lane(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(lanes.entry(key.to_owned()).or_default())
    }
}

impl<R, S> RebuildCoordinator<R, S>
where
    R: SessionRepository,
    S: AggregateStore,
{
    /// Rebuild one view for one scope.
    ///
    /// The swap is atomic per scope: readers see the previous rows or the new
    /// rows in full. Rebuilding twice from an unchanged ledger writes
    /// identical rows apart from `refreshed_at`.
    pub async fn rebuild(&self, view: ViewName, scope: &RebuildScope) -> Result<RebuildReport, Error> {
        let lane_key = scope.lane_key(view);
        let lane = self.lane(&lane_key);
        let _serialized = lane.lock().await;

        info!(view = %view, lane = %lane_key, "aggregate rebuild started");
        match self.rebuild_locked(view, scope).await {
            Ok(report) => {
                info!(
                    view = %view,
                    lane = %lane_key,
                    rows = report.rows_written,
                    "aggregate rebuild completed"
                );
                Ok(report)
            }
            Err(err) => {
                error!(view = %view, lane = %lane_key, error = %err, "aggregate rebuild failed");
                Err(err)
            }
        }
    }

    /// Rebuild every registered view for `scope`, respecting dependency
    /// order: per-owner summaries first, then the views derived alongside
    /// them. When `concurrent` is set the two dependent views rebuild in
    /// parallel.
    pub async fn rebuild_all(
        &self,
        scope: &RebuildScope,
        concurrent: bool,
    ) -> Result<Vec<RebuildReport>, Error> {
        let summaries = self.rebuild(ViewName::SessionSummary, scope).await?;

        let (weekly, leaderboard) = if concurrent {
            tokio::join!(
                self.rebuild(ViewName::WeeklyAggregates, scope),
                self.rebuild(ViewName::Leaderboard, scope),
            )
        } else {
            let weekly = self.rebuild(ViewName::WeeklyAggregates, scope).await;
            let leaderboard = self.rebuild(ViewName::Leaderboard, scope).await;
            (weekly, leaderboard)
        };

        Ok(vec![summaries, weekly?, leaderboard?])
    }

    async fn rebuild_locked(
        &self,
        view: ViewName,
        scope: &RebuildScope,
    ) -> Result<RebuildReport, Error> {
        let records = self.read_scope(view, scope).await?;
        let refreshed_at = self.clock.utc();

        let rows_written = match view {
            ViewName::SessionSummary => {
                let rows = compute::session_summaries(&records, refreshed_at);
                self.store
                    .replace_session_summaries(scope, &rows)
                    .await
                    .map_err(map_store_error)?;
                rows.len()
            }
            ViewName::WeeklyAggregates => {
                let rows = compute::weekly_aggregates(&records, refreshed_at);
                self.store
                    .replace_weekly_aggregates(scope, &rows)
                    .await
                    .map_err(map_store_error)?;
                rows.len()
            }
            ViewName::Leaderboard => {
                let rows = leaderboard_rows(&records, scope, refreshed_at);
                self.store
                    .replace_leaderboard(scope, &rows)
                    .await
                    .map_err(map_store_error)?;
                rows.len()
            }
        };

        Ok(RebuildReport {
            view,
            scope: *scope,
            rows_written,
            refreshed_at,
        })
    }

    async fn read_scope(
        &self,
        view: ViewName,
        scope: &RebuildScope,
    ) -> Result<Vec<CompletedSessionRecord>, Error> {
        let range = scope_range(view, scope)?;
        self.ledger
            .list_completed(scope.owner().copied(), range)
            .await
            .map_err(map_ledger_error)
    }
}

#[async_trait::async_trait]
impl<R, S> RefreshJobHandler for RebuildCoordinator<R, S>
where
    R: SessionRepository + 'static,
    S: AggregateStore + 'static,
{
    async fn execute(&self, job: &RefreshJob) -> Result<(), Error> {
        self.rebuild(job.view, &job.scope).await.map(|_| ())
    }
}

/// Leaderboard rows for a scope. A period-scoped rebuild ranks only that
/// granularity; owner-wide and full rebuilds refresh both granularities so no
/// bucket is left holding rows from a stale ledger.
fn leaderboard_rows(
    records: &[CompletedSessionRecord],
    scope: &RebuildScope,
    refreshed_at: DateTime<Utc>,
) -> Vec<super::views::LeaderboardEntry> {
    match scope {
        RebuildScope::Period { granularity, .. } => {
            compute::leaderboard(records, *granularity, refreshed_at)
        }
        RebuildScope::All | RebuildScope::Owner(_) => {
            let mut rows = compute::leaderboard(records, PeriodGranularity::Week, refreshed_at);
            rows.extend(compute::leaderboard(
                records,
                PeriodGranularity::Month,
                refreshed_at,
            ));
            rows
        }
    }
}

/// Ledger read range for a (view, scope) rebuild.
///
/// Period scopes bound the read only for views keyed by that period. Summary
/// rows are all-time totals, so they always recompute from the full history;
/// weekly rollups widen the period to whole Monday-start weeks so a week
/// straddling the boundary is recounted in full rather than from the slice
/// inside the period.
fn scope_range(view: ViewName, scope: &RebuildScope) -> Result<Option<TimeRange>, Error> {
    let RebuildScope::Period { granularity, start } = scope else {
        return Ok(None);
    };
    let overflow = || Error::internal("rebuild period end overflowed the calendar");
    let to = granularity.period_end(*start).ok_or_else(overflow)?;

    match view {
        ViewName::SessionSummary => Ok(None),
        ViewName::WeeklyAggregates => {
            let (from, to) = PeriodGranularity::week_aligned(*start, to).ok_or_else(overflow)?;
            Ok(Some(TimeRange { from, to }))
        }
        ViewName::Leaderboard => Ok(Some(TimeRange { from: *start, to })),
    }
}

fn map_store_error(err: AggregateStoreError) -> Error {
    match err {
        AggregateStoreError::Connection { message } => Error::scheduling_unavailable(format!(
            "aggregate store unavailable during rebuild: {message}"
        )),
        AggregateStoreError::Query { message } => {
            Error::internal(format!("aggregate swap failed: {message}"))
        }
    }
}

fn map_ledger_error(err: SessionRepositoryError) -> Error {
    match err {
        SessionRepositoryError::Connection { message } => Error::scheduling_unavailable(format!(
            "session ledger unavailable during rebuild: {message}"
        )),
        SessionRepositoryError::Query { message } | SessionRepositoryError::Conflict { message } => {
            Error::internal(format!("rebuild ledger read failed: {message}"))
        }
    }
}
