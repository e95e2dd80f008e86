//! Port for atomically swapping derived aggregate view contents.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::aggregates::{
    LeaderboardEntry, PeriodGranularity, RebuildScope, SessionSummary, WeeklyAggregate,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by aggregate store adapters.
    pub enum AggregateStoreError {
        /// Store connection could not be established.
        Connection { message: String } =>
            "aggregate store connection failed: {message}",
        /// Query or swap failed during execution.
        Query { message: String } =>
            "aggregate store query failed: {message}",
    }
}

/// Port for replacing and reading derived aggregate rows.
///
/// `replace_*` must be atomic for the given scope: concurrent readers observe
/// either the previous rows or the new rows in full, never a mix. Views are
/// never partially patched through any other path.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Replace per-owner summaries within `scope`.
    async fn replace_session_summaries(
        &self,
        scope: &RebuildScope,
        rows: &[SessionSummary],
    ) -> Result<(), AggregateStoreError>;

    /// Replace weekly rollups within `scope`.
    async fn replace_weekly_aggregates(
        &self,
        scope: &RebuildScope,
        rows: &[WeeklyAggregate],
    ) -> Result<(), AggregateStoreError>;

    /// Replace leaderboard rows within `scope`.
    async fn replace_leaderboard(
        &self,
        scope: &RebuildScope,
        rows: &[LeaderboardEntry],
    ) -> Result<(), AggregateStoreError>;

    /// Read per-owner summaries, ordered by owner id.
    async fn session_summaries(
        &self,
        scope: &RebuildScope,
    ) -> Result<Vec<SessionSummary>, AggregateStoreError>;

    /// Read weekly rollups, ordered by (owner id, week start).
    async fn weekly_aggregates(
        &self,
        scope: &RebuildScope,
    ) -> Result<Vec<WeeklyAggregate>, AggregateStoreError>;

    /// Read leaderboard rows for a granularity, newest period first, rank
    /// ascending within a period; optionally restricted to one period start.
    async fn leaderboard(
        &self,
        period: PeriodGranularity,
        period_start: Option<DateTime<Utc>>,
    ) -> Result<Vec<LeaderboardEntry>, AggregateStoreError>;
}
