//! PostgreSQL-backed `AggregateStore` implementation.
//!
//! Each `replace_*` runs a delete-then-insert inside one transaction, which
//! is the atomic swap the port requires: under PostgreSQL's default isolation
//! a reader sees the rows from before the transaction or after it, never a
//! partially rewritten scope.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::domain::aggregates::{
    LeaderboardEntry, PeriodGranularity, RebuildScope, SessionSummary, WeeklyAggregate,
};
use crate::domain::ports::{AggregateStore, AggregateStoreError};
use crate::domain::sessions::OwnerId;

use super::diesel_error_mapping::{map_basic_diesel_error, map_basic_pool_error};
use super::models::{LeaderboardEntryRow, SessionSummaryRow, WeeklyAggregateRow};
use super::pool::{DbPool, PoolError};
use super::schema::{leaderboard_entries, session_summaries, weekly_aggregates};

/// Diesel-backed implementation of the aggregate store port.
#[derive(Clone)]
pub struct DieselAggregateStore {
    pool: DbPool,
}

impl DieselAggregateStore {
    /// Create a new store with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn connection(
        &self,
    ) -> Result<diesel_async::pooled_connection::bb8::PooledConnection<'_, AsyncPgConnection>, AggregateStoreError>
    {
        self.pool.get().await.map_err(map_pool_error)
    }
}

fn map_pool_error(error: PoolError) -> AggregateStoreError {
    map_basic_pool_error(error, AggregateStoreError::connection)
}

fn map_diesel_error(error: diesel::result::Error) -> AggregateStoreError {
    map_basic_diesel_error(
        error,
        AggregateStoreError::query,
        AggregateStoreError::connection,
    )
}

fn summary_rows(rows: &[SessionSummary]) -> Vec<SessionSummaryRow> {
    rows.iter()
        .map(|row| SessionSummaryRow {
            owner_id: *row.owner_id.as_uuid(),
            sessions_completed: row.sessions_completed,
            total_duration_minutes: row.total_duration_minutes,
            total_calories_kcal: row.total_calories_kcal,
            total_points: row.total_points,
            refreshed_at: row.refreshed_at,
        })
        .collect()
}

fn weekly_rows(rows: &[WeeklyAggregate]) -> Vec<WeeklyAggregateRow> {
    rows.iter()
        .map(|row| WeeklyAggregateRow {
            owner_id: *row.owner_id.as_uuid(),
            week_start: row.week_start,
            sessions_completed: row.sessions_completed,
            total_duration_minutes: row.total_duration_minutes,
            total_calories_kcal: row.total_calories_kcal,
            total_points: row.total_points,
            refreshed_at: row.refreshed_at,
        })
        .collect()
}

fn leaderboard_rows(rows: &[LeaderboardEntry]) -> Vec<LeaderboardEntryRow> {
    rows.iter()
        .map(|row| LeaderboardEntryRow {
            period: row.period.as_str().to_owned(),
            period_start: row.period_start,
            owner_id: *row.owner_id.as_uuid(),
            points: row.points,
            rank: row.rank,
            refreshed_at: row.refreshed_at,
        })
        .collect()
}

fn parse_period(value: &str) -> Result<PeriodGranularity, AggregateStoreError> {
    value
        .parse()
        .map_err(|err: crate::domain::aggregates::ParsePeriodGranularityError| {
            AggregateStoreError::query(err.to_string())
        })
}

/// Owners whose summary rows a scope rewrites; `None` means the whole view.
///
/// Summaries are all-time totals, so a period-scoped rebuild recomputes them
/// from the full ledger and swaps the whole view; restricting the swap to the
/// period's owners would overwrite their history with one period's numbers.
fn scope_owners(scope: &RebuildScope) -> Option<Vec<Uuid>> {
    match scope {
        RebuildScope::All | RebuildScope::Period { .. } => None,
        RebuildScope::Owner(owner_id) => Some(vec![*owner_id.as_uuid()]),
    }
}

/// Week buckets a period-scoped weekly swap deletes: the period widened to
/// whole Monday-start weeks, matching the recompute's read range.
fn weekly_delete_window(
    granularity: PeriodGranularity,
    start: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = granularity.period_end(start).unwrap_or(start);
    PeriodGranularity::week_aligned(start, end).unwrap_or((start, end))
}

#[async_trait]
impl AggregateStore for DieselAggregateStore {
    async fn replace_session_summaries(
        &self,
        scope: &RebuildScope,
        rows: &[SessionSummary],
    ) -> Result<(), AggregateStoreError> {
        let new_rows = summary_rows(rows);
        let owners = scope_owners(scope);
        let mut conn = self.connection().await?;

        conn.transaction(|conn| {
            async move {
                let delete = diesel::delete(session_summaries::table);
                match owners {
                    Some(owners) => {
                        delete
                            .filter(session_summaries::owner_id.eq_any(owners))
                            .execute(conn)
                            .await?;
                    }
                    None => {
                        delete.execute(conn).await?;
                    }
                }
                if !new_rows.is_empty() {
                    diesel::insert_into(session_summaries::table)
                        .values(&new_rows)
                        .execute(conn)
                        .await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)
    }

    async fn replace_weekly_aggregates(
        &self,
        scope: &RebuildScope,
        rows: &[WeeklyAggregate],
    ) -> Result<(), AggregateStoreError> {
        let new_rows = weekly_rows(rows);
        let scope = *scope;
        let mut conn = self.connection().await?;

        conn.transaction(|conn| {
            async move {
                match scope {
                    RebuildScope::All => {
                        diesel::delete(weekly_aggregates::table).execute(conn).await?;
                    }
                    RebuildScope::Owner(owner_id) => {
                        diesel::delete(weekly_aggregates::table)
                            .filter(weekly_aggregates::owner_id.eq(*owner_id.as_uuid()))
                            .execute(conn)
                            .await?;
                    }
                    RebuildScope::Period { granularity, start } => {
                        let (from, to) = weekly_delete_window(granularity, start);
                        diesel::delete(weekly_aggregates::table)
                            .filter(weekly_aggregates::week_start.ge(from))
                            .filter(weekly_aggregates::week_start.lt(to))
                            .execute(conn)
                            .await?;
                    }
                }
                if !new_rows.is_empty() {
                    diesel::insert_into(weekly_aggregates::table)
                        .values(&new_rows)
                        .execute(conn)
                        .await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)
    }

    async fn replace_leaderboard(
        &self,
        scope: &RebuildScope,
        rows: &[LeaderboardEntry],
    ) -> Result<(), AggregateStoreError> {
        let new_rows = leaderboard_rows(rows);
        let scope = *scope;
        let mut conn = self.connection().await?;

        conn.transaction(|conn| {
            async move {
                match scope {
                    // Rank is a bucket-global property, so anything other
                    // than a single-period rebuild rewrites every bucket the
                    // computation covered: all of them.
                    RebuildScope::All | RebuildScope::Owner(_) => {
                        diesel::delete(leaderboard_entries::table).execute(conn).await?;
                    }
                    RebuildScope::Period { granularity, start } => {
                        diesel::delete(leaderboard_entries::table)
                            .filter(leaderboard_entries::period.eq(granularity.as_str()))
                            .filter(leaderboard_entries::period_start.eq(start))
                            .execute(conn)
                            .await?;
                    }
                }
                if !new_rows.is_empty() {
                    diesel::insert_into(leaderboard_entries::table)
                        .values(&new_rows)
                        .execute(conn)
                        .await?;
                }
                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)
    }

    async fn session_summaries(
        &self,
        scope: &RebuildScope,
    ) -> Result<Vec<SessionSummary>, AggregateStoreError> {
        let mut conn = self.connection().await?;

        let mut query = session_summaries::table.into_boxed();
        if let RebuildScope::Owner(owner_id) = scope {
            query = query.filter(session_summaries::owner_id.eq(*owner_id.as_uuid()));
        }
        let rows: Vec<SessionSummaryRow> = query
            .order(session_summaries::owner_id.asc())
            .select(SessionSummaryRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        Ok(rows
            .into_iter()
            .map(|row| SessionSummary {
                owner_id: OwnerId::from_uuid(row.owner_id),
                sessions_completed: row.sessions_completed,
                total_duration_minutes: row.total_duration_minutes,
                total_calories_kcal: row.total_calories_kcal,
                total_points: row.total_points,
                refreshed_at: row.refreshed_at,
            })
            .collect())
    }

    async fn weekly_aggregates(
        &self,
        scope: &RebuildScope,
    ) -> Result<Vec<WeeklyAggregate>, AggregateStoreError> {
        let mut conn = self.connection().await?;

        let mut query = weekly_aggregates::table.into_boxed();
        if let RebuildScope::Owner(owner_id) = scope {
            query = query.filter(weekly_aggregates::owner_id.eq(*owner_id.as_uuid()));
        }
        let rows: Vec<WeeklyAggregateRow> = query
            .order((
                weekly_aggregates::owner_id.asc(),
                weekly_aggregates::week_start.asc(),
            ))
            .select(WeeklyAggregateRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        Ok(rows
            .into_iter()
            .map(|row| WeeklyAggregate {
                owner_id: OwnerId::from_uuid(row.owner_id),
                week_start: row.week_start,
                sessions_completed: row.sessions_completed,
                total_duration_minutes: row.total_duration_minutes,
                total_calories_kcal: row.total_calories_kcal,
                total_points: row.total_points,
                refreshed_at: row.refreshed_at,
            })
            .collect())
    }

    async fn leaderboard(
        &self,
        period: PeriodGranularity,
        period_start: Option<DateTime<Utc>>,
    ) -> Result<Vec<LeaderboardEntry>, AggregateStoreError> {
        let mut conn = self.connection().await?;

        let mut query = leaderboard_entries::table
            .filter(leaderboard_entries::period.eq(period.as_str()))
            .into_boxed();
        if let Some(start) = period_start {
            query = query.filter(leaderboard_entries::period_start.eq(start));
        }
        let rows: Vec<LeaderboardEntryRow> = query
            .order((
                leaderboard_entries::period_start.desc(),
                leaderboard_entries::rank.asc(),
            ))
            .select(LeaderboardEntryRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(LeaderboardEntry {
                    period: parse_period(&row.period)?,
                    period_start: row.period_start,
                    owner_id: OwnerId::from_uuid(row.owner_id),
                    points: row.points,
                    rank: row.rank,
                    refreshed_at: row.refreshed_at,
                })
            })
            .collect()
    }
}
