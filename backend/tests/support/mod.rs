//! In-memory port implementations shared by the integration tests.
//!
//! These doubles keep the real domain semantics observable without a live
//! PostgreSQL instance: the ledger refuses inserts into uncovered months the
//! way a partitioned table would, and the aggregate store swaps scopes whole.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone, Utc};
use mockable::Clock;
use uuid::Uuid;

use backend::domain::aggregates::{
    LeaderboardEntry, PeriodGranularity, RebuildScope, SessionSummary, WeeklyAggregate,
};
use backend::domain::ports::{
    AggregateStore, AggregateStoreError, PartitionOutcome, PartitionSpec, PartitionStore,
    PartitionStoreError, SessionFilter, SessionRepository, SessionRepositoryError, TimeRange,
};
use backend::domain::sessions::{
    CompletedSessionRecord, OwnerId, SessionKey, SessionPatch, TrainingSession,
};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fixed-instant clock for deterministic timestamps.
pub struct FixtureClock {
    utc_now: DateTime<Utc>,
}

impl FixtureClock {
    pub fn at(utc_now: DateTime<Utc>) -> Arc<dyn Clock> {
        Arc::new(Self { utc_now })
    }
}

impl Clock for FixtureClock {
    fn local(&self) -> DateTime<Local> {
        self.utc_now.with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        self.utc_now
    }
}

pub fn ts(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0)
        .single()
        .expect("valid fixture timestamp")
}

pub fn owner(byte: u8) -> OwnerId {
    OwnerId::from_uuid(Uuid::from_bytes([byte; 16]))
}

/// Partition store tracking which monthly ranges exist.
#[derive(Default)]
pub struct InMemoryPartitionStore {
    partitions: Mutex<Vec<PartitionSpec>>,
}

impl InMemoryPartitionStore {
    pub fn partition_names(&self) -> Vec<String> {
        lock(&self.partitions)
            .iter()
            .map(|spec| spec.name().to_owned())
            .collect()
    }

    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        lock(&self.partitions).iter().any(|spec| spec.covers(at))
    }
}

#[async_trait]
impl PartitionStore for InMemoryPartitionStore {
    async fn create_if_absent(
        &self,
        spec: &PartitionSpec,
    ) -> Result<PartitionOutcome, PartitionStoreError> {
        let mut partitions = lock(&self.partitions);
        if partitions.iter().any(|existing| existing == spec) {
            return Ok(PartitionOutcome::AlreadyCovered);
        }
        partitions.push(spec.clone());
        Ok(PartitionOutcome::Created)
    }
}

/// Session ledger that enforces partition coverage like the real store.
pub struct InMemorySessionLedger {
    partitions: Arc<InMemoryPartitionStore>,
    rows: Mutex<Vec<TrainingSession>>,
}

impl InMemorySessionLedger {
    pub fn new(partitions: Arc<InMemoryPartitionStore>) -> Self {
        Self {
            partitions,
            rows: Mutex::new(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.rows).len()
    }

    /// Seed a session bypassing coverage checks; test setup only.
    pub fn seed(&self, session: TrainingSession) {
        lock(&self.rows).push(session);
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionLedger {
    async fn insert(&self, session: &TrainingSession) -> Result<(), SessionRepositoryError> {
        if !self.partitions.covers(session.scheduled_at()) {
            return Err(SessionRepositoryError::query(format!(
                "no partition covers {}",
                session.scheduled_at()
            )));
        }
        let mut rows = lock(&self.rows);
        if rows.iter().any(|existing| existing.key() == session.key()) {
            return Err(SessionRepositoryError::conflict("duplicate session key"));
        }
        rows.push(session.clone());
        Ok(())
    }

    async fn update(
        &self,
        key: &SessionKey,
        patch: &SessionPatch,
    ) -> Result<(), SessionRepositoryError> {
        let mut rows = lock(&self.rows);
        let slot = rows
            .iter_mut()
            .find(|existing| existing.key() == *key)
            .filter(|existing| !(patch.status.is_some() && existing.status().is_terminal()))
            .ok_or_else(|| {
                SessionRepositoryError::conflict(
                    "session row is missing or already reached a terminal status",
                )
            })?;
        *slot = slot
            .apply_patch(patch.clone())
            .map_err(|err| SessionRepositoryError::query(err.to_string()))?;
        Ok(())
    }

    async fn mark_deleted(
        &self,
        key: &SessionKey,
        deleted_at: DateTime<Utc>,
    ) -> Result<(), SessionRepositoryError> {
        let mut rows = lock(&self.rows);
        if let Some(slot) = rows.iter_mut().find(|existing| existing.key() == *key) {
            if !slot.is_deleted() {
                *slot = slot.mark_deleted(deleted_at);
            }
        }
        Ok(())
    }

    async fn find_by_id(
        &self,
        session_id: &Uuid,
    ) -> Result<Option<TrainingSession>, SessionRepositoryError> {
        Ok(lock(&self.rows)
            .iter()
            .find(|session| session.id() == *session_id)
            .cloned())
    }

    async fn list_by_owner(
        &self,
        owner_id: &OwnerId,
        filter: &SessionFilter,
    ) -> Result<Vec<TrainingSession>, SessionRepositoryError> {
        let mut sessions: Vec<TrainingSession> = lock(&self.rows)
            .iter()
            .filter(|session| session.owner_id() == owner_id)
            .filter(|session| filter.status.is_none_or(|status| session.status() == status))
            .filter(|session| {
                filter
                    .scheduled_within
                    .is_none_or(|range| range.contains(session.scheduled_at()))
            })
            .filter(|session| filter.include_deleted || !session.is_deleted())
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.scheduled_at().cmp(&a.scheduled_at()));
        Ok(sessions)
    }

    async fn list_completed(
        &self,
        owner_id: Option<OwnerId>,
        scheduled_within: Option<TimeRange>,
    ) -> Result<Vec<CompletedSessionRecord>, SessionRepositoryError> {
        Ok(lock(&self.rows)
            .iter()
            .filter_map(TrainingSession::completion_record)
            .filter(|record| owner_id.is_none_or(|owner| record.owner_id == owner))
            .filter(|record| {
                scheduled_within.is_none_or(|range| range.contains(record.scheduled_at))
            })
            .collect())
    }
}

/// Aggregate store swapping whole scopes, mirroring the SQL adapter.
#[derive(Default)]
pub struct InMemoryAggregateStore {
    summaries: Mutex<Vec<SessionSummary>>,
    weekly: Mutex<Vec<WeeklyAggregate>>,
    leaderboard: Mutex<Vec<LeaderboardEntry>>,
    swaps: Mutex<HashMap<String, usize>>,
}

impl InMemoryAggregateStore {
    pub fn swap_count(&self, table: &str) -> usize {
        lock(&self.swaps).get(table).copied().unwrap_or(0)
    }

    fn record_swap(&self, table: &str) {
        *lock(&self.swaps).entry(table.to_owned()).or_insert(0) += 1;
    }
}

#[async_trait]
impl AggregateStore for InMemoryAggregateStore {
    async fn replace_session_summaries(
        &self,
        scope: &RebuildScope,
        rows: &[SessionSummary],
    ) -> Result<(), AggregateStoreError> {
        self.record_swap("session_summaries");
        let mut summaries = lock(&self.summaries);
        match scope {
            // Summaries are all-time totals: period scopes recompute them
            // from the full ledger and swap the whole view.
            RebuildScope::All | RebuildScope::Period { .. } => summaries.clear(),
            RebuildScope::Owner(owner_id) => {
                summaries.retain(|row| row.owner_id != *owner_id);
            }
        }
        summaries.extend_from_slice(rows);
        summaries.sort_by_key(|row| row.owner_id);
        Ok(())
    }

    async fn replace_weekly_aggregates(
        &self,
        scope: &RebuildScope,
        rows: &[WeeklyAggregate],
    ) -> Result<(), AggregateStoreError> {
        self.record_swap("weekly_aggregates");
        let mut weekly = lock(&self.weekly);
        match scope {
            RebuildScope::All => weekly.clear(),
            RebuildScope::Owner(owner_id) => {
                weekly.retain(|row| row.owner_id != *owner_id);
            }
            RebuildScope::Period { granularity, start } => {
                // Delete the whole Monday-start weeks the recompute covered,
                // so a week straddling the period boundary cannot survive
                // alongside its recomputed replacement.
                let end = granularity.period_end(*start).unwrap_or(*start);
                let (from, to) =
                    PeriodGranularity::week_aligned(*start, end).unwrap_or((*start, end));
                weekly.retain(|row| row.week_start < from || row.week_start >= to);
            }
        }
        weekly.extend_from_slice(rows);
        weekly.sort_by_key(|row| (row.owner_id, row.week_start));
        Ok(())
    }

    async fn replace_leaderboard(
        &self,
        scope: &RebuildScope,
        rows: &[LeaderboardEntry],
    ) -> Result<(), AggregateStoreError> {
        self.record_swap("leaderboard_entries");
        let mut leaderboard = lock(&self.leaderboard);
        match scope {
            RebuildScope::All | RebuildScope::Owner(_) => leaderboard.clear(),
            RebuildScope::Period { granularity, start } => {
                leaderboard
                    .retain(|row| row.period != *granularity || row.period_start != *start);
            }
        }
        leaderboard.extend_from_slice(rows);
        Ok(())
    }

    async fn session_summaries(
        &self,
        scope: &RebuildScope,
    ) -> Result<Vec<SessionSummary>, AggregateStoreError> {
        Ok(lock(&self.summaries)
            .iter()
            .filter(|row| match scope {
                RebuildScope::Owner(owner_id) => row.owner_id == *owner_id,
                RebuildScope::All | RebuildScope::Period { .. } => true,
            })
            .copied()
            .collect())
    }

    async fn weekly_aggregates(
        &self,
        scope: &RebuildScope,
    ) -> Result<Vec<WeeklyAggregate>, AggregateStoreError> {
        Ok(lock(&self.weekly)
            .iter()
            .filter(|row| match scope {
                RebuildScope::Owner(owner_id) => row.owner_id == *owner_id,
                RebuildScope::All | RebuildScope::Period { .. } => true,
            })
            .copied()
            .collect())
    }

    async fn leaderboard(
        &self,
        period: PeriodGranularity,
        period_start: Option<DateTime<Utc>>,
    ) -> Result<Vec<LeaderboardEntry>, AggregateStoreError> {
        let mut rows: Vec<LeaderboardEntry> = lock(&self.leaderboard)
            .iter()
            .filter(|row| row.period == period)
            .filter(|row| period_start.is_none_or(|start| row.period_start == start))
            .copied()
            .collect();
        rows.sort_by(|a, b| {
            b.period_start
                .cmp(&a.period_start)
                .then_with(|| a.rank.cmp(&b.rank))
        });
        Ok(rows)
    }
}
