//! PostgreSQL-backed `SessionRepository` implementation using Diesel ORM.
//!
//! Persists training sessions into the partitioned ledger and loads them back
//! through validated domain constructors. Callers must secure partition
//! coverage before inserting; this adapter only routes rows.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::domain::ports::{
    SessionFilter, SessionRepository, SessionRepositoryError, TimeRange,
};
use crate::domain::sessions::{
    CompletedSessionRecord, OwnerId, RecurrenceRule, SessionDraft, SessionExercise,
    SessionExerciseDraft, SessionKey, SessionPatch, SessionStatus, TrainingSession, Visibility,
};

use super::diesel_error_mapping::{
    map_basic_diesel_error, map_basic_pool_error, map_write_diesel_error,
};
use super::models::{
    NewSessionExerciseRow, NewTrainingSessionRow, SessionExerciseRow, TrainingSessionChangeset,
    TrainingSessionRow,
};
use super::pool::{DbPool, PoolError};
use super::schema::{session_exercises, training_sessions};

/// Stored status strings no patch may transition a row out of. Keep in step
/// with `SessionStatus::is_terminal`.
const TERMINAL_STATUSES: [&str; 2] = ["completed", "cancelled"];

/// Diesel-backed implementation of the session ledger port.
#[derive(Clone)]
pub struct DieselSessionRepository {
    pool: DbPool,
}

impl DieselSessionRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> SessionRepositoryError {
    map_basic_pool_error(error, SessionRepositoryError::connection)
}

fn map_read_error(error: diesel::result::Error) -> SessionRepositoryError {
    map_basic_diesel_error(
        error,
        SessionRepositoryError::query,
        SessionRepositoryError::connection,
    )
}

fn map_write_error(error: diesel::result::Error) -> SessionRepositoryError {
    map_write_diesel_error(
        error,
        SessionRepositoryError::query,
        SessionRepositoryError::connection,
        SessionRepositoryError::conflict,
    )
}

fn serialize_recurrence(
    session: &TrainingSession,
) -> Result<Option<serde_json::Value>, SessionRepositoryError> {
    session
        .recurrence()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|err| SessionRepositoryError::query(format!("serialise recurrence: {err}")))
}

fn decode_recurrence(
    recurrence: Option<serde_json::Value>,
) -> Result<Option<RecurrenceRule>, SessionRepositoryError> {
    recurrence
        .map(serde_json::from_value)
        .transpose()
        .map_err(|err| SessionRepositoryError::query(format!("decode recurrence: {err}")))
}

/// Convert a ledger row plus its child rows into a validated domain session.
fn row_to_session(
    row: TrainingSessionRow,
    exercise_rows: Vec<SessionExerciseRow>,
) -> Result<TrainingSession, SessionRepositoryError> {
    let status: SessionStatus = row
        .status
        .parse()
        .map_err(|err: crate::domain::sessions::ParseSessionStatusError| {
            SessionRepositoryError::query(err.to_string())
        })?;
    let visibility: Visibility = row
        .visibility
        .parse()
        .map_err(|err: crate::domain::sessions::ParseVisibilityError| {
            SessionRepositoryError::query(err.to_string())
        })?;
    let recurrence = decode_recurrence(row.recurrence)?;

    let exercises = exercise_rows
        .into_iter()
        .map(|entry| {
            SessionExercise::new(SessionExerciseDraft {
                id: entry.id,
                order_index: entry.order_index,
                exercise_id: entry.exercise_id,
                notes: entry.notes,
            })
        })
        .collect();

    TrainingSession::new(SessionDraft {
        id: row.id,
        owner_id: OwnerId::from_uuid(row.owner_id),
        plan_id: row.plan_id,
        title: row.title,
        visibility,
        scheduled_at: row.scheduled_at,
        started_at: row.started_at,
        completed_at: row.completed_at,
        status,
        recurrence,
        calories_kcal: row.calories_kcal,
        points: row.points,
        deleted_at: row.deleted_at,
        exercises,
    })
    .map_err(|err| SessionRepositoryError::query(err.to_string()))
}

fn exercise_batch(session: &TrainingSession) -> Vec<NewSessionExerciseRow<'_>> {
    session
        .exercises()
        .iter()
        .map(|entry| NewSessionExerciseRow {
            id: entry.id(),
            session_id: session.id(),
            session_scheduled_at: session.scheduled_at(),
            order_index: entry.order_index(),
            exercise_id: entry.exercise_id(),
            notes: entry.notes(),
        })
        .collect()
}

async fn load_exercises(
    conn: &mut diesel_async::AsyncPgConnection,
    session_ids: &[Uuid],
) -> Result<Vec<SessionExerciseRow>, SessionRepositoryError> {
    session_exercises::table
        .filter(session_exercises::session_id.eq_any(session_ids))
        .order(session_exercises::order_index.asc())
        .select(SessionExerciseRow::as_select())
        .load(conn)
        .await
        .map_err(map_read_error)
}

#[async_trait]
impl SessionRepository for DieselSessionRepository {
    async fn insert(&self, session: &TrainingSession) -> Result<(), SessionRepositoryError> {
        use diesel_async::AsyncConnection as _;
        use diesel_async::scoped_futures::ScopedFutureExt as _;

        let recurrence = serialize_recurrence(session)?;
        let new_row = NewTrainingSessionRow {
            id: session.id(),
            owner_id: *session.owner_id().as_uuid(),
            plan_id: session.plan_id(),
            title: session.title(),
            visibility: session.visibility().as_str(),
            scheduled_at: session.scheduled_at(),
            started_at: session.started_at(),
            completed_at: session.completed_at(),
            status: session.status().as_str(),
            recurrence: recurrence.as_ref(),
            calories_kcal: session.calories_kcal(),
            points: session.points(),
            deleted_at: session.deleted_at(),
        };
        let exercise_rows = exercise_batch(session);

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        // Parent and children land in one transaction so a constraint failure
        // cannot leave a session without its exercises.
        conn.transaction(|conn| {
            async move {
                diesel::insert_into(training_sessions::table)
                    .values(&new_row)
                    .execute(conn)
                    .await?;

                if !exercise_rows.is_empty() {
                    diesel::insert_into(session_exercises::table)
                        .values(&exercise_rows)
                        .execute(conn)
                        .await?;
                }

                Ok(())
            }
            .scope_boxed()
        })
        .await
        .map_err(map_write_error)
    }

    async fn update(
        &self,
        key: &SessionKey,
        patch: &SessionPatch,
    ) -> Result<(), SessionRepositoryError> {
        if patch.is_empty() {
            return Ok(());
        }
        let changeset = TrainingSessionChangeset {
            title: patch.title.as_deref(),
            visibility: patch.visibility.map(Visibility::as_str),
            status: patch.status.map(SessionStatus::as_str),
            started_at: patch.started_at,
            completed_at: patch.completed_at,
            calories_kcal: patch.calories_kcal,
            points: patch.points,
        };
        let target = training_sessions::table
            .filter(training_sessions::id.eq(key.id))
            .filter(training_sessions::scheduled_at.eq(key.scheduled_at));

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        // Status changes are validated against the caller's read of the row;
        // the predicate re-checks at write time so a patch computed from a
        // stale read cannot pull a row back out of a terminal status.
        let updated = if patch.status.is_some() {
            diesel::update(target.filter(training_sessions::status.ne_all(TERMINAL_STATUSES)))
                .set(&changeset)
                .execute(&mut conn)
                .await
                .map_err(map_write_error)?
        } else {
            diesel::update(target)
                .set(&changeset)
                .execute(&mut conn)
                .await
                .map_err(map_write_error)?
        };

        if updated == 0 {
            return Err(SessionRepositoryError::conflict(
                "session row is missing or already reached a terminal status",
            ));
        }
        Ok(())
    }

    async fn mark_deleted(
        &self,
        key: &SessionKey,
        deleted_at: DateTime<Utc>,
    ) -> Result<(), SessionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        // Zero rows means the marker was already set; the original instant
        // wins and the call stays idempotent.
        diesel::update(
            training_sessions::table
                .filter(training_sessions::id.eq(key.id))
                .filter(training_sessions::scheduled_at.eq(key.scheduled_at))
                .filter(training_sessions::deleted_at.is_null()),
        )
        .set(training_sessions::deleted_at.eq(deleted_at))
        .execute(&mut conn)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn find_by_id(
        &self,
        session_id: &Uuid,
    ) -> Result<Option<TrainingSession>, SessionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let row = training_sessions::table
            .filter(training_sessions::id.eq(session_id))
            .select(TrainingSessionRow::as_select())
            .first::<TrainingSessionRow>(&mut conn)
            .await
            .optional()
            .map_err(map_read_error)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let exercises = load_exercises(&mut conn, &[row.id]).await?;
        row_to_session(row, exercises).map(Some)
    }

    async fn list_by_owner(
        &self,
        owner_id: &OwnerId,
        filter: &SessionFilter,
    ) -> Result<Vec<TrainingSession>, SessionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let mut query = training_sessions::table
            .filter(training_sessions::owner_id.eq(owner_id.as_uuid()))
            .into_boxed();
        if let Some(status) = filter.status {
            query = query.filter(training_sessions::status.eq(status.as_str()));
        }
        if let Some(range) = filter.scheduled_within {
            query = query
                .filter(training_sessions::scheduled_at.ge(range.from))
                .filter(training_sessions::scheduled_at.lt(range.to));
        }
        if !filter.include_deleted {
            query = query.filter(training_sessions::deleted_at.is_null());
        }

        let rows: Vec<TrainingSessionRow> = query
            .order((
                training_sessions::scheduled_at.desc(),
                training_sessions::id.desc(),
            ))
            .select(TrainingSessionRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_read_error)?;

        let session_ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let exercises = load_exercises(&mut conn, &session_ids).await?;
        let mut by_session: HashMap<Uuid, Vec<SessionExerciseRow>> = HashMap::new();
        for entry in exercises {
            by_session.entry(entry.session_id).or_default().push(entry);
        }

        rows.into_iter()
            .map(|row| {
                let children = by_session.remove(&row.id).unwrap_or_default();
                row_to_session(row, children)
            })
            .collect()
    }

    async fn list_completed(
        &self,
        owner_id: Option<OwnerId>,
        scheduled_within: Option<TimeRange>,
    ) -> Result<Vec<CompletedSessionRecord>, SessionRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let mut query = training_sessions::table
            .filter(training_sessions::status.eq(SessionStatus::Completed.as_str()))
            .filter(training_sessions::deleted_at.is_null())
            .filter(training_sessions::started_at.is_not_null())
            .filter(training_sessions::completed_at.is_not_null())
            .into_boxed();
        if let Some(owner_id) = owner_id {
            query = query.filter(training_sessions::owner_id.eq(*owner_id.as_uuid()));
        }
        if let Some(range) = scheduled_within {
            query = query
                .filter(training_sessions::scheduled_at.ge(range.from))
                .filter(training_sessions::scheduled_at.lt(range.to));
        }

        let rows: Vec<TrainingSessionRow> = query
            .order((
                training_sessions::scheduled_at.asc(),
                training_sessions::id.asc(),
            ))
            .select(TrainingSessionRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_read_error)?;

        rows.into_iter()
            .map(|row| {
                let started_at = row.started_at.ok_or_else(|| {
                    SessionRepositoryError::query("completed session missing started_at")
                })?;
                let completed_at = row.completed_at.ok_or_else(|| {
                    SessionRepositoryError::query("completed session missing completed_at")
                })?;
                Ok(CompletedSessionRecord {
                    owner_id: OwnerId::from_uuid(row.owner_id),
                    scheduled_at: row.scheduled_at,
                    started_at,
                    completed_at,
                    calories_kcal: row.calories_kcal,
                    points: row.points,
                })
            })
            .collect()
    }
}
