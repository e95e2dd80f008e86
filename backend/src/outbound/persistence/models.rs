//! Internal Diesel row structs for database operations.
//!
//! Implementation details of the persistence layer, never exposed to the
//! domain. They exist solely to satisfy Diesel's type requirements for
//! queries and mutations.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::schema::{
    leaderboard_entries, session_exercises, session_summaries, training_sessions,
    weekly_aggregates,
};

/// Row struct for reading from the training_sessions table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = training_sessions)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct TrainingSessionRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub title: String,
    pub visibility: String,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: String,
    pub recurrence: Option<serde_json::Value>,
    pub calories_kcal: i64,
    pub points: i64,
    pub deleted_at: Option<DateTime<Utc>>,
    #[expect(dead_code, reason = "schema field read for audit tooling only")]
    pub created_at: DateTime<Utc>,
    #[expect(dead_code, reason = "schema field read for audit tooling only")]
    pub updated_at: DateTime<Utc>,
}

/// Insertable struct for creating new ledger rows.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = training_sessions)]
pub(crate) struct NewTrainingSessionRow<'a> {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub plan_id: Option<Uuid>,
    pub title: &'a str,
    pub visibility: &'a str,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: &'a str,
    pub recurrence: Option<&'a serde_json::Value>,
    pub calories_kcal: i64,
    pub points: i64,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Changeset for the mutable scalar fields of a ledger row.
///
/// Every field is optional and `None` is skipped, so an UPDATE writes exactly
/// the fields the patch named; concurrent patches to disjoint fields both
/// survive. `scheduled_at` is deliberately absent: it is the partition key
/// and part of the identity. The soft-delete marker has its own write path.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = training_sessions)]
pub(crate) struct TrainingSessionChangeset<'a> {
    pub title: Option<&'a str>,
    pub visibility: Option<&'a str>,
    pub status: Option<&'a str>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub calories_kcal: Option<i64>,
    pub points: Option<i64>,
}

/// Row struct for reading from the session_exercises table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = session_exercises)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct SessionExerciseRow {
    pub id: Uuid,
    pub session_id: Uuid,
    #[expect(dead_code, reason = "composite reference column, filtered not read")]
    pub session_scheduled_at: DateTime<Utc>,
    pub order_index: i32,
    pub exercise_id: Option<Uuid>,
    pub notes: Option<String>,
}

/// Insertable struct for creating exercise entries.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = session_exercises)]
pub(crate) struct NewSessionExerciseRow<'a> {
    pub id: Uuid,
    pub session_id: Uuid,
    pub session_scheduled_at: DateTime<Utc>,
    pub order_index: i32,
    pub exercise_id: Option<Uuid>,
    pub notes: Option<&'a str>,
}

/// Row struct for the session_summaries view table, read and written whole.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = session_summaries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct SessionSummaryRow {
    pub owner_id: Uuid,
    pub sessions_completed: i64,
    pub total_duration_minutes: i64,
    pub total_calories_kcal: i64,
    pub total_points: i64,
    pub refreshed_at: DateTime<Utc>,
}

/// Row struct for the weekly_aggregates view table, read and written whole.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = weekly_aggregates)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct WeeklyAggregateRow {
    pub owner_id: Uuid,
    pub week_start: DateTime<Utc>,
    pub sessions_completed: i64,
    pub total_duration_minutes: i64,
    pub total_calories_kcal: i64,
    pub total_points: i64,
    pub refreshed_at: DateTime<Utc>,
}

/// Row struct for the leaderboard_entries view table, read and written whole.
#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = leaderboard_entries)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct LeaderboardEntryRow {
    pub period: String,
    pub period_start: DateTime<Utc>,
    pub owner_id: Uuid,
    pub points: i64,
    pub rank: i32,
    pub refreshed_at: DateTime<Utc>,
}
