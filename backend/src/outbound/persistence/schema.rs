//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions describe the shape the database is provisioned with;
//! the base tables are created out of band and Diesel uses the definitions
//! for compile-time query validation. `training_sessions` is declared
//! `PARTITION BY RANGE (scheduled_at)`, which is why its primary key is
//! composite: PostgreSQL requires the partition key inside the primary key,
//! and a session id alone does not locate a row.

diesel::table! {
    /// Time-partitioned session ledger. One partition per calendar month,
    /// created at runtime by the partition store adapter.
    training_sessions (id, scheduled_at) {
        /// Session identifier (UUID v4).
        id -> Uuid,
        /// Owning user.
        owner_id -> Uuid,
        /// Optional training plan reference.
        plan_id -> Nullable<Uuid>,
        /// Display title.
        title -> Varchar,
        /// Visibility marker: `private` or `public`.
        visibility -> Varchar,
        /// Scheduled instant; the partition key, immutable once written.
        scheduled_at -> Timestamptz,
        /// When the owner started the session.
        started_at -> Nullable<Timestamptz>,
        /// When the owner completed the session.
        completed_at -> Nullable<Timestamptz>,
        /// Lifecycle status: `planned`, `active`, `completed`, `cancelled`.
        status -> Varchar,
        /// Recurrence rule JSON carried by anchor sessions.
        recurrence -> Nullable<Jsonb>,
        /// Computed energy expenditure.
        calories_kcal -> Int8,
        /// Computed score contribution.
        points -> Int8,
        /// Soft-delete marker; rows are never physically removed.
        deleted_at -> Nullable<Timestamptz>,
        /// Record creation timestamp.
        created_at -> Timestamptz,
        /// Last modification timestamp (auto-updated by trigger).
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Ordered exercise entries owned by their parent session.
    session_exercises (id) {
        /// Entry identifier.
        id -> Uuid,
        /// Parent session id.
        session_id -> Uuid,
        /// Parent session scheduled instant; completes the composite
        /// reference into the partitioned ledger.
        session_scheduled_at -> Timestamptz,
        /// Position within the session; strictly increasing.
        order_index -> Int4,
        /// Optional reference into the exercise catalogue.
        exercise_id -> Nullable<Uuid>,
        /// Free-form notes.
        notes -> Nullable<Text>,
    }
}

diesel::table! {
    /// Derived per-owner totals; fully rewritten by rebuilds.
    session_summaries (owner_id) {
        /// Owning user.
        owner_id -> Uuid,
        /// Number of completed sessions.
        sessions_completed -> Int8,
        /// Total active minutes.
        total_duration_minutes -> Int8,
        /// Total energy expenditure.
        total_calories_kcal -> Int8,
        /// Total score contribution.
        total_points -> Int8,
        /// When the row was last rebuilt.
        refreshed_at -> Timestamptz,
    }
}

diesel::table! {
    /// Derived per-owner, per-week rollups; fully rewritten by rebuilds.
    weekly_aggregates (owner_id, week_start) {
        /// Owning user.
        owner_id -> Uuid,
        /// Monday-start week bucket.
        week_start -> Timestamptz,
        /// Number of completed sessions in the week.
        sessions_completed -> Int8,
        /// Active minutes in the week.
        total_duration_minutes -> Int8,
        /// Energy expenditure in the week.
        total_calories_kcal -> Int8,
        /// Score contribution in the week.
        total_points -> Int8,
        /// When the row was last rebuilt.
        refreshed_at -> Timestamptz,
    }
}

diesel::table! {
    /// Derived leaderboard rows, one per (period, period start, owner).
    leaderboard_entries (period, period_start, owner_id) {
        /// Period granularity: `week` or `month`.
        period -> Varchar,
        /// Truncated period start.
        period_start -> Timestamptz,
        /// Ranked user.
        owner_id -> Uuid,
        /// Points accumulated within the period.
        points -> Int8,
        /// 1-based rank within the period bucket.
        rank -> Int4,
        /// When the row was last rebuilt.
        refreshed_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(training_sessions, session_exercises);
