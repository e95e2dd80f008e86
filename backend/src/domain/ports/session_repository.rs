//! Port for training session ledger persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::sessions::{
    CompletedSessionRecord, OwnerId, SessionKey, SessionPatch, SessionStatus, TrainingSession,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by session ledger adapters.
    pub enum SessionRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "session ledger connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } =>
            "session ledger query failed: {message}",
        /// A uniqueness or referential constraint was violated; indicates a
        /// logic or input error, never retried.
        Conflict { message: String } =>
            "session ledger constraint violated: {message}",
    }
}

/// Half-open time range `[from, to)` used for ledger reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Inclusive lower bound.
    pub from: DateTime<Utc>,
    /// Exclusive upper bound.
    pub to: DateTime<Utc>,
}

impl TimeRange {
    /// Whether `at` falls within the range.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from <= at && at < self.to
    }
}

/// Listing filters for an owner's session history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionFilter {
    /// Restrict to a single status.
    pub status: Option<SessionStatus>,
    /// Restrict to a scheduled-time range.
    pub scheduled_within: Option<TimeRange>,
    /// Include soft-deleted rows; off by default.
    pub include_deleted: bool,
}

/// Port for writing and reading the partitioned session ledger.
///
/// Callers must secure partition coverage (via the partition manager) before
/// inserting; the adapter does not create partitions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a new session and its child exercises.
    async fn insert(&self, session: &TrainingSession) -> Result<(), SessionRepositoryError>;

    /// Apply a field-level patch to an existing session, keyed by its
    /// composite identity.
    ///
    /// Only the fields the patch names are written, so concurrent patches to
    /// disjoint fields both survive. A patch that changes the status must not
    /// overwrite a row that reached a terminal status after the caller read
    /// it; such a stale write fails with `Conflict`.
    async fn update(
        &self,
        key: &SessionKey,
        patch: &SessionPatch,
    ) -> Result<(), SessionRepositoryError>;

    /// Stamp the soft-delete marker unless one is already set; idempotent.
    async fn mark_deleted(
        &self,
        key: &SessionKey,
        deleted_at: DateTime<Utc>,
    ) -> Result<(), SessionRepositoryError>;

    /// Find a session by id across partitions.
    async fn find_by_id(
        &self,
        session_id: &Uuid,
    ) -> Result<Option<TrainingSession>, SessionRepositoryError>;

    /// List an owner's sessions, newest scheduled first.
    async fn list_by_owner(
        &self,
        owner_id: &OwnerId,
        filter: &SessionFilter,
    ) -> Result<Vec<TrainingSession>, SessionRepositoryError>;

    /// Read completed, non-deleted sessions as aggregate input, optionally
    /// restricted to one owner and/or a scheduled-time range.
    async fn list_completed(
        &self,
        owner_id: Option<OwnerId>,
        scheduled_within: Option<TimeRange>,
    ) -> Result<Vec<CompletedSessionRecord>, SessionRepositoryError>;
}
