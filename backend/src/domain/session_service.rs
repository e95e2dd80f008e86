//! Application service for session scheduling.
//!
//! Orchestrates the write path of the ledger: partition coverage is secured
//! before any insert, recurrence rules are expanded into materialized future
//! instances at creation time, and updates go through the validated
//! field-level patch on the entity.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use mockable::Clock;
use tracing::info;
use uuid::Uuid;

use crate::domain::Error;
use crate::domain::partitions::PartitionManager;
use crate::domain::ports::{
    PartitionStore, SessionFilter, SessionRepository, SessionRepositoryError,
};
use crate::domain::sessions::{
    OwnerId, RecurrenceRule, RecurrenceRuleDraft, SessionDraft, SessionExercise,
    SessionExerciseDraft, SessionPatch, SessionStatus, SessionValidationError, TrainingSession,
    Visibility,
};

/// Default expansion horizon for recurrence materialization, in days.
pub const DEFAULT_EXPANSION_HORIZON_DAYS: i64 = 90;

/// Input payload for [`SessionService::create_session`].
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    /// Owning user, supplied by the caller's authentication layer.
    pub owner_id: OwnerId,
    /// Optional training plan reference.
    pub plan_id: Option<Uuid>,
    /// Display title.
    pub title: String,
    /// Visibility to other users.
    pub visibility: Visibility,
    /// Scheduled instant; required, immutable once accepted.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Optional recurrence rule to expand at creation time.
    pub recurrence: Option<RecurrenceRuleDraft>,
    /// Ordered child exercise entries.
    pub exercises: Vec<SessionExerciseDraft>,
}

/// Result of creating a session: the anchor plus any instances materialized
/// from its recurrence rule.
#[derive(Debug, Clone)]
pub struct CreatedSessions {
    /// The session carrying the recurrence rule, if any.
    pub anchor: TrainingSession,
    /// Future instances materialized within the expansion horizon, in
    /// schedule order.
    pub occurrences: Vec<TrainingSession>,
}

/// Orchestrates ledger writes, partition coverage, and recurrence expansion.
pub struct SessionService<R, P> {
    ledger: Arc<R>,
    partitions: Arc<PartitionManager<P>>,
    clock: Arc<dyn Clock>,
    expansion_horizon: Duration,
}

impl<R, P> SessionService<R, P> {
    /// Create a service with the default recurrence expansion horizon.
    pub fn new(ledger: Arc<R>, partitions: Arc<PartitionManager<P>>, clock: Arc<dyn Clock>) -> Self {
        Self::with_horizon(
            ledger,
            partitions,
            clock,
            Duration::days(DEFAULT_EXPANSION_HORIZON_DAYS),
        )
    }

    /// Create a service with an explicit recurrence expansion horizon.
    pub fn with_horizon(
        ledger: Arc<R>,
        partitions: Arc<PartitionManager<P>>,
        clock: Arc<dyn Clock>,
        expansion_horizon: Duration,
    ) -> Self {
        Self {
            ledger,
            partitions,
            clock,
            expansion_horizon,
        }
    }
}

impl<R, P> SessionService<R, P>
where
    R: SessionRepository,
    P: PartitionStore,
{
    /// Create a session, securing partition coverage first and materializing
    /// recurrence instances up to the expansion horizon.
    ///
    /// Each materialized instance is an independent planned row with a fresh
    /// identity; only the anchor carries the rule.
    pub async fn create_session(&self, request: CreateSessionRequest) -> Result<CreatedSessions, Error> {
        let scheduled_at = request
            .scheduled_at
            .ok_or_else(|| Error::invalid_request("a scheduled time is required"))?;

        let recurrence = request
            .recurrence
            .map(RecurrenceRule::new)
            .transpose()
            .map_err(|err| Error::invalid_request(err.to_string()))?;

        let anchor = TrainingSession::new(SessionDraft {
            id: Uuid::new_v4(),
            owner_id: request.owner_id,
            plan_id: request.plan_id,
            title: request.title,
            visibility: request.visibility,
            scheduled_at,
            started_at: None,
            completed_at: None,
            status: SessionStatus::Planned,
            recurrence,
            calories_kcal: 0,
            points: 0,
            deleted_at: None,
            exercises: request
                .exercises
                .into_iter()
                .map(SessionExercise::new)
                .collect(),
        })
        .map_err(map_validation_error)?;

        self.partitions.ensure_coverage(scheduled_at).await?;
        self.ledger
            .insert(&anchor)
            .await
            .map_err(map_repository_error)?;

        let occurrences = self.materialize_recurrence(&anchor).await?;
        info!(
            session_id = %anchor.id(),
            owner_id = %anchor.owner_id(),
            occurrences = occurrences.len(),
            "training session created"
        );

        Ok(CreatedSessions { anchor, occurrences })
    }

    /// Apply a field-level patch to an existing session.
    ///
    /// `scheduled_at` changes are rejected outright; rescheduling goes
    /// through [`SessionService::clone_session`].
    pub async fn update_session(
        &self,
        session_id: &Uuid,
        patch: SessionPatch,
    ) -> Result<TrainingSession, Error> {
        let current = self.require_session(session_id).await?;
        let updated = current
            .apply_patch(patch.clone())
            .map_err(map_validation_error)?;

        // Restating the current status is a no-op transition; drop it so the
        // ledger's stale-status-write guard only sees real transitions.
        let mut effective = patch;
        if effective.status == Some(current.status()) {
            effective.status = None;
        }
        if !effective.is_empty() {
            self.ledger
                .update(&current.key(), &effective)
                .await
                .map_err(map_repository_error)?;
        }
        Ok(updated)
    }

    /// Clone a session to a new scheduled time as a fresh planned row.
    ///
    /// Defaults to the source session's scheduled time when no target is
    /// given. The clone never carries the source's recurrence rule.
    pub async fn clone_session(
        &self,
        session_id: &Uuid,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<TrainingSession, Error> {
        let source = self.require_session(session_id).await?;
        let target = scheduled_at.unwrap_or_else(|| source.scheduled_at());
        let clone = source.clone_as_planned(target);

        self.partitions.ensure_coverage(target).await?;
        self.ledger
            .insert(&clone)
            .await
            .map_err(map_repository_error)?;
        info!(
            source_id = %source.id(),
            session_id = %clone.id(),
            "training session cloned"
        );
        Ok(clone)
    }

    /// Soft-delete a session; idempotent.
    ///
    /// The row stays in the ledger so aggregates rebuilt from history remain
    /// explainable; reads exclude it by default.
    pub async fn soft_delete_session(&self, session_id: &Uuid) -> Result<TrainingSession, Error> {
        let current = self.require_session(session_id).await?;
        let deleted = current.mark_deleted(self.clock.utc());
        self.ledger
            .mark_deleted(&current.key(), self.clock.utc())
            .await
            .map_err(map_repository_error)?;
        Ok(deleted)
    }

    /// Fetch one session by id.
    pub async fn get_session(&self, session_id: &Uuid) -> Result<TrainingSession, Error> {
        self.require_session(session_id).await
    }

    /// List an owner's sessions, newest scheduled first.
    pub async fn list_sessions(
        &self,
        owner_id: &OwnerId,
        filter: &SessionFilter,
    ) -> Result<Vec<TrainingSession>, Error> {
        self.ledger
            .list_by_owner(owner_id, filter)
            .await
            .map_err(map_repository_error)
    }

    async fn require_session(&self, session_id: &Uuid) -> Result<TrainingSession, Error> {
        self.ledger
            .find_by_id(session_id)
            .await
            .map_err(map_repository_error)?
            .ok_or_else(|| Error::not_found(format!("session {session_id} does not exist")))
    }

    async fn materialize_recurrence(
        &self,
        anchor: &TrainingSession,
    ) -> Result<Vec<TrainingSession>, Error> {
        let Some(rule) = anchor.recurrence() else {
            return Ok(Vec::new());
        };

        let horizon = self
            .clock
            .utc()
            .checked_add_signed(self.expansion_horizon)
            .ok_or_else(|| Error::internal("expansion horizon overflowed the calendar"))?;

        let mut occurrences = Vec::new();
        for instant in rule.expand(anchor.scheduled_at(), horizon) {
            let instance = anchor.clone_as_planned(instant);
            self.partitions.ensure_coverage(instant).await?;
            self.ledger
                .insert(&instance)
                .await
                .map_err(map_repository_error)?;
            occurrences.push(instance);
        }
        Ok(occurrences)
    }
}

fn map_validation_error(err: SessionValidationError) -> Error {
    match err {
        SessionValidationError::InvalidStatusTransition { .. } => Error::conflict(err.to_string()),
        _ => Error::invalid_request(err.to_string()),
    }
}

fn map_repository_error(err: SessionRepositoryError) -> Error {
    match err {
        SessionRepositoryError::Connection { message } => Error::scheduling_unavailable(format!(
            "session ledger unavailable: {message}"
        )),
        SessionRepositoryError::Conflict { message } => {
            Error::conflict(format!("session write conflicted: {message}"))
        }
        SessionRepositoryError::Query { message } => {
            Error::internal(format!("session ledger query failed: {message}"))
        }
    }
}

#[cfg(test)]
#[path = "session_service_tests.rs"]
mod tests;
