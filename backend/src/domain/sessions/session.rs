//! Training session entity and related value objects.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{
    OwnerId, RecurrenceRule, SessionExercise, SessionStatus, SessionValidationError, Visibility,
};

/// Composite ledger identity: the store is partitioned by scheduled time, so
/// a session id alone does not locate a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    /// Session identifier.
    pub id: Uuid,
    /// Scheduled instant; immutable once set.
    pub scheduled_at: DateTime<Utc>,
}

/// Input payload for [`TrainingSession::new`].
#[derive(Debug, Clone)]
pub struct SessionDraft {
    /// Session identifier.
    pub id: Uuid,
    /// Owning user, supplied by the authentication layer.
    pub owner_id: OwnerId,
    /// Optional training plan reference.
    pub plan_id: Option<Uuid>,
    /// Display title.
    pub title: String,
    /// Visibility to other users.
    pub visibility: Visibility,
    /// Scheduled instant; part of the identity.
    pub scheduled_at: DateTime<Utc>,
    /// When the owner started the session.
    pub started_at: Option<DateTime<Utc>>,
    /// When the owner completed the session.
    pub completed_at: Option<DateTime<Utc>>,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Optional recurrence rule carried by the anchor session.
    pub recurrence: Option<RecurrenceRule>,
    /// Computed energy expenditure.
    pub calories_kcal: i64,
    /// Computed score contribution.
    pub points: i64,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Ordered child exercise entries.
    pub exercises: Vec<SessionExercise>,
}

/// Field-level patch applied by [`TrainingSession::apply_patch`].
///
/// Absent fields are left unchanged (last-writer-wins per field). A present
/// `scheduled_at` is always rejected: the schedule time is part of the
/// identity and rescheduling goes through the clone operation instead.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    /// New display title.
    pub title: Option<String>,
    /// New visibility.
    pub visibility: Option<Visibility>,
    /// Requested status transition.
    pub status: Option<SessionStatus>,
    /// New start timestamp.
    pub started_at: Option<DateTime<Utc>>,
    /// New completion timestamp.
    pub completed_at: Option<DateTime<Utc>>,
    /// New calories total.
    pub calories_kcal: Option<i64>,
    /// New points total.
    pub points: Option<i64>,
    /// Rejected when present; see the type docs.
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl SessionPatch {
    /// Whether the patch names no fields at all.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.visibility.is_none()
            && self.status.is_none()
            && self.started_at.is_none()
            && self.completed_at.is_none()
            && self.calories_kcal.is_none()
            && self.points.is_none()
            && self.scheduled_at.is_none()
    }
}

/// Ledger read model consumed by aggregate rebuilds.
///
/// A flat projection of a completed, non-deleted session; carries only the
/// fields the aggregation pipeline needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedSessionRecord {
    /// Owning user.
    pub owner_id: OwnerId,
    /// Scheduled instant; used for week and period bucketing.
    pub scheduled_at: DateTime<Utc>,
    /// Start timestamp.
    pub started_at: DateTime<Utc>,
    /// Completion timestamp.
    pub completed_at: DateTime<Utc>,
    /// Energy expenditure.
    pub calories_kcal: i64,
    /// Score contribution.
    pub points: i64,
}

/// A scheduled or completed training activity in the ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSession {
    pub(super) id: Uuid,
    pub(super) owner_id: OwnerId,
    pub(super) plan_id: Option<Uuid>,
    pub(super) title: String,
    pub(super) visibility: Visibility,
    pub(super) scheduled_at: DateTime<Utc>,
    pub(super) started_at: Option<DateTime<Utc>>,
    pub(super) completed_at: Option<DateTime<Utc>>,
    pub(super) status: SessionStatus,
    pub(super) recurrence: Option<RecurrenceRule>,
    pub(super) calories_kcal: i64,
    pub(super) points: i64,
    pub(super) deleted_at: Option<DateTime<Utc>>,
    pub(super) exercises: Vec<SessionExercise>,
}

impl TrainingSession {
    /// Creates a validated training session.
    pub fn new(draft: SessionDraft) -> Result<Self, SessionValidationError> {
        Self::try_from(draft)
    }

    /// Returns the session id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the composite ledger identity.
    pub fn key(&self) -> SessionKey {
        SessionKey {
            id: self.id,
            scheduled_at: self.scheduled_at,
        }
    }

    /// Returns the owning user id.
    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    /// Returns the optional plan reference.
    pub fn plan_id(&self) -> Option<Uuid> {
        self.plan_id
    }

    /// Returns the display title.
    pub fn title(&self) -> &str {
        self.title.as_str()
    }

    /// Returns the visibility.
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Returns the scheduled instant.
    pub fn scheduled_at(&self) -> DateTime<Utc> {
        self.scheduled_at
    }

    /// Returns the optional start timestamp.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Returns the optional completion timestamp.
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Returns the lifecycle status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Returns the optional recurrence rule.
    pub fn recurrence(&self) -> Option<&RecurrenceRule> {
        self.recurrence.as_ref()
    }

    /// Returns the computed calories total.
    pub fn calories_kcal(&self) -> i64 {
        self.calories_kcal
    }

    /// Returns the computed points total.
    pub fn points(&self) -> i64 {
        self.points
    }

    /// Returns the soft-delete marker.
    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }

    /// Whether the session is soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Returns child exercises in display order.
    pub fn exercises(&self) -> &[SessionExercise] {
        self.exercises.as_slice()
    }

    /// Apply a field-level patch, re-validating the resulting session.
    ///
    /// Rejects `scheduled_at` changes and invalid status transitions before
    /// any field is applied, so a failed patch leaves no partial state.
    pub fn apply_patch(&self, patch: SessionPatch) -> Result<Self, SessionValidationError> {
        if patch.scheduled_at.is_some() {
            return Err(SessionValidationError::ScheduledAtImmutable);
        }
        if let Some(next) = patch.status {
            if !self.status.can_transition_to(next) {
                return Err(SessionValidationError::InvalidStatusTransition {
                    from: self.status,
                    to: next,
                });
            }
        }

        Self::try_from(SessionDraft {
            id: self.id,
            owner_id: self.owner_id,
            plan_id: self.plan_id,
            title: patch.title.unwrap_or_else(|| self.title.clone()),
            visibility: patch.visibility.unwrap_or(self.visibility),
            scheduled_at: self.scheduled_at,
            started_at: patch.started_at.or(self.started_at),
            completed_at: patch.completed_at.or(self.completed_at),
            status: patch.status.unwrap_or(self.status),
            recurrence: self.recurrence,
            calories_kcal: patch.calories_kcal.unwrap_or(self.calories_kcal),
            points: patch.points.unwrap_or(self.points),
            deleted_at: self.deleted_at,
            exercises: self.exercises.clone(),
        })
    }

    /// Produce a logically new session cloned from this one.
    ///
    /// The clone gets a fresh identity, starts in `planned` status with
    /// lifecycle timestamps and computed metrics cleared, and copies child
    /// exercises with fresh ids preserving relative order. The recurrence
    /// rule stays on the original anchor so materialized instances do not
    /// re-expand.
    pub fn clone_as_planned(&self, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: self.owner_id,
            plan_id: self.plan_id,
            title: self.title.clone(),
            visibility: self.visibility,
            scheduled_at,
            started_at: None,
            completed_at: None,
            status: SessionStatus::Planned,
            recurrence: None,
            calories_kcal: 0,
            points: 0,
            deleted_at: None,
            exercises: self.exercises.iter().map(SessionExercise::fresh_copy).collect(),
        }
    }

    /// Mark the session soft-deleted at the given instant.
    ///
    /// Idempotent: an already-deleted session keeps its original marker. The
    /// row is never physically removed while aggregates may reference it.
    pub fn mark_deleted(&self, now: DateTime<Utc>) -> Self {
        let mut deleted = self.clone();
        deleted.deleted_at = Some(self.deleted_at.unwrap_or(now));
        deleted
    }

    /// Project this session into the aggregate read model.
    ///
    /// Returns `None` unless the session is completed, fully timestamped,
    /// and not soft-deleted.
    pub fn completion_record(&self) -> Option<CompletedSessionRecord> {
        if self.status != SessionStatus::Completed || self.is_deleted() {
            return None;
        }
        let started_at = self.started_at?;
        let completed_at = self.completed_at?;
        Some(CompletedSessionRecord {
            owner_id: self.owner_id,
            scheduled_at: self.scheduled_at,
            started_at,
            completed_at,
            calories_kcal: self.calories_kcal,
            points: self.points,
        })
    }
}
