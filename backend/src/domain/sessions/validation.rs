//! Session validation and conversion helpers.

use super::{SessionDraft, SessionExercise, SessionStatus, SessionValidationError, TrainingSession};

impl TryFrom<SessionDraft> for TrainingSession {
    type Error = SessionValidationError;

    fn try_from(draft: SessionDraft) -> Result<Self, Self::Error> {
        if draft.title.trim().is_empty() {
            return Err(SessionValidationError::EmptyTitle);
        }

        // Grace window between scheduled_at and started_at is zero.
        if draft
            .started_at
            .is_some_and(|started_at| started_at < draft.scheduled_at)
        {
            return Err(SessionValidationError::StartedBeforeScheduled);
        }
        match (draft.started_at, draft.completed_at) {
            (None, Some(_)) => return Err(SessionValidationError::CompletedWithoutStart),
            (Some(started_at), Some(completed_at)) if completed_at < started_at => {
                return Err(SessionValidationError::CompletedBeforeStarted);
            }
            _ => {}
        }
        if draft.status == SessionStatus::Completed && draft.completed_at.is_none() {
            return Err(SessionValidationError::CompletedStatusWithoutTimestamp);
        }

        validate_metric("calories_kcal", draft.calories_kcal)?;
        validate_metric("points", draft.points)?;
        validate_exercise_order(draft.exercises.as_slice())?;

        Ok(Self {
            id: draft.id,
            owner_id: draft.owner_id,
            plan_id: draft.plan_id,
            title: draft.title,
            visibility: draft.visibility,
            scheduled_at: draft.scheduled_at,
            started_at: draft.started_at,
            completed_at: draft.completed_at,
            status: draft.status,
            recurrence: draft.recurrence,
            calories_kcal: draft.calories_kcal,
            points: draft.points,
            deleted_at: draft.deleted_at,
            exercises: draft.exercises,
        })
    }
}

fn validate_metric(field: &'static str, value: i64) -> Result<(), SessionValidationError> {
    if value < 0 {
        return Err(SessionValidationError::NegativeMetric { field, value });
    }
    Ok(())
}

/// Order indices need not be contiguous but must be strictly increasing in
/// display order, which also guarantees uniqueness per session.
fn validate_exercise_order(exercises: &[SessionExercise]) -> Result<(), SessionValidationError> {
    let mut previous: Option<i32> = None;
    for exercise in exercises {
        if previous.is_some_and(|prev| exercise.order_index() <= prev) {
            return Err(SessionValidationError::NonIncreasingExerciseOrder {
                order_index: exercise.order_index(),
            });
        }
        previous = Some(exercise.order_index());
    }
    Ok(())
}
