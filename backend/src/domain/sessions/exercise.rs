//! Ordered exercise entries attached to a training session.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Input payload for [`SessionExercise::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionExerciseDraft {
    /// Entry identifier.
    pub id: Uuid,
    /// Position within the session; strictly increasing, not necessarily
    /// contiguous.
    pub order_index: i32,
    /// Optional reference into the exercise catalogue.
    pub exercise_id: Option<Uuid>,
    /// Free-form notes.
    pub notes: Option<String>,
}

/// An exercise entry exclusively owned by its parent session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionExercise {
    pub(super) id: Uuid,
    pub(super) order_index: i32,
    pub(super) exercise_id: Option<Uuid>,
    pub(super) notes: Option<String>,
}

impl SessionExercise {
    /// Create an exercise entry from a draft.
    pub fn new(draft: SessionExerciseDraft) -> Self {
        Self {
            id: draft.id,
            order_index: draft.order_index,
            exercise_id: draft.exercise_id,
            notes: draft.notes,
        }
    }

    /// Returns the entry id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the display order index.
    pub fn order_index(&self) -> i32 {
        self.order_index
    }

    /// Returns the optional catalogue reference.
    pub fn exercise_id(&self) -> Option<Uuid> {
        self.exercise_id
    }

    /// Returns the optional notes.
    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    /// Copy this entry with a fresh id, preserving order and content.
    ///
    /// Used when cloning a session: children keep their relative order but
    /// belong to the new identity.
    pub fn fresh_copy(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_index: self.order_index,
            exercise_id: self.exercise_id,
            notes: self.notes.clone(),
        }
    }
}
