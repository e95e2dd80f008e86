//! Training session domain types.
//!
//! Sessions are the ledger entity: identified by `(id, scheduled_at)` because
//! the physical store is range-partitioned by scheduled time. Exercises are
//! ordered child entries owned by their session, and recurrence rules are
//! pure value objects expanded into future session instances.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod exercise;
mod recurrence;
mod session;
mod validation;

pub use exercise::{SessionExercise, SessionExerciseDraft};
pub use recurrence::{
    Frequency, RecurrenceEnd, RecurrenceExpansion, RecurrenceRule, RecurrenceRuleDraft,
    RecurrenceValidationError,
};
pub use session::{
    CompletedSessionRecord, SessionDraft, SessionKey, SessionPatch, TrainingSession,
};

/// Owner identity supplied by the authentication layer.
///
/// The core trusts this identity; credential validation happens upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(Uuid);

impl OwnerId {
    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Borrow the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Generate a random owner id; used by tests and fixtures.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created but not yet started.
    Planned,
    /// Currently in progress.
    Active,
    /// Finished; terminal.
    Completed,
    /// Abandoned before completion; terminal.
    Cancelled,
}

impl SessionStatus {
    /// Stable string form used in persistence and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether no further transitions are allowed from this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether a transition to `next` is allowed.
    ///
    /// Owners move sessions `planned` → `active` → `completed`, and may
    /// cancel at any point before completion. Terminal statuses only permit
    /// the identity transition.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return true;
        }
        match self {
            Self::Planned => matches!(next, Self::Active | Self::Cancelled),
            Self::Active => matches!(next, Self::Completed | Self::Cancelled),
            Self::Completed | Self::Cancelled => false,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised when parsing a session status from its stored string form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown session status: {value}")]
pub struct ParseSessionStatusError {
    /// The rejected input.
    pub value: String,
}

impl FromStr for SessionStatus {
    type Err = ParseSessionStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "planned" => Ok(Self::Planned),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ParseSessionStatusError {
                value: other.to_owned(),
            }),
        }
    }
}

/// Who may see a session besides its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible to the owner only.
    Private,
    /// Visible to other users (leaderboards, shared plans).
    Public,
}

impl Visibility {
    /// Stable string form used in persistence.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }
}

/// Error raised when parsing a visibility from its stored string form.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown session visibility: {value}")]
pub struct ParseVisibilityError {
    /// The rejected input.
    pub value: String,
}

impl FromStr for Visibility {
    type Err = ParseVisibilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(Self::Private),
            "public" => Ok(Self::Public),
            other => Err(ParseVisibilityError {
                value: other.to_owned(),
            }),
        }
    }
}

/// Validation errors raised by session constructors and updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionValidationError {
    /// Title was empty after trimming.
    EmptyTitle,
    /// `started_at` precedes `scheduled_at` (grace window is zero).
    StartedBeforeScheduled,
    /// `completed_at` precedes `started_at`.
    CompletedBeforeStarted,
    /// `completed_at` was set without a `started_at`.
    CompletedWithoutStart,
    /// Status is `completed` but no completion timestamp is present.
    CompletedStatusWithoutTimestamp,
    /// Exercise order indices must be strictly increasing.
    NonIncreasingExerciseOrder {
        /// The offending order index.
        order_index: i32,
    },
    /// A computed metric was negative.
    NegativeMetric {
        /// Field name for diagnostics.
        field: &'static str,
        /// The rejected value.
        value: i64,
    },
    /// The requested status transition is not allowed.
    InvalidStatusTransition {
        /// Current status.
        from: SessionStatus,
        /// Requested status.
        to: SessionStatus,
    },
    /// `scheduled_at` is part of the identity and cannot be patched.
    ScheduledAtImmutable,
}

impl fmt::Display for SessionValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyTitle => write!(f, "session title must not be empty"),
            Self::StartedBeforeScheduled => {
                write!(f, "started_at must not precede scheduled_at")
            }
            Self::CompletedBeforeStarted => {
                write!(f, "completed_at must not precede started_at")
            }
            Self::CompletedWithoutStart => {
                write!(f, "completed_at requires started_at")
            }
            Self::CompletedStatusWithoutTimestamp => {
                write!(f, "completed status requires completed_at")
            }
            Self::NonIncreasingExerciseOrder { order_index } => {
                write!(
                    f,
                    "exercise order indices must be strictly increasing (got {order_index})"
                )
            }
            Self::NegativeMetric { field, value } => {
                write!(f, "{field} must not be negative (got {value})")
            }
            Self::InvalidStatusTransition { from, to } => {
                write!(f, "cannot transition session from {from} to {to}")
            }
            Self::ScheduledAtImmutable => {
                write!(
                    f,
                    "scheduled_at is immutable; clone the session to reschedule"
                )
            }
        }
    }
}

impl std::error::Error for SessionValidationError {}
