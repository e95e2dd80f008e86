//! Domain model and services for session scheduling and aggregation.
//!
//! The ledger side ([`sessions`], [`SessionService`], [`PartitionManager`])
//! owns writes: validated session entities, recurrence expansion, and
//! partition coverage. The derived side ([`aggregates`], [`RefreshScheduler`])
//! recomputes read views from the ledger and swaps them atomically. The two
//! sides meet only through the [`ports`] traits, which outbound adapters
//! implement.

pub mod aggregates;
pub mod error;
pub mod partitions;
pub mod ports;
pub mod refresh;
pub mod retry;
pub mod session_service;
pub mod sessions;

pub use self::aggregates::{RebuildCoordinator, RebuildReport, RebuildScope, ViewName};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::partitions::PartitionManager;
pub use self::refresh::{RefreshJob, RefreshScheduler, TriggerSource};
pub use self::session_service::{CreateSessionRequest, CreatedSessions, SessionService};
pub use self::sessions::{SessionPatch, SessionStatus, TrainingSession};

/// Convenient service result alias.
pub type ServiceResult<T> = Result<T, Error>;
