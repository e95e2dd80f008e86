//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod aggregate_store;
mod partition_store;
mod refresh_queue;
mod session_repository;

#[cfg(test)]
pub use aggregate_store::MockAggregateStore;
pub use aggregate_store::{AggregateStore, AggregateStoreError};
#[cfg(test)]
pub use partition_store::MockPartitionStore;
pub use partition_store::{PartitionOutcome, PartitionSpec, PartitionStore, PartitionStoreError};
#[cfg(test)]
pub use refresh_queue::{MockRefreshJobHandler, MockRefreshQueue};
pub use refresh_queue::{JobDispatchError, RefreshJobHandler, RefreshQueue};
#[cfg(test)]
pub use session_repository::MockSessionRepository;
pub use session_repository::{
    SessionFilter, SessionRepository, SessionRepositoryError, TimeRange,
};
