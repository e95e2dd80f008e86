//! PostgreSQL persistence adapters using Diesel ORM.
//!
//! Concrete implementations of the domain ports backed by PostgreSQL via
//! Diesel with async support through `diesel-async` and `bb8` pooling.
//!
//! The adapters are thin translators: Diesel row structs (`models.rs`) and
//! table definitions (`schema.rs`) never leak to the domain, every database
//! error maps to a port error, and no business logic lives here. The ledger
//! adapter additionally assumes partition coverage was secured by the caller;
//! partition DDL is the partition store's job alone.

mod diesel_aggregate_store;
mod diesel_error_mapping;
mod diesel_partition_store;
mod diesel_session_repository;
mod models;
mod pool;
mod schema;

pub use diesel_aggregate_store::DieselAggregateStore;
pub use diesel_partition_store::DieselPartitionStore;
pub use diesel_session_repository::DieselSessionRepository;
pub use pool::{DbPool, PoolConfig, PoolError};
