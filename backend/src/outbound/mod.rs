//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! Following the hexagonal pattern, each adapter is a thin translator
//! between domain types and an infrastructure concern:
//!
//! - **persistence**: PostgreSQL-backed ledger, partition, and aggregate
//!   stores using Diesel ORM
//! - **queue**: in-process Tokio lane queue for refresh jobs
//!
//! No business logic lives here.

pub mod persistence;
pub mod queue;
