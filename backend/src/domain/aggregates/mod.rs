//! Derived aggregate views over the session ledger.
//!
//! Views are never patched incrementally: a rebuild recomputes a scope from
//! the ledger and swaps it in atomically. [`compute`] holds the pure
//! aggregation functions; [`RebuildCoordinator`] wires them to the ledger and
//! store ports and serializes rebuilds per (view, scope) lane.

pub mod compute;
mod rebuild;
mod views;

pub use rebuild::{RebuildCoordinator, RebuildReport};
pub use views::{
    LeaderboardEntry, ParsePeriodGranularityError, PeriodGranularity, RebuildScope,
    SessionSummary, ViewName, WeeklyAggregate,
};
