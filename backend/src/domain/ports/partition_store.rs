//! Port for physical partition creation on the session ledger.

use chrono::{DateTime, Datelike, Days, Months, NaiveTime, Utc};

use async_trait::async_trait;

use super::define_port_error;

define_port_error! {
    /// Errors raised by partition store adapters.
    pub enum PartitionStoreError {
        /// Transient DDL-level lock contention; safe to retry.
        Contention { message: String } =>
            "partition creation hit contention: {message}",
        /// Store connection could not be established.
        Connection { message: String } =>
            "partition store connection failed: {message}",
        /// DDL statement failed for a non-transient reason.
        Query { message: String } =>
            "partition store query failed: {message}",
    }
}

/// Result of an idempotent partition creation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionOutcome {
    /// The partition was physically created by this call.
    Created,
    /// A partition covering the range already existed; treated as success.
    AlreadyCovered,
}

/// Description of one calendar-month partition of the session ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSpec {
    name: String,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl PartitionSpec {
    /// Build the partition description for the calendar month containing `at`.
    pub fn month_of(at: DateTime<Utc>) -> Self {
        let from = month_start(at);
        let to = (from.date_naive() + Months::new(1))
            .and_time(NaiveTime::MIN)
            .and_utc();
        let name = format!(
            "training_sessions_y{:04}m{:02}",
            from.year(),
            from.month()
        );
        Self { name, from, to }
    }

    /// Partition table name; derived, never caller-supplied.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Inclusive range start.
    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    /// Exclusive range end.
    pub fn to(&self) -> DateTime<Utc> {
        self.to
    }

    /// Whether `at` falls inside this partition's range.
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.from <= at && at < self.to
    }
}

fn month_start(at: DateTime<Utc>) -> DateTime<Utc> {
    let date = at.date_naive();
    (date - Days::new(u64::from(date.day0())))
        .and_time(NaiveTime::MIN)
        .and_utc()
}

/// Port for creating ledger partitions idempotently.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PartitionStore: Send + Sync {
    /// Create the partition described by `spec` unless it already exists.
    ///
    /// Concurrent callers racing for the same range must converge: duplicate
    /// creation attempts report [`PartitionOutcome::AlreadyCovered`] instead
    /// of an error.
    async fn create_if_absent(
        &self,
        spec: &PartitionSpec,
    ) -> Result<PartitionOutcome, PartitionStoreError>;
}
