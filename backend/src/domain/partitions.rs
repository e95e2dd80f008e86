//! Partition lifecycle management for the session ledger.
//!
//! The ledger is range-partitioned by scheduled time, one partition per
//! calendar month. Writers call [`PartitionManager::ensure_coverage`] before
//! any insert; a scheduled maintenance task calls
//! [`PartitionManager::ensure_lookahead`] to keep near-future months covered.
//! Both paths are idempotent and safe to call concurrently.

use std::sync::Arc;

use chrono::{DateTime, Months, Utc};
use tracing::info;

use crate::domain::Error;
use crate::domain::ports::{PartitionOutcome, PartitionSpec, PartitionStore, PartitionStoreError};
use crate::domain::retry::{RetryPolicy, Sleeper, TokioSleeper, run_with_retry};

/// Ensures ledger partitions exist for target schedule ranges.
pub struct PartitionManager<P> {
    store: Arc<P>,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl<P> PartitionManager<P> {
    /// Create a manager with the default bounded retry policy (3 attempts,
    /// short fixed delay).
    pub fn new(store: Arc<P>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Override the retry policy and sleeper; used by tests and operators
    /// tuning contention behaviour.
    pub fn with_retry(store: Arc<P>, retry: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            store,
            retry,
            sleeper,
        }
    }
}

impl<P> PartitionManager<P>
where
    P: PartitionStore,
{
    /// Guarantee a partition covering `at` exists.
    ///
    /// Contention during creation is retried a bounded number of times; all
    /// other store failures surface immediately. Duplicate creation attempts
    /// from racing callers converge to [`PartitionOutcome::AlreadyCovered`]
    /// without error. Emits a creation event only when a partition was
    /// physically created.
    pub async fn ensure_coverage(&self, at: DateTime<Utc>) -> Result<PartitionOutcome, Error> {
        let spec = PartitionSpec::month_of(at);
        let outcome = run_with_retry(
            &self.retry,
            self.sleeper.as_ref(),
            |err: &PartitionStoreError| matches!(err, PartitionStoreError::Contention { .. }),
            || self.store.create_if_absent(&spec),
        )
        .await
        .map_err(|err| map_store_error(&spec, err))?;

        if outcome == PartitionOutcome::Created {
            info!(
                partition = spec.name(),
                from = %spec.from(),
                to = %spec.to(),
                "session partition created"
            );
        }
        Ok(outcome)
    }

    /// Guarantee coverage for the month containing `now` plus `months`
    /// further months of lookahead.
    pub async fn ensure_lookahead(&self, now: DateTime<Utc>, months: u32) -> Result<(), Error> {
        for offset in 0..=months {
            let at = now
                .checked_add_months(Months::new(offset))
                .ok_or_else(|| Error::internal("partition lookahead overflowed the calendar"))?;
            self.ensure_coverage(at).await?;
        }
        Ok(())
    }
}

fn map_store_error(spec: &PartitionSpec, err: PartitionStoreError) -> Error {
    match err {
        PartitionStoreError::Contention { message } => Error::scheduling_unavailable(format!(
            "partition {} creation kept hitting contention: {message}",
            spec.name()
        )),
        PartitionStoreError::Connection { message } => Error::scheduling_unavailable(format!(
            "partition store unavailable while securing {}: {message}",
            spec.name()
        )),
        PartitionStoreError::Query { message } => Error::internal(format!(
            "partition {} creation failed: {message}",
            spec.name()
        )),
    }
}

#[cfg(test)]
#[path = "partitions_tests.rs"]
mod tests;
