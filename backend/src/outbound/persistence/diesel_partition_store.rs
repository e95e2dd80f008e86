//! PostgreSQL-backed `PartitionStore` implementation.
//!
//! Creates monthly range partitions of the `training_sessions` ledger via
//! dynamic DDL. Partition DDL cannot be parameterised, so statements are
//! assembled from the partition spec; every interpolated value comes from the
//! spec's own formatting (a generated identifier and RFC 3339 bounds), never
//! from caller input.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_query;
use diesel::sql_types::{Bool, Text};
use diesel_async::RunQueryDsl;

use crate::domain::ports::{
    PartitionOutcome, PartitionSpec, PartitionStore, PartitionStoreError,
};

use super::diesel_error_mapping::{is_catalogue_contention, map_basic_pool_error};
use super::pool::{DbPool, PoolError};

/// Diesel-backed implementation of the partition store port.
#[derive(Clone)]
pub struct DieselPartitionStore {
    pool: DbPool,
}

impl DieselPartitionStore {
    /// Create a new store with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[derive(QueryableByName)]
struct RegclassRow {
    #[diesel(sql_type = Bool)]
    exists: bool,
}

fn map_pool_error(error: PoolError) -> PartitionStoreError {
    map_basic_pool_error(error, PartitionStoreError::connection)
}

fn map_ddl_error(error: diesel::result::Error) -> PartitionStoreError {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    if is_catalogue_contention(&error) {
        return PartitionStoreError::contention("tuple concurrently updated");
    }
    match error {
        // Racing creators can also surface as a duplicate catalogue entry;
        // a retry observes the partition and reports it as covered.
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            PartitionStoreError::contention(info.message().to_owned())
        }
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, info) => {
            PartitionStoreError::connection(info.message().to_owned())
        }
        other => PartitionStoreError::query(other.to_string()),
    }
}

fn create_partition_sql(spec: &PartitionSpec) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {name} PARTITION OF training_sessions \
         FOR VALUES FROM ('{from}') TO ('{to}')",
        name = spec.name(),
        from = spec.from().to_rfc3339(),
        to = spec.to().to_rfc3339(),
    )
}

fn create_indexes_sql(spec: &PartitionSpec) -> [String; 2] {
    let name = spec.name();
    [
        format!(
            "CREATE INDEX IF NOT EXISTS {name}_owner_status_scheduled_idx \
             ON {name} (owner_id, status, scheduled_at DESC)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS {name}_live_rows_idx \
             ON {name} (owner_id, scheduled_at DESC) WHERE deleted_at IS NULL"
        ),
    ]
}

#[async_trait]
impl PartitionStore for DieselPartitionStore {
    async fn create_if_absent(
        &self,
        spec: &PartitionSpec,
    ) -> Result<PartitionOutcome, PartitionStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let existing: RegclassRow =
            sql_query("SELECT to_regclass($1) IS NOT NULL AS exists")
                .bind::<Text, _>(spec.name())
                .get_result(&mut conn)
                .await
                .map_err(map_ddl_error)?;
        if existing.exists {
            return Ok(PartitionOutcome::AlreadyCovered);
        }

        sql_query(create_partition_sql(spec))
            .execute(&mut conn)
            .await
            .map_err(map_ddl_error)?;
        for statement in create_indexes_sql(spec) {
            sql_query(statement)
                .execute(&mut conn)
                .await
                .map_err(map_ddl_error)?;
        }

        Ok(PartitionOutcome::Created)
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for DDL assembly and error classification.

    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    use super::*;

    fn spec() -> PartitionSpec {
        let at = Utc
            .with_ymd_and_hms(2026, 3, 17, 8, 0, 0)
            .single()
            .expect("valid timestamp");
        PartitionSpec::month_of(at)
    }

    #[rstest]
    fn partition_ddl_names_the_month_and_half_open_bounds() {
        let sql = create_partition_sql(&spec());

        assert!(sql.contains("training_sessions_y2026m03"));
        assert!(sql.contains("PARTITION OF training_sessions"));
        assert!(sql.contains("FROM ('2026-03-01T00:00:00+00:00')"));
        assert!(sql.contains("TO ('2026-04-01T00:00:00+00:00')"));
    }

    #[rstest]
    fn index_ddl_targets_the_partition() {
        let [by_owner, live_rows] = create_indexes_sql(&spec());

        assert!(by_owner.contains("ON training_sessions_y2026m03 (owner_id, status"));
        assert!(live_rows.contains("WHERE deleted_at IS NULL"));
    }

    #[rstest]
    fn catalogue_contention_is_classified_as_contention() {
        let error = diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::Unknown,
            Box::new("tuple concurrently updated".to_owned()),
        );

        let mapped = map_ddl_error(error);
        assert!(matches!(mapped, PartitionStoreError::Contention { .. }));
    }

    #[rstest]
    fn unrelated_database_errors_are_query_failures() {
        let error = diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::Unknown,
            Box::new("relation does not exist".to_owned()),
        );

        let mapped = map_ddl_error(error);
        assert!(matches!(mapped, PartitionStoreError::Query { .. }));
    }
}
