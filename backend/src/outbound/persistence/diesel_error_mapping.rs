//! Shared Diesel error mapping for the persistence adapters.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::debug;

use super::pool::PoolError;

/// Map pool errors into an adapter-specific connection error constructor.
pub fn map_basic_pool_error<E, C>(error: PoolError, connection: C) -> E
where
    C: FnOnce(String) -> E,
{
    let message = match error {
        PoolError::Checkout { message } | PoolError::Build { message } => message,
    };
    connection(message)
}

/// Map common Diesel error variants into query/connection constructors.
pub fn map_basic_diesel_error<E, Q, C>(error: DieselError, query: Q, connection: C) -> E
where
    Q: Fn(&'static str) -> E,
    C: Fn(&'static str) -> E,
{
    log_diesel_error(&error);

    match error {
        DieselError::NotFound => query("record not found"),
        DieselError::QueryBuilderError(_) => query("database query error"),
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            connection("database connection error")
        }
        _ => query("database error"),
    }
}

/// Map Diesel errors for write paths where constraint violations carry
/// meaning: uniqueness and referential failures go to `conflict`, everything
/// else follows the basic mapping.
pub fn map_write_diesel_error<E, Q, C, K>(
    error: DieselError,
    query: Q,
    connection: C,
    conflict: K,
) -> E
where
    Q: Fn(&'static str) -> E,
    C: Fn(&'static str) -> E,
    K: FnOnce(String) -> E,
{
    match error {
        DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation | DatabaseErrorKind::ForeignKeyViolation,
            info,
        ) => {
            debug!(message = info.message(), "constraint violation");
            conflict(info.message().to_owned())
        }
        other => map_basic_diesel_error(other, query, connection),
    }
}

/// Whether a Diesel error is PostgreSQL catalogue contention from concurrent
/// DDL. Racing partition creators hit this; it is transient and safe to
/// retry.
pub fn is_catalogue_contention(error: &DieselError) -> bool {
    match error {
        DieselError::DatabaseError(_, info) => {
            info.message().contains("tuple concurrently updated")
        }
        _ => false,
    }
}

fn log_diesel_error(error: &DieselError) {
    match error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        _ => debug!(
            error_type = %std::any::type_name_of_val(error),
            "diesel operation failed"
        ),
    }
}
