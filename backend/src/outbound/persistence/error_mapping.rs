//! Shared classification of pool and Diesel failures.
//!
//! Repositories map these classes onto their own port error enums so that
//! the domain never sees Diesel types. Undefined-relation failures are kept
//! distinguishable: the notifications feature degrades gracefully when its
//! table has not been migrated yet.

use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::debug;

use super::pool::PoolError;

/// PostgreSQL error code for "relation does not exist".
const UNDEFINED_TABLE: &str = "42P01";

/// Storage failure classes shared by every repository.
pub enum StorageErrorClass {
    Connection(String),
    Query(String),
    MissingRelation(String),
}

pub fn classify_pool_error(error: PoolError) -> StorageErrorClass {
    StorageErrorClass::Connection(error.to_string())
}

pub fn classify_diesel_error(error: DieselError) -> StorageErrorClass {
    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
            if is_undefined_relation(&error) {
                return StorageErrorClass::MissingRelation(info.message().to_owned());
            }
            if matches!(kind, DatabaseErrorKind::ClosedConnection) {
                return StorageErrorClass::Connection(info.message().to_owned());
            }
            StorageErrorClass::Query(info.message().to_owned())
        }
        DieselError::NotFound => StorageErrorClass::Query("record not found".to_owned()),
        other => {
            debug!(error = %other, "diesel operation failed");
            StorageErrorClass::Query(other.to_string())
        }
    }
}

/// Whether a Diesel error is PostgreSQL's undefined-table failure, checked
/// by SQLSTATE when available with a message fallback for other drivers.
fn is_undefined_relation(error: &DieselError) -> bool {
    match error {
        DieselError::DatabaseError(DatabaseErrorKind::Unknown, info) => {
            info.details()
                .map(|details| details.contains(UNDEFINED_TABLE))
                .unwrap_or(false)
                || info.message().contains("does not exist")
        }
        DieselError::DatabaseError(_, info) => info.message().contains("does not exist"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn pool_errors_classify_as_connection() {
        let class = classify_pool_error(PoolError("timed out".into()));
        assert!(
            matches!(class, StorageErrorClass::Connection(message) if message.contains("timed out"))
        );
    }

    #[rstest]
    fn not_found_classifies_as_query() {
        let class = classify_diesel_error(DieselError::NotFound);
        assert!(matches!(class, StorageErrorClass::Query(_)));
    }

    #[rstest]
    fn undefined_relation_is_distinguished() {
        let error = DieselError::DatabaseError(
            DatabaseErrorKind::Unknown,
            Box::new(r#"relation "notifications" does not exist"#.to_owned()),
        );
        let class = classify_diesel_error(error);
        assert!(matches!(class, StorageErrorClass::MissingRelation(_)));
    }
}
