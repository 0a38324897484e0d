//! Classification of `sqlx` errors into domain errors.

use crate::domain::foundation::{DomainError, ErrorCode};

/// Maps a `sqlx` error, marking faults a fresh transaction may survive as transient.
///
/// Transient: I/O failures, pool exhaustion or shutdown, SQLSTATE class 08
/// (connection exception), 40001 (serialization failure) and 40P01 (deadlock).
pub fn map_sqlx_error(err: sqlx::Error) -> DomainError {
    if is_transient(&err) {
        return DomainError::transient(format!("Transient database fault: {}", err));
    }
    let mapped = DomainError::new(ErrorCode::DatabaseError, format!("Database error: {}", err));
    match &err {
        sqlx::Error::Database(db) => match db.code() {
            Some(code) => mapped.with_detail("sqlstate", code.to_string()),
            None => mapped,
        },
        _ => mapped,
    }
}

fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db.code().map_or(false, |code| is_transient_sqlstate(&code)),
        _ => false,
    }
}

fn is_transient_sqlstate(code: &str) -> bool {
    code.starts_with("08") || code == "40001" || code == "40P01"
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn connection_and_concurrency_sqlstates_are_transient() {
        assert!(is_transient_sqlstate("08006"));
        assert!(is_transient_sqlstate("08001"));
        assert!(is_transient_sqlstate("40001"));
        assert!(is_transient_sqlstate("40P01"));
    }

    #[test]
    fn constraint_sqlstates_are_not_transient() {
        assert!(!is_transient_sqlstate("23505"));
        assert!(!is_transient_sqlstate("42P01"));
        assert!(!is_transient_sqlstate("40002"));
    }

    #[test]
    fn pool_and_io_faults_are_transient() {
        assert!(map_sqlx_error(sqlx::Error::PoolTimedOut).is_transient());
        assert!(map_sqlx_error(sqlx::Error::PoolClosed).is_transient());
        let io = sqlx::Error::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        assert!(map_sqlx_error(io).is_transient());
    }

    #[test]
    fn other_faults_are_database_errors() {
        let err = map_sqlx_error(sqlx::Error::RowNotFound);
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(!err.is_transient());
    }
}
