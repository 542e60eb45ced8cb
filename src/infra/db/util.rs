use sqlx::error::ErrorKind;

use crate::application::repos::RepoError;

/// Classify a driver error. Foreign-key violations surface as `ConstraintViolation` so
/// callers never inspect backend messages.
pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(db) if matches!(db.kind(), ErrorKind::ForeignKeyViolation) => {
            RepoError::ConstraintViolation {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            }
        }
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to user request") =>
        {
            RepoError::Timeout
        }
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        other => RepoError::from_persistence(other),
    }
}

/// Narrow a stored INTEGER column back to its domain width.
pub(crate) fn stat_from_column(column: &'static str, value: i32) -> Result<u16, RepoError> {
    u16::try_from(value)
        .map_err(|_| RepoError::from_persistence(format!("{column} out of range: {value}")))
}
