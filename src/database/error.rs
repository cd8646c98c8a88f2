use error_stack::Report;
use thiserror::Error;

/// Database related errors
#[derive(Debug, Error)]
pub enum Error {
    /// An error caused by an invalid Postgres connection url.
    #[error("invalid connection url")]
    InvalidUrl,
    /// An error caused by an [`sqlx`] error.
    #[error("received a pool error: {0}")]
    Internal(sqlx::Error),
    /// Failed to apply pending migrations.
    #[error("could not run database migrations")]
    Migration,
    /// The database is currently in read mode (most likely due
    /// to maintenance) and should not perform any writes.
    #[error("database is currently in read mode")]
    Readonly,
    /// The database pool does not have a reliable connection to
    /// transact to the database.
    #[error("unhealthy database pool")]
    UnhealthyPool,
}

/// Converts from a generic [sqlx] result into a [database compatible error](Error).
pub trait ErrorExt<T> {
    fn into_db_error(self) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, sqlx::Error> {
    fn into_db_error(self) -> Result<T> {
        self.map_err(|e| match &e {
            sqlx::Error::Database(err) if err.message().ends_with("read-only transaction") => {
                Report::new(e).change_context(Error::Readonly)
            }
            _ => Report::new(Error::Internal(e)),
        })
    }
}

/// Lazily typed [`std::result::Result`] but the error generic
/// is filled up with [a database error](Error).
pub type Result<T> = error_stack::Result<T, Error>;

/// Reads the kind of a `Report<Error>` without matching on its
/// context every time.
pub trait ErrorExt2 {
    fn is_unhealthy(&self) -> bool;
    fn is_readonly(&self) -> bool;
}

impl ErrorExt2 for Report<Error> {
    fn is_unhealthy(&self) -> bool {
        self.downcast_ref::<Error>()
            .map(|v| matches!(v, Error::UnhealthyPool))
            .unwrap_or_default()
    }

    fn is_readonly(&self) -> bool {
        self.downcast_ref::<Error>()
            .map(|v| matches!(v, Error::Readonly))
            .unwrap_or_default()
    }
}
