use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database query error: {0}")]
    QueryError(String),

    #[error("Database migration error: {0}")]
    MigrationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Data conversion error: {0}")]
    ConversionError(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Record not found: {0}")]
    NotFound(String),
}

impl From<StoreError> for common::Error {
    fn from(err: StoreError) -> Self {
        common::Error::DbError(err.to_string())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_check_violation() => {
                StoreError::ConstraintViolation(db.message().to_string())
            }
            _ => StoreError::QueryError(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::MigrationError(err.to_string())
    }
}
