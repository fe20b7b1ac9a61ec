use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Timed out after {0}s connecting to the database")]
    ConnectTimeout(u64),

    #[error("Invalid table name: {0:?}")]
    InvalidIdentifier(String),
}

pub type DbResult<T> = Result<T, DbError>;
