//! Error types shared across the Sluice crates.

use thiserror::Error;

/// Result alias defaulting to [`CoreError`].
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

/// Errors produced by core domain operations and repositories.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Database query or connection failure.
    #[error("database error: {0}")]
    Database(String),

    /// Requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// JSON serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Caller-supplied data failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CoreError {
    /// Creates a database error from any displayable source.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Creates a not-found error for the given entity description.
    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound(entity.into())
    }

    /// Creates an invalid-input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Whether retrying the operation could plausibly succeed.
    ///
    /// Only transient database failures qualify; not-found and validation
    /// errors are deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::NotFound("row not found".to_string()),
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_errors_are_retryable() {
        assert!(CoreError::database("connection reset").is_retryable());
        assert!(!CoreError::not_found("tenant acme").is_retryable());
        assert!(!CoreError::invalid_input("missing event_type").is_retryable());
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = CoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}
