use thiserror::Error;

/// Error type for endpoint operations.
///
/// Producer failures are carried inside [`EndpointState::error`](crate::state::EndpointState)
/// and never propagate out of a refetch; the usage-error variants are returned
/// eagerly by the facade when a key is unknown or accessed with the wrong
/// value type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("endpoint `{0}` is not defined")]
    UnknownEndpoint(String),

    #[error("endpoint `{0}` holds a different value type")]
    TypeMismatch(String),
}

impl QueryError {
    /// Creates a [`QueryError::Fetch`] from any displayable error.
    pub fn fetch(err: impl ToString) -> Self {
        Self::Fetch(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QueryError::Fetch("boom".to_string());
        assert_eq!(err.to_string(), "Fetch failed: boom");

        let err = QueryError::UnknownEndpoint("users".to_string());
        assert_eq!(err.to_string(), "endpoint `users` is not defined");

        let err = QueryError::TypeMismatch("users".to_string());
        assert_eq!(
            err.to_string(),
            "endpoint `users` holds a different value type"
        );
    }

    #[test]
    fn test_fetch_helper() {
        let err = QueryError::fetch(std::io::Error::other("connection reset"));
        assert_eq!(err, QueryError::Fetch("connection reset".to_string()));
    }
}
