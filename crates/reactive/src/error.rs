//! Error types for live results.

use alloc::string::String;
use thiserror::Error;
use vellum_query::QueryError;

/// A full fetch that did not produce a result.
///
/// Failures are values: the controller caches them as its current result and
/// retries on the next `result()` call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    /// The controller has no store to fetch from.
    #[error("Controller is not bound to a store")]
    Unbound,

    /// The store could not translate the query predicate.
    #[error("Predicate translation failed: {0}")]
    Translation(#[from] QueryError),

    /// The store backend reported an error.
    #[error("Store fetch failed: {message}")]
    Backend { message: String },

    /// The store does not hold objects of the requested type.
    #[error("Entity {entity} is not registered with the store")]
    TypeNotRegistered { entity: String },
}

impl FetchFailure {
    /// Creates a backend failure.
    pub fn backend(message: impl Into<String>) -> Self {
        FetchFailure::Backend {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_failure_display() {
        assert!(FetchFailure::backend("disk gone").to_string().contains("disk gone"));

        let err: FetchFailure = QueryError::EmptySort.into();
        assert_eq!(err, FetchFailure::Translation(QueryError::EmptySort));
        assert!(err.to_string().starts_with("Predicate translation failed"));
    }
}
