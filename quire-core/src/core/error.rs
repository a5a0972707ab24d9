use thiserror::Error;

/// Errors raised by the pagination engine.
///
/// These are real contract errors and propagate to the endpoint layer:
/// a bad cursor or an unknown sort field means the request (or the caller's
/// query construction) is wrong, not the engine.
#[derive(Debug, Error)]
pub enum PaginationError {
    /// Malformed or foreign cursor string. Surfaced to clients as
    /// "invalid pagination token, restart from page one".
    #[error("Invalid pagination cursor: {0}")]
    InvalidCursor(String),

    /// Sort spec references a field the target entity does not expose.
    #[error("Unknown sort field: {0}")]
    InvalidSortField(String),

    /// A sort spec must carry at least one field.
    #[error("Sort spec must contain at least one field")]
    EmptySort,

    /// Failure in the underlying query source (database, index, ...).
    #[error("Query source error: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl PaginationError {
    /// Wrap an arbitrary query-source failure.
    pub fn source<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Source(Box::new(err))
    }
}

/// Errors raised by cache backends.
///
/// These never cross the `CacheManager` public surface: every manager
/// operation absorbs them into a neutral return value plus a logged warning.
/// The cache is an optimization, not a correctness dependency.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache transport error: {0}")]
    Transport(String),

    #[error("Cache serialization error: {0}")]
    Serialization(String),

    #[error("No cache backend named '{0}'")]
    UnknownBackend(String),

    #[error("Value is not a valid integer")]
    NotAnInteger,
}

/// Result type alias for pagination operations
pub type PageResult<T> = std::result::Result<T, PaginationError>;

/// Result type alias for cache backend operations
pub type CacheResult<T> = std::result::Result<T, CacheError>;
