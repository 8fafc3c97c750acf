//! Query error types
//!
//! Every failure raised while planning, executing or mapping a query is a
//! [`QueryError`]: the operation that failed, a [`QueryErrorKind`] and a
//! human-readable message.
//!
//! # Example
//!
//! ```rust
//! use acton_query::query::{QueryError, QueryErrorKind, QueryOperation};
//!
//! let error = QueryError::ambiguous_result(QueryOperation::FetchOne, "2 rows matched");
//! assert!(matches!(error.kind, QueryErrorKind::AmbiguousResult));
//! assert!(!error.is_collaborator());
//! ```

use std::fmt;

/// Result type for query operations
pub type QueryResult<T> = std::result::Result<T, QueryError>;

/// Operation being performed when the query error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryOperation {
    /// Turning a request into a query plan
    Plan,
    /// Fetching at most one row
    FetchOne,
    /// Fetching the first row of an ordered result
    FetchFirst,
    /// Fetching all matching rows
    FetchList,
    /// Fetching a window of rows plus the total count
    FetchPage,
    /// Counting matching rows
    Count,
    /// Converting rows into output objects
    Map,
    /// Inserting a record through the collaborator
    Insert,
    /// Bulk update through the collaborator
    BulkUpdate,
    /// Bulk delete through the collaborator
    BulkDelete,
}

impl fmt::Display for QueryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plan => write!(f, "plan"),
            Self::FetchOne => write!(f, "fetch_one"),
            Self::FetchFirst => write!(f, "fetch_first"),
            Self::FetchList => write!(f, "fetch_list"),
            Self::FetchPage => write!(f, "fetch_page"),
            Self::Count => write!(f, "count"),
            Self::Map => write!(f, "map"),
            Self::Insert => write!(f, "insert"),
            Self::BulkUpdate => write!(f, "bulk_update"),
            Self::BulkDelete => write!(f, "bulk_delete"),
        }
    }
}

/// Category of query error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryErrorKind {
    /// The request was malformed and rejected before reaching storage
    ValidationFailed,
    /// A single-result fetch matched more than one row
    AmbiguousResult,
    /// An output shape could not be bound to, or filled from, a row
    MappingFailed,
    /// The storage collaborator could not be reached
    ConnectionFailed,
    /// The storage collaborator timed out
    Timeout,
    /// The storage collaborator rejected a write (unique, foreign key, check)
    ConstraintViolation,
    /// Any other storage collaborator failure
    DatabaseError,
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed => write!(f, "validation_failed"),
            Self::AmbiguousResult => write!(f, "ambiguous_result"),
            Self::MappingFailed => write!(f, "mapping_failed"),
            Self::ConnectionFailed => write!(f, "connection_failed"),
            Self::Timeout => write!(f, "timeout"),
            Self::ConstraintViolation => write!(f, "constraint_violation"),
            Self::DatabaseError => write!(f, "database_error"),
        }
    }
}

/// Structured query error with operation context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    /// The operation being performed when the error occurred
    pub operation: QueryOperation,
    /// The category of error
    pub kind: QueryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The entity type the query was rooted at, when known
    pub entity_type: Option<String>,
}

impl QueryError {
    /// Create a new query error
    pub fn new(
        operation: QueryOperation,
        kind: QueryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
        }
    }

    /// Create a validation error raised while planning
    ///
    /// # Example
    ///
    /// ```rust
    /// use acton_query::query::{QueryError, QueryOperation};
    ///
    /// let error = QueryError::validation_failed("offset must be non-negative, got -1");
    /// assert_eq!(error.operation, QueryOperation::Plan);
    /// ```
    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(
            QueryOperation::Plan,
            QueryErrorKind::ValidationFailed,
            message,
        )
    }

    /// Create an ambiguous single-result error
    pub fn ambiguous_result(operation: QueryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, QueryErrorKind::AmbiguousResult, message)
    }

    /// Create a mapping error
    pub fn mapping_failed(message: impl Into<String>) -> Self {
        Self::new(QueryOperation::Map, QueryErrorKind::MappingFailed, message)
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::new(
            QueryOperation::FetchList,
            QueryErrorKind::ConnectionFailed,
            message,
        )
    }

    /// Create a timeout error
    pub fn timeout(operation: QueryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, QueryErrorKind::Timeout, message)
    }

    /// Create a constraint violation error
    pub fn constraint_violation(operation: QueryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, QueryErrorKind::ConstraintViolation, message)
    }

    /// Create a generic storage error
    pub fn database_error(operation: QueryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, QueryErrorKind::DatabaseError, message)
    }

    /// Attach the entity type the failing query was rooted at
    #[must_use]
    pub fn with_entity(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    /// Set the operation that caused the error
    ///
    /// # Example
    ///
    /// ```rust
    /// use acton_query::query::{QueryError, QueryOperation};
    ///
    /// let error = QueryError::connection_failed("Connection refused")
    ///     .with_operation(QueryOperation::Count);
    /// assert_eq!(error.operation, QueryOperation::Count);
    /// ```
    #[must_use]
    pub fn with_operation(mut self, operation: QueryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Whether the error came from the storage collaborator rather than this crate
    pub fn is_collaborator(&self) -> bool {
        matches!(
            self.kind,
            QueryErrorKind::ConnectionFailed
                | QueryErrorKind::Timeout
                | QueryErrorKind::ConstraintViolation
                | QueryErrorKind::DatabaseError
        )
    }

    /// Check if this error is transient. Nothing in this crate retries; the
    /// classification is for callers that do.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.kind,
            QueryErrorKind::ConnectionFailed | QueryErrorKind::Timeout
        )
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Query {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let Some(ref entity_type) = self.entity_type {
            write!(f, " [{}]", entity_type)?;
        }
        Ok(())
    }
}

impl std::error::Error for QueryError {}

#[cfg(feature = "database")]
impl From<sqlx::Error> for QueryError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error as E;
        match err {
            E::PoolTimedOut => Self::timeout(QueryOperation::FetchList, "Connection pool timed out"),
            E::PoolClosed => Self::connection_failed("Connection pool is closed"),
            E::Io(e) => Self::connection_failed(format!("I/O error: {}", e)),
            E::Tls(e) => Self::connection_failed(format!("TLS error: {}", e)),
            E::ColumnDecode { index, source } => {
                Self::mapping_failed(format!("Failed to decode column {}: {}", index, source))
            }
            E::Database(db_err) => {
                let message = db_err.message().to_string();
                if db_err.is_unique_violation()
                    || db_err.is_foreign_key_violation()
                    || db_err.is_check_violation()
                {
                    Self::constraint_violation(QueryOperation::Insert, message)
                } else {
                    Self::database_error(QueryOperation::FetchList, message)
                }
            }
            other => Self::database_error(QueryOperation::FetchList, other.to_string()),
        }
    }
}
