use std::backtrace::Backtrace;
use std::panic::Location;

use thiserror::Error;

/// Error type for database layer operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A placeholder referenced an unknown token, was missing a binding, or
    /// was handed a value of the wrong type.
    #[error("Invalid placeholder {token}: {reason}")]
    Placeholder { token: String, reason: String },

    /// A query or insert call was assembled incorrectly by the caller.
    #[error("Malformed statement: {0}")]
    Malformed(String),

    /// Error reported by the database backend.
    #[error("Database error: {0}")]
    Database(String),

    /// Commit or rollback without an active transaction, or begin while one
    /// is already active.
    #[error("Transaction state error: {0}")]
    TransactionState(String),

    /// The backend cannot provide the requested semantics.
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Could not decode column {column}: {reason}")]
    ColumnDecode { column: String, reason: String },

    #[error("Expected {expected} row(s), got {actual}")]
    UnexpectedRowCount { expected: usize, actual: usize },
}

/// Result type alias for database layer operations.
pub type Result<T> = std::result::Result<T, DbError>;

/// How a recorded fault is surfaced in the log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Worth noting, the caller may carry on.
    Warning,
    /// Fatal to the current request path.
    Critical,
}

/// Record diagnostic context for an error before it is propagated.
///
/// Logs the message together with the caller's file and line and a captured
/// call-stack backtrace, then hands the error back unchanged so the call site
/// can `return Err(error_backtrace(..))`. Side effects only, no state change.
#[track_caller]
pub fn error_backtrace(error: DbError, log_message: &str, severity: Severity) -> DbError {
    let caller = Location::caller();
    let backtrace = Backtrace::force_capture();
    let detail = if log_message.is_empty() {
        error.to_string()
    } else {
        log_message.to_string()
    };

    match severity {
        Severity::Critical => tracing::error!(
            error = %error,
            file = caller.file(),
            line = caller.line(),
            backtrace = %backtrace,
            "{detail}"
        ),
        Severity::Warning => tracing::warn!(
            error = %error,
            file = caller.file(),
            line = caller.line(),
            backtrace = %backtrace,
            "{detail}"
        ),
    }

    error
}
