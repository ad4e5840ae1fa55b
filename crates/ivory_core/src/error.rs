//! Error types for the Ivory administration service.
//!
//! Every layer wraps the error beneath it with call-site context rather than
//! discarding it, so the message that reaches an HTTP client reads like
//! `"service: create backup: pg_dump failed: ..."`.

use std::process::ExitStatus;

use thiserror::Error;

/// Main error type for Ivory.
#[derive(Debug, Error)]
pub enum IvoryError {
    /// Database connection failed or was lost.
    #[error("connection error: {message}")]
    Connection {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Query execution error with PostgreSQL-specific details.
    #[error("postgres: {message}")]
    Query {
        /// PostgreSQL error message.
        message: String,
        /// Additional detail from PostgreSQL.
        detail: Option<String>,
        /// PostgreSQL hint.
        hint: Option<String>,
        /// Position in query (1-indexed).
        position: Option<usize>,
        /// PostgreSQL error code (e.g., "42P01").
        code: Option<String>,
    },

    /// Caller supplied an invalid or incomplete request.
    #[error("{message}")]
    Validation {
        /// Human-readable error message.
        message: String,
    },

    /// Backup file or directory could not be accessed.
    #[error("{message}: {source}")]
    Filesystem {
        /// What was being attempted.
        message: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// External dump/restore tool exited unsuccessfully.
    #[error("{tool} failed: {status}, output: {output}")]
    Process {
        /// Tool name (e.g. `pg_dump`).
        tool: String,
        /// Exit status description.
        status: String,
        /// Captured stdout followed by stderr.
        output: String,
    },

    /// Configuration error.
    #[error("config error: {message}")]
    Config {
        /// Human-readable error message.
        message: String,
    },

    /// Unexpected internal error.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
    },

    /// An error annotated with the operation that produced it.
    #[error("{context}: {source}")]
    Context {
        /// Call-site description.
        context: String,
        /// The wrapped error.
        #[source]
        source: Box<IvoryError>,
    },
}

impl IvoryError {
    // ========== Constructors ==========

    /// Create a new connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Create a new connection error with source.
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create a query error carrying only a message.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query { message: message.into(), detail: None, hint: None, position: None, code: None }
    }

    /// Create a new validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Create a new filesystem error.
    pub fn filesystem(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Filesystem { message: message.into(), source }
    }

    /// Create an error for a tool that exited unsuccessfully.
    pub fn process(tool: impl Into<String>, status: ExitStatus, output: impl Into<String>) -> Self {
        Self::Process { tool: tool.into(), status: status.to_string(), output: output.into() }
    }

    /// Create a new config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Wrap this error with call-site context.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context { context: context.into(), source: Box::new(self) }
    }

    // ========== Methods ==========

    /// The innermost error, with all context layers peeled off.
    pub fn root(&self) -> &IvoryError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if the error was caused by the caller rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self.root(), Self::Validation { .. })
    }

    /// Check if a backup file or directory was missing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.root(),
            Self::Filesystem { source, .. } if source.kind() == std::io::ErrorKind::NotFound
        )
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self.root() {
            Self::Connection { .. } => "Connection",
            Self::Query { .. } => "Query",
            Self::Validation { .. } => "Validation",
            Self::Filesystem { .. } => "Filesystem",
            Self::Process { .. } => "Process",
            Self::Config { .. } => "Config",
            Self::Internal { .. } => "Internal",
            Self::Context { .. } => "Context",
        }
    }

    /// Get PostgreSQL error code (if applicable).
    pub fn pg_code(&self) -> Option<&str> {
        match self.root() {
            Self::Query { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Extension for annotating `Result`s with call-site context.
pub trait ResultExt<T> {
    /// Wrap the error, if any, with `context`.
    fn context(self, context: &str) -> Result<T, IvoryError>;
}

impl<T, E: Into<IvoryError>> ResultExt<T> for Result<T, E> {
    fn context(self, context: &str) -> Result<T, IvoryError> {
        self.map_err(|e| e.into().context(context))
    }
}

// ========== Error Conversions ==========

/// Convert from tokio_postgres::Error to IvoryError.
impl From<tokio_postgres::Error> for IvoryError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let message = db_err.message().to_string();
            let code_str = db_err.code().code();

            // Connection exceptions (08xxx)
            if code_str.starts_with("08") {
                return IvoryError::Connection { message, source: Some(Box::new(err)) };
            }

            let position = db_err.position().and_then(|p| match p {
                tokio_postgres::error::ErrorPosition::Original(pos) => Some(*pos as usize),
                tokio_postgres::error::ErrorPosition::Internal { .. } => None,
            });

            return IvoryError::Query {
                message,
                detail: db_err.detail().map(String::from),
                hint: db_err.hint().map(String::from),
                position,
                code: Some(code_str.to_string()),
            };
        }

        if err.is_closed() {
            return IvoryError::Connection {
                message: "connection closed".to_string(),
                source: Some(Box::new(err)),
            };
        }

        IvoryError::Connection { message: err.to_string(), source: Some(Box::new(err)) }
    }
}

/// Convert from deadpool pool errors to IvoryError.
impl From<deadpool_postgres::PoolError> for IvoryError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        match err {
            deadpool_postgres::PoolError::Backend(pg) => pg.into(),
            other => IvoryError::connection(format!("failed to acquire connection: {other}")),
        }
    }
}

/// Convert from std::io::Error to IvoryError.
impl From<std::io::Error> for IvoryError {
    fn from(err: std::io::Error) -> Self {
        IvoryError::Filesystem { message: "filesystem error".to_string(), source: err }
    }
}

/// Convert from serde_json::Error to IvoryError.
impl From<serde_json::Error> for IvoryError {
    fn from(err: serde_json::Error) -> Self {
        IvoryError::internal(format!("json marshal: {err}"))
    }
}

/// Convert from config::ConfigError to IvoryError.
impl From<config::ConfigError> for IvoryError {
    fn from(err: config::ConfigError) -> Self {
        IvoryError::config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_layers_prefix_message() {
        let err = IvoryError::validation("filename is required")
            .context("restore backup")
            .context("service");

        assert_eq!(err.to_string(), "service: restore backup: filename is required");
        assert_eq!(err.category(), "Validation");
        assert!(err.is_client_error());
    }

    #[test]
    fn test_not_found_detection_through_context() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = IvoryError::filesystem("failed to delete backup file", io).context("service");

        assert!(err.is_not_found());
        assert!(!err.is_client_error());
        assert_eq!(err.category(), "Filesystem");
    }

    #[test]
    fn test_result_ext_wraps_io_errors() {
        let result: Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"));

        let err = result.context("list backups").unwrap_err();
        assert!(err.to_string().starts_with("list backups: "));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_query_error_has_no_code_by_default() {
        let err = IvoryError::query("syntax error");
        assert_eq!(err.pg_code(), None);
        assert_eq!(err.to_string(), "postgres: syntax error");
    }
}
