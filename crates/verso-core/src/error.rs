//! Error types for verso operations.
//!
//! Errors carry a structured [`ErrorCode`] so callers can tell wiring
//! mistakes (a context without the right version collection) apart from
//! storage failures reported by the durable store.

use thiserror::Error;

/// Result type alias for verso operations.
pub type VersoResult<T> = Result<T, VersoError>;

/// Main error type for all verso operations.
#[derive(Error, Debug)]
pub enum VersoError {
    /// The supplied storage context is not wired for the tracked type.
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        code: ErrorCode,
        /// Capability the context was expected to expose.
        capability: Option<String>,
    },

    /// Database operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Parse error.
    #[error("Parse error: {message}")]
    Parse { message: String, code: ErrorCode },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error codes for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Configuration (CFG_xxx)
    CfgMissingCollection,
    CfgInvalidFile,
    CfgInvalidValue,

    // Database (DB_xxx)
    DbConnectionFailed,
    DbOperationFailed,

    // Parse (PARSE_xxx)
    ParseInvalidJson,
    ParseInvalidTimestamp,

    // Internal
    Internal,
}

impl ErrorCode {
    /// Get the string representation of the error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::CfgMissingCollection => "CFG_001",
            ErrorCode::CfgInvalidFile => "CFG_002",
            ErrorCode::CfgInvalidValue => "CFG_003",
            ErrorCode::DbConnectionFailed => "DB_001",
            ErrorCode::DbOperationFailed => "DB_002",
            ErrorCode::ParseInvalidJson => "PARSE_001",
            ErrorCode::ParseInvalidTimestamp => "PARSE_002",
            ErrorCode::Internal => "INT_001",
        }
    }
}

impl VersoError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            code: ErrorCode::CfgInvalidValue,
            capability: None,
        }
    }

    /// Create an error for a context that does not expose the required
    /// version collection.
    pub fn missing_collection(context: &str, capability: impl Into<String>) -> Self {
        let capability = capability.into();
        Self::Configuration {
            message: format!("{} must expose a {}", context, capability),
            code: ErrorCode::CfgMissingCollection,
            capability: Some(capability),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            code: ErrorCode::DbOperationFailed,
            source: None,
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            code: ErrorCode::ParseInvalidJson,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Configuration { code, .. } => *code,
            Self::Database { code, .. } => *code,
            Self::Parse { code, .. } => *code,
            Self::Serialization(_) => ErrorCode::ParseInvalidJson,
            _ => ErrorCode::Internal,
        }
    }

    /// Capability named by a configuration error, if any.
    pub fn capability(&self) -> Option<&str> {
        match self {
            Self::Configuration { capability, .. } => capability.as_deref(),
            _ => None,
        }
    }

    /// Whether this error is a wiring mistake rather than a runtime failure.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Get a user-friendly suggestion for resolving this error.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Configuration {
                code: ErrorCode::CfgMissingCollection,
                ..
            } => Some("Register a version collection for this context type at startup"),
            Self::Configuration { .. } => Some("Please check your verso configuration"),
            Self::Database { .. } => Some("Please check your version store connection settings"),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for VersoError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database {
            message: err.to_string(),
            code: ErrorCode::DbOperationFailed,
            source: Some(Box::new(err)),
        }
    }
}
