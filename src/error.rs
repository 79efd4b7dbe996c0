//! Error types for schemaload.

use thiserror::Error;

/// The main error type for loading operations.
///
/// Unit-level variants (`Parse`, `MissingExtension`, `Execution`, `Template`)
/// are recorded on ledger entries and never abort a run. The remaining
/// variants surface from configuration, connection setup and file listing.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// A file could not be decomposed into statements.
    #[error("Parse error at line {line}, column {column}: {message}")]
    Parse {
        line: usize,
        column: usize,
        message: String,
    },

    /// A required PostgreSQL extension is not installed in the target.
    #[error("Missing extension: {0}")]
    MissingExtension(String),

    /// The target rejected a statement.
    #[error("{message}")]
    Execution {
        message: String,
        detail: Option<String>,
    },

    /// A template marker was opened but never closed.
    #[error("Unterminated template marker '{open}' at line {line}, column {column}")]
    Template {
        open: String,
        line: usize,
        column: usize,
    },

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML deserialization error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LoaderError {
    /// Create a parse error at the given position.
    pub fn parse(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            column,
            message: message.into(),
        }
    }

    /// Create an execution error without detail.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            detail: None,
        }
    }

    /// Message recorded on a ledger entry, including the target's detail line.
    pub fn ledger_message(&self) -> String {
        match self {
            Self::Execution {
                message,
                detail: Some(detail),
            } => format!("{}\nDETAIL: {}", message, detail),
            other => other.to_string(),
        }
    }
}

/// Result type alias for loading operations.
pub type LoadResult<T> = Result<T, LoaderError>;
