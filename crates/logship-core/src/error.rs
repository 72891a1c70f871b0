//! Error types for logship.

use thiserror::Error;

/// Result type alias using logship's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for logship operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Record type cannot be constructed (no zero-value constructor, unknown name)
    #[error("Instantiation error: {0}")]
    Instantiation(String),

    /// Template could not be evaluated. Only surfaced by `try_resolve`.
    #[error("Template resolution error: {0}")]
    TemplateResolution(String),

    /// Backend connectivity or DDL failure while reconciling a table
    #[error("Schema sync error on {table}: {message}")]
    SchemaSync { table: String, message: String },

    /// No sink could be resolved for a record
    #[error("Sink unavailable: {0}")]
    SinkUnavailable(String),

    /// A resolved sink failed to deliver a record
    #[error("Send failure on sink '{sink}' for {record_type} {record_id}: {source}")]
    SendFailure {
        sink: String,
        record_id: String,
        record_type: String,
        #[source]
        source: Box<Error>,
    },

    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Message queue operation failed
    #[error("Queue error: {0}")]
    Queue(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a sink's own error with the identity of the record it failed on.
    pub fn send_failure(
        sink: impl Into<String>,
        record_id: impl Into<String>,
        record_type: impl Into<String>,
        source: Error,
    ) -> Self {
        Error::SendFailure {
            sink: sink.into(),
            record_id: record_id.into(),
            record_type: record_type.into(),
            source: Box::new(source),
        }
    }

    /// Whether retrying the same operation may succeed.
    ///
    /// Network, queue and pool-level database failures are transient;
    /// schema, instantiation and input errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Request(_) | Error::Queue(_) => true,
            Error::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            Error::SendFailure { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
