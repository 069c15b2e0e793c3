//! Error types for the Athena datasource.
//!
//! Defines the main error enum used throughout the crate.

use thiserror::Error;

use crate::athena::QueryState;

/// Main error type for datasource operations.
#[derive(Error, Debug)]
pub enum DatasourceError {
    /// The query is missing fields required by its mode.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The named query does not exist in the work group.
    #[error("Named query not found: {0}")]
    NotFound(String),

    /// The work group has no result output location configured.
    #[error("Please configure an output location for work group {0}")]
    MissingOutputLocation(String),

    /// The execution reached a state other than SUCCEEDED.
    #[error("Execution {handle} failed with state {state}")]
    ExecutionFailed { handle: String, state: QueryState },

    /// The execution did not succeed within the polling budget.
    #[error("Execution {handle} timed out after {elapsed_ms} ms (last state {state})")]
    TimedOut {
        handle: String,
        state: QueryState,
        elapsed_ms: u128,
    },

    /// The request was cancelled by the caller.
    #[error("Query cancelled")]
    Cancelled,

    /// Transport or service errors from the remote API.
    #[error("Remote call failed: {0}")]
    RemoteCall(String),

    /// The requested output format is neither timeseries nor table.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Credential resolution errors (missing keys, role assumption failures, etc.)
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// Configuration errors (invalid config file, malformed request settings, etc.)
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DatasourceError {
    /// Creates an invalid query error with the given message.
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    /// Creates a not found error with the given message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Creates a remote call error with the given message.
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::RemoteCall(msg.into())
    }

    /// Creates a credentials error with the given message.
    pub fn credentials(msg: impl Into<String>) -> Self {
        Self::Credentials(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidQuery(_) => "Invalid Query",
            Self::NotFound(_) => "Not Found",
            Self::MissingOutputLocation(_) => "Missing Output Location",
            Self::ExecutionFailed { .. } => "Execution Failed",
            Self::TimedOut { .. } => "Timed Out",
            Self::Cancelled => "Cancelled",
            Self::RemoteCall(_) => "Remote Call Failed",
            Self::UnsupportedFormat(_) => "Unsupported Format",
            Self::Credentials(_) => "Credentials Error",
            Self::Config(_) => "Configuration Error",
        }
    }

    /// Returns true for failures that must abort the whole batch.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Credentials(_) | Self::Config(_)
        )
    }
}

impl From<reqwest::Error> for DatasourceError {
    fn from(err: reqwest::Error) -> Self {
        Self::RemoteCall(err.to_string())
    }
}

/// Result type alias using DatasourceError.
pub type Result<T> = std::result::Result<T, DatasourceError>;
