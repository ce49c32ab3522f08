//! Error Handling Infrastructure
//!
//! This module defines all error types used throughout Schemalens.
//! Every failure is scoped to a single request and maps to a stable,
//! machine-readable code for JSON output.
//!
//! # Error Categories
//! - `ConnectionFailed`: the probe could not reach the target database
//! - `ExtractionFailed`: catalog extraction failed (no snapshot produced)
//! - `AiUnavailable` / `GenerationFailed`: the language-model backend is missing
//!   or returned garbage
//! - `UnsafeSql`: the safety gate rejected a generated statement
//! - `QueryFailed`: a gated statement failed against the target database
//! - `PreconditionFailed`: a question was asked before any schema was extracted
//! - `NotFound`, `InvalidInput`, `ConfigError`: plumbing failures

use thiserror::Error;

/// Main error type for Schemalens operations
#[derive(Error, Debug)]
pub enum LensError {
    /// Target database unreachable during a probe
    #[error("Could not connect: {0}")]
    ConnectionFailed(String),

    /// Schema extraction failed
    #[error("Schema extraction failed: {0}")]
    ExtractionFailed(String),

    /// No language-model backend credential configured
    #[error("AI is not enabled. Set OPENAI_API_KEY to use text-to-SQL.")]
    AiUnavailable,

    /// Backend unreachable or its response did not have the expected shape
    #[error("SQL generation failed: {0}")]
    GenerationFailed(String),

    /// Generated statement contains a disallowed keyword
    #[error("Query contains disallowed keyword: {keyword}")]
    UnsafeSql { keyword: String },

    /// Statement failed against the target database
    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    /// Operation requires state that does not exist yet
    #[error("{0}")]
    PreconditionFailed(String),

    /// Named resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input or missing required parameters
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error (file not found, invalid JSON, missing env var, etc.)
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl LensError {
    /// Convert error to error code string for JSON output
    ///
    /// Error codes are stable and suitable for programmatic handling.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ConnectionFailed(_) => "CONNECTION_FAILED",
            Self::ExtractionFailed(_) => "EXTRACTION_FAILED",
            Self::AiUnavailable | Self::GenerationFailed(_) => "AI_ERROR",
            Self::UnsafeSql { .. } => "UNSAFE_SQL",
            Self::QueryFailed(_) => "QUERY_ERROR",
            Self::PreconditionFailed(_) => "PRECONDITION_FAILED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidInput(_) => "VALIDATION_ERROR",
            Self::ConfigError(_) => "CONFIG_ERROR",
        }
    }

    /// Get human-readable error message
    ///
    /// Messages never contain credentials.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a connection failed error
    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed(message.into())
    }

    /// Create an extraction failed error
    pub fn extraction_failed(message: impl Into<String>) -> Self {
        Self::ExtractionFailed(message.into())
    }

    /// Create a generation failed error
    pub fn generation_failed(message: impl Into<String>) -> Self {
        Self::GenerationFailed(message.into())
    }

    /// Create an unsafe SQL error naming the offending keyword
    pub fn unsafe_sql(keyword: impl Into<String>) -> Self {
        Self::UnsafeSql {
            keyword: keyword.into(),
        }
    }

    /// Create a query failed error
    pub fn query_failed(message: impl Into<String>) -> Self {
        Self::QueryFailed(message.into())
    }

    /// Create a precondition failed error
    pub fn precondition_failed(message: impl Into<String>) -> Self {
        Self::PreconditionFailed(message.into())
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }
}

/// Result type alias for Schemalens operations
pub type Result<T> = std::result::Result<T, LensError>;
