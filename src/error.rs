//! Error types for pgfunc
//!
//! This module defines the error hierarchy used throughout the crate.
//! We use `thiserror` for library-style errors with clear error chains.

use std::io;
use std::path::PathBuf;

/// Main error type for the pgfunc crate
#[derive(Debug, thiserror::Error)]
pub enum PgfuncError {
    /// Connection profile errors
    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Connection profile store errors
///
/// `DuplicateName`, `NotFound` and `NoDefaultDefined` are structural and are
/// always returned to the immediate caller.
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    /// A profile with this name already exists
    #[error("Connection '{0}' already exists")]
    DuplicateName(String),

    /// No profile with this name exists
    #[error("Connection '{0}' not found")]
    NotFound(String),

    /// No profile is marked as default
    #[error("No default connection defined")]
    NoDefaultDefined,

    /// The backing store could not be read or written
    #[error("Profile storage failed at {path}: {message}")]
    Storage { path: PathBuf, message: String },
}

/// Database operation errors
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// Failed to establish connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    /// Operation timed out
    #[error("Operation timed out after {0}s")]
    Timeout(u64),

    /// The server cancelled the statement at our request
    #[error("Query cancelled")]
    Cancelled,
}

/// Configuration loading/parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Home directory not found
    #[error("Could not determine home directory")]
    NoHomeDir,

    /// Failed to parse TOML
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Service name missing from the service file
    #[error("Service '{0}' not found in service file")]
    ServiceNotFound(String),

    /// Failed to read a configuration file
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DbError {
    /// Classify a driver error, recognising server-side statement cancellation.
    pub fn from_query(err: &tokio_postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db) if db.code() == &tokio_postgres::error::SqlState::QUERY_CANCELED => {
                DbError::Cancelled
            }
            Some(db) => DbError::QueryFailed(db.message().to_string()),
            None => DbError::QueryFailed(err.to_string()),
        }
    }
}

/// Specialized Result type for pgfunc operations
pub type Result<T> = std::result::Result<T, PgfuncError>;

/// Specialized Result type for profile store operations
pub type ProfileResult<T> = std::result::Result<T, ProfileError>;

/// Specialized Result type for database operations
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Specialized Result type for config operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
