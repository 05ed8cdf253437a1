//! Error types for kiln.
//!
//! All errors use `thiserror` for ergonomic error handling and proper error chains.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for kiln operations.
pub type Result<T> = std::result::Result<T, KilnError>;

/// Main error type for kiln.
#[derive(Error, Debug)]
pub enum KilnError {
    // Validation errors
    #[error(
        "invalid name {name}, name needs to start with a letter and may not contain symbols, except ._-"
    )]
    InvalidName { name: String },

    #[error("invalid platform {spec}: {reason}")]
    InvalidPlatform { spec: String, reason: String },

    #[error("invalid duplicate endpoint {endpoint}")]
    DuplicateEndpoint { endpoint: String },

    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    // Node group errors
    #[error("node {node} not found for {group}, did you mean to append?")]
    NodeNotFound { node: String, group: String },

    #[error("can not leave last node {node} of {group}, do you want to rm instance instead?")]
    CannotRemoveLastNode { node: String, group: String },

    #[error("no builder {name} found")]
    NotFound { name: String },

    // Driver errors
    #[error("driver not running: {reason}")]
    NotRunning { reason: String },

    #[error("driver not connecting: {reason}")]
    NotConnecting { reason: String },

    #[error("failed to bootstrap {driver} driver in {attempts} attempts")]
    BootstrapExhausted { driver: String, attempts: u32 },

    #[error("failed to bootstrap {driver} driver: {reason}")]
    BootstrapFailed { driver: String, reason: String },

    #[error("failed to stop {driver} driver: {reason}")]
    StopFailed { driver: String, reason: String },

    #[error("failed to find driver {name}")]
    DriverNotFound { name: String },

    #[error("invalid {driver} driver configuration: {reason}")]
    InvalidDriverConfig { driver: String, reason: String },

    // Storage errors
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt store entry at {path:?}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    // Configuration errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl KilnError {
    /// Create an Internal error from any error type.
    pub fn internal(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Internal(err.to_string())
    }

    /// Wrap an I/O error with the path it happened at.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// True for a node group lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True when a driver reported its backend as not (yet) reachable.
    pub fn is_not_running(&self) -> bool {
        matches!(self, Self::NotRunning { .. })
    }
}
