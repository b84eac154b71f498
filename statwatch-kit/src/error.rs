//! Error types for the kit.
//!
//! Lifecycle operations on readers and modules never return these; they log
//! and change state instead. Errors only surface from construction,
//! configuration loading and persistence.

use thiserror::Error;

/// Errors raised while building readers/modules or loading settings.
#[derive(Debug, Error)]
pub enum KitError {
    /// A reader or module was built outside a tokio runtime and no handle was given.
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    /// Settings could not be read or deserialized.
    #[error("invalid settings: {0}")]
    Settings(#[from] config::ConfigError),

    /// The persistent store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors from the persistent key-value store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The backing document is not valid JSON.
    #[error("store document is malformed: {0}")]
    Format(#[from] serde_json::Error),
}

/// Errors from delivering a user-facing notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The platform refused to show notifications.
    #[error("notifications not permitted: {0}")]
    Denied(String),

    /// The notification could not be delivered.
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Result alias for kit operations.
pub type Result<T, E = KitError> = std::result::Result<T, E>;
