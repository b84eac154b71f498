//! Error types for sources.

use thiserror::Error;

/// Errors raised while setting up a metric source or its module.
#[derive(Debug, Error)]
pub enum SourceError {
    /// No mounted volume matches the requested mount point.
    #[error("no disk mounted at {0}")]
    DiskNotFound(String),

    /// No network interface has the requested name.
    #[error("unknown network interface: {0}")]
    UnknownInterface(String),

    /// Building the reader or module failed.
    #[error(transparent)]
    Kit(#[from] statwatch_kit::KitError),
}

/// Result alias for source setup.
pub type Result<T, E = SourceError> = std::result::Result<T, E>;
