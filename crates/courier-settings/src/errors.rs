//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Why settings could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        /// Settings file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The settings file is not valid JSON.
    #[error("{} is not valid JSON: {source}", .path.display())]
    Parse {
        /// Settings file.
        path: PathBuf,
        /// Parser failure, with line and column.
        #[source]
        source: serde_json::Error,
    },
    /// The merged document does not fit [`CourierSettings`](crate::CourierSettings),
    /// e.g. a string where a port is expected.
    #[error("settings have the wrong shape: {0}")]
    Schema(#[from] serde_json::Error),
    /// A value the relay cannot run with.
    #[error("invalid {key}: {reason}")]
    InvalidValue {
        /// camelCase path of the offending key, e.g. `session.sendTimeoutMs`.
        key: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
