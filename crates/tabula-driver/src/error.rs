use thiserror::Error;

use crate::id::DriverId;

/// Errors raised while resolving drivers or invoking their test extensions.
#[derive(Debug, Error)]
pub enum DriverError {
    /// No test extensions could be found after module load, parent delegation and reload.
    #[error("no test extensions found for driver '{0}'")]
    NoTestExtensions(DriverId),
    /// The registry has no extension module for the driver.
    #[error("no extension module registered for driver '{0}'")]
    ExtensionNotFound(DriverId),
    /// The driver was never declared in the registry.
    #[error("unknown driver '{0}'")]
    UnknownDriver(DriverId),
    #[error("driver '{0}' is already declared")]
    DuplicateDriver(DriverId),
    /// An expected environment credential is not set.
    #[error("missing test credential '{key}' for driver '{driver}': set {var}")]
    MissingCredential {
        driver: DriverId,
        key: String,
        var: String,
    },
    /// The one-time setup hook of a driver failed.
    #[error("setup failed for driver '{driver}': {reason}")]
    Setup { driver: DriverId, reason: String },
    /// The backend rejected an operation.
    #[error("driver '{driver}' failed: {reason}")]
    Backend { driver: DriverId, reason: String },
    /// The requested behavior is not available.
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("invalid settings: {0}")]
    Settings(String),
    #[error(transparent)]
    Dataset(#[from] tabula_core::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("toml decode error: {0}")]
    TomlDecode(#[from] toml::de::Error),
}

/// Result type for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;
