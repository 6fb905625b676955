use thiserror::Error;

/// Core error type shared across tabula crates.
#[derive(Debug, Error)]
pub enum Error {
    /// A dataset description violates the model invariants.
    #[error("invalid dataset definition at {path}: {message}")]
    SchemaValidation { path: String, message: String },
    /// The named dataset resource does not exist.
    #[error("dataset resource '{name}' not found at {location}")]
    ResourceNotFound { name: String, location: String },
    /// The named dataset resource exists but could not be turned into a definition.
    #[error("dataset resource '{name}' is malformed: {reason}")]
    MalformedResource { name: String, reason: String },
    /// A table referenced by name is not part of the database definition.
    #[error("unknown table: {0}")]
    UnknownTable(String),
    /// A foreign key names a table missing from the database definition.
    #[error("foreign key {table}.{field} references unknown table '{target}'")]
    UnknownForeignKeyTarget {
        table: String,
        field: String,
        target: String,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn validation(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaValidation {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Convenience alias for results returned by tabula crates.
pub type Result<T> = std::result::Result<T, Error>;
