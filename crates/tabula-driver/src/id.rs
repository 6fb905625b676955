use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical driver identifier (e.g. `memory`, `csv`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(String);

impl DriverId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DriverId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DriverId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for DriverId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
