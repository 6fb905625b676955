use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DriverError, Result};
use crate::id::DriverId;

/// Environment variable overriding [`FixtureSettings::drivers`] (comma separated).
pub const DRIVERS_ENV: &str = "DRIVERS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

/// Settings of a fixture run, read from `tabula.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureSettings {
    /// Drivers under test.
    pub drivers: Vec<DriverId>,
    pub dataset_dir: PathBuf,
    pub csv_root: PathBuf,
    pub log: LogSettings,
}

impl Default for FixtureSettings {
    fn default() -> Self {
        Self {
            drivers: vec![DriverId::from("memory")],
            dataset_dir: PathBuf::from("datasets"),
            csv_root: PathBuf::from("target/tabula-csv"),
            log: LogSettings::default(),
        }
    }
}

impl FixtureSettings {
    /// Replace the active drivers with a comma separated list, ignoring blanks.
    pub fn with_driver_list(mut self, list: &str) -> Result<Self> {
        let drivers: Vec<DriverId> = list
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(DriverId::from)
            .collect();
        if drivers.is_empty() {
            return Err(DriverError::Settings(format!(
                "{DRIVERS_ENV} must name at least one driver"
            )));
        }
        self.drivers = drivers;
        Ok(self)
    }
}

/// Load settings from `path`, falling back to defaults when the file is absent.
pub fn load_settings(path: &Path) -> Result<FixtureSettings> {
    let settings = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)?
    } else {
        FixtureSettings::default()
    };

    match std::env::var(DRIVERS_ENV) {
        Ok(list) => settings.with_driver_list(&list),
        Err(_) => Ok(settings),
    }
}
