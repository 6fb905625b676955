//! Built-in drivers: in-process storage and CSV files.

pub mod csv;
pub mod flat_csv;
pub mod memory;

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::FixtureSettings;
use crate::credentials::lookup_test_credential;
use crate::error::Result;
use crate::id::DriverId;
use crate::registry::DriverRegistry;

pub use self::csv::{CsvExtensions, write_table_csv};
pub use self::flat_csv::FlatCsvExtensions;
pub use self::memory::{
    MaterializedDatabase, MaterializedField, MaterializedTable, MemoryExtensions, MemoryStore,
};

pub const MEMORY: &str = "memory";
/// Structural parent of the file based drivers.
pub const FILE: &str = "file";
pub const CSV: &str = "csv";
pub const FLAT_CSV: &str = "flat-csv";

/// Declare the built-in drivers and register their extension modules.
///
/// `flat-csv` writes below `<csv_root>/flat` so it never shares a directory
/// with `csv`. `MB_CSV_TEST_ROOT` overrides `csv_root`.
pub fn register_builtin(
    registry: &DriverRegistry,
    settings: &FixtureSettings,
    store: MemoryStore,
) -> Result<()> {
    registry.declare(MEMORY, Vec::<DriverId>::new())?;
    registry.declare_abstract(FILE, Vec::<DriverId>::new())?;
    registry.declare(CSV, [FILE])?;
    registry.declare(FLAT_CSV, [CSV])?;

    registry.register_module(MEMORY, move |registry| {
        registry.register_extensions(MEMORY, Arc::new(MemoryExtensions::new(MEMORY, store.clone())));
        Ok(())
    });

    let default_root = settings.csv_root.display().to_string();
    let csv_root = move || -> Result<PathBuf> {
        lookup_test_credential(&DriverId::from(CSV), "root", Some(default_root.as_str())).map(PathBuf::from)
    };

    let root = csv_root.clone();
    registry.register_module(CSV, move |registry| {
        registry.register_extensions(CSV, Arc::new(CsvExtensions::new(CSV, root()?)));
        Ok(())
    });

    registry.register_module(FLAT_CSV, move |registry| {
        let csv = Arc::new(CsvExtensions::new(FLAT_CSV, csv_root()?.join("flat")));
        registry.register_extensions(FLAT_CSV, Arc::new(FlatCsvExtensions::new(FLAT_CSV, csv)));
        Ok(())
    });

    Ok(())
}

/// Registry with the built-in drivers and a fresh [`MemoryStore`].
pub fn builtin_registry(settings: &FixtureSettings) -> Result<(DriverRegistry, MemoryStore)> {
    let registry = DriverRegistry::new();
    let store = MemoryStore::new();
    register_builtin(&registry, settings, store.clone())?;
    Ok((registry, store))
}
