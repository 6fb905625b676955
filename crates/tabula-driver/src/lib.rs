//! Driver test extensions for tabula.
//!
//! A [`DriverRegistry`] resolves logical driver ids to their
//! [`TestExtensions`], loading extension modules lazily and running each
//! driver's setup exactly once.

pub mod catalog;
pub mod config;
pub mod credentials;
pub mod drivers;
pub mod error;
pub mod extensions;
pub mod id;
pub mod registry;

pub use catalog::{DomainCatalog, database_record, field_record, table_record};
pub use config::{DRIVERS_ENV, FixtureSettings, LogSettings, load_settings};
pub use credentials::{credential_var_name, lookup_test_credential, lookup_with};
pub use drivers::{builtin_registry, register_builtin};
pub use error::{DriverError, Result};
pub use extensions::{
    AggregationKind, ColumnInfo, ColumnSource, ConnectionContext, ConnectionDetails,
    CreateDatabaseOptions, DriverFeature, TestExtensions, default_aggregate_column_info,
};
pub use id::DriverId;
pub use registry::{DriverDescriptor, DriverRegistry, DriverState, ExtensionLoader};
