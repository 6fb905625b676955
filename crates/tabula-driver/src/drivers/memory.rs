use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::info;

use tabula_core::{BaseType, DatabaseDefinition, Row, db_qualified_table_name};

use crate::catalog::DomainCatalog;
use crate::error::{DriverError, Result};
use crate::extensions::{
    ConnectionContext, ConnectionDetails, CreateDatabaseOptions, DriverFeature, TestExtensions,
};
use crate::id::DriverId;

#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedField {
    pub name: String,
    pub base_type: BaseType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedTable {
    pub name: String,
    pub fields: Vec<MaterializedField>,
    pub rows: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedDatabase {
    pub name: String,
    pub tables: Vec<MaterializedTable>,
}

/// Databases materialized in process, shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    databases: Arc<RwLock<BTreeMap<String, Arc<MaterializedDatabase>>>>,
    qualify_table_names: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose tables are named with [`db_qualified_table_name`], as
    /// backends that keep every dataset in one shared schema do.
    pub fn qualified() -> Self {
        Self {
            qualify_table_names: true,
            ..Self::default()
        }
    }

    pub fn database(&self, name: &str) -> Option<Arc<MaterializedDatabase>> {
        self.databases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn database_names(&self) -> Vec<String> {
        self.databases
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    fn materialize(&self, definition: &DatabaseDefinition) -> MaterializedDatabase {
        let tables = definition
            .tables()
            .iter()
            .map(|table| MaterializedTable {
                name: if self.qualify_table_names {
                    db_qualified_table_name(definition.name(), table.name())
                } else {
                    table.name().to_string()
                },
                fields: table
                    .fields()
                    .iter()
                    .map(|field| MaterializedField {
                        name: field.name().to_string(),
                        base_type: field.base_type().clone(),
                    })
                    .collect(),
                rows: table.rows().to_vec(),
            })
            .collect();

        MaterializedDatabase {
            name: definition.name().to_string(),
            tables,
        }
    }
}

impl DomainCatalog for MemoryStore {
    type Database = Arc<MaterializedDatabase>;
    type Table = MaterializedTable;
    type Field = MaterializedField;

    fn database_named(&self, name: &str) -> Option<Self::Database> {
        self.database(name)
    }

    fn table_named(&self, database: &Self::Database, name: &str) -> Option<Self::Table> {
        database.tables.iter().find(|table| table.name == name).cloned()
    }

    fn field_named(&self, table: &Self::Table, name: &str) -> Option<Self::Field> {
        table.fields.iter().find(|field| field.name == name).cloned()
    }
}

/// Test extensions materializing datasets into a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryExtensions {
    driver: DriverId,
    store: MemoryStore,
}

impl MemoryExtensions {
    pub fn new(driver: impl Into<DriverId>, store: MemoryStore) -> Self {
        Self {
            driver: driver.into(),
            store,
        }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }
}

#[async_trait]
impl TestExtensions for MemoryExtensions {
    fn connection_details(
        &self,
        context: ConnectionContext,
        database: &DatabaseDefinition,
    ) -> Result<ConnectionDetails> {
        let details = ConnectionDetails::new().with("store", "memory");
        Ok(match context {
            ConnectionContext::Server => details,
            ConnectionContext::Database => details.with("database", database.name()),
        })
    }

    async fn create_database(
        &self,
        database: &DatabaseDefinition,
        options: &CreateDatabaseOptions,
    ) -> Result<()> {
        let materialized = Arc::new(self.store.materialize(database));
        let mut databases = self
            .store
            .databases
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if databases.contains_key(database.name()) {
            if options.skip_drop_existing {
                return Err(DriverError::Backend {
                    driver: self.driver.clone(),
                    reason: format!("database '{}' already exists", database.name()),
                });
            }
            info!(event = "database_dropped", driver = %self.driver, database = %database.name());
        }

        databases.insert(database.name().to_string(), materialized);
        info!(
            event = "database_created",
            driver = %self.driver,
            database = %database.name(),
            tables = database.tables().len()
        );
        Ok(())
    }

    fn supports(&self, feature: DriverFeature) -> bool {
        matches!(
            feature,
            DriverFeature::ForeignKeys | DriverFeature::Joins | DriverFeature::NestedQueries
        )
    }
}
