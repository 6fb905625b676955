use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use tabula_core::{
    BaseType, DatabaseDefinition, Error, TableDefinition, build_fk_graph_report, flatten_database,
};

use crate::drivers::csv::CsvExtensions;
use crate::error::{DriverError, Result};
use crate::extensions::{
    ConnectionContext, ConnectionDetails, CreateDatabaseOptions, TestExtensions,
};
use crate::id::DriverId;

/// CSV output without joins: every table is written flattened.
#[derive(Debug)]
pub struct FlatCsvExtensions {
    driver: DriverId,
    csv: Arc<CsvExtensions>,
}

impl FlatCsvExtensions {
    pub fn new(driver: impl Into<DriverId>, csv: Arc<CsvExtensions>) -> Self {
        Self {
            driver: driver.into(),
            csv,
        }
    }

    pub fn csv(&self) -> &CsvExtensions {
        &self.csv
    }

    /// Every table of `database` replaced by its flattened form.
    pub fn flatten_all(&self, database: &DatabaseDefinition) -> Result<DatabaseDefinition> {
        let report = build_fk_graph_report(database);
        if let Some(cycle) = report.cycle {
            return Err(DriverError::Backend {
                driver: self.driver.clone(),
                reason: format!("cannot flatten cyclic foreign keys: {}", cycle.join(", ")),
            });
        }

        let tables = database
            .tables()
            .iter()
            .map(|table| -> Result<TableDefinition> {
                let flat = flatten_database(database, table.name())?;
                flat.into_tables()
                    .into_iter()
                    .next()
                    .ok_or_else(|| Error::UnknownTable(table.name().to_string()).into())
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(database.with_tables(tables)?)
    }
}

#[async_trait]
impl TestExtensions for FlatCsvExtensions {
    fn connection_details(
        &self,
        context: ConnectionContext,
        database: &DatabaseDefinition,
    ) -> Result<ConnectionDetails> {
        self.csv.connection_details(context, database)
    }

    async fn create_database(
        &self,
        database: &DatabaseDefinition,
        options: &CreateDatabaseOptions,
    ) -> Result<()> {
        let flat = self.flatten_all(database)?;
        info!(
            event = "database_flattened",
            driver = %self.driver,
            database = %database.name(),
            tables = flat.tables().len()
        );
        self.csv.write_database(&flat, options)
    }

    fn map_expected_type(&self, base_type: &BaseType) -> BaseType {
        self.csv.map_expected_type(base_type)
    }

    fn format_identifier(&self, name: &str) -> String {
        self.csv.format_identifier(name)
    }

    fn before_run(&self, driver: &DriverId) -> Result<()> {
        self.csv.before_run(driver)
    }

    fn has_after_run_hook(&self) -> bool {
        self.csv.has_after_run_hook()
    }

    fn after_run(&self, driver: &DriverId) -> Result<()> {
        self.csv.after_run(driver)
    }
}
