use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use tabula_core::{BaseType, DatabaseDefinition, TableDefinition, build_fk_graph_report};

use crate::error::{DriverError, Result};
use crate::extensions::{
    ConnectionContext, ConnectionDetails, CreateDatabaseOptions, TestExtensions,
};
use crate::id::DriverId;

/// Test extensions writing each table to `<root>/<database>/<table>.csv`.
#[derive(Debug)]
pub struct CsvExtensions {
    driver: DriverId,
    root: PathBuf,
    created: Mutex<BTreeSet<PathBuf>>,
}

impl CsvExtensions {
    pub fn new(driver: impl Into<DriverId>, root: impl Into<PathBuf>) -> Self {
        Self {
            driver: driver.into(),
            root: root.into(),
            created: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database_dir(&self, database: &str) -> PathBuf {
        self.root.join(self.format_identifier(database))
    }

    pub fn table_path(&self, database: &str, table: &str) -> PathBuf {
        self.database_dir(database)
            .join(format!("{}.csv", self.format_identifier(table)))
    }

    /// Write every table of `database`, referenced tables first.
    pub(crate) fn write_database(
        &self,
        database: &DatabaseDefinition,
        options: &CreateDatabaseOptions,
    ) -> Result<()> {
        let dir = self.database_dir(database.name());
        if dir.exists() {
            if options.skip_drop_existing {
                return Err(DriverError::Backend {
                    driver: self.driver.clone(),
                    reason: format!("database directory {} already exists", dir.display()),
                });
            }
            std::fs::remove_dir_all(&dir)?;
            info!(event = "database_dropped", driver = %self.driver, path = %dir.display());
        }

        std::fs::create_dir_all(&dir)?;
        self.record_created(dir.clone());

        for table in self.table_order(database) {
            let path = self.table_path(database.name(), table.name());
            let bytes = write_table_csv(&path, table, |name| self.format_identifier(name))?;
            debug!(
                event = "table_written",
                driver = %self.driver,
                table = %table.name(),
                rows = table.row_count(),
                bytes
            );
        }

        info!(
            event = "database_created",
            driver = %self.driver,
            database = %database.name(),
            path = %dir.display()
        );
        Ok(())
    }

    fn table_order<'a>(&self, database: &'a DatabaseDefinition) -> Vec<&'a TableDefinition> {
        let report = build_fk_graph_report(database);
        match report.topo_order {
            Some(order) => order
                .iter()
                .filter_map(|name| database.table(name))
                .collect(),
            None => {
                warn!(
                    event = "fk_cycle_detected",
                    driver = %self.driver,
                    database = %database.name(),
                    tables = ?report.cycle
                );
                database.tables().iter().collect()
            }
        }
    }

    fn record_created(&self, path: PathBuf) {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path);
    }
}

#[async_trait]
impl TestExtensions for CsvExtensions {
    fn connection_details(
        &self,
        context: ConnectionContext,
        database: &DatabaseDefinition,
    ) -> Result<ConnectionDetails> {
        let details = ConnectionDetails::new().with("root", self.root.display().to_string());
        Ok(match context {
            ConnectionContext::Server => details,
            ConnectionContext::Database => details.with(
                "path",
                self.database_dir(database.name()).display().to_string(),
            ),
        })
    }

    async fn create_database(
        &self,
        database: &DatabaseDefinition,
        options: &CreateDatabaseOptions,
    ) -> Result<()> {
        self.write_database(database, options)
    }

    /// Everything that is not a number is read back as text.
    fn map_expected_type(&self, base_type: &BaseType) -> BaseType {
        match base_type {
            BaseType::Boolean | BaseType::Json | BaseType::Uuid => BaseType::Text,
            temporal if temporal.is_temporal() => BaseType::Text,
            other => other.clone(),
        }
    }

    fn format_identifier(&self, name: &str) -> String {
        name.to_lowercase()
    }

    fn before_run(&self, driver: &DriverId) -> Result<()> {
        if !self.root.exists() {
            std::fs::create_dir_all(&self.root)?;
            self.record_created(self.root.clone());
            info!(event = "csv_root_created", driver = %driver, path = %self.root.display());
        }
        Ok(())
    }

    fn has_after_run_hook(&self) -> bool {
        true
    }

    /// Remove every directory this driver created, deepest first.
    fn after_run(&self, driver: &DriverId) -> Result<()> {
        let created: Vec<PathBuf> = std::mem::take(
            &mut *self.created.lock().unwrap_or_else(PoisonError::into_inner),
        )
        .into_iter()
        .collect();

        for dir in created.iter().rev() {
            match std::fs::remove_dir_all(dir) {
                Ok(()) => debug!(event = "directory_removed", driver = %driver, path = %dir.display()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}

/// Write a table as CSV with a header row, returning the bytes written.
pub fn write_table_csv(
    path: &Path,
    table: &TableDefinition,
    format_identifier: impl Fn(&str) -> String,
) -> std::result::Result<u64, csv::Error> {
    let writer = BufWriter::new(File::create(path).map_err(csv::Error::from)?);
    let counting = CountingWriter::new(writer);
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(counting);

    let header: Vec<String> = table.field_names().map(format_identifier).collect();
    writer.write_record(&header)?;

    for row in table.rows() {
        writer.write_record(row.iter().map(|value| value.to_string()))?;
    }

    writer.flush()?;
    let counting = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(counting.bytes_written())
}

struct CountingWriter<W: Write> {
    inner: W,
    bytes: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, bytes: 0 }
    }

    fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let size = self.inner.write(buf)?;
        self.bytes = self.bytes.saturating_add(size as u64);
        Ok(size)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
