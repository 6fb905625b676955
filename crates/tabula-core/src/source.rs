use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, info};

use crate::error::Result;
use crate::resource::{ResourceLoader, parse_dataset};
use crate::schema::DatabaseDefinition;
use crate::transform::TransformedSource;

/// Something that resolves to a database definition.
///
/// Cloning is cheap; clones share the memoized result of file-backed and
/// transformed variants.
#[derive(Debug, Clone)]
pub enum DatasetSource {
    /// An already-constructed definition; resolving is the identity.
    Literal(Arc<DatabaseDefinition>),
    /// A named external resource, read and parsed at most once.
    FileBacked(Arc<FileBackedSource>),
    /// A pure function of another source, computed at most once.
    Transformed(Arc<TransformedSource>),
}

impl DatasetSource {
    pub fn literal(database: DatabaseDefinition) -> Self {
        DatasetSource::Literal(Arc::new(database))
    }

    pub fn file_backed(name: impl Into<String>, loader: Arc<dyn ResourceLoader>) -> Self {
        DatasetSource::FileBacked(Arc::new(FileBackedSource::new(name, loader)))
    }

    /// Logical name of the dataset this source produces.
    pub fn name(&self) -> &str {
        match self {
            DatasetSource::Literal(database) => database.name(),
            DatasetSource::FileBacked(source) => source.name(),
            DatasetSource::Transformed(source) => source.name(),
        }
    }

    /// Resolve the source into its database definition.
    pub fn resolve(&self) -> Result<Arc<DatabaseDefinition>> {
        match self {
            DatasetSource::Literal(database) => Ok(Arc::clone(database)),
            DatasetSource::FileBacked(source) => source.resolve(),
            DatasetSource::Transformed(source) => source.resolve(),
        }
    }
}

impl From<DatabaseDefinition> for DatasetSource {
    fn from(database: DatabaseDefinition) -> Self {
        DatasetSource::literal(database)
    }
}

impl From<TransformedSource> for DatasetSource {
    fn from(source: TransformedSource) -> Self {
        DatasetSource::Transformed(Arc::new(source))
    }
}

/// Dataset loaded lazily from a [`ResourceLoader`].
#[derive(Debug)]
pub struct FileBackedSource {
    name: String,
    loader: Arc<dyn ResourceLoader>,
    cell: OnceCell<Arc<DatabaseDefinition>>,
}

impl FileBackedSource {
    pub fn new(name: impl Into<String>, loader: Arc<dyn ResourceLoader>) -> Self {
        Self {
            name: name.into(),
            loader,
            cell: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Concurrent first callers block on one read; a failed read is not
    /// cached and the next call tries again.
    pub fn resolve(&self) -> Result<Arc<DatabaseDefinition>> {
        self.cell
            .get_or_try_init(|| {
                info!(
                    event = "dataset_loading",
                    dataset = %self.name,
                    location = %self.loader.location(&self.name)
                );
                let raw = self.loader.read(&self.name)?;
                let database = parse_dataset(&self.name, &raw)?;
                debug!(
                    event = "dataset_loaded",
                    dataset = %self.name,
                    tables = database.tables().len()
                );
                Ok(Arc::new(database))
            })
            .map(Arc::clone)
    }
}
