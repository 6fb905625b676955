//! Declarative transformations of dataset definitions.
//!
//! A transformed source renames the resolved definition first and then
//! applies each transform in declaration order, every transform receiving
//! the previous result. The outcome is memoized like a file-backed source.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::error::Result;
use crate::schema::{DatabaseDefinition, Row, TableDefinition};
use crate::source::DatasetSource;

type TransformFn = dyn Fn(DatabaseDefinition) -> Result<DatabaseDefinition> + Send + Sync;
type TableFn = dyn Fn(TableDefinition) -> Result<TableDefinition> + Send + Sync;
type RowsFn = dyn Fn(Vec<Row>) -> Vec<Row> + Send + Sync;

/// A named, pure function from one database definition to another.
#[derive(Clone)]
pub struct Transform {
    label: String,
    apply: Arc<TransformFn>,
}

impl Transform {
    pub fn new(
        label: impl Into<String>,
        apply: impl Fn(DatabaseDefinition) -> Result<DatabaseDefinition> + Send + Sync + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            apply: Arc::new(apply),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn apply(&self, database: DatabaseDefinition) -> Result<DatabaseDefinition> {
        (self.apply)(database)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform").field("label", &self.label).finish()
    }
}

/// Source whose definition is derived from another source.
#[derive(Debug)]
pub struct TransformedSource {
    source: DatasetSource,
    name: String,
    transforms: Vec<Transform>,
    cell: OnceCell<Arc<DatabaseDefinition>>,
}

impl TransformedSource {
    pub fn new(
        source: impl Into<DatasetSource>,
        name: impl Into<String>,
        transforms: impl IntoIterator<Item = Transform>,
    ) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
            transforms: transforms.into_iter().collect(),
            cell: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub fn resolve(&self) -> Result<Arc<DatabaseDefinition>> {
        self.cell
            .get_or_try_init(|| {
                let base = self.source.resolve()?;
                let mut database = base.renamed(self.name.clone())?;
                for transform in &self.transforms {
                    debug!(
                        event = "transform_applied",
                        dataset = %self.name,
                        transform = %transform.label()
                    );
                    database = transform.apply(database)?;
                }
                Ok(Arc::new(database))
            })
            .map(Arc::clone)
    }
}

/// Derive a new source named `name` from `source` by applying `transforms` in order.
pub fn transform(
    source: impl Into<DatasetSource>,
    name: impl Into<String>,
    transforms: impl IntoIterator<Item = Transform>,
) -> DatasetSource {
    TransformedSource::new(source, name, transforms).into()
}

/// Keep only the named tables, preserving their original order.
///
/// Names that match no table are ignored.
pub fn only_tables<I, S>(names: I) -> Transform
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
    let label = format!(
        "only_tables({})",
        names.iter().cloned().collect::<Vec<_>>().join(", ")
    );
    Transform::new(label, move |database| {
        let tables = database
            .tables()
            .iter()
            .filter(|table| names.contains(table.name()))
            .cloned()
            .collect();
        database.with_tables(tables)
    })
}

/// Builder for a transform that rewrites a single table.
///
/// The table function runs first, then the rows function on the result.
/// Both default to the identity. A table name that matches nothing leaves
/// the database unchanged.
#[derive(Clone)]
pub struct UpdateTable {
    table: String,
    table_fn: Option<Arc<TableFn>>,
    rows_fn: Option<Arc<RowsFn>>,
}

/// Start an [`UpdateTable`] transform for `table`.
pub fn update_table(table: impl Into<String>) -> UpdateTable {
    UpdateTable {
        table: table.into(),
        table_fn: None,
        rows_fn: None,
    }
}

impl UpdateTable {
    pub fn table_fn(
        mut self,
        table_fn: impl Fn(TableDefinition) -> Result<TableDefinition> + Send + Sync + 'static,
    ) -> Self {
        self.table_fn = Some(Arc::new(table_fn));
        self
    }

    pub fn rows_fn(mut self, rows_fn: impl Fn(Vec<Row>) -> Vec<Row> + Send + Sync + 'static) -> Self {
        self.rows_fn = Some(Arc::new(rows_fn));
        self
    }

    fn apply_to(&self, table: TableDefinition) -> Result<TableDefinition> {
        let table = match &self.table_fn {
            Some(table_fn) => table_fn(table)?,
            None => table,
        };
        match &self.rows_fn {
            Some(rows_fn) => {
                let rows = rows_fn(table.rows().to_vec());
                table.with_rows(rows)
            }
            None => Ok(table),
        }
    }
}

impl From<UpdateTable> for Transform {
    fn from(update: UpdateTable) -> Self {
        let label = format!("update_table({})", update.table);
        Transform::new(label, move |database| {
            let tables = database
                .tables()
                .iter()
                .map(|table| {
                    if table.name() == update.table {
                        update.apply_to(table.clone())
                    } else {
                        Ok(table.clone())
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            database.with_tables(tables)
        })
    }
}

/// Rewrite the rows of one table.
pub fn update_rows(
    table: impl Into<String>,
    rows_fn: impl Fn(Vec<Row>) -> Vec<Row> + Send + Sync + 'static,
) -> Transform {
    update_table(table).rows_fn(rows_fn).into()
}

/// Rename one table.
pub fn rename_table(from: impl Into<String>, to: impl Into<String>) -> Transform {
    let to = to.into();
    update_table(from)
        .table_fn(move |table| table.renamed(to.clone()))
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldDefinition;
    use crate::types::{BaseType, Value};

    fn database(tables: &[&str]) -> DatabaseDefinition {
        DatabaseDefinition::from_tables(
            "db",
            tables.iter().map(|name| {
                (
                    *name,
                    vec![FieldDefinition::new("id", BaseType::Integer).expect("field")],
                    vec![vec![Value::Int(1)], vec![Value::Int(2)]],
                )
            }),
        )
        .expect("database")
    }

    fn table_names(database: &DatabaseDefinition) -> Vec<&str> {
        database.tables().iter().map(|table| table.name()).collect()
    }

    #[test]
    fn zero_transforms_only_rename() {
        let source = transform(database(&["a", "b"]), "renamed", Vec::new());
        let resolved = source.resolve().expect("resolve");
        assert_eq!(resolved.name(), "renamed");
        assert_eq!(resolved.tables(), database(&["a", "b"]).tables());
    }

    #[test]
    fn only_tables_keeps_original_order() {
        let source = transform(
            database(&["a", "b", "c"]),
            "subset",
            [only_tables(["c", "a", "missing"])],
        );
        let resolved = source.resolve().expect("resolve");
        assert_eq!(table_names(&resolved), vec!["a", "c"]);
    }

    #[test]
    fn transforms_apply_in_declaration_order() {
        // Keeping "a" and then renaming it only works left to right.
        let source = transform(
            database(&["a", "b"]),
            "ordered",
            [only_tables(["a"]), rename_table("a", "z")],
        );
        let resolved = source.resolve().expect("resolve");
        assert_eq!(table_names(&resolved), vec!["z"]);

        let source = transform(
            database(&["a", "b"]),
            "reversed",
            [rename_table("a", "z"), only_tables(["a"])],
        );
        assert!(source.resolve().expect("resolve").tables().is_empty());
    }

    #[test]
    fn update_table_runs_table_fn_then_rows_fn() {
        let update: Transform = update_table("a")
            .table_fn(|table| table.renamed("a2"))
            .rows_fn(|rows| rows.into_iter().rev().collect())
            .into();
        let source = transform(database(&["a", "b"]), "db", [update]);
        let resolved = source.resolve().expect("resolve");

        let a2 = resolved.require_table("a2").expect("renamed table");
        assert_eq!(a2.rows(), &[vec![Value::Int(2)], vec![Value::Int(1)]]);
        assert_eq!(resolved.require_table("b").expect("b").rows()[0], vec![Value::Int(1)]);
    }

    #[test]
    fn update_of_unknown_table_is_a_no_op() {
        let source = transform(
            database(&["a"]),
            "db",
            [update_rows("missing", |_| Vec::new())],
        );
        assert_eq!(*source.resolve().expect("resolve"), database(&["a"]));
    }

    #[test]
    fn rows_fn_output_is_validated() {
        let source = transform(
            database(&["a"]),
            "db",
            [update_rows("a", |_| vec![vec![Value::Int(1), Value::Int(2)]])],
        );
        assert!(source.resolve().is_err());
    }

    #[test]
    fn transformed_result_is_memoized() {
        let source = transform(database(&["a"]), "db", [only_tables(["a"])]);
        let first = source.resolve().expect("resolve");
        let second = source.clone().resolve().expect("resolve");
        assert!(Arc::ptr_eq(&first, &second));
    }
}
