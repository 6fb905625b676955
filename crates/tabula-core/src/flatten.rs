//! Denormalize a table by following its foreign keys.
//!
//! Every foreign-key field is replaced by the (recursively flattened) fields
//! of the table it references. Cyclic foreign-key graphs are not supported:
//! nesting a cycle recurses without bound. Use
//! [`build_fk_graph_report`](crate::graph::build_fk_graph_report) to check
//! for cycles first.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::schema::{DatabaseDefinition, FieldDefinition, Row, TableDefinition};
use crate::source::DatasetSource;
use crate::transform::{Transform, transform};
use crate::types::Value;

/// Name of a flattened field before mangling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NestedName {
    /// A field of the flattened table itself.
    Plain(String),
    /// A field reached through the foreign key `local` into `fk_table`.
    Path {
        local: String,
        fk_table: String,
        nested: Box<NestedName>,
    },
}

impl NestedName {
    /// Presentation name: `singular(fk_table)_<nested>` for paths, the name itself otherwise.
    pub fn mangle(&self) -> String {
        match self {
            NestedName::Plain(name) => name.clone(),
            NestedName::Path {
                fk_table, nested, ..
            } => format!("{}_{}", singularize(fk_table), nested.mangle()),
        }
    }
}

/// Naive singularization: a trailing `ies` becomes `y`, then a trailing `s` is dropped.
pub fn singularize(name: &str) -> String {
    let name = match name.strip_suffix("ies") {
        Some(stem) => format!("{stem}y"),
        None => name.to_string(),
    };
    match name.strip_suffix('s') {
        Some(stem) => stem.to_string(),
        None => name,
    }
}

/// A leaf field together with the path that reaches it.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedField {
    pub name: NestedName,
    pub field: FieldDefinition,
}

/// Expand the fields of `table` by recursively following foreign keys.
pub fn nest_fields(database: &DatabaseDefinition, table: &str) -> Result<Vec<NestedField>> {
    let definition = database.require_table(table)?;
    let mut nested = Vec::new();

    for field in definition.fields() {
        match field.fk() {
            None => nested.push(NestedField {
                name: NestedName::Plain(field.name().to_string()),
                field: field.clone(),
            }),
            Some(target) => {
                if database.table(target).is_none() {
                    return Err(Error::UnknownForeignKeyTarget {
                        table: definition.name().to_string(),
                        field: field.name().to_string(),
                        target: target.to_string(),
                    });
                }
                for inner in nest_fields(database, target)? {
                    nested.push(NestedField {
                        name: NestedName::Path {
                            local: field.name().to_string(),
                            fk_table: target.to_string(),
                            nested: Box::new(inner.name),
                        },
                        field: inner.field,
                    });
                }
            }
        }
    }

    Ok(nested)
}

/// Row values keyed by table, then by 1-based ordinal (index + 1), then by field name.
struct RowIndex<'a> {
    tables: HashMap<&'a str, Vec<HashMap<&'a str, &'a Value>>>,
}

impl<'a> RowIndex<'a> {
    fn new(database: &'a DatabaseDefinition) -> Self {
        let tables = database
            .tables()
            .iter()
            .map(|table| {
                let rows = table
                    .rows()
                    .iter()
                    .map(|row| table.field_names().zip(row.iter()).collect())
                    .collect();
                (table.name(), rows)
            })
            .collect();
        Self { tables }
    }

    fn lookup(&self, table: &str, ordinal: usize, field: &str) -> Option<&'a Value> {
        let rows = self.tables.get(table)?;
        let row = rows.get(ordinal.checked_sub(1)?)?;
        row.get(field).copied()
    }

    /// Resolve `name` for the row at `ordinal` of `table`.
    ///
    /// Missing rows and null foreign keys resolve to null.
    fn resolve(&self, table: &str, ordinal: usize, name: &NestedName) -> Result<Value> {
        match name {
            NestedName::Plain(field) => Ok(self
                .lookup(table, ordinal, field)
                .cloned()
                .unwrap_or(Value::Null)),
            NestedName::Path {
                local,
                fk_table,
                nested,
            } => match self.lookup(table, ordinal, local) {
                None | Some(Value::Null) => Ok(Value::Null),
                Some(Value::Int(id)) if *id >= 1 => {
                    let id = usize::try_from(*id)
                        .map_err(|_| foreign_key_value_error(table, ordinal, local))?;
                    self.resolve(fk_table, id, nested)
                }
                Some(_) => Err(foreign_key_value_error(table, ordinal, local)),
            },
        }
    }
}

fn foreign_key_value_error(table: &str, ordinal: usize, field: &str) -> Error {
    Error::SchemaValidation {
        path: format!("{table}.rows[{}].{field}", ordinal.saturating_sub(1)),
        message: "foreign key value must be a positive integer row ordinal".to_string(),
    }
}

/// Flatten `table` into a single-table database with the same name as `database`.
pub fn flatten_database(database: &DatabaseDefinition, table: &str) -> Result<DatabaseDefinition> {
    let definition = database.require_table(table)?;
    let nested = nest_fields(database, table)?;
    let index = RowIndex::new(database);

    let rows = (1..=definition.row_count())
        .map(|ordinal| {
            nested
                .iter()
                .map(|field| index.resolve(table, ordinal, &field.name))
                .collect::<Result<Row>>()
        })
        .collect::<Result<Vec<_>>>()?;

    let fields = nested
        .iter()
        .map(|field| field.field.renamed(field.name.mangle()))
        .collect::<Result<Vec<_>>>()?;

    let mut flattened = TableDefinition::new(definition.name(), fields, rows)?;
    if let Some(comment) = definition.comment() {
        flattened = flattened.with_comment(comment);
    }
    DatabaseDefinition::new(database.name(), vec![flattened])
}

/// Transform that replaces the database with the flattened form of `table`.
pub fn flatten_table(table: impl Into<String>) -> Transform {
    let table = table.into();
    Transform::new(format!("flatten_table({table})"), move |database| {
        flatten_database(&database, &table)
    })
}

/// Memoized source of the flattened form of `table`, keeping the source's name.
pub fn flattened(source: &DatasetSource, table: impl Into<String>) -> DatasetSource {
    transform(source.clone(), source.name().to_string(), [flatten_table(table)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BaseType;

    fn field(name: &str, base_type: BaseType) -> FieldDefinition {
        FieldDefinition::new(name, base_type).expect("field")
    }

    fn fk(name: &str, table: &str) -> FieldDefinition {
        field(name, BaseType::Integer).with_fk(table)
    }

    fn row(values: Vec<Value>) -> Row {
        values
    }

    fn shop() -> DatabaseDefinition {
        DatabaseDefinition::from_tables(
            "shop",
            [
                (
                    "categories",
                    vec![field("id", BaseType::Integer), field("name", BaseType::Text)],
                    vec![
                        row(vec![1.into(), "toys".into()]),
                        row(vec![2.into(), "books".into()]),
                    ],
                ),
                (
                    "products",
                    vec![
                        field("id", BaseType::Integer),
                        fk("category_id", "categories"),
                        field("title", BaseType::Text),
                    ],
                    vec![
                        row(vec![1.into(), 1.into(), "robot".into()]),
                        row(vec![2.into(), 2.into(), "atlas".into()]),
                    ],
                ),
            ],
        )
        .expect("shop")
    }

    fn regions_chain() -> DatabaseDefinition {
        let regions: Vec<Row> = ["north", "south", "west"]
            .iter()
            .map(|name| row(vec![(*name).into()]))
            .collect();
        let users: Vec<Row> = (1..=7)
            .map(|id| {
                let region = if id == 7 { 3 } else { 1 };
                row(vec![format!("user{id}").into(), Value::Int(region)])
            })
            .collect();
        DatabaseDefinition::from_tables(
            "sales",
            [
                (
                    "orders",
                    vec![field("total", BaseType::Float), fk("user_id", "users")],
                    vec![row(vec![9.5.into(), 7.into()]), row(vec![1.0.into(), Value::Null])],
                ),
                (
                    "users",
                    vec![field("name", BaseType::Text), fk("region_id", "regions")],
                    users,
                ),
                ("regions", vec![field("name", BaseType::Text)], regions),
            ],
        )
        .expect("sales")
    }

    #[test]
    fn singularize_strips_plural_suffixes() {
        assert_eq!(singularize("categories"), "category");
        assert_eq!(singularize("users"), "user");
        assert_eq!(singularize("regions"), "region");
        assert_eq!(singularize("venue"), "venue");
    }

    #[test]
    fn mangles_nested_paths_with_foreign_table_names() {
        let name = NestedName::Path {
            local: "user_id".to_string(),
            fk_table: "users".to_string(),
            nested: Box::new(NestedName::Path {
                local: "region_id".to_string(),
                fk_table: "regions".to_string(),
                nested: Box::new(NestedName::Plain("name".to_string())),
            }),
        };
        assert_eq!(name.mangle(), "user_region_name");
    }

    #[test]
    fn follows_foreign_key_chains() {
        let flat = flatten_database(&regions_chain(), "orders").expect("flatten");
        let orders = flat.require_table("orders").expect("orders");
        let names: Vec<&str> = orders.field_names().collect();
        assert_eq!(names, vec!["total", "user_name", "user_region_name"]);
        assert_eq!(
            orders.rows()[0],
            vec![Value::Float(9.5), "user7".into(), "west".into()]
        );
        assert_eq!(orders.rows()[1], vec![Value::Float(1.0), Value::Null, Value::Null]);
    }

    // `category_id -> categories` expands to every field of `categories`,
    // prefixed with the singular table name. The result follows the same
    // mangling as `user_region_name` above, so there is no
    // `category_category_name` column.
    #[test]
    fn flattens_shop_products() {
        let flat = flatten_database(&shop(), "products").expect("flatten");
        assert_eq!(flat.name(), "shop");
        assert_eq!(flat.tables().len(), 1);

        let products = &flat.tables()[0];
        let names: Vec<&str> = products.field_names().collect();
        assert_eq!(names, vec!["id", "category_id", "category_name", "title"]);
        assert_eq!(
            products.rows(),
            &[
                vec![Value::Int(1), Value::Int(1), "toys".into(), "robot".into()],
                vec![Value::Int(2), Value::Int(2), "books".into(), "atlas".into()],
            ]
        );
        assert!(products.fields().iter().all(|field| field.fk().is_none()));
    }

    #[test]
    fn table_without_foreign_keys_is_unchanged() {
        let database = shop();
        let flat = flatten_database(&database, "categories").expect("flatten");
        assert_eq!(&flat.tables()[0], database.require_table("categories").expect("table"));
    }

    #[test]
    fn unknown_table_fails() {
        assert!(matches!(
            flatten_database(&shop(), "nope"),
            Err(Error::UnknownTable(_))
        ));
    }

    #[test]
    fn unknown_foreign_key_target_fails() {
        let database = DatabaseDefinition::from_tables(
            "db",
            [("orders", vec![fk("user_id", "users")], vec![row(vec![1.into()])])],
        )
        .expect("database");
        assert!(matches!(
            flatten_database(&database, "orders"),
            Err(Error::UnknownForeignKeyTarget { ref target, .. }) if target == "users"
        ));
    }

    #[test]
    fn non_integer_foreign_key_values_fail() {
        let database = DatabaseDefinition::from_tables(
            "db",
            [
                ("orders", vec![fk("user_id", "users")], vec![row(vec!["x".into()])]),
                ("users", vec![field("name", BaseType::Text)], vec![row(vec!["a".into()])]),
            ],
        )
        .expect("database");
        assert!(matches!(
            flatten_database(&database, "orders"),
            Err(Error::SchemaValidation { .. })
        ));
    }

    #[test]
    fn flattened_source_keeps_name_and_memoizes() {
        let source = DatasetSource::from(shop());
        let flat = flattened(&source, "products");
        let first = flat.resolve().expect("resolve");
        let second = flat.resolve().expect("resolve");
        assert_eq!(first.name(), "shop");
        assert!(std::sync::Arc::ptr_eq(&first, &second));
    }
}
