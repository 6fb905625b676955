use std::fmt;

use crate::error::{Error, Result};
use crate::types::{BaseType, SpecialType, Value, VisibilityType};
use crate::validation::{validate_field, validate_name, validate_rows, validate_unique_names};

/// A single row of fixture data, positionally aligned with the table's fields.
pub type Row = Vec<Value>;

/// Definition of one field (column) of a fixture table.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    name: String,
    base_type: BaseType,
    special_type: Option<SpecialType>,
    visibility: Option<VisibilityType>,
    fk: Option<String>,
    comment: Option<String>,
}

impl FieldDefinition {
    /// Create a field definition, rejecting blank names.
    pub fn new(name: impl Into<String>, base_type: BaseType) -> Result<Self> {
        let field = Self {
            name: name.into(),
            base_type,
            special_type: None,
            visibility: None,
            fk: None,
            comment: None,
        };
        validate_field(&field.name, &field)?;
        Ok(field)
    }

    pub fn with_special_type(mut self, special_type: SpecialType) -> Self {
        self.special_type = Some(special_type);
        self
    }

    pub fn with_visibility(mut self, visibility: VisibilityType) -> Self {
        self.visibility = Some(visibility);
        self
    }

    /// Mark the field as a foreign key to the table named `table`.
    pub fn with_fk(mut self, table: impl Into<String>) -> Self {
        self.fk = Some(table.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Copy of this field under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name(&name, &name)?;
        Ok(Self {
            name,
            ..self.clone()
        })
    }

    /// Copy of this field without its foreign key.
    pub fn without_fk(&self) -> Self {
        Self {
            fk: None,
            ..self.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_type(&self) -> &BaseType {
        &self.base_type
    }

    pub fn special_type(&self) -> Option<SpecialType> {
        self.special_type
    }

    pub fn visibility(&self) -> Option<VisibilityType> {
        self.visibility
    }

    pub fn fk(&self) -> Option<&str> {
        self.fk.as_deref()
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }
}

/// Definition of a fixture table: ordered fields plus positional rows.
///
/// The 1-based position of a row is its implicit identifier when other
/// tables reference it through a foreign key.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    name: String,
    fields: Vec<FieldDefinition>,
    rows: Vec<Row>,
    comment: Option<String>,
}

impl TableDefinition {
    /// Create a table, validating its name, field names and row widths.
    pub fn new(name: impl Into<String>, fields: Vec<FieldDefinition>, rows: Vec<Row>) -> Result<Self> {
        let name = name.into();
        validate_name(&name, &name)?;
        validate_unique_names(
            &name,
            "field",
            fields.iter().map(|field| field.name.as_str()),
        )?;
        validate_rows(&name, fields.len(), &rows)?;
        Ok(Self {
            name,
            fields,
            rows,
            comment: None,
        })
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Copy of this table under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name(&name, &name)?;
        Ok(Self {
            name,
            ..self.clone()
        })
    }

    /// Copy of this table with replaced rows; the new rows are validated.
    pub fn with_rows(&self, rows: Vec<Row>) -> Result<Self> {
        validate_rows(&self.name, self.fields.len(), &rows)?;
        Ok(Self {
            rows,
            ..self.clone()
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn into_parts(self) -> (String, Vec<FieldDefinition>, Vec<Row>, Option<String>) {
        (self.name, self.fields, self.rows, self.comment)
    }
}

/// Definition of a fixture database: a named, ordered set of tables.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseDefinition {
    name: String,
    tables: Vec<TableDefinition>,
}

impl DatabaseDefinition {
    /// Create a database, validating its name and table name uniqueness.
    pub fn new(name: impl Into<String>, tables: Vec<TableDefinition>) -> Result<Self> {
        let name = name.into();
        validate_name(&name, &name)?;
        validate_unique_names(
            &name,
            "table",
            tables.iter().map(|table| table.name.as_str()),
        )?;
        Ok(Self { name, tables })
    }

    /// Build a database from `(table name, fields, rows)` triples.
    pub fn from_tables<N, I>(name: impl Into<String>, tables: I) -> Result<Self>
    where
        N: Into<String>,
        I: IntoIterator<Item = (N, Vec<FieldDefinition>, Vec<Row>)>,
    {
        let name = name.into();
        let tables = tables
            .into_iter()
            .map(|(table, fields, rows)| {
                TableDefinition::new(table, fields, rows).map_err(|err| prefix_path(&name, err))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(name, tables)
    }

    /// Copy of this database under a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name(&name, &name)?;
        Ok(Self {
            name,
            tables: self.tables.clone(),
        })
    }

    /// Copy of this database holding `tables` instead.
    pub fn with_tables(&self, tables: Vec<TableDefinition>) -> Result<Self> {
        Self::new(self.name.clone(), tables)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tables(&self) -> &[TableDefinition] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.iter().find(|table| table.name == name)
    }

    /// Look up a table, failing with [`Error::UnknownTable`] when absent.
    pub fn require_table(&self, name: &str) -> Result<&TableDefinition> {
        self.table(name)
            .ok_or_else(|| Error::UnknownTable(format!("{}.{}", self.name, name)))
    }

    pub fn into_tables(self) -> Vec<TableDefinition> {
        self.tables
    }
}

fn prefix_path(database: &str, err: Error) -> Error {
    match err {
        Error::SchemaValidation { path, message } => Error::SchemaValidation {
            path: format!("{database}.{path}"),
            message,
        },
        other => other,
    }
}

impl fmt::Display for FieldDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.base_type)?;
        if let Some(fk) = &self.fk {
            write!(f, " -> {fk}")?;
        }
        Ok(())
    }
}

impl fmt::Display for TableDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "table {} ({} fields, {} rows)",
            self.name,
            self.fields.len(),
            self.rows.len()
        )?;
        for field in &self.fields {
            writeln!(f, "  {field}")?;
        }
        Ok(())
    }
}

impl fmt::Display for DatabaseDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "database {}", self.name)?;
        for table in &self.tables {
            for line in table.to_string().lines() {
                writeln!(f, "  {line}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str) -> FieldDefinition {
        FieldDefinition::new(name, BaseType::Integer).expect("valid field")
    }

    #[test]
    fn row_width_mismatch_is_rejected() {
        let err = TableDefinition::new(
            "users",
            vec![field("id"), field("age")],
            vec![vec![Value::Int(1), Value::Int(30)], vec![Value::Int(2)]],
        )
        .unwrap_err();
        match err {
            Error::SchemaValidation { path, .. } => assert_eq!(path, "users.rows[1]"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn blank_names_are_rejected() {
        assert!(matches!(
            FieldDefinition::new("  ", BaseType::Text),
            Err(Error::SchemaValidation { .. })
        ));
        assert!(matches!(
            TableDefinition::new("", Vec::new(), Vec::new()),
            Err(Error::SchemaValidation { .. })
        ));
        assert!(matches!(
            DatabaseDefinition::new("", Vec::new()),
            Err(Error::SchemaValidation { .. })
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        assert!(TableDefinition::new("t", vec![field("id"), field("id")], Vec::new()).is_err());

        let table = TableDefinition::new("t", vec![field("id")], Vec::new()).expect("table");
        let err = DatabaseDefinition::new("db", vec![table.clone(), table]).unwrap_err();
        assert!(err.to_string().contains("duplicate table name"));
    }

    #[test]
    fn from_tables_prefixes_database_in_error_path() {
        let err = DatabaseDefinition::from_tables(
            "shop",
            [("items", vec![field("id")], vec![vec![Value::Int(1), Value::Int(2)]])],
        )
        .unwrap_err();
        match err {
            Error::SchemaValidation { path, .. } => assert_eq!(path, "shop.items.rows[0]"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn equality_is_structural() {
        let build = || {
            DatabaseDefinition::from_tables(
                "db",
                [("t", vec![field("id")], vec![vec![Value::Int(1)]])],
            )
            .expect("database")
        };
        assert_eq!(build(), build());
    }
}
