use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::schema::{DatabaseDefinition, FieldDefinition, Row};
use crate::types::BaseType;

/// Reject blank identifiers.
pub(crate) fn validate_name(path: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::validation(path, "name must not be blank"));
    }
    Ok(())
}

pub(crate) fn validate_field(path: &str, field: &FieldDefinition) -> Result<()> {
    validate_name(path, field.name())?;
    if let BaseType::Native(native) = field.base_type() {
        if native.trim().is_empty() {
            return Err(Error::validation(
                format!("{path}.base_type"),
                "native type must not be blank",
            ));
        }
    }
    if let Some(fk) = field.fk() {
        validate_name(&format!("{path}.fk"), fk)?;
    }
    Ok(())
}

pub(crate) fn validate_unique_names<'a>(
    path: &str,
    kind: &str,
    names: impl Iterator<Item = &'a str>,
) -> Result<()> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(Error::validation(
                format!("{path}.{name}"),
                format!("duplicate {kind} name: {name}"),
            ));
        }
    }
    Ok(())
}

/// Every row must hold exactly one value per field.
pub(crate) fn validate_rows(table: &str, width: usize, rows: &[Row]) -> Result<()> {
    for (idx, row) in rows.iter().enumerate() {
        if row.len() != width {
            return Err(Error::validation(
                format!("{table}.rows[{idx}]"),
                format!("row has {} values but the table has {width} fields", row.len()),
            ));
        }
    }
    Ok(())
}

/// Validate that every foreign key of a database definition points at a table
/// of the same database.
///
/// Construction does not enforce this; flattening does. Callers that want to
/// fail early (e.g. when loading fixtures) run this check explicitly.
pub fn validate_references(database: &DatabaseDefinition) -> Result<()> {
    let catalog: BTreeSet<&str> = database.tables().iter().map(|table| table.name()).collect();

    for table in database.tables() {
        for field in table.fields() {
            if let Some(target) = field.fk() {
                if !catalog.contains(target) {
                    return Err(Error::UnknownForeignKeyTarget {
                        table: table.name().to_string(),
                        field: field.name().to_string(),
                        target: target.to_string(),
                    });
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::TableDefinition;

    #[test]
    fn dangling_foreign_key_is_reported() {
        let orders = TableDefinition::new(
            "orders",
            vec![
                FieldDefinition::new("user_id", BaseType::Integer)
                    .expect("field")
                    .with_fk("users"),
            ],
            Vec::new(),
        )
        .expect("table");
        let database = DatabaseDefinition::new("db", vec![orders]).expect("database");

        let err = validate_references(&database).unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownForeignKeyTarget { ref target, .. } if target == "users"
        ));
    }

    #[test]
    fn references_within_the_database_pass() {
        let users = TableDefinition::new(
            "users",
            vec![FieldDefinition::new("id", BaseType::Integer).expect("field")],
            Vec::new(),
        )
        .expect("table");
        let orders = TableDefinition::new(
            "orders",
            vec![
                FieldDefinition::new("user_id", BaseType::Integer)
                    .expect("field")
                    .with_fk("users"),
            ],
            Vec::new(),
        )
        .expect("table");
        let database = DatabaseDefinition::new("db", vec![users, orders]).expect("database");

        validate_references(&database).expect("references resolve");
    }

    #[test]
    fn blank_native_type_is_rejected() {
        let err = FieldDefinition::new("raw", BaseType::Native(" ".to_string())).unwrap_err();
        assert!(err.to_string().contains("raw.base_type"));
    }
}
