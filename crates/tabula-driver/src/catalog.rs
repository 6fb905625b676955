//! Bridge from dataset definitions to records persisted by the application.

use tabula_core::{DatabaseDefinition, FieldDefinition, TableDefinition, db_qualified_table_name};

/// Lookup of persisted domain records by name.
pub trait DomainCatalog {
    type Database;
    type Table;
    type Field;

    fn database_named(&self, name: &str) -> Option<Self::Database>;

    fn table_named(&self, database: &Self::Database, name: &str) -> Option<Self::Table>;

    fn field_named(&self, table: &Self::Table, name: &str) -> Option<Self::Field>;
}

pub fn database_record<C: DomainCatalog>(
    catalog: &C,
    definition: &DatabaseDefinition,
) -> Option<C::Database> {
    catalog.database_named(definition.name())
}

/// Table record by exact name, falling back to the database-qualified name.
pub fn table_record<C: DomainCatalog>(
    catalog: &C,
    database_definition: &DatabaseDefinition,
    database: &C::Database,
    definition: &TableDefinition,
) -> Option<C::Table> {
    catalog.table_named(database, definition.name()).or_else(|| {
        let qualified = db_qualified_table_name(database_definition.name(), definition.name());
        catalog.table_named(database, &qualified)
    })
}

pub fn field_record<C: DomainCatalog>(
    catalog: &C,
    table: &C::Table,
    definition: &FieldDefinition,
) -> Option<C::Field> {
    catalog.field_named(table, definition.name())
}
