//! Core dataset contracts for tabula.
//!
//! This crate defines the fixture dataset model (databases, tables, fields,
//! rows), the ways to obtain a definition (literal, file-backed, transformed),
//! and the flattening of foreign-key chains into a single table.

pub mod error;
pub mod flatten;
pub mod graph;
pub mod naming;
pub mod redaction;
pub mod resource;
pub mod schema;
pub mod source;
pub mod transform;
pub mod types;
pub mod validation;

pub use error::{Error, Result};
pub use flatten::{
    NestedField, NestedName, flatten_database, flatten_table, flattened, nest_fields, singularize,
};
pub use graph::{FkGraphReport, FkGraphSummary, build_fk_graph_report};
pub use naming::db_qualified_table_name;
pub use redaction::{is_sensitive_key, redact_url, redact_value};
pub use resource::{
    DirectoryLoader, FieldSpec, ResourceLoader, TableSpec, dataset_json_schema, parse_dataset,
    specs_from_database,
};
pub use schema::{DatabaseDefinition, FieldDefinition, Row, TableDefinition};
pub use source::{DatasetSource, FileBackedSource};
pub use transform::{
    Transform, TransformedSource, UpdateTable, only_tables, rename_table, transform, update_rows,
    update_table,
};
pub use types::{BaseType, SpecialType, Value, VisibilityType};
pub use validation::validate_references;
