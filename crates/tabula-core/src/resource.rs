use std::fmt;
use std::path::{Path, PathBuf};

use jsonschema::JSONSchema;
use schemars::{JsonSchema, schema_for};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::{DatabaseDefinition, FieldDefinition, TableDefinition};
use crate::types::{BaseType, SpecialType, Value, VisibilityType};

/// Field entry of a dataset resource.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    pub name: String,
    pub base_type: BaseType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_type: Option<SpecialType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<VisibilityType>,
    /// Name of the referenced table when the field is a foreign key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Table entry of a dataset resource.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TableSpec {
    pub name: String,
    pub fields: Vec<FieldSpec>,
    /// Rows aligned positionally with `fields`.
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// JSON Schema of a dataset resource (an array of table specs).
pub fn dataset_json_schema() -> Result<serde_json::Value> {
    let schema = schema_for!(Vec<TableSpec>);
    Ok(serde_json::to_value(&schema)?)
}

/// Parse raw resource text into a database definition named `name`.
///
/// Structural problems (schema violations, bad JSON, row width mismatches)
/// are reported as [`Error::MalformedResource`] naming the dataset.
pub fn parse_dataset(name: &str, raw: &str) -> Result<DatabaseDefinition> {
    let malformed = |reason: String| Error::MalformedResource {
        name: name.to_string(),
        reason,
    };

    let document: serde_json::Value =
        serde_json::from_str(raw).map_err(|err| malformed(err.to_string()))?;

    let schema = dataset_json_schema()?;
    let issues = schema_issues(&schema, &document).map_err(malformed)?;
    if !issues.is_empty() {
        return Err(malformed(issues.join("; ")));
    }

    let tables: Vec<TableSpec> =
        serde_json::from_value(document).map_err(|err| malformed(err.to_string()))?;
    database_from_specs(name, tables).map_err(|err| match err {
        Error::SchemaValidation { path, message } => malformed(format!("{path}: {message}")),
        other => other,
    })
}

fn schema_issues(
    schema: &serde_json::Value,
    document: &serde_json::Value,
) -> std::result::Result<Vec<String>, String> {
    let compiled = JSONSchema::compile(schema).map_err(|err| err.to_string())?;

    let mut issues = Vec::new();
    if let Err(errors) = compiled.validate(document) {
        for error in errors {
            let path = error.instance_path.to_string();
            let path = if path.is_empty() { "/".to_string() } else { path };
            issues.push(format!("{path}: {error}"));
        }
    }
    Ok(issues)
}

/// Build a database definition from resource table specs.
pub fn database_from_specs(name: &str, tables: Vec<TableSpec>) -> Result<DatabaseDefinition> {
    let tables = tables
        .into_iter()
        .map(|table| {
            let fields = table
                .fields
                .into_iter()
                .map(field_from_spec)
                .collect::<Result<Vec<_>>>()?;
            let definition = TableDefinition::new(table.name, fields, table.rows)?;
            Ok(match table.comment {
                Some(comment) => definition.with_comment(comment),
                None => definition,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    DatabaseDefinition::new(name, tables)
}

fn field_from_spec(spec: FieldSpec) -> Result<FieldDefinition> {
    let mut field = FieldDefinition::new(spec.name, spec.base_type)?;
    if let Some(special_type) = spec.special_type {
        field = field.with_special_type(special_type);
    }
    if let Some(visibility) = spec.visibility {
        field = field.with_visibility(visibility);
    }
    if let Some(fk) = spec.fk {
        field = field.with_fk(fk);
    }
    if let Some(comment) = spec.comment {
        field = field.with_comment(comment);
    }
    Ok(field)
}

/// Render a database definition back into resource table specs.
pub fn specs_from_database(database: &DatabaseDefinition) -> Vec<TableSpec> {
    database
        .tables()
        .iter()
        .map(|table| TableSpec {
            name: table.name().to_string(),
            fields: table
                .fields()
                .iter()
                .map(|field| FieldSpec {
                    name: field.name().to_string(),
                    base_type: field.base_type().clone(),
                    special_type: field.special_type(),
                    visibility: field.visibility(),
                    fk: field.fk().map(str::to_string),
                    comment: field.comment().map(str::to_string),
                })
                .collect(),
            rows: table.rows().to_vec(),
            comment: table.comment().map(str::to_string),
        })
        .collect()
}

/// Source of raw dataset resources, addressed by dataset name.
pub trait ResourceLoader: fmt::Debug + Send + Sync {
    /// Human-readable location of the named resource, used in errors.
    fn location(&self, name: &str) -> String;

    /// Read the raw resource text, failing with [`Error::ResourceNotFound`] when absent.
    fn read(&self, name: &str) -> Result<String>;
}

/// Loads `<root>/<name>.json` files.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.json"))
    }
}

impl ResourceLoader for DirectoryLoader {
    fn location(&self, name: &str) -> String {
        self.path_for(name).display().to_string()
    }

    fn read(&self, name: &str) -> Result<String> {
        let path = self.path_for(name);
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(raw),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(Error::ResourceNotFound {
                name: name.to_string(),
                location: path.display().to_string(),
            }),
            Err(err) => Err(Error::Io(err)),
        }
    }
}
