use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use tabula_core::{BaseType, DatabaseDefinition, FieldDefinition, SpecialType, redact_value};

use crate::error::{DriverError, Result};
use crate::id::DriverId;

/// What a set of connection details should reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionContext {
    /// The server itself, independent of any database.
    Server,
    /// One specific database on the server.
    Database,
}

/// Ordered connection parameters for a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ConnectionDetails(BTreeMap<String, String>);

impl ConnectionDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Copy with secrets masked, safe for logs.
    pub fn redacted(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|(key, value)| (key.clone(), redact_value(key, value)))
            .collect()
    }
}

impl fmt::Display for ConnectionDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs: Vec<String> = self
            .redacted()
            .into_iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        f.write_str(&pairs.join(" "))
    }
}

/// Options for [`TestExtensions::create_database`].
#[derive(Debug, Clone, Default)]
pub struct CreateDatabaseOptions {
    /// Keep an existing database of the same name instead of dropping it first.
    pub skip_drop_existing: bool,
}

/// Optional backend capabilities that tests branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverFeature {
    /// The backend can run queries in an explicit report timezone.
    SetTimezone,
    ForeignKeys,
    NestedQueries,
    Joins,
}

/// Aggregation whose output column metadata tests compare against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationKind {
    Count,
    CumulativeCount,
    Sum,
    CumulativeSum,
    Avg,
    Min,
    Max,
    Distinct,
    StdDev,
}

impl AggregationKind {
    /// Output column name of the aggregation.
    pub fn column_name(self) -> &'static str {
        match self {
            AggregationKind::Count | AggregationKind::CumulativeCount => "count",
            AggregationKind::Sum | AggregationKind::CumulativeSum => "sum",
            AggregationKind::Avg => "avg",
            AggregationKind::Min => "min",
            AggregationKind::Max => "max",
            AggregationKind::Distinct => "count",
            AggregationKind::StdDev => "stddev",
        }
    }

    fn display_name(self) -> &'static str {
        match self {
            AggregationKind::Count => "Count",
            AggregationKind::CumulativeCount => "Cumulative count",
            AggregationKind::Sum => "Sum",
            AggregationKind::CumulativeSum => "Cumulative sum",
            AggregationKind::Avg => "Average",
            AggregationKind::Min => "Min",
            AggregationKind::Max => "Max",
            AggregationKind::Distinct => "Distinct values",
            AggregationKind::StdDev => "Standard deviation",
        }
    }

    fn counts_rows(self) -> bool {
        matches!(
            self,
            AggregationKind::Count | AggregationKind::CumulativeCount | AggregationKind::Distinct
        )
    }
}

/// Where an expected result column comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnSource {
    Aggregation,
}

/// Expected metadata of an aggregation output column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub display_name: String,
    pub base_type: BaseType,
    pub special_type: Option<SpecialType>,
    pub source: ColumnSource,
}

/// Column metadata shared by every driver unless overridden.
///
/// Without a field only row counting aggregations are meaningful.
pub fn default_aggregate_column_info(
    kind: AggregationKind,
    field: Option<&FieldDefinition>,
) -> Result<ColumnInfo> {
    let Some(field) = field else {
        if !kind.counts_rows() || kind == AggregationKind::Distinct {
            return Err(DriverError::Unsupported(format!(
                "aggregation {kind:?} requires a field"
            )));
        }
        return Ok(ColumnInfo {
            name: kind.column_name().to_string(),
            display_name: kind.display_name().to_string(),
            base_type: BaseType::Integer,
            special_type: Some(SpecialType::Number),
            source: ColumnSource::Aggregation,
        });
    };

    let (base_type, special_type) = match kind {
        kind if kind.counts_rows() => (BaseType::Integer, Some(SpecialType::Number)),
        AggregationKind::Avg | AggregationKind::StdDev => (BaseType::Float, field.special_type()),
        _ => (field.base_type().clone(), field.special_type()),
    };

    Ok(ColumnInfo {
        name: kind.column_name().to_string(),
        display_name: format!("{} of {}", kind.display_name(), field.name()),
        base_type,
        special_type,
        source: ColumnSource::Aggregation,
    })
}

/// Test behavior every driver extension provides.
///
/// Defaults apply to every driver that does not override them. Extensions
/// are shared across threads and must not hold per-call state without
/// their own synchronization.
#[async_trait]
pub trait TestExtensions: fmt::Debug + Send + Sync {
    /// Parameters that reach either the server or `database` on it.
    fn connection_details(
        &self,
        context: ConnectionContext,
        database: &DatabaseDefinition,
    ) -> Result<ConnectionDetails>;

    /// Materialize schema and rows of `database`.
    async fn create_database(
        &self,
        database: &DatabaseDefinition,
        options: &CreateDatabaseOptions,
    ) -> Result<()>;

    fn supports(&self, _feature: DriverFeature) -> bool {
        false
    }

    /// Base type observed after a value of `base_type` round-trips through the backend.
    fn map_expected_type(&self, base_type: &BaseType) -> BaseType {
        base_type.clone()
    }

    /// Backend spelling of a lowercase identifier.
    fn format_identifier(&self, name: &str) -> String {
        name.to_string()
    }

    fn has_questionable_timezone_support(&self) -> bool {
        !self.supports(DriverFeature::SetTimezone)
    }

    /// Base type of synthetic identifier columns.
    fn id_field_type(&self) -> BaseType {
        BaseType::Integer
    }

    fn aggregate_column_info(
        &self,
        kind: AggregationKind,
        field: Option<&FieldDefinition>,
    ) -> Result<ColumnInfo> {
        default_aggregate_column_info(kind, field)
    }

    /// One-time setup, run before the first use of `driver`.
    fn before_run(&self, _driver: &DriverId) -> Result<()> {
        Ok(())
    }

    /// Whether [`TestExtensions::after_run`] does anything.
    fn has_after_run_hook(&self) -> bool {
        false
    }

    /// Teardown, run at most once per driver at the end of a test run.
    fn after_run(&self, _driver: &DriverId) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Bare;

    #[async_trait]
    impl TestExtensions for Bare {
        fn connection_details(
            &self,
            _context: ConnectionContext,
            _database: &DatabaseDefinition,
        ) -> Result<ConnectionDetails> {
            Ok(ConnectionDetails::new())
        }

        async fn create_database(
            &self,
            _database: &DatabaseDefinition,
            _options: &CreateDatabaseOptions,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn defaults_apply_without_overrides() {
        let bare = Bare;
        assert_eq!(bare.map_expected_type(&BaseType::Date), BaseType::Date);
        assert_eq!(bare.format_identifier("venues"), "venues");
        assert_eq!(bare.id_field_type(), BaseType::Integer);
        assert!(bare.has_questionable_timezone_support());
        assert!(!bare.has_after_run_hook());
    }

    #[test]
    fn count_without_field_is_an_integer_column() {
        let info = Bare
            .aggregate_column_info(AggregationKind::Count, None)
            .expect("count info");
        assert_eq!(info.name, "count");
        assert_eq!(info.base_type, BaseType::Integer);
        assert!(Bare.aggregate_column_info(AggregationKind::Sum, None).is_err());
    }

    #[test]
    fn field_aggregations_follow_field_types() {
        let price = FieldDefinition::new("price", BaseType::Decimal)
            .expect("field")
            .with_special_type(SpecialType::Currency);

        let sum = Bare
            .aggregate_column_info(AggregationKind::Sum, Some(&price))
            .expect("sum info");
        assert_eq!(sum.base_type, BaseType::Decimal);
        assert_eq!(sum.special_type, Some(SpecialType::Currency));
        assert_eq!(sum.display_name, "Sum of price");

        let avg = Bare
            .aggregate_column_info(AggregationKind::Avg, Some(&price))
            .expect("avg info");
        assert_eq!(avg.base_type, BaseType::Float);
    }

    #[test]
    fn redacted_details_hide_passwords() {
        let details = ConnectionDetails::new()
            .with("host", "localhost")
            .with("password", "hunter2");
        assert_eq!(details.to_string(), "host=localhost password=***");
    }
}
