mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use tabula_core::{
    DatabaseDefinition, DatasetSource, DirectoryLoader, Error as CoreError, build_fk_graph_report,
    dataset_json_schema, flattened, specs_from_database, validate_references,
};
use tabula_driver::{
    ConnectionContext, CreateDatabaseOptions, DriverError, DriverId, FixtureSettings,
    builtin_registry, load_settings,
};
use thiserror::Error;

use logging::init_logging;

#[derive(Debug, Error)]
enum CliError {
    #[error("dataset error: {0}")]
    Dataset(#[from] CoreError),
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("logging error: {0}")]
    Logging(String),
    #[error("dataset '{dataset}' has cyclic foreign keys between {}", .tables.join(", "))]
    CyclicDataset { dataset: String, tables: Vec<String> },
}

#[derive(Parser, Debug)]
#[command(name = "tabula", version, about = "Tabula fixture datasets")]
struct Cli {
    /// Settings file.
    #[arg(long, global = true, default_value = "tabula.toml")]
    config: PathBuf,
    /// Directory holding `<dataset>.json` resources (overrides settings).
    #[arg(long, global = true)]
    dataset_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a dataset and check its foreign keys.
    Validate(DatasetArgs),
    /// Print a dataset and its foreign key order.
    Inspect(DatasetArgs),
    /// Flatten one table of a dataset into a single-table resource.
    Flatten(FlattenArgs),
    /// List known drivers.
    Drivers,
    /// Materialize a dataset with a driver.
    Create(CreateArgs),
    /// Print the JSON Schema of dataset resources.
    Schema,
}

#[derive(Args, Debug)]
struct DatasetArgs {
    /// Dataset name.
    dataset: String,
}

#[derive(Args, Debug)]
struct FlattenArgs {
    dataset: String,
    /// Table to flatten.
    #[arg(long)]
    table: String,
    /// Output path; stdout when absent.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CreateArgs {
    dataset: String,
    /// Driver id.
    #[arg(long)]
    driver: String,
    /// Fail instead of dropping an existing database.
    #[arg(long, default_value_t = false)]
    skip_drop_existing: bool,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let mut settings = load_settings(&cli.config)?;
    if let Some(dir) = cli.dataset_dir {
        settings.dataset_dir = dir;
    }
    init_logging(&settings.log)?;

    match cli.command {
        Command::Validate(args) => run_validate(&settings, args),
        Command::Inspect(args) => run_inspect(&settings, args),
        Command::Flatten(args) => run_flatten(&settings, args),
        Command::Drivers => run_drivers(&settings),
        Command::Create(args) => run_create(&settings, args).await,
        Command::Schema => {
            println!("{}", serde_json::to_string_pretty(&dataset_json_schema()?)?);
            Ok(())
        }
    }
}

fn dataset_source(settings: &FixtureSettings, name: &str) -> DatasetSource {
    DatasetSource::file_backed(name, Arc::new(DirectoryLoader::new(&settings.dataset_dir)))
}

fn load_dataset(settings: &FixtureSettings, name: &str) -> Result<Arc<DatabaseDefinition>, CliError> {
    let database = dataset_source(settings, name).resolve()?;
    validate_references(&database)?;
    Ok(database)
}

fn run_validate(settings: &FixtureSettings, args: DatasetArgs) -> Result<(), CliError> {
    let database = load_dataset(settings, &args.dataset)?;
    let rows: usize = database.tables().iter().map(|table| table.row_count()).sum();
    tracing::info!(event = "dataset_validated", dataset = %database.name(), rows);
    println!(
        "{}: {} tables, {} rows",
        database.name(),
        database.tables().len(),
        rows
    );
    Ok(())
}

fn run_inspect(settings: &FixtureSettings, args: DatasetArgs) -> Result<(), CliError> {
    let database = load_dataset(settings, &args.dataset)?;
    print!("{database}");

    let report = build_fk_graph_report(&database);
    println!(
        "fk graph: {} nodes, {} edges",
        report.summary.nodes, report.summary.edges
    );
    match (&report.topo_order, &report.cycle) {
        (Some(order), _) => println!("order: {}", order.join(" -> ")),
        (None, Some(cycle)) => println!("cycle: {}", cycle.join(", ")),
        (None, None) => {}
    }
    Ok(())
}

/// Flattening follows foreign keys, so it only accepts acyclic datasets.
fn ensure_acyclic(database: &DatabaseDefinition) -> Result<(), CliError> {
    let report = build_fk_graph_report(database);
    match report.cycle {
        Some(tables) => Err(CliError::CyclicDataset {
            dataset: database.name().to_string(),
            tables,
        }),
        None => Ok(()),
    }
}

fn run_flatten(settings: &FixtureSettings, args: FlattenArgs) -> Result<(), CliError> {
    let source = dataset_source(settings, &args.dataset);
    ensure_acyclic(&*source.resolve()?)?;

    let database = flattened(&source, &args.table).resolve()?;
    let encoded = serde_json::to_string_pretty(&specs_from_database(&database))?;
    match args.out {
        Some(path) => {
            std::fs::write(&path, encoded)?;
            tracing::info!(event = "flattened_written", table = %args.table, path = %path.display());
        }
        None => println!("{encoded}"),
    }
    Ok(())
}

fn run_drivers(settings: &FixtureSettings) -> Result<(), CliError> {
    let (registry, _) = builtin_registry(settings)?;
    for descriptor in registry.drivers() {
        let parents: Vec<&str> = descriptor.parents.iter().map(DriverId::as_str).collect();
        let marker = if settings.drivers.contains(&descriptor.id) {
            "*"
        } else {
            " "
        };
        let kind = if descriptor.is_abstract {
            "abstract"
        } else {
            "driver"
        };
        println!(
            "{marker} {:<10} {kind:<8} parents=[{}] state={}",
            descriptor.id.as_str(),
            parents.join(","),
            registry.state(&descriptor.id)
        );
    }
    Ok(())
}

async fn run_create(settings: &FixtureSettings, args: CreateArgs) -> Result<(), CliError> {
    let database = load_dataset(settings, &args.dataset)?;
    let (registry, _) = builtin_registry(settings)?;
    let driver = DriverId::from(args.driver);
    if registry.descriptor(&driver).is_none() {
        return Err(DriverError::UnknownDriver(driver).into());
    }

    let timer = Instant::now();
    let extensions = registry.extensions(&driver)?;
    let options = CreateDatabaseOptions {
        skip_drop_existing: args.skip_drop_existing,
    };
    extensions.create_database(&database, &options).await?;

    let details = extensions.connection_details(ConnectionContext::Database, &database)?;
    tracing::info!(
        event = "database_created",
        driver = %driver,
        dataset = %database.name(),
        duration_ms = timer.elapsed().as_millis()
    );
    println!("{} created with {driver}: {details}", database.name());
    Ok(())
}
