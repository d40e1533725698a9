//! redshift-bridge CLI - move tables between local files, S3 and Redshift.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use redshift_bridge::frame::{from_delimited, to_delimited, DelimitedFormat};
use redshift_bridge::{
    BridgeError, Compression, Config, ExistencePolicy, FacadeSettings, GeneratedStatement,
    LoadSource, ObjectStoreBackend, Outcome, QueryOutput, RedshiftPool, StagedLocation,
    StagingStore, TableDefinition, TransferFacade, Warehouse,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "redshift-bridge")]
#[command(about = "Move tables between local files, S3 and Amazon Redshift")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print the statements that would run instead of running them
    #[arg(long)]
    dry_run: bool,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a table from a YAML table definition
    CreateTable {
        /// Table definition file
        definition: PathBuf,
    },

    /// Load a local delimited file into a table
    Load {
        /// Local file to load
        file: PathBuf,

        /// Table definition file; the table is created per its existence policy
        #[arg(long, conflicts_with = "infer")]
        definition: Option<PathBuf>,

        /// Infer column types from the file instead of reading a definition
        #[arg(long, requires = "table")]
        infer: bool,

        /// Target table for --infer, optionally schema-qualified
        #[arg(long)]
        table: Option<String>,

        /// Existence policy for --infer: drop-first, fail-if-exists, append-if-exists
        #[arg(long, default_value = "drop-first", value_parser = parse_existence)]
        existence: ExistencePolicy,

        /// Stage under this s3:// location instead of a generated key
        #[arg(long)]
        staging_location: Option<String>,

        /// Keep the staged object after loading
        #[arg(long)]
        retain: bool,

        /// Compression for the staged object: none, gzip, zstd
        #[arg(long, value_parser = parse_compression)]
        compression: Option<Compression>,
    },

    /// Unload a query result to an S3 prefix
    Unload {
        /// SQL query to unload
        query: String,

        /// Destination prefix, e.g. s3://bucket/exports/run_
        destination: String,

        /// Write a manifest after the data files
        #[arg(long)]
        manifest: bool,

        /// Write a single file instead of one per slice
        #[arg(long)]
        serial: bool,

        /// Overwrite existing files under the prefix
        #[arg(long)]
        allow_overwrite: bool,

        /// Output compression: none, gzip, bzip2, zstd
        #[arg(long, value_parser = parse_compression)]
        compression: Option<Compression>,
    },

    /// Read a delimited S3 object and print it as CSV
    Read {
        /// Object location, e.g. s3://bucket/exports/run_0000_part_00
        source: String,

        /// Treat the source as a key prefix and read every part under it
        #[arg(long)]
        prefix: bool,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Upload a local file to S3 unchanged
    Upload {
        file: PathBuf,
        destination: String,
    },

    /// Download an S3 object to a local file
    Download {
        source: String,
        file: PathBuf,
    },

    /// Test the warehouse and object store connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), BridgeError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(BridgeError::Config)?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);
    if cli.dry_run {
        config.transfer.dry_run = true;
    }

    let cancel_token = setup_signal_handler();

    tokio::select! {
        result = execute(cli.command, config, cli.output_json) => result,
        _ = cancel_token.cancelled() => {
            warn!("Interrupted; a staged object may have been left behind");
            Err(BridgeError::Io(std::io::Error::new(
                std::io::ErrorKind::Interrupted,
                "interrupted by signal",
            )))
        }
    }
}

async fn execute(command: Commands, config: Config, output_json: bool) -> Result<(), BridgeError> {
    if let Commands::HealthCheck = command {
        return health_check(&config, output_json).await;
    }

    let needs_warehouse = matches!(
        command,
        Commands::CreateTable { .. } | Commands::Load { .. } | Commands::Unload { .. }
    );
    let facade = build_facade(&config, needs_warehouse).await?;
    let defaults = &config.transfer.options;

    match command {
        Commands::CreateTable { definition } => {
            let definition = read_definition(&definition)?;
            let outcome = facade.create_table(&definition).await?;
            report(&outcome, output_json, |_| {
                println!("Created table {}", definition.name());
                Ok(())
            })?;
        }

        Commands::Load {
            file,
            definition,
            infer,
            table,
            existence,
            staging_location,
            retain,
            compression,
        } => {
            let mut opts = defaults.clone();
            opts.retain_staged |= retain;
            if let Some(c) = compression {
                opts.compression = c;
            }

            let frame;
            let (source, target) = match (definition, table) {
                (Some(path), _) => (LoadSource::File(&file), read_definition(&path)?),
                (None, Some(name)) if infer => {
                    frame = read_local_frame(&file, &opts.local_format())?;
                    let target = facade.infer_definition(
                        &frame,
                        name.parse()?,
                        existence,
                        &HashMap::new(),
                    )?;
                    (LoadSource::Frame(&frame), target)
                }
                _ => {
                    return Err(BridgeError::Config(
                        "load needs --definition or --infer with --table".into(),
                    ))
                }
            };

            let outcome = match staging_location {
                Some(uri) => {
                    let location = StagedLocation::parse(&uri)?;
                    facade.load_at(source, location, &target, &opts).await?
                }
                None => facade.load(source, &target, &opts).await?,
            };
            report(&outcome, output_json, |r| {
                println!("Loaded {} rows into {}", r.rows_loaded, target.name());
                println!("  Staged object: s3://{}/{}", r.artifact.bucket, r.artifact.key);
                println!("  Final state: {}", r.state);
                if let Some(w) = &r.cleanup_warning {
                    println!("  Warning: {}", w);
                }
                Ok(())
            })?;
        }

        Commands::Unload {
            query,
            destination,
            manifest,
            serial,
            allow_overwrite,
            compression,
        } => {
            let mut opts = defaults.clone();
            opts.manifest |= manifest;
            opts.unload.allow_overwrite |= allow_overwrite;
            if serial {
                opts.unload.parallel = false;
            }
            if let Some(c) = compression {
                opts.compression = c;
            }
            let destination = StagedLocation::parse(&destination)?;
            let outcome = facade.unload(&query, &destination, &opts).await?;
            report(&outcome, output_json, |artifacts| {
                println!("Unloaded {} object(s):", artifacts.len());
                for a in artifacts {
                    println!("  s3://{}/{}", a.bucket, a.key);
                }
                Ok(())
            })?;
        }

        Commands::Read {
            source,
            prefix,
            output,
        } => {
            let location = StagedLocation::parse(&source)?;
            let outcome = if prefix {
                facade.read_prefix(&location, defaults).await?
            } else {
                facade.read(&location, defaults).await?
            };
            let Outcome::Executed(frame) = outcome else {
                println!("Dry run: would read {}", location);
                return Ok(());
            };
            let text = to_delimited(&frame, &DelimitedFormat::default())?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &text)?;
                    println!("Wrote {} rows to {}", frame.height(), path.display());
                }
                None => print!("{}", String::from_utf8_lossy(&text)),
            }
        }

        Commands::Upload { file, destination } => {
            let location = StagedLocation::parse(&destination)?;
            let outcome = facade.upload_file(&file, &location).await?;
            report(&outcome, output_json, |a| {
                println!("Uploaded {} to s3://{}/{}", file.display(), a.bucket, a.key);
                Ok(())
            })?;
        }

        Commands::Download { source, file } => {
            let location = StagedLocation::parse(&source)?;
            let outcome = facade.download_file(&location, &file).await?;
            report(&outcome, output_json, |bytes| {
                println!("Downloaded {} bytes to {}", bytes, file.display());
                Ok(())
            })?;
        }

        Commands::HealthCheck => unreachable!(), // Handled above
    }

    Ok(())
}

/// Stands in for the warehouse when a command never executes statements.
struct Disconnected;

#[async_trait]
impl Warehouse for Disconnected {
    async fn execute(&self, _statement: &GeneratedStatement) -> Result<QueryOutput, BridgeError> {
        Err(BridgeError::Config(
            "no warehouse connection was opened for this command".into(),
        ))
    }
}

async fn build_facade(config: &Config, needs_warehouse: bool) -> Result<TransferFacade, BridgeError> {
    let store: Arc<dyn StagingStore> =
        Arc::new(ObjectStoreBackend::new(config.object_store.clone()));
    let warehouse: Arc<dyn Warehouse> = if needs_warehouse && !config.transfer.dry_run {
        Arc::new(RedshiftPool::new(config.require_warehouse("this command")?).await?)
    } else {
        Arc::new(Disconnected)
    };
    Ok(TransferFacade::new(
        store,
        warehouse,
        FacadeSettings::from_config(&config.transfer),
    ))
}

fn read_definition(path: &Path) -> Result<TableDefinition, BridgeError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

fn read_local_frame(
    path: &Path,
    format: &DelimitedFormat,
) -> Result<redshift_bridge::DataFrame, BridgeError> {
    let data = std::fs::read(path)?;
    let raw = Compression::from_key(&path.to_string_lossy()).decode(&data)?;
    from_delimited(&raw, format)
}

/// Print an outcome: statements for a dry run, otherwise the value as JSON
/// or through `human`.
fn report<T: Serialize>(
    outcome: &Outcome<T>,
    output_json: bool,
    human: impl FnOnce(&T) -> Result<(), BridgeError>,
) -> Result<(), BridgeError> {
    match outcome {
        Outcome::DryRun(statements) => {
            if output_json {
                let shown: Vec<String> = statements.iter().map(|s| s.redacted()).collect();
                println!("{}", serde_json::to_string_pretty(&shown)?);
            } else if statements.is_empty() {
                println!("Dry run: no statements");
            } else {
                println!("Dry run: {} statement(s) would be executed\n", statements.len());
                for s in statements {
                    println!("{};\n", s);
                }
            }
            Ok(())
        }
        Outcome::Executed(value) if output_json => {
            println!("{}", serde_json::to_string_pretty(value)?);
            Ok(())
        }
        Outcome::Executed(value) => human(value),
    }
}

#[derive(Debug, Serialize)]
struct HealthCheckResult {
    healthy: bool,
    warehouse_connected: bool,
    warehouse_latency_ms: u64,
    warehouse_error: Option<String>,
    store_connected: bool,
    store_latency_ms: u64,
    store_error: Option<String>,
}

async fn health_check(config: &Config, output_json: bool) -> Result<(), BridgeError> {
    let start = Instant::now();
    let warehouse_error = match config.require_warehouse("health-check") {
        Ok(wh) => RedshiftPool::new(wh).await.err().map(|e| e.to_string()),
        Err(e) => Some(e.to_string()),
    };
    let warehouse_latency_ms = start.elapsed().as_millis() as u64;

    let start = Instant::now();
    let store = ObjectStoreBackend::new(config.object_store.clone());
    let store_error = if config.transfer.staging_bucket.is_empty() {
        Some("transfer.staging_bucket is not set".to_string())
    } else {
        store
            .list(&config.transfer.staging_bucket, &config.transfer.staging_prefix)
            .await
            .err()
            .map(|e| e.to_string())
    };
    let store_latency_ms = start.elapsed().as_millis() as u64;

    let result = HealthCheckResult {
        healthy: warehouse_error.is_none() && store_error.is_none(),
        warehouse_connected: warehouse_error.is_none(),
        warehouse_latency_ms,
        warehouse_error,
        store_connected: store_error.is_none(),
        store_latency_ms,
        store_error,
    };

    if output_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Health Check Results:");
        println!(
            "  Warehouse (Redshift): {} ({}ms)",
            if result.warehouse_connected { "OK" } else { "FAILED" },
            result.warehouse_latency_ms
        );
        if let Some(ref err) = result.warehouse_error {
            println!("    Error: {}", err);
        }
        println!(
            "  Object store: {} ({}ms)",
            if result.store_connected { "OK" } else { "FAILED" },
            result.store_latency_ms
        );
        if let Some(ref err) = result.store_error {
            println!("    Error: {}", err);
        }
        println!(
            "\n  Overall: {}",
            if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
        );
    }

    if !result.healthy {
        return Err(BridgeError::pool("Health check failed", "health-check"));
    }
    Ok(())
}

fn parse_compression(s: &str) -> Result<Compression, String> {
    match s.to_lowercase().as_str() {
        "none" => Ok(Compression::None),
        "gzip" | "gz" => Ok(Compression::Gzip),
        "bzip2" | "bz2" => Ok(Compression::Bzip2),
        "zstd" | "zst" => Ok(Compression::Zstd),
        "lzop" | "lzo" => Ok(Compression::Lzop),
        other => Err(format!("unknown compression: {}", other)),
    }
}

fn parse_existence(s: &str) -> Result<ExistencePolicy, String> {
    match s.to_lowercase().replace('_', "-").as_str() {
        "drop-first" => Ok(ExistencePolicy::DropFirst),
        "fail-if-exists" => Ok(ExistencePolicy::FailIfExists),
        "append-if-exists" => Ok(ExistencePolicy::AppendIfExists),
        other => Err(format!("unknown existence policy: {}", other)),
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so stdout carries only command output.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().try_init().map_err(|e| e.to_string())
    } else {
        subscriber.try_init().map_err(|e| e.to_string())
    }
}

/// Cancel on SIGINT or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, name) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        tokio::spawn(async move {
            match signal(kind) {
                Ok(mut stream) => {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Stopping...", name);
                    token.cancel();
                }
                Err(e) => eprintln!("Failed to install {} handler: {}", name, e),
            }
        });
    }

    cancel_token
}

/// Cancel on Ctrl-C.
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping...");
            token.cancel();
        }
    });

    cancel_token
}
