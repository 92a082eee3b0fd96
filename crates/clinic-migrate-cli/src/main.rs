//! clinic-migrate CLI - legacy clinic dump migration and reconciliation.

use clap::{Parser, Subcommand};
use clinic_migrate::config::{CollectionsConfig, DisplayIdConfig};
use clinic_migrate::reconcile::{
    MergeDoctors, NormalizeDisplayIds, PruneOrphans, RelabelField, RepairDoctorLinks,
};
use clinic_migrate::{
    run_pass, Config, DumpReader, MigrateError, MigrationReport, Migrator, ParsedDump,
    PassReport, ReconcilePass, RunStatus, StoreConfig,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "clinic-migrate")]
#[command(about = "Migrate a legacy clinic SQL dump into the document store")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

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
    /// Migrate a legacy dump into the store
    Run {
        /// Path to the legacy SQL dump
        #[arg(long)]
        dump: PathBuf,

        /// Plan inserts and skips without writing
        #[arg(long)]
        dry_run: bool,

        /// Also write the run report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Re-run the link step against the current store contents
    Link {
        /// Legacy dump supplying doctor names for matching
        #[arg(long)]
        dump: Option<PathBuf>,
    },

    /// Parse a dump and print per-table row counts (no store needed)
    Inspect {
        /// Path to the legacy SQL dump
        #[arg(long)]
        dump: PathBuf,
    },

    /// Run one reconciliation pass
    #[command(subcommand)]
    Reconcile(ReconcileCommand),

    /// Test store connectivity
    HealthCheck,
}

#[derive(Subcommand)]
enum ReconcileCommand {
    /// Rebind appointments and bills from stale doctor ids
    RepairDoctorLinks {
        /// Mapping from a stale doctor id to the correct one
        #[arg(long = "map", value_name = "FROM=TO", required = true, value_parser = parse_mapping)]
        mappings: Vec<(String, String)>,
    },

    /// Merge a duplicate doctor into its survivor
    MergeDoctors {
        #[arg(long)]
        duplicate: String,

        #[arg(long)]
        survivor: String,
    },

    /// Delete migrated appointments and bills without a patient
    PruneOrphans {
        /// Delete instead of only counting
        #[arg(long)]
        confirm: bool,
    },

    /// Rewrite patient display ids into the canonical format
    NormalizeIds,

    /// Replace an obsolete field value across a collection
    Relabel {
        #[arg(long)]
        collection: String,

        #[arg(long)]
        field: String,

        #[arg(long)]
        from: String,

        #[arg(long)]
        to: String,
    },
}

fn parse_mapping(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((from, to)) if !from.trim().is_empty() && !to.trim().is_empty() => {
            Ok((from.trim().to_string(), to.trim().to_string()))
        }
        _ => Err(format!("expected FROM=TO, got {:?}", raw)),
    }
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

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    let config = match &cli.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::default(),
    };

    // Inspect only parses; it never touches the store
    if let Commands::Inspect { dump } = &cli.command {
        let reader = DumpReader::open(dump)?;
        let parsed = ParsedDump::read(&reader, &config.tables)?;
        if cli.output_json {
            println!("{}", serde_json::to_string_pretty(&parsed.stats)?);
        } else {
            println!("Dump: {}", reader.path().display());
            for (table, stats) in &parsed.stats {
                println!(
                    "  {}: {} rows, {} parsed, {} malformed",
                    table, stats.rows_seen, stats.rows_parsed, stats.rows_malformed
                );
            }
        }
        return Ok(());
    }

    // Store settings must be valid before the dump is read or the store written
    let store_config = StoreConfig::from_env()?;
    let cancel_token = setup_signal_handler();
    let collections = config.collections.clone();
    let display_id = config.display_id.clone();

    let migrator = Migrator::connect(config, &store_config)
        .await?
        .with_cancel(cancel_token);

    // Close on every path, including a failed command
    let outcome = execute(
        cli.command,
        &migrator,
        cli.output_json,
        &collections,
        display_id,
    )
    .await;
    migrator.store().close().await;
    info!(store = migrator.store().store_type(), "Closed document store");
    outcome
}

async fn execute(
    command: Commands,
    migrator: &Migrator,
    output_json: bool,
    collections: &CollectionsConfig,
    display_id: DisplayIdConfig,
) -> Result<(), MigrateError> {
    match command {
        Commands::Inspect { .. } => unreachable!(), // Handled above
        Commands::Run {
            dump,
            dry_run,
            report,
        } => {
            let result = migrator.run(&dump, dry_run).await?;
            if let Some(path) = report {
                result.save(&path)?;
                info!("Saved run report to {:?}", path);
            }

            if output_json {
                println!("{}", result.to_json()?);
            } else {
                print_run(&result);
            }
            Ok(())
        }

        Commands::Link { dump } => {
            let links = migrator.link(dump.as_deref()).await?;
            if output_json {
                println!("{}", serde_json::to_string_pretty(&links)?);
            } else {
                println!("Link step completed!");
                for link in &links {
                    println!(
                        "  {}.{}: {} found, {} linked, {} not found",
                        link.collection, link.field, link.found, link.linked, link.not_found
                    );
                }
            }
            Ok(())
        }

        Commands::Reconcile(command) => {
            let pass = reconcile_pass(command, collections, display_id);
            let report = run_pass(pass.as_ref(), migrator.store()).await?;
            if output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_pass(&report);
            }
            Ok(())
        }

        Commands::HealthCheck => {
            let result = migrator.health_check().await?;

            if output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Store ({}): {} ({}ms)",
                    result.store_type,
                    if result.connected { "OK" } else { "FAILED" },
                    result.latency_ms
                );
                if let Some(ref err) = result.error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                Err(MigrateError::Config("Health check failed".to_string()))
            } else {
                Ok(())
            }
        }
    }
}

fn reconcile_pass(
    command: ReconcileCommand,
    collections: &CollectionsConfig,
    display_id: DisplayIdConfig,
) -> Box<dyn ReconcilePass> {
    let dependents = [collections.appointments.as_str(), collections.bills.as_str()];
    match command {
        ReconcileCommand::RepairDoctorLinks { mappings } => Box::new(RepairDoctorLinks::new(
            mappings,
            &collections.doctors,
            &dependents,
        )),
        ReconcileCommand::MergeDoctors {
            duplicate,
            survivor,
        } => Box::new(MergeDoctors::new(
            &duplicate,
            &survivor,
            &collections.doctors,
            &dependents,
        )),
        ReconcileCommand::PruneOrphans { confirm } => Box::new(PruneOrphans::new(
            &[collections.bills.as_str(), collections.appointments.as_str()],
            confirm,
        )),
        ReconcileCommand::NormalizeIds => Box::new(NormalizeDisplayIds::new(
            &collections.patients,
            display_id,
        )),
        ReconcileCommand::Relabel {
            collection,
            field,
            from,
            to,
        } => Box::new(RelabelField::new(&collection, &field, from, to)),
    }
}

fn print_run(result: &MigrationReport) {
    let status_msg = match result.status {
        RunStatus::DryRun => "Dry run completed!",
        RunStatus::Completed => "Migration completed!",
    };
    println!("\n{}", status_msg);
    println!("  Run ID: {}", result.run_id);
    println!("  Duration: {:.2}s", result.duration_seconds);
    for (table, stats) in &result.parse {
        println!(
            "  Parsed {}: {}/{} rows ({} malformed)",
            table, stats.rows_parsed, stats.rows_seen, stats.rows_malformed
        );
    }
    for load in &result.loads {
        println!(
            "  {}: {} found, {} inserted, {} skipped",
            load.collection, load.found, load.inserted, load.skipped
        );
    }
    for link in &result.links {
        println!(
            "  Linked {}.{}: {} ({} not found)",
            link.collection, link.field, link.linked, link.not_found
        );
    }
    if !result.doctors.unresolved.is_empty() {
        println!("  Unresolved doctors: {:?}", result.doctors.unresolved);
    }
    for ambiguous in &result.doctors.ambiguous {
        println!(
            "  Ambiguous doctor {} ({}): {:?}",
            ambiguous.legacy_id, ambiguous.name, ambiguous.candidates
        );
    }
}

fn print_pass(report: &PassReport) {
    let suffix = if report.dry_run { " (dry run)" } else { "" };
    println!("Reconcile {}{}:", report.pass, suffix);
    println!("  Matched: {}", report.matched);
    println!("  Modified: {}", report.modified);
    println!("  Deleted: {}", report.deleted);
    for detail in &report.details {
        println!("  {}", detail);
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

    // Logs go to stderr so --output-json stays parseable
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    for (kind, label) in [
        (SignalKind::interrupt(), "SIGINT"),
        (SignalKind::terminate(), "SIGTERM"),
    ] {
        let token = cancel_token.clone();
        match signal(kind) {
            Ok(mut stream) => {
                tokio::spawn(async move {
                    stream.recv().await;
                    eprintln!("\nReceived {}. Stopping after the current chunk...", label);
                    token.cancel();
                });
            }
            Err(e) => warn!("Failed to install {} handler: {}", label, e),
        }
    }

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                eprintln!("\nReceived Ctrl-C. Stopping after the current chunk...");
                token.cancel();
            }
            Err(e) => warn!("Failed to install Ctrl-C handler: {}", e),
        }
    });

    cancel_token
}
