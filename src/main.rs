use std::path::PathBuf;

use clap::Parser;
use table_archiver::{
    Archiver, ArchiverConfig, RunReport,
    config::{self, FailurePolicy},
    observability,
};

/// Config file picked up from the working directory when --config is absent.
const LOCAL_CONFIG_FILE: &str = "table-archiver.toml";

/// CLI arguments for the table archiver
#[derive(Parser, Debug)]
#[command(
    version,
    about = "Archive stale database tables to object storage and drop them",
    long_about = None
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./table-archiver.toml if it exists,
    /// otherwise the built-in defaults with DB_* environment variables)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Archive and drop every stale table (default)
    Run {
        /// Select and log candidates without exporting, uploading or dropping
        #[arg(long)]
        dry_run: bool,
        /// Continue with the next table after a failure instead of halting
        #[arg(long)]
        skip_on_error: bool,
    },
    /// Print the tables that would be archived, one per line
    Candidates,
    /// Drop one table whose archive is already in the bucket
    ///
    /// Use this to retry a drop that failed after a successful upload.
    Drop {
        /// Table to drop
        table: String,
        /// Drop even if no archive is found in the bucket
        #[arg(long)]
        force: bool,
    },
    /// Write a commented configuration file
    Init {
        /// Path to create the config file (defaults to ./table-archiver.toml)
        #[arg(short, long)]
        output: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Init { output, force }) => run_init(output, force),
        Some(Command::Candidates) => run_candidates(args.config.as_deref()).await,
        Some(Command::Drop { table, force }) => {
            run_drop(args.config.as_deref(), &table, force).await
        }
        Some(Command::Run {
            dry_run,
            skip_on_error,
        }) => run_archive(args.config.as_deref(), dry_run, skip_on_error).await,
        None => run_archive(args.config.as_deref(), false, false).await,
    }
}

/// Load configuration and initialize logging, exiting on failure.
fn load_config(explicit_config_path: Option<&str>) -> ArchiverConfig {
    let path = explicit_config_path.map(PathBuf::from).or_else(|| {
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        local.exists().then_some(local)
    });

    let result = match &path {
        Some(path) => ArchiverConfig::from_file(path),
        None => ArchiverConfig::from_env(),
    };

    let config = match result {
        Ok(c) => c,
        Err(e) => {
            match &path {
                Some(path) => eprintln!("Failed to load config from {}: {}", path.display(), e),
                None => eprintln!("Failed to load config from environment: {}", e),
            }
            std::process::exit(1);
        }
    };

    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    tracing::debug!(
        config_file = path.as_ref().map(|p| p.display().to_string()),
        "Configuration loaded"
    );

    config
}

async fn build_archiver(config: &ArchiverConfig) -> Archiver {
    match Archiver::from_config(config).await {
        Ok(archiver) => archiver,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize archiver");
            std::process::exit(1);
        }
    }
}

async fn run_archive(explicit_config_path: Option<&str>, dry_run: bool, skip_on_error: bool) {
    let mut config = load_config(explicit_config_path);
    if dry_run {
        config.pipeline.dry_run = true;
    }
    if skip_on_error {
        config.pipeline.failure_policy = FailurePolicy::Skip;
    }

    tracing::info!(
        database = %config.database.database,
        host = %config.database.host,
        destination = %config.storage.destination(),
        failure_policy = ?config.pipeline.failure_policy,
        dry_run = config.pipeline.dry_run,
        "Starting archival run"
    );

    let archiver = build_archiver(&config).await;
    match archiver.run().await {
        Ok(report) => {
            print_summary(&report);
            if !report.is_success() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Archival run failed");
            std::process::exit(1);
        }
    }
}

fn print_summary(report: &RunReport) {
    if report.dry_run {
        tracing::info!(
            candidates = report.candidates.len(),
            "DRY RUN: no tables were exported, uploaded or dropped"
        );
        return;
    }

    for failure in &report.failures {
        tracing::error!(
            table = %failure.table,
            stage = %failure.stage,
            error = %failure.error,
            "Table not archived"
        );
    }

    let not_attempted = report.candidates.len()
        - report.archived.len()
        - report.failures.len()
        - report.skipped.len();
    tracing::info!(
        archived = report.archived.len(),
        failed = report.failures.len(),
        skipped = report.skipped.len(),
        not_attempted,
        "Summary"
    );
}

async fn run_candidates(explicit_config_path: Option<&str>) {
    let config = load_config(explicit_config_path);
    let archiver = build_archiver(&config).await;

    match archiver.candidates().await {
        Ok(tables) => {
            for table in tables {
                println!("{}", table);
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to select candidate tables");
            std::process::exit(1);
        }
    }
}

async fn run_drop(explicit_config_path: Option<&str>, table: &str, force: bool) {
    let config = load_config(explicit_config_path);
    let archiver = build_archiver(&config).await;

    match archiver.drop_archived(table, force).await {
        Ok(Some(object)) => tracing::info!(
            table,
            bucket = %object.bucket,
            key = %object.key,
            size = object.size,
            "Dropped table with verified archive"
        ),
        Ok(None) => tracing::info!(table, "Dropped table"),
        Err(e) => {
            tracing::error!(table, error = %e, "Failed to drop table");
            std::process::exit(1);
        }
    }
}

/// Create a default configuration file.
fn run_init(output: Option<String>, force: bool) {
    let output_path = output
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(LOCAL_CONFIG_FILE));

    if output_path.exists() && !force {
        eprintln!(
            "Config file already exists: {}\nUse --force to overwrite.",
            output_path.display()
        );
        std::process::exit(1);
    }

    // Create parent directories if needed
    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create directory {}: {}", parent.display(), e);
        std::process::exit(1);
    }

    if let Err(e) = std::fs::write(&output_path, config::default_config_toml()) {
        eprintln!("Failed to write config file: {}", e);
        std::process::exit(1);
    }

    println!("Created config file: {}", output_path.display());
    println!();
    println!("To archive stale tables, run:");
    println!("  table-archiver run --config {}", output_path.display());
}
