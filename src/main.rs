//! VMFS Datastore Operator
//!
//! Command line harness for the datastore lifecycle. Operations run against a
//! simulated datacenter loaded from a lab inventory file, which is written
//! back after every command so successive invocations see the same state.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vmfs_datastore_operator::{
    DatastoreConfig, DatastoreLifecycle, DatastoreState, InMemoryGateway, LabInventory,
    LifecycleConfig, LifecycleMetrics,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// VMFS Datastore Operator - lifecycle management for multi-extent datastores
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Lab inventory file describing hosts, disks and datastores
    #[arg(long, env = "LAB_INVENTORY", default_value = "lab.yaml")]
    lab: PathBuf,

    /// Lifecycle configuration file (YAML)
    #[arg(long, env = "LIFECYCLE_CONFIG")]
    config: Option<PathBuf>,

    /// Timeout for each remote call in seconds
    #[arg(long, env = "API_TIMEOUT")]
    api_timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Print collected metrics after the command
    #[arg(long)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Provision a datastore from a resource file
    Create {
        /// Datastore resource (YAML)
        #[arg(long)]
        resource: PathBuf,
        /// Where to write the observed state (JSON)
        #[arg(long)]
        state: PathBuf,
    },
    /// Refresh the observed state of a datastore
    Read {
        #[arg(long)]
        state: PathBuf,
    },
    /// Reconcile a datastore with an updated resource file
    Update {
        #[arg(long)]
        resource: PathBuf,
        #[arg(long)]
        state: PathBuf,
    },
    /// Remove a datastore and wait until it is gone
    Delete {
        #[arg(long)]
        state: PathBuf,
    },
    /// Adopt an existing datastore
    Import {
        /// Composite ID in the form DATASTOREID:HOSTID
        id: String,
        #[arg(long)]
        state: PathBuf,
    },
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting VMFS Datastore Operator");
    info!("  Version: {}", vmfs_datastore_operator::VERSION);
    info!("  Lab inventory: {}", args.lab.display());

    let config = load_config(&args)?;
    let inventory = LabInventory::from_yaml_file(&args.lab)
        .with_context(|| format!("loading lab inventory {}", args.lab.display()))?;
    let gateway = Arc::new(InMemoryGateway::from_inventory(inventory));
    let metrics = LifecycleMetrics::new()?;
    let lifecycle = DatastoreLifecycle::new(gateway.clone(), config, metrics);

    let outcome = run(&lifecycle, &args.command).await;

    // The lab is saved even on failure so that dangling datastores stay visible
    gateway
        .snapshot()
        .save_yaml_file(&args.lab)
        .with_context(|| format!("saving lab inventory {}", args.lab.display()))?;

    if args.print_metrics {
        println!("{}", lifecycle.metrics().gather_text()?);
    }

    if let Err(e) = &outcome {
        error!("Command failed: {:#}", e);
    }
    outcome
}

async fn run(lifecycle: &DatastoreLifecycle, command: &Command) -> Result<()> {
    match command {
        Command::Create { resource, state } => {
            let desired = read_resource(resource)?;
            let observed = lifecycle.create(&desired).await?;
            write_state(state, &observed)
        }
        Command::Read { state } => {
            let prior = read_state(state)?;
            let observed = lifecycle.read(&prior.id, &prior.host_system_id).await?;
            write_state(state, &observed)
        }
        Command::Update { resource, state } => {
            let desired = read_resource(resource)?;
            let prior = read_state(state)?;
            let observed = lifecycle.update(&prior, &desired).await?;
            write_state(state, &observed)
        }
        Command::Delete { state } => {
            let prior = read_state(state)?;
            let report = lifecycle.delete(&prior.id, &prior.host_system_id).await?;
            std::fs::remove_file(state)
                .with_context(|| format!("removing state file {}", state.display()))?;
            info!(
                id = %prior.id,
                remove_attempts = report.remove_attempts,
                wait_attempts = report.wait_attempts,
                "Datastore deleted"
            );
            println!("{}", serde_json::json!({ "deleted": prior.id }));
            Ok(())
        }
        Command::Import { id, state } => {
            let observed = lifecycle.import(id).await?;
            write_state(state, &observed)
        }
    }
}

// =============================================================================
// Configuration and State Files
// =============================================================================

fn load_config(args: &Args) -> Result<LifecycleConfig> {
    let mut config = match &args.config {
        Some(path) => LifecycleConfig::from_yaml_file(path)
            .with_context(|| format!("loading lifecycle config {}", path.display()))?,
        None => LifecycleConfig::default(),
    };
    if let Some(secs) = args.api_timeout {
        config = config.with_api_timeout(secs);
        config.validate()?;
    }
    Ok(config)
}

fn read_resource(path: &Path) -> Result<DatastoreConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading resource {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("parsing resource {}", path.display()))
}

fn read_state(path: &Path) -> Result<DatastoreState> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading state {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing state {}", path.display()))
}

fn write_state(path: &Path, state: &DatastoreState) -> Result<()> {
    let raw = serde_json::to_string_pretty(state)?;
    std::fs::write(path, &raw).with_context(|| format!("writing state {}", path.display()))?;
    println!("{}", raw);
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // Logs go to stderr so stdout only carries state output
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
