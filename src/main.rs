//! zipld - z/OS IPL Timing Analysis
//!
//! Deployment orchestration and telemetry ingestion for LPAR fleets
//! reachable over SSH.
//!
//! # Usage
//!
//! ```bash
//! # Run the scheduler service (bootstraps jobs from enabled targets)
//! zipld serve
//!
//! # One-shot deployment across targets 1, 2 and 3
//! zipld deploy --ids 1,2,3
//!
//! # Pre-flight checks for a host
//! zipld dry-run --host sysa.example.com --user ipluser --qualifier SYSA.SYSLOG
//!
//! # Ingest and classify retrieved CSV telemetry
//! zipld ingest
//! ```
//!
//! # Environment Variables
//!
//! - `ZIPLD_CONFIG`: Path to the engine TOML config (default: ./zipld.toml)
//! - `CIRRUS_USER` / `CIRRUS_PASSWORD`: Network-policy API credentials
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use zipld::config::{self, ZipldConfig};
use zipld::events::{BroadcastSink, LogSink, ProgressSink};
use zipld::ingest::IngestionClassifier;
use zipld::policy::{CirrusClient, NetworkPolicy, UnconfiguredPolicy};
use zipld::remote::{RemoteChannel, SshChannel};
use zipld::scheduler::TaskScheduler;
use zipld::service::{DeployRunner, Engine};
use zipld::storage::{Registry, ResultStore, TargetRepository, VaultRepository};
use zipld::types::LparTarget;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "zipld")]
#[command(about = "z/OS IPL timing analysis - fleet deployment and ingestion")]
#[command(version)]
struct CliArgs {
    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Run the scheduler service until interrupted
    Serve,

    /// Deploy the analysis payload to targets and retrieve telemetry
    Deploy {
        /// Comma-separated target ids
        #[arg(long, value_delimiter = ',')]
        ids: Vec<u64>,
    },

    /// Run the pre-flight checks for one host
    DryRun {
        #[arg(long)]
        host: String,
        #[arg(long)]
        user: String,
        #[arg(long)]
        qualifier: String,
    },

    /// Ingest and classify retrieved CSV telemetry
    Ingest,

    /// Inspect or clear scheduled jobs
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },

    /// Import LPAR targets from a TOML file
    Targets {
        #[arg(long)]
        file: PathBuf,
    },

    /// Store a private key in the vault
    Vault {
        #[arg(long)]
        user: String,
        #[arg(long)]
        key_file: PathBuf,
    },
}

#[derive(clap::Subcommand, Debug)]
enum JobsAction {
    /// List jobs bootstrapped from enabled targets
    List,
    /// Clear jobs by tag, or all jobs when no tag is given
    Clear {
        #[arg(long)]
        tag: Option<String>,
    },
}

/// Target import file: a list of `[[target]]` tables.
#[derive(Debug, serde::Deserialize)]
struct TargetsFile {
    target: Vec<LparTarget>,
}

// ============================================================================
// Wiring
// ============================================================================

struct EngineParts {
    registry: Arc<Registry>,
    engine: Engine,
}

/// Build the engine with the given sink. Every collaborator is opened from
/// the global config.
fn build_engine(sink: Arc<dyn ProgressSink>) -> Result<EngineParts> {
    let cfg = config::get();

    let registry = Arc::new(
        Registry::open_at(cfg.paths.data_dir.join("registry"))
            .context("Failed to open target registry")?,
    );
    let results = Arc::new(
        ResultStore::open(cfg.paths.data_dir.join("result_store"))
            .context("Failed to open result store")?,
    );

    let vault: Arc<dyn VaultRepository> = registry.clone();
    let channel: Arc<dyn RemoteChannel> = Arc::new(SshChannel::new(
        vault,
        cfg.paths.key_dir.clone(),
        Duration::from_secs(cfg.remote.connect_timeout_secs),
    ));

    let policy: Arc<dyn NetworkPolicy> = match CirrusClient::from_env() {
        Ok(client) => Arc::new(client),
        Err(e) => {
            warn!(error = %e, "Network-policy client not configured — dry-run firewall checks will error");
            Arc::new(UnconfiguredPolicy)
        }
    };

    let runner = Arc::new(DeployRunner::new(Arc::clone(&channel), Arc::clone(&sink)));
    let scheduler = Arc::new(TaskScheduler::new(runner));
    let ingestion = Arc::new(IngestionClassifier::from_config(results));

    let targets: Arc<dyn TargetRepository> = registry.clone();
    let engine = Engine::new(targets, channel, policy, sink, scheduler, ingestion);

    Ok(EngineParts { registry, engine })
}

// ============================================================================
// Subcommand handlers
// ============================================================================

/// Run the scheduler service until ctrl-c.
async fn serve() -> Result<()> {
    let sink = Arc::new(BroadcastSink::new(256));
    let mut events = sink.subscribe();

    // Render progress events into the log while the service runs.
    tokio::spawn(async move {
        use tokio::sync::broadcast::error::RecvError;
        loop {
            match events.recv().await {
                Ok(event) => info!(event = %event.event, payload = %event.payload, "progress"),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Progress log fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let parts = build_engine(sink)?;
    let enabled = parts.registry.enabled()?;
    info!(targets = enabled.len(), "Bootstrapping scheduler from enabled targets");

    parts.engine.scheduler().bootstrap(&enabled);
    parts.engine.scheduler().start();

    info!("zipld service running — press ctrl-c to stop");
    tokio::signal::ctrl_c().await.ok();
    info!("Shutdown signal received");
    parts.engine.scheduler().shutdown().await;
    Ok(())
}

async fn deploy(ids: Vec<u64>) -> Result<()> {
    anyhow::ensure!(!ids.is_empty(), "no target ids given");
    let parts = build_engine(Arc::new(LogSink))?;

    let results = parts
        .engine
        .run_deployment(ids)
        .await
        .context("Deployment task failed")?;
    for result in &results {
        info!(result = %result, "host settled");
    }
    let failed = results.iter().filter(|r| r.starts_with("ERROR")).count();
    info!(
        hosts = results.len(),
        failed = failed,
        "Deployment finished"
    );
    Ok(())
}

async fn dry_run(host: String, user: String, qualifier: String) -> Result<()> {
    let parts = build_engine(Arc::new(LogSink))?;
    let report = parts
        .engine
        .run_dry_run(host, user, qualifier)
        .await
        .context("Dry-run task failed")?;
    info!(
        firewall = report.firewall_rules.as_wire(),
        ssh_login = report.check_ssh_login.as_wire(),
        dataset_access = report.check_dataset_access.as_wire(),
        tmp_space = report.check_tmp_space.as_wire(),
        "Dry run finished"
    );
    Ok(())
}

async fn ingest() -> Result<()> {
    let parts = build_engine(Arc::new(LogSink))?;
    let touched = parts
        .engine
        .ingest_and_classify()
        .await
        .context("Ingestion task failed")??;
    if touched.is_empty() {
        info!("No new telemetry to ingest");
    } else {
        info!(systems = ?touched, "Ingested and classified");
    }
    Ok(())
}

fn import_targets(file: &PathBuf, registry: &Registry) -> Result<()> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let parsed: TargetsFile =
        toml::from_str(&contents).with_context(|| format!("Failed to parse {}", file.display()))?;
    let count = registry.import_targets(&parsed.target)?;
    info!(count = count, "Targets imported");
    Ok(())
}

fn import_key(user: &str, key_file: &PathBuf, registry: &Registry) -> Result<()> {
    let key = std::fs::read_to_string(key_file)
        .with_context(|| format!("Failed to read {}", key_file.display()))?;
    registry.set_private_key(user, &key)?;
    info!(user = user, "Private key stored in vault");
    Ok(())
}

// ============================================================================
// Entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    if dotenvy::dotenv().is_ok() {
        info!("Loaded environment from .env");
    }

    let args = CliArgs::parse();
    config::init(ZipldConfig::load());

    match args.command {
        SubCommand::Serve => serve().await,
        SubCommand::Deploy { ids } => deploy(ids).await,
        SubCommand::DryRun {
            host,
            user,
            qualifier,
        } => dry_run(host, user, qualifier).await,
        SubCommand::Ingest => ingest().await,
        SubCommand::Jobs { action } => {
            let parts = build_engine(Arc::new(LogSink))?;
            match action {
                JobsAction::List => {
                    let enabled = parts.registry.enabled()?;
                    parts.engine.scheduler().bootstrap(&enabled);
                    for job in parts.engine.list_scheduled_jobs() {
                        info!(
                            tag = %job.tag,
                            task = %job.task,
                            next_run = %job.next_run,
                            unit = %job.unit,
                            "job"
                        );
                    }
                    Ok(())
                }
                JobsAction::Clear { tag } => {
                    parts.engine.clear_scheduled_jobs(tag.as_deref());
                    Ok(())
                }
            }
        }
        SubCommand::Targets { file } => {
            let parts = build_engine(Arc::new(LogSink))?;
            import_targets(&file, &parts.registry)
        }
        SubCommand::Vault { user, key_file } => {
            let parts = build_engine(Arc::new(LogSink))?;
            import_key(&user, &key_file, &parts.registry)
        }
    }
}
