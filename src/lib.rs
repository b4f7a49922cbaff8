//! ZIPLD: z/OS IPL Timing Analysis
//!
//! Orchestration-and-ingestion engine for mainframe IPL timing telemetry.
//!
//! ## Architecture
//!
//! - **Remote Channel**: one-shot SSH sessions per operation (exec + SFTP)
//! - **Deployment Orchestrator**: bounded fan-out across LPARs with per-host
//!   failure isolation and streamed progress snapshots
//! - **Preflight Validator**: four-stage dry-run pipeline with firewall
//!   short-circuit
//! - **Task Scheduler**: recurring per-target jobs on a 1 Hz tick loop
//! - **Ingestion Classifier**: exactly-once CSV ingestion with
//!   Done/Fail/Garbage classification and duration arithmetic

pub mod config;
pub mod types;
pub mod events;
pub mod storage;
pub mod remote;
pub mod policy;
pub mod deploy;
pub mod scheduler;
pub mod ingest;
pub mod service;

// Re-export engine configuration
pub use config::ZipldConfig;

// Re-export commonly used types
pub use types::{
    DoneRecord, HostStatus, JobView, LastIplRecord, LparTarget, PreflightReport,
    PreflightStatus, RawIplRecord,
};

// Re-export the operation facade
pub use service::{DeployRunner, Engine, EngineError};

// Re-export components
pub use deploy::{DeploymentOrchestrator, PreflightValidator};
pub use ingest::IngestionClassifier;
pub use scheduler::TaskScheduler;

// Re-export seams
pub use events::{BroadcastSink, LogSink, ProgressEvent, ProgressSink};
pub use policy::{CirrusClient, NetworkPolicy};
pub use remote::{RemoteChannel, RemoteError, SshChannel};
pub use storage::{Registry, ResultStore, StoreError, TargetRepository, VaultRepository};
