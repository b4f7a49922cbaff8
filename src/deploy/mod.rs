//! Deployment — concurrent multi-host workflow execution and dry-run
//! preflight validation.
//!
//! ## Architecture
//!
//! - **workflow**: the five-step per-host sequence (reset workspace, upload
//!   payload, run driver, retrieve CSVs, clean up). Strictly sequential
//!   within one host.
//! - **DeploymentOrchestrator**: fans the workflow out across N hosts with a
//!   bounded worker pool, isolates per-host failure and streams progress
//!   snapshots.
//! - **PreflightValidator**: four-stage dry-run check pipeline with
//!   short-circuit on the firewall stage.

pub mod orchestrator;
pub mod preflight;
pub mod workflow;

pub use orchestrator::DeploymentOrchestrator;
pub use preflight::PreflightValidator;
