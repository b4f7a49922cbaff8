//! Remote execution channel — one-shot SSH sessions against LPARs.
//!
//! Every call opens a fresh session and tears it down afterward. Remote SSH
//! daemons on these hosts are a scarce, fragile resource; sessions are never
//! pooled across calls.

pub mod keys;
pub mod session;

pub use session::SshChannel;

use async_trait::async_trait;
use std::path::Path;

use crate::storage::StoreError;

/// Transport and credential errors surfaced by the channel.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("no private key in vault for user {0}")]
    CredentialNotFound(String),
    #[error("connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },
    #[error("authentication as {user}@{host} failed: {reason}")]
    Auth {
        user: String,
        host: String,
        reason: String,
    },
    #[error("remote command exited with status {status}: {stderr}")]
    Command { status: u32, stderr: String },
    #[error("file transfer failed: {0}")]
    Transfer(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("ssh protocol error: {0}")]
    Ssh(#[from] russh::Error),
    #[error("vault lookup failed: {0}")]
    Store(#[from] StoreError),
}

/// One-shot remote operations against a single host.
///
/// The trait seam exists so orchestration and preflight can be exercised with
/// an in-memory channel in tests; `SshChannel` is the production
/// implementation.
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Run a command and return its trimmed stdout. Non-zero exit maps to
    /// [`RemoteError::Command`].
    async fn run_command(
        &self,
        host: &str,
        username: &str,
        command: &str,
    ) -> Result<String, RemoteError>;

    /// Upload a local file to the exact remote path.
    async fn upload_file(
        &self,
        host: &str,
        username: &str,
        local: &Path,
        remote: &str,
    ) -> Result<(), RemoteError>;

    /// Download from a remote path into `local`.
    ///
    /// A `*`-glob in the remote basename (e.g. `dir/*.CSV`) expands against
    /// the remote directory listing and downloads every match into `local`,
    /// which is then treated as a directory.
    async fn download_file(
        &self,
        host: &str,
        username: &str,
        remote: &str,
        local: &Path,
    ) -> Result<(), RemoteError>;
}
