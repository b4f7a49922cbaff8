//! Production SSH channel backed by russh + russh-sftp.
//!
//! Each operation performs the full scoped-acquisition cycle: materialize the
//! user's key, connect, authenticate, open a channel, do the work, disconnect.

use async_trait::async_trait;
use russh::client::AuthResult;
use russh::keys::PrivateKeyWithHashAlg;
use russh::{ChannelMsg, Disconnect};
use russh_sftp::client::SftpSession;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs as tokiofs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::keys::materialize_key;
use super::{RemoteChannel, RemoteError};
use crate::config::defaults::SSH_PORT;
use crate::storage::VaultRepository;

/// Minimal russh client handler. Host key checking is disabled: LPARs live on
/// a closed management network and their keys churn with every system
/// replacement.
struct ClientHandler;

impl russh::client::Handler for ClientHandler {
    type Error = RemoteError;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

/// SSH-backed [`RemoteChannel`].
pub struct SshChannel {
    vault: Arc<dyn VaultRepository>,
    key_dir: PathBuf,
    connect_timeout: Duration,
}

impl SshChannel {
    pub fn new(vault: Arc<dyn VaultRepository>, key_dir: PathBuf, connect_timeout: Duration) -> Self {
        Self {
            vault,
            key_dir,
            connect_timeout,
        }
    }

    async fn connect(
        &self,
        host: &str,
        username: &str,
    ) -> Result<russh::client::Handle<ClientHandler>, RemoteError> {
        let key_path = materialize_key(self.vault.as_ref(), &self.key_dir, username)?;
        let key = russh::keys::load_secret_key(&key_path, None).map_err(|e| RemoteError::Auth {
            user: username.to_string(),
            host: host.to_string(),
            reason: format!("unusable private key: {e}"),
        })?;

        let config = Arc::new(russh::client::Config::default());
        let mut handle = tokio::time::timeout(
            self.connect_timeout,
            russh::client::connect(config, (host.to_string(), SSH_PORT), ClientHandler),
        )
        .await
        .map_err(|_| RemoteError::Connection {
            host: host.to_string(),
            reason: format!("connect timed out after {:?}", self.connect_timeout),
        })?
        .map_err(|e| RemoteError::Connection {
            host: host.to_string(),
            reason: e.to_string(),
        })?;

        let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
        let key = PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg);
        let auth = handle
            .authenticate_publickey(username.to_string(), key)
            .await?;

        match auth {
            AuthResult::Success => Ok(handle),
            AuthResult::Failure { .. } => Err(RemoteError::Auth {
                user: username.to_string(),
                host: host.to_string(),
                reason: "public key rejected".to_string(),
            }),
        }
    }

    async fn sftp(
        handle: &russh::client::Handle<ClientHandler>,
    ) -> Result<SftpSession, RemoteError> {
        let channel = handle.channel_open_session().await?;
        channel.request_subsystem(true, "sftp").await?;
        SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| RemoteError::Transfer(format!("sftp subsystem: {e}")))
    }

    async fn disconnect(handle: russh::client::Handle<ClientHandler>) {
        let _ = handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await;
    }
}

/// Match a filename against a `*`-prefixed glob: `*.CSV` matches by suffix,
/// anything without a `*` matches exactly.
pub(crate) fn glob_match(name: &str, pattern: &str) -> bool {
    match pattern.strip_prefix('*') {
        Some(suffix) => name.ends_with(suffix),
        None => name == pattern,
    }
}

/// Split a remote path into directory and basename.
fn split_remote(remote: &str) -> (&str, &str) {
    match remote.rsplit_once('/') {
        Some((dir, base)) => (if dir.is_empty() { "/" } else { dir }, base),
        None => (".", remote),
    }
}

async fn download_one(
    sftp: &SftpSession,
    remote: &str,
    local: &Path,
) -> Result<(), RemoteError> {
    if let Some(parent) = local.parent() {
        tokiofs::create_dir_all(parent).await?;
    }
    let mut rfile = sftp
        .open(remote)
        .await
        .map_err(|e| RemoteError::Transfer(format!("open {remote}: {e}")))?;
    let mut lfile = tokiofs::File::create(local).await?;
    tokio::io::copy(&mut rfile, &mut lfile).await?;
    lfile.flush().await?;
    Ok(())
}

#[async_trait]
impl RemoteChannel for SshChannel {
    async fn run_command(
        &self,
        host: &str,
        username: &str,
        command: &str,
    ) -> Result<String, RemoteError> {
        let handle = self.connect(host, username).await?;
        debug!(host = host, command = command, "Executing remote command");

        let mut channel = handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut status = 0u32;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                ChannelMsg::ExtendedData { ref data, ext: 1 } => stderr.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status } => status = exit_status,
                ChannelMsg::Close => break,
                _ => {}
            }
        }
        let _ = channel.eof().await;
        let _ = channel.close().await;
        Self::disconnect(handle).await;

        if status != 0 {
            return Err(RemoteError::Command {
                status,
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    async fn upload_file(
        &self,
        host: &str,
        username: &str,
        local: &Path,
        remote: &str,
    ) -> Result<(), RemoteError> {
        let contents = tokiofs::read(local).await?;
        let handle = self.connect(host, username).await?;
        debug!(host = host, local = %local.display(), remote = remote, "Uploading file");

        let sftp = Self::sftp(&handle).await?;
        let result = async {
            let mut rfile = sftp
                .create(remote)
                .await
                .map_err(|e| RemoteError::Transfer(format!("create {remote}: {e}")))?;
            rfile.write_all(&contents).await?;
            rfile.flush().await?;
            rfile.shutdown().await?;
            Ok(())
        }
        .await;

        Self::disconnect(handle).await;
        result
    }

    async fn download_file(
        &self,
        host: &str,
        username: &str,
        remote: &str,
        local: &Path,
    ) -> Result<(), RemoteError> {
        let handle = self.connect(host, username).await?;
        let sftp = Self::sftp(&handle).await?;

        let (dir, base) = split_remote(remote);
        let result = async {
            if base.contains('*') {
                // scp-style glob retrieval: expand against the remote listing
                // and place every match under the local directory.
                tokiofs::create_dir_all(local).await?;
                let entries = sftp
                    .read_dir(dir)
                    .await
                    .map_err(|e| RemoteError::Transfer(format!("read_dir {dir}: {e}")))?;
                for entry in entries {
                    let name = entry.file_name();
                    if entry.metadata().is_dir() || !glob_match(&name, base) {
                        continue;
                    }
                    let remote_child = format!("{}/{}", dir.trim_end_matches('/'), name);
                    download_one(&sftp, &remote_child, &local.join(&name)).await?;
                    debug!(host = host, file = %name, "Downloaded artifact");
                }
                Ok(())
            } else {
                download_one(&sftp, remote, local).await
            }
        }
        .await;

        Self::disconnect(handle).await;
        result
    }
}
