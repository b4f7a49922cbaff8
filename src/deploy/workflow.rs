//! Per-host deployment workflow.
//!
//! Steps run strictly sequentially for one host; there is no overlap between
//! two steps of the same workflow and no session state shared across hosts.
//! Any step error aborts only this host's workflow.

use std::path::PathBuf;
use tokio::fs as tokiofs;
use tracing::{debug, info};

use crate::config;
use crate::config::defaults::PAYLOAD_FILES;
use crate::remote::{RemoteChannel, RemoteError};
use crate::types::LparTarget;

/// Shell snippet that idempotently resets a directory (delete-then-recreate)
/// and lists it so the caller can verify the workspace exists.
fn reset_dir_command(dir: &str) -> String {
    format!(
        "if [ -d {dir} ]; then rm -rf {dir} && mkdir -p {dir}; else mkdir -p {dir}; fi; ls -la {dir}"
    )
}

/// Remote workspace for a host: tmp root + host short name.
pub(crate) fn workspace_for(target: &LparTarget) -> String {
    let tmp_root = &config::get().remote.tmp_root;
    format!("{}{}", tmp_root, target.short_name())
}

/// Local directory receiving this host's CSV artifacts.
pub(crate) fn results_dir_for(target: &LparTarget) -> PathBuf {
    config::get().paths.results_root.join(target.short_name())
}

/// Run the full deployment workflow against one host.
///
/// Returns the hostname on success; the orchestrator converts errors into
/// the host's terminal `"ERROR: ..."` value.
pub async fn deploy_host(
    channel: &dyn RemoteChannel,
    target: &LparTarget,
) -> Result<String, RemoteError> {
    let host = target.hostname.as_str();
    let user = target.username.as_str();
    let workspace = workspace_for(target);

    // Step 1: reset the remote workspace.
    let listing = channel
        .run_command(host, user, &reset_dir_command(&workspace))
        .await?;
    if listing.is_empty() {
        return Err(RemoteError::Transfer(format!(
            "workspace {workspace} could not be created"
        )));
    }
    debug!(host = host, workspace = %workspace, "Remote workspace ready");

    // Step 2: upload the analysis payload, in order.
    let payload_dir = &config::get().paths.payload_dir;
    for file in PAYLOAD_FILES {
        channel
            .upload_file(
                host,
                user,
                &payload_dir.join(file),
                &format!("{workspace}/{file}"),
            )
            .await?;
    }
    debug!(host = host, files = PAYLOAD_FILES.len(), "Payload uploaded");

    // Step 3: run the driver script.
    let driver_output = channel
        .run_command(
            host,
            user,
            &format!(
                "{workspace}/main.sh -r cli -a {host} -q {qualifier}",
                qualifier = target.dataset
            ),
        )
        .await?;
    debug!(host = host, output_bytes = driver_output.len(), "Driver script finished");

    // Step 4: recreate the local results directory and pull the artifacts.
    let results_dir = results_dir_for(target);
    if tokiofs::metadata(&results_dir).await.is_ok() {
        tokiofs::remove_dir_all(&results_dir).await?;
    }
    tokiofs::create_dir_all(&results_dir).await?;
    channel
        .download_file(host, user, &format!("{workspace}/*.CSV"), &results_dir)
        .await?;

    // Step 5: clean up the workspace and its parent tmp root.
    channel
        .run_command(host, user, &format!("rm -rf {workspace}"))
        .await?;
    let tmp_root = config::get().remote.tmp_root.trim_end_matches('/').to_string();
    channel
        .run_command(
            host,
            user,
            &format!("if [ -d {tmp_root} ]; then rm -rf {tmp_root}; fi"),
        )
        .await?;

    info!(host = host, results = %results_dir.display(), "Deployment workflow complete");
    Ok(target.hostname.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_command_is_idempotent_shell() {
        let cmd = reset_dir_command("/tmp/ipl_analysis/sysa");
        assert!(cmd.contains("rm -rf /tmp/ipl_analysis/sysa"));
        assert!(cmd.contains("mkdir -p /tmp/ipl_analysis/sysa"));
        assert!(cmd.ends_with("ls -la /tmp/ipl_analysis/sysa"));
    }

    #[test]
    fn payload_order_is_fixed() {
        assert_eq!(
            PAYLOAD_FILES,
            [
                "ipld_calc.awk",
                "ipld_parsing.awk",
                "patterns",
                "main.sh",
                "methods.sh"
            ]
        );
    }
}
