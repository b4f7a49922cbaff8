//! Engine configuration schema and loading.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;

/// Configuration load errors. Only fatal at startup when an explicitly
/// requested file cannot be used; the fallback chain otherwise degrades to
/// built-in defaults.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("could not parse {0}: {1}")]
    Parse(PathBuf, #[source] toml::de::Error),
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ZipldConfig {
    pub paths: PathsConfig,
    pub remote: RemoteConfig,
    pub deploy: DeployConfig,
    pub preflight: PreflightConfig,
    pub ingest: IngestConfig,
    pub policy: PolicyConfig,
}

/// Local filesystem layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding the analysis payload scripts.
    pub payload_dir: PathBuf,
    /// Root under which per-host result directories are recreated.
    pub results_root: PathBuf,
    /// Root for persistent stores (registry, raw/classified results).
    pub data_dir: PathBuf,
    /// Directory where per-user private keys are materialized.
    pub key_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            payload_dir: PathBuf::from("./payload"),
            results_root: PathBuf::from("./data/results"),
            data_dir: PathBuf::from("./data"),
            key_dir: PathBuf::from("./data/secret"),
        }
    }
}

/// Remote transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Remote workspace root; the host short name is appended per run.
    pub tmp_root: String,
    pub connect_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            tmp_root: defaults::DEFAULT_REMOTE_TMP_ROOT.to_string(),
            connect_timeout_secs: defaults::DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

/// Deployment fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Bounded worker-pool cap for concurrent host workflows.
    pub worker_cap: usize,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            worker_cap: defaults::DEFAULT_WORKER_CAP,
        }
    }
}

/// Dry-run thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreflightConfig {
    /// /tmp usage above this percentage fails the space check.
    pub tmp_space_max_percent: u32,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            tmp_space_max_percent: defaults::DEFAULT_TMP_SPACE_MAX_PERCENT,
        }
    }
}

/// Ingestion gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Minimum viable CSV size in bytes.
    pub min_viable_bytes: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            min_viable_bytes: defaults::DEFAULT_MIN_VIABLE_BYTES,
        }
    }
}

/// Network-policy service endpoints. Credentials come from the environment
/// (`CIRRUS_USER` / `CIRRUS_PASSWORD`), never from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub token_url: String,
    pub egress_url: String,
    pub project_id: String,
    pub cluster_id: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            token_url: "https://api.cirrus.ibm.com/v1/identity/token".to_string(),
            egress_url: "https://api.cirrus.ibm.com/v1/firewall/flows".to_string(),
            project_id: String::new(),
            cluster_id: String::new(),
        }
    }
}

impl ZipldConfig {
    /// Load configuration using the documented precedence chain.
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var("ZIPLD_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded engine config from ZIPLD_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from ZIPLD_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "ZIPLD_CONFIG points to non-existent file, falling back");
            }
        }

        // 2. Check ./zipld.toml
        let local = PathBuf::from("zipld.toml");
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded engine config from ./zipld.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./zipld.toml, using defaults");
                }
            }
        }

        // 3. Defaults
        info!("No zipld.toml found — using built-in defaults");
        Self::default()
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
    }
}
