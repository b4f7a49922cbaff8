//! Target and vault registry.
//!
//! The engine consumes targets and private keys through the two repository
//! traits; the full CRUD surface lives outside the engine. The sled-backed
//! [`Registry`] here is the thin production implementation plus the import
//! operations the CLI needs for seeding.

use std::path::Path;
use tracing::info;

use super::StoreError;
use crate::types::LparTarget;

/// Read access to LPAR targets.
pub trait TargetRepository: Send + Sync {
    fn by_id(&self, id: u64) -> Result<Option<LparTarget>, StoreError>;
    fn by_ids(&self, ids: &[u64]) -> Result<Vec<LparTarget>, StoreError>;
    /// Targets with the enabled flag set — the scheduler bootstrap set.
    fn enabled(&self) -> Result<Vec<LparTarget>, StoreError>;
}

/// Read access to per-user SSH private keys.
pub trait VaultRepository: Send + Sync {
    fn private_key(&self, username: &str) -> Result<Option<String>, StoreError>;
}

/// Sled-backed registry holding the `lpar` and `vault` trees.
#[derive(Clone)]
pub struct Registry {
    targets: sled::Tree,
    vault: sled::Tree,
}

impl Registry {
    /// Open or create the registry inside an existing sled database.
    pub fn open(db: &sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            targets: db.open_tree("lpar")?,
            vault: db.open_tree("vault")?,
        })
    }

    /// Open a standalone registry at the given path.
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::open(&db)
    }

    /// Insert or replace a target, keyed by id.
    pub fn upsert_target(&self, target: &LparTarget) -> Result<(), StoreError> {
        let value = serde_json::to_vec(target)?;
        self.targets.insert(target.id.to_be_bytes(), value)?;
        Ok(())
    }

    /// Bulk import, used by `zipld targets import`.
    pub fn import_targets(&self, targets: &[LparTarget]) -> Result<usize, StoreError> {
        for target in targets {
            self.upsert_target(target)?;
        }
        self.targets.flush()?;
        info!(count = targets.len(), "Imported targets into registry");
        Ok(targets.len())
    }

    /// Store a private key for a user, replacing any previous key.
    pub fn set_private_key(&self, username: &str, key: &str) -> Result<(), StoreError> {
        self.vault.insert(username.as_bytes(), key.as_bytes())?;
        self.vault.flush()?;
        Ok(())
    }

    pub fn all_targets(&self) -> Result<Vec<LparTarget>, StoreError> {
        let mut targets = Vec::new();
        for item in self.targets.iter() {
            let (_key, value) = item?;
            targets.push(serde_json::from_slice(&value)?);
        }
        Ok(targets)
    }
}

impl TargetRepository for Registry {
    fn by_id(&self, id: u64) -> Result<Option<LparTarget>, StoreError> {
        match self.targets.get(id.to_be_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn by_ids(&self, ids: &[u64]) -> Result<Vec<LparTarget>, StoreError> {
        let mut targets = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(target) = self.by_id(id)? {
                targets.push(target);
            }
        }
        Ok(targets)
    }

    fn enabled(&self) -> Result<Vec<LparTarget>, StoreError> {
        Ok(self
            .all_targets()?
            .into_iter()
            .filter(|t| t.enabled)
            .collect())
    }
}

impl VaultRepository for Registry {
    fn private_key(&self, username: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .vault
            .get(username.as_bytes())?
            .map(|value| String::from_utf8_lossy(&value).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: u64, lpar: &str, enabled: bool) -> LparTarget {
        LparTarget {
            id,
            lpar: lpar.to_string(),
            hostname: format!("{}.example.com", lpar.to_lowercase()),
            username: "ipluser".to_string(),
            dataset: "SYS1.LOG".to_string(),
            enabled,
            schedule: None,
        }
    }

    fn open_registry() -> (tempfile::TempDir, Registry) {
        let dir = tempfile::tempdir().expect("tempdir");
        let registry = Registry::open_at(dir.path().join("registry")).expect("open");
        (dir, registry)
    }

    #[test]
    fn roundtrip_by_ids_preserves_targets() {
        let (_dir, registry) = open_registry();
        registry.upsert_target(&target(1, "SYSA", true)).expect("upsert");
        registry.upsert_target(&target(2, "SYSB", true)).expect("upsert");

        let loaded = registry.by_ids(&[1, 2, 99]).expect("by_ids");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].lpar, "SYSA");
    }

    #[test]
    fn enabled_filters_disabled_targets() {
        let (_dir, registry) = open_registry();
        registry.upsert_target(&target(1, "SYSA", true)).expect("upsert");
        registry.upsert_target(&target(2, "SYSB", false)).expect("upsert");

        let enabled = registry.enabled().expect("enabled");
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].lpar, "SYSA");
    }

    #[test]
    fn vault_returns_stored_key() {
        let (_dir, registry) = open_registry();
        registry
            .set_private_key("ipluser", "-----BEGIN KEY-----")
            .expect("set");
        let key = registry.private_key("ipluser").expect("get");
        assert_eq!(key.as_deref(), Some("-----BEGIN KEY-----"));
        assert!(registry.private_key("nobody").expect("get").is_none());
    }
}
