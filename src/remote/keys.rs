//! Private-key materialization from the vault.
//!
//! Keys are stored in the vault as text and written to a per-user file with
//! restrictive permissions on first use. The file is rewritten whenever the
//! vault copy and the on-disk copy diverge, so a rotated key takes effect on
//! the next session.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::RemoteError;
use crate::storage::VaultRepository;

/// Normalize key text as stored in the vault: strip stray carriage returns
/// (keys pasted from Windows consoles carry them) and ensure a trailing
/// newline, which OpenSSH-format parsers require.
pub(crate) fn normalize_private_key(raw: &str) -> String {
    let mut key = raw.replace('\r', "");
    if !key.ends_with('\n') {
        key.push('\n');
    }
    key
}

/// Resolve the private key for `username` and return the path of the
/// materialized key file.
pub fn materialize_key(
    vault: &dyn VaultRepository,
    key_dir: &Path,
    username: &str,
) -> Result<PathBuf, RemoteError> {
    let raw = vault
        .private_key(username)?
        .ok_or_else(|| RemoteError::CredentialNotFound(username.to_string()))?;
    let key = normalize_private_key(&raw);

    fs::create_dir_all(key_dir)?;
    let key_path = key_dir.join(username);

    let stale = match fs::read_to_string(&key_path) {
        Ok(existing) => existing != key,
        Err(_) => true,
    };

    if stale {
        debug!(user = username, path = %key_path.display(), "Materializing private key");
        fs::write(&key_path, &key)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&key_path, fs::Permissions::from_mode(0o600))?;
        }
    }

    Ok(key_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreError;
    use std::collections::HashMap;

    struct MapVault(HashMap<String, String>);

    impl VaultRepository for MapVault {
        fn private_key(&self, username: &str) -> Result<Option<String>, StoreError> {
            Ok(self.0.get(username).cloned())
        }
    }

    #[test]
    fn normalization_strips_cr_and_appends_newline() {
        let raw = "-----BEGIN KEY-----\r\nabc\r\n-----END KEY-----";
        let key = normalize_private_key(raw);
        assert!(!key.contains('\r'));
        assert!(key.ends_with("-----END KEY-----\n"));
    }

    #[test]
    fn missing_vault_entry_is_credential_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let vault = MapVault(HashMap::new());
        let err = materialize_key(&vault, dir.path(), "ghost").expect_err("must fail");
        assert!(matches!(err, RemoteError::CredentialNotFound(user) if user == "ghost"));
    }

    #[test]
    fn key_file_written_once_and_refreshed_when_stale() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut vault = MapVault(HashMap::from([(
            "ipluser".to_string(),
            "-----BEGIN KEY-----\nv1\n-----END KEY-----".to_string(),
        )]));

        let path = materialize_key(&vault, dir.path(), "ipluser").expect("materialize");
        let first = fs::read_to_string(&path).expect("read");
        assert!(first.ends_with('\n'));

        // Unchanged vault: file content stays identical.
        materialize_key(&vault, dir.path(), "ipluser").expect("materialize");
        assert_eq!(fs::read_to_string(&path).expect("read"), first);

        // Rotated key: file is rewritten.
        vault.0.insert(
            "ipluser".to_string(),
            "-----BEGIN KEY-----\nv2\n-----END KEY-----".to_string(),
        );
        materialize_key(&vault, dir.path(), "ipluser").expect("materialize");
        assert!(fs::read_to_string(&path).expect("read").contains("v2"));
    }
}
