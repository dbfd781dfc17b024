//! Encrypted per-secret file storage
//!
//! Each secret is a single file under the `secure/` directory of the config
//! home, named after the `(key, environment)` pair and sealed with the
//! platform cipher. A missing file always means "unset".

pub mod cipher;
pub mod keys;

use log::{debug, error, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::SecretError;
use cipher::{CipherError, SecretCipher};

const SECRET_EXTENSION: &str = "enc";

/// Encrypted secret storage keyed by `(key, environment)`
#[derive(Clone)]
pub struct SecretStore {
    dir: PathBuf,
    cipher: Arc<dyn SecretCipher>,
}

impl SecretStore {
    pub fn new(dir: impl Into<PathBuf>, cipher: Arc<dyn SecretCipher>) -> Self {
        Self {
            dir: dir.into(),
            cipher,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the secret: non-alphanumerics of `{key}_{environment}` become `_`
    pub fn path_for(&self, key: &str, environment: &str) -> PathBuf {
        let stem: String = format!("{key}_{environment}")
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.dir.join(format!("{stem}.{SECRET_EXTENSION}"))
    }

    fn seal(&self, value: &str) -> Result<Vec<u8>, SecretError> {
        self.cipher.encrypt(value.as_bytes()).map_err(|e| match e {
            CipherError::Unavailable(reason) | CipherError::Invalid(reason) => {
                SecretError::EncryptionUnavailable(reason)
            }
        })
    }

    /// Encrypt and store a value, replacing any previous one
    pub fn set(&self, key: &str, environment: &str, value: &str) -> Result<(), SecretError> {
        self.set_all(environment, &[(key, value)])
    }

    /// Store several values of one environment together.
    ///
    /// Everything is encrypted and staged before the first file is replaced,
    /// so a failure up to that point leaves every previous value in place.
    pub fn set_all(&self, environment: &str, entries: &[(&str, &str)]) -> Result<(), SecretError> {
        let sealed = entries
            .iter()
            .map(|(key, value)| Ok((*key, self.seal(value)?)))
            .collect::<Result<Vec<_>, SecretError>>()?;

        fs::create_dir_all(&self.dir)?;
        let mut staged = Vec::with_capacity(sealed.len());
        for (key, bytes) in &sealed {
            let path = self.path_for(key, environment);
            let staging = path.with_extension(format!("{SECRET_EXTENSION}.tmp"));
            let written = fs::write(&staging, bytes).and_then(|()| restrict_permissions(&staging));
            staged.push((*key, staging, path));
            if let Err(e) = written {
                for (_, staging, _) in &staged {
                    let _ = fs::remove_file(staging);
                }
                return Err(e.into());
            }
        }

        for (key, staging, path) in staged {
            fs::rename(&staging, &path)?;
            debug!("Stored secret '{}' for environment '{}'", key, environment);
        }
        Ok(())
    }

    /// Read a value: `Ok(None)` when unset, `Err(Corrupt)` when unreadable
    pub fn get(&self, key: &str, environment: &str) -> Result<Option<String>, SecretError> {
        let path = self.path_for(key, environment);
        let sealed = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let plaintext = self.cipher.decrypt(&sealed).map_err(|e| match e {
            CipherError::Unavailable(reason) => SecretError::EncryptionUnavailable(reason),
            CipherError::Invalid(reason) => SecretError::Corrupt {
                path: path.clone(),
                reason,
            },
        })?;

        String::from_utf8(plaintext)
            .map(Some)
            .map_err(|e| SecretError::Corrupt {
                path,
                reason: e.to_string(),
            })
    }

    /// Read a value, treating absence and corruption alike as empty.
    ///
    /// Only an unavailable encryption facility is reported.
    pub fn get_or_empty(&self, key: &str, environment: &str) -> Result<String, SecretError> {
        match self.get(key, environment) {
            Ok(value) => Ok(value.unwrap_or_default()),
            Err(e @ SecretError::EncryptionUnavailable(_)) => Err(e),
            Err(e) => {
                error!("Failed to read secret '{}' for '{}': {}", key, environment, e);
                Ok(String::new())
            }
        }
    }

    /// Remove a value; removing an unset value is not an error
    pub fn delete(&self, key: &str, environment: &str) -> Result<(), SecretError> {
        let path = self.path_for(key, environment);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Deleted secret '{}' for environment '{}'", key, environment);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove every secret an environment can own, in both auth modes.
    ///
    /// Each key is attempted; the first failure is returned afterwards.
    pub fn purge_environment(&self, environment: &str) -> Result<(), SecretError> {
        let mut first_error = None;
        for key in keys::all_keys() {
            if let Err(e) = self.delete(key, environment) {
                warn!("Failed to delete secret '{}' for '{}': {}", key, environment, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::cipher::AesGcmCipher;
    use tempfile::TempDir;

    /// AES-GCM cipher that refuses to seal the value "boom"
    struct Refusing(AesGcmCipher);

    impl SecretCipher for Refusing {
        fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
            if plaintext == b"boom" {
                return Err(CipherError::Unavailable("keychain locked".into()));
            }
            self.0.encrypt(plaintext)
        }

        fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CipherError> {
            self.0.decrypt(sealed)
        }
    }

    fn store() -> (TempDir, SecretStore) {
        let dir = TempDir::new().unwrap();
        let store = SecretStore::new(
            dir.path().join("secure"),
            Arc::new(AesGcmCipher::new([9u8; 32])),
        );
        (dir, store)
    }

    #[test]
    fn test_path_is_sanitized() {
        let (_dir, store) = store();
        let path = store.path_for(keys::OAUTH_ACCESS_TOKEN, "acme-sb");
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "environments_oauth_accesstoken_acme_sb.enc"
        );
    }

    #[test]
    fn test_roundtrip_including_empty() {
        let (_dir, store) = store();
        for value in ["", "abc", "s3cr3t with spaces & symbols!"] {
            store.set(keys::PAT_CLIENT_SECRET, "prod", value).unwrap();
            assert_eq!(
                store.get(keys::PAT_CLIENT_SECRET, "prod").unwrap().as_deref(),
                Some(value)
            );
        }
    }

    #[test]
    fn test_unset_reads_empty() {
        let (_dir, store) = store();
        assert_eq!(store.get(keys::PAT_CLIENT_ID, "prod").unwrap(), None);
        assert_eq!(store.get_or_empty(keys::PAT_CLIENT_ID, "prod").unwrap(), "");
    }

    #[test]
    fn test_file_is_not_plaintext() {
        let (_dir, store) = store();
        store.set(keys::PAT_CLIENT_SECRET, "prod", "xyz-plain").unwrap();
        let raw = fs::read(store.path_for(keys::PAT_CLIENT_SECRET, "prod")).unwrap();
        assert!(!raw.windows(9).any(|w| w == b"xyz-plain"));
    }

    #[test]
    fn test_corrupt_is_distinct_from_absent() {
        let (_dir, store) = store();
        fs::create_dir_all(store.dir()).unwrap();
        fs::write(store.path_for(keys::OAUTH_ACCESS_TOKEN, "prod"), b"garbage-bytes").unwrap();

        let result = store.get(keys::OAUTH_ACCESS_TOKEN, "prod");
        assert!(matches!(result, Err(SecretError::Corrupt { .. })));
        assert_eq!(store.get_or_empty(keys::OAUTH_ACCESS_TOKEN, "prod").unwrap(), "");
    }

    #[test]
    fn test_delete_missing_is_ok() {
        let (_dir, store) = store();
        store.delete(keys::PAT_EXPIRY, "nowhere").unwrap();
        store.set(keys::PAT_EXPIRY, "prod", "x").unwrap();
        store.delete(keys::PAT_EXPIRY, "prod").unwrap();
        assert_eq!(store.get(keys::PAT_EXPIRY, "prod").unwrap(), None);
    }

    #[test]
    fn test_purge_removes_all_keys() {
        let (_dir, store) = store();
        for key in keys::all_keys() {
            store.set(key, "prod", "value").unwrap();
            store.set(key, "dev", "value").unwrap();
        }
        store.purge_environment("prod").unwrap();
        for key in keys::all_keys() {
            assert_eq!(store.get(key, "prod").unwrap(), None);
            assert_eq!(store.get(key, "dev").unwrap().as_deref(), Some("value"));
        }
    }

    #[test]
    fn test_set_all_keeps_old_values_on_failure() {
        let dir = TempDir::new().unwrap();
        let store = SecretStore::new(
            dir.path().join("secure"),
            Arc::new(Refusing(AesGcmCipher::new([9u8; 32]))),
        );
        store.set(keys::OAUTH_ACCESS_TOKEN, "prod", "old-access").unwrap();
        store.set(keys::OAUTH_REFRESH_TOKEN, "prod", "old-refresh").unwrap();

        let result = store.set_all(
            "prod",
            &[
                (keys::OAUTH_ACCESS_TOKEN, "new-access"),
                (keys::OAUTH_REFRESH_TOKEN, "boom"),
            ],
        );
        assert!(matches!(result, Err(SecretError::EncryptionUnavailable(_))));
        assert_eq!(
            store.get(keys::OAUTH_ACCESS_TOKEN, "prod").unwrap().as_deref(),
            Some("old-access")
        );
        assert_eq!(
            store.get(keys::OAUTH_REFRESH_TOKEN, "prod").unwrap().as_deref(),
            Some("old-refresh")
        );

        store
            .set_all(
                "prod",
                &[
                    (keys::OAUTH_ACCESS_TOKEN, "new-access"),
                    (keys::OAUTH_REFRESH_TOKEN, "new-refresh"),
                ],
            )
            .unwrap();
        assert_eq!(
            store.get(keys::OAUTH_REFRESH_TOKEN, "prod").unwrap().as_deref(),
            Some("new-refresh")
        );
        let leftovers = fs::read_dir(store.dir())
            .unwrap()
            .filter(|entry| entry.as_ref().unwrap().path().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_purge_continues_past_failures() {
        let (_dir, store) = store();
        for key in keys::all_keys() {
            store.set(key, "prod", "value").unwrap();
        }
        // A directory in place of the first secret cannot be removed as a file
        let blocked = store.path_for(keys::PAT_CLIENT_ID, "prod");
        fs::remove_file(&blocked).unwrap();
        fs::create_dir(&blocked).unwrap();
        fs::write(blocked.join("keep"), b"x").unwrap();

        assert!(store.purge_environment("prod").is_err());
        assert!(blocked.exists());
        for key in keys::all_keys().filter(|key| *key != keys::PAT_CLIENT_ID) {
            assert_eq!(store.get(key, "prod").unwrap(), None);
        }
    }
}
