//! File-based token storage.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::instrument;

use super::TokenStorage;
use crate::error::{AuthError, Result};

/// File permissions for token files (Unix only): owner read/write.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Directory permissions (Unix only): owner read/write/execute.
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// File-based token storage.
///
/// Stores each secret as a plain-text file named after its key:
/// `{dir}/{key}`.
///
/// # Security
/// - File permissions are set to 0600 (owner read/write only) on Unix
/// - Parent directories are created with 0700 permissions
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    dir: PathBuf,
}

impl FileTokenStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the directory where tokens are stored.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty() {
            return Err(AuthError::storage("Key cannot be empty"));
        }

        // Allow only alphanumeric, hyphen, and underscore
        if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(AuthError::storage(format!(
                "Invalid key '{}': contains invalid characters",
                key
            )));
        }

        Ok(self.dir.join(key))
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir).map_err(|e| {
                AuthError::storage(format!(
                    "Failed to create token directory '{}': {}",
                    self.dir.display(),
                    e
                ))
            })?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = std::fs::Permissions::from_mode(DIR_MODE);
                std::fs::set_permissions(&self.dir, perms).map_err(|e| {
                    AuthError::storage(format!(
                        "Failed to set directory permissions on '{}': {}",
                        self.dir.display(),
                        e
                    ))
                })?;
            }
        }
        Ok(())
    }

    fn write_atomic(path: &Path, content: &str) -> Result<()> {
        // Unique per write so concurrent saves of one key never share a temp file.
        let temp_path = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));

        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::OpenOptionsExt;
            std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(FILE_MODE)
                .open(&temp_path)
                .and_then(|mut f| {
                    f.write_all(content.as_bytes())?;
                    f.sync_all()
                })
                .map_err(|e| {
                    AuthError::storage(format!(
                        "Failed to write temp file '{}': {}",
                        temp_path.display(),
                        e
                    ))
                })?;
        }

        #[cfg(not(unix))]
        {
            std::fs::write(&temp_path, content).map_err(|e| {
                AuthError::storage(format!(
                    "Failed to write temp file '{}': {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if let Err(e) = std::fs::rename(&temp_path, path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(AuthError::storage(format!(
                "Failed to rename '{}' to '{}': {}",
                temp_path.display(),
                path.display(),
                e
            )));
        }
        Ok(())
    }

    fn read(path: &Path) -> Result<Option<String>> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let secret = content.trim();
                if secret.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(secret.to_string()))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AuthError::storage(format!(
                "Failed to read token file '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    fn remove(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AuthError::storage(format!(
                "Failed to remove token file '{}': {}",
                path.display(),
                e
            ))),
        }
    }
}

/// Run filesystem work off the async worker threads.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AuthError::storage(format!("Token file task failed: {}", e)))?
}

#[async_trait]
impl TokenStorage for FileTokenStorage {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.key_path(key)?;
        blocking(move || Self::read(&path)).await
    }

    #[instrument(skip(self, secret))]
    async fn save(&self, key: &str, secret: &str) -> Result<()> {
        let path = self.key_path(key)?;
        let storage = self.clone();
        let secret = secret.to_string();
        blocking(move || {
            storage.ensure_dir()?;
            Self::write_atomic(&path, &secret)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.key_path(key)?;
        blocking(move || Self::remove(&path)).await
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::{TOKEN_KEY, TokenStore};

    #[tokio::test]
    async fn test_file_save_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileTokenStorage::new(dir.path().join("tokens"));

        assert!(storage.get(TOKEN_KEY).await.unwrap().is_none());

        storage.save(TOKEN_KEY, "header.payload.sig").await.unwrap();
        assert_eq!(
            storage.get(TOKEN_KEY).await.unwrap().as_deref(),
            Some("header.payload.sig")
        );
        let entries = std::fs::read_dir(dir.path().join("tokens")).unwrap().count();
        assert_eq!(entries, 1, "temp file left behind");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let storage = FileTokenStorage::new(dir.path().join("tokens"));
        storage.save(TOKEN_KEY, "secret").await.unwrap();

        let mode = std::fs::metadata(storage.dir().join(TOKEN_KEY))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
        let dir_mode = std::fs::metadata(storage.dir()).unwrap().permissions().mode();
        assert_eq!(dir_mode & 0o777, 0o700);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_pair_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(FileTokenStorage::new(dir.path().join("tokens")));

        let writers = (0..4).map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.save_pair(&format!("access-{i}"), "refresh").await })
        });
        for writer in writers.collect::<Vec<_>>() {
            writer.await.unwrap().unwrap();
        }

        assert!(store.access_token().await.unwrap().starts_with("access-"));
        assert_eq!(store.refresh_token().await.as_deref(), Some("refresh"));
        store.clear().await;
        assert!(store.access_token().await.is_none());
    }

    #[tokio::test]
    async fn test_file_delete_missing_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileTokenStorage::new(dir.path());
        storage.delete(TOKEN_KEY).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileTokenStorage::new(dir.path());
        assert!(storage.save("../escape", "x").await.is_err());
        assert!(storage.get("a/b").await.is_err());
        assert!(storage.get("").await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_discarded_by_store() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(TOKEN_KEY), [0xff, 0xfe, 0x00, 0x80]).unwrap();

        let store = TokenStore::new(FileTokenStorage::new(dir.path()));
        assert_eq!(store.access_token().await, None);
        assert!(!dir.path().join(TOKEN_KEY).exists());
    }
}
