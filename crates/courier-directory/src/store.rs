//! Snapshot persistence for the user directory.
//!
//! The directory lives in memory while the server runs. A [`UserStore`]
//! loads it once at startup and writes it back on shutdown.

use std::path::{Path, PathBuf};

use crate::{StoreError, UserDirectory};

/// Default snapshot file name, relative to the working directory.
pub const DEFAULT_DATA_FILE: &str = "user_data.json";

/// Loads and saves whole-directory snapshots.
pub trait UserStore: Send + Sync + 'static {
    /// Reads the stored directory. A fresh (missing or empty) store yields
    /// an empty directory, not an error.
    async fn load(&self) -> Result<UserDirectory, StoreError>;

    /// Overwrites the stored directory.
    async fn save(&self, directory: &UserDirectory) -> Result<(), StoreError>;
}

/// A [`UserStore`] backed by a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for JsonFileStore {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_FILE)
    }
}

impl UserStore for JsonFileStore {
    async fn load(&self) -> Result<UserDirectory, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "no snapshot yet, starting empty");
                return Ok(UserDirectory::new());
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(UserDirectory::new());
        }

        let directory: UserDirectory =
            serde_json::from_slice(&bytes).map_err(StoreError::Decode)?;
        tracing::info!(
            path = %self.path.display(),
            users = directory.len(),
            "user directory loaded"
        );
        Ok(directory)
    }

    async fn save(&self, directory: &UserDirectory) -> Result<(), StoreError> {
        let bytes =
            serde_json::to_vec_pretty(directory).map_err(StoreError::Encode)?;

        // Write-then-rename so a crash mid-write never truncates the
        // previous snapshot.
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::info!(
            path = %self.path.display(),
            users = directory.len(),
            "user directory saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::User;

    #[tokio::test]
    async fn test_load_missing_file_yields_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("absent.json"));

        let loaded = store.load().await.expect("missing file is not an error");
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_load_empty_file_yields_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, b"").unwrap();

        let loaded = JsonFileStore::new(&path).load().await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupt_file_returns_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, b"{ definitely not a directory").unwrap();

        let result = JsonFileStore::new(&path).load().await;
        assert!(matches!(result, Err(StoreError::Decode(_))));
    }

    #[tokio::test]
    async fn test_save_then_load_keeps_users_and_contacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("users.json"));

        let mut directory = UserDirectory::new();
        let mut alice = User::new("alice", "pw1");
        alice.add_contact("bob");
        alice.append_to_chat("bob", "alice: hello\n");
        directory.register(alice);
        directory.register(User::new("bob", "pw2"));

        store.save(&directory).await.expect("save");
        let loaded = store.load().await.expect("load");

        assert_eq!(loaded.names(), vec!["alice", "bob"]);
        assert_eq!(loaded.get("alice").unwrap().chat("bob"), Some("alice: hello\n"));
        assert!(loaded.validate_password(Some("bob"), Some("pw2")));
    }

    #[tokio::test]
    async fn test_snapshot_never_contains_plaintext_password() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        let store = JsonFileStore::new(&path);

        let mut directory = UserDirectory::new();
        directory.register(User::new("alice", "correct-horse"));
        store.save(&directory).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("correct-horse"));
    }

    #[tokio::test]
    async fn test_save_into_missing_directory_returns_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nope").join("users.json"));

        let result = store.save(&UserDirectory::new()).await;
        assert!(matches!(result, Err(StoreError::Io(_))));
    }
}
