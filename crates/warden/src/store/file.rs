//! Filesystem token backend.
//!
//! Each cache key maps to one JSON entry file in the store directory:
//!
//! ```text
//! <directory>/
//! ├── warden-access-token.json   {"value": "...", "expires_at": "2026-01-01T00:00:00Z"}
//! └── tenant_2fa.json            (key "tenant/a", escaped)
//! ```
//!
//! The directory is created owner-only (`0700`) and entry files are written
//! `0600` via write-to-temp-then-rename. File I/O runs on the blocking pool.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use warden_common::Token;

use super::TokenBackend;
use crate::error::StoreError;

#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};

/// On-disk entry format.
#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Token backend persisting one file per cache key.
#[derive(Debug, Clone)]
pub struct FileBackend {
    directory: PathBuf,
}

impl FileBackend {
    /// Opens a backend rooted at `directory`, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or restricted to
    /// its owner, or the path exists but is not a directory.
    pub fn open(directory: impl Into<PathBuf>) -> io::Result<Self> {
        let directory = directory.into();

        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o700);
        builder.create(&directory)?;

        if !fs::metadata(&directory)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "store path exists and is not a directory",
            ));
        }

        // Harden directories that already existed with looser modes
        #[cfg(unix)]
        fs::set_permissions(&directory, fs::Permissions::from_mode(0o700))?;

        debug!(directory = %directory.display(), "Opened file token store");
        Ok(Self { directory })
    }

    /// The store directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the entry file for `key`.
    #[must_use]
    pub fn entry_path(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{}.json", escape_key(key)))
    }

    fn read_entry(path: &Path) -> Result<Option<Token>, StoreError> {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let entry: StoredEntry =
            serde_json::from_str(&json).map_err(|source| StoreError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Some(Token::new(entry.value, entry.expires_at)))
    }

    fn write_entry(path: &Path, token: &Token) -> Result<(), StoreError> {
        let entry = StoredEntry {
            value: token.value().expose_secret().to_string(),
            expires_at: token.expires_at(),
        };
        let json = serde_json::to_vec(&entry).map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;

        // Atomic write: write to a unique temp file, then rename
        let temp_path = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let written = options.open(&temp_path).and_then(|mut file| {
            file.write_all(&json)?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|()| fs::rename(&temp_path, path)) {
            let _ = fs::remove_file(&temp_path);
            return Err(io_err(e));
        }

        Ok(())
    }

    fn remove_entry(path: &Path) -> Result<(), StoreError> {
        match fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(StoreError::Io {
                path: path.to_path_buf(),
                source: e,
            }),
            _ => Ok(()),
        }
    }
}

/// Runs a synchronous entry operation on the blocking thread pool.
async fn run_blocking<F, T>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Backend(format!("Task join error: {e}")))?
}

#[async_trait]
impl TokenBackend for FileBackend {
    async fn load(&self, key: &str) -> Result<Option<Token>, StoreError> {
        let path = self.entry_path(key);
        run_blocking(move || Self::read_entry(&path)).await
    }

    async fn save(&self, key: &str, token: &Token) -> Result<(), StoreError> {
        let path = self.entry_path(key);
        let token = token.clone();
        run_blocking(move || Self::write_entry(&path, &token)).await?;

        debug!(key, "Saved token entry");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.entry_path(key);
        run_blocking(move || Self::remove_entry(&path)).await
    }
}

/// Maps a cache key to a file stem.
///
/// ASCII letters, digits, and `-` pass through; every other byte becomes
/// `_xx` (lowercase hex), so distinct keys never share a file.
fn escape_key(key: &str) -> String {
    use std::fmt::Write as _;

    let mut escaped = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            escaped.push(char::from(byte));
        } else {
            let _ = write!(escaped, "_{byte:02x}");
        }
    }
    if escaped.is_empty() {
        escaped.push('_');
    }
    escaped
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use chrono::TimeDelta;
    use tempfile::TempDir;

    use super::*;

    fn setup_backend() -> (FileBackend, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let backend = FileBackend::open(temp_dir.path().join("tokens")).unwrap();
        (backend, temp_dir)
    }

    #[test]
    fn test_escape_key() {
        assert_eq!(escape_key("warden-access-token"), "warden-access-token");
        assert_eq!(escape_key("tenant/a"), "tenant_2fa");
        assert_eq!(escape_key("a_b"), "a_5fb");
        assert_eq!(escape_key(".."), "_2e_2e");
        assert_eq!(escape_key(""), "_");
        assert_ne!(escape_key("a/b"), escape_key("a_b"));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (backend, _temp) = setup_backend();
        let expires_at = Utc::now() + TimeDelta::seconds(300);

        backend
            .save("k", &Token::new("T", expires_at))
            .await
            .unwrap();
        let loaded = backend.load("k").await.unwrap().unwrap();

        assert_eq!(loaded.value().expose_secret(), "T");
        assert_eq!(loaded.expires_at(), expires_at);
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let (backend, _temp) = setup_backend();
        assert!(backend.load("absent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let expires_at = Utc::now() + TimeDelta::seconds(60);

        FileBackend::open(temp_dir.path())
            .unwrap()
            .save("k", &Token::new("persisted", expires_at))
            .await
            .unwrap();

        let reopened = FileBackend::open(temp_dir.path()).unwrap();
        let loaded = reopened.load("k").await.unwrap().unwrap();
        assert_eq!(loaded.value().expose_secret(), "persisted");
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_reported() {
        let (backend, _temp) = setup_backend();
        fs::write(backend.entry_path("k"), "not json").unwrap();

        let err = backend.load("k").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (backend, _temp) = setup_backend();

        backend.save("k", &Token::new("T", Utc::now())).await.unwrap();
        backend.remove("k").await.unwrap();
        backend.remove("k").await.unwrap();

        assert!(!backend.entry_path("k").exists());
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let (backend, _temp) = setup_backend();

        backend.save("k", &Token::new("T1", Utc::now())).await.unwrap();
        backend.save("k", &Token::new("T2", Utc::now())).await.unwrap();

        let names: Vec<_> = fs::read_dir(backend.directory())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("k.json")]);
    }

    #[test]
    fn test_open_rejects_file_path() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("occupied");
        fs::write(&file_path, "x").unwrap();

        assert!(FileBackend::open(&file_path).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_permissions_are_owner_only() {
        let (backend, _temp) = setup_backend();
        backend.save("k", &Token::new("T", Utc::now())).await.unwrap();

        let dir_mode = fs::metadata(backend.directory()).unwrap().permissions().mode();
        let file_mode = fs::metadata(backend.entry_path("k"))
            .unwrap()
            .permissions()
            .mode();

        assert_eq!(dir_mode & 0o777, 0o700);
        assert_eq!(file_mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_open_tightens_existing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let directory = temp_dir.path().join("shared");
        fs::create_dir(&directory).unwrap();
        fs::set_permissions(&directory, fs::Permissions::from_mode(0o777)).unwrap();

        let backend = FileBackend::open(&directory).unwrap();

        let mode = fs::metadata(backend.directory()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
