//! JSON file token store
//!
//! The session file is the only state shared with other processes (and with
//! older clients using the same file), so reads are forgiving and writes are
//! atomic: a temp file in the target directory is written, synced and
//! renamed over the target.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::error::StoreError;
use super::traits::TokenStore;
use super::types::{SessionRecord, StoredSession};

/// File name used in the home directory when no path is configured.
pub const DEFAULT_TOKEN_FILE: &str = ".audi_tokens.json";

/// [`TokenStore`] backed by a JSON file
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Store at an explicit path
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.audi_tokens.json`, if a home directory is known
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DEFAULT_TOKEN_FILE))
    }

    /// Store at [`Self::default_path`]
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the home directory cannot be determined.
    pub fn at_default_location() -> Result<Self, StoreError> {
        Self::default_path().map(Self::new).ok_or_else(|| {
            StoreError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                "home directory not available for the token file",
            ))
        })
    }

    /// Location of the session file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(path: &Path) -> Result<Option<SessionRecord>, StoreError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No token file");
                return Ok(None);
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                warn!(path = %path.display(), error = %e, "Ignoring token file that is not UTF-8");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            debug!(path = %path.display(), "Token file is empty");
            return Ok(None);
        }

        let stored: StoredSession = match serde_json::from_str(&contents) {
            Ok(stored) => stored,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable token file");
                return Ok(None);
            }
        };

        let record = stored.into_record();
        if record.is_none() {
            warn!(path = %path.display(), "Ignoring token file without an access token");
        }
        Ok(record)
    }

    fn write(path: &Path, stored: &StoredSession) -> Result<(), StoreError> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut temp = NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut temp, stored)?;
        temp.write_all(b"\n")?;
        restrict_permissions(temp.as_file())?;
        temp.as_file().sync_all()?;
        temp.persist(path)?;

        debug!(path = %path.display(), "Token file written");
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(file: &std::fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &std::fs::File) -> std::io::Result<()> {
    Ok(())
}

fn join_error(e: tokio::task::JoinError) -> StoreError {
    StoreError::Io(std::io::Error::other(e))
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<SessionRecord>, StoreError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::read(&path)).await.map_err(join_error)?
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let path = self.path.clone();
        let stored = StoredSession::from(record);
        tokio::task::spawn_blocking(move || Self::write(&path, &stored))
            .await
            .map_err(join_error)?
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for auth::store.
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    use super::*;
    use crate::auth::types::{CapabilityToken, TokenSet};

    fn sample_record() -> SessionRecord {
        SessionRecord::new(
            TokenSet {
                access_token: "access-1".to_string(),
                refresh_token: Some("refresh-1".to_string()),
                id_token: Some("id-1".to_string()),
                expiry: Utc::now() + Duration::hours(1),
            },
            CapabilityToken {
                token: "mbb-1".to_string(),
                expiry: Utc::now() + Duration::minutes(30),
            },
        )
    }

    /// Validates that a saved record loads back unchanged.
    #[tokio::test]
    async fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join("tokens.json"));
        let record = sample_record();

        store.save(&record).await.unwrap();
        let loaded = store.load().await.unwrap();

        assert_eq!(loaded, Some(record));
    }

    #[tokio::test]
    async fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join("absent.json"));
        assert_eq!(store.load().await.unwrap(), None);
    }

    /// Validates that empty and corrupt files are treated as no session.
    #[tokio::test]
    async fn test_empty_and_corrupt_files_are_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.json");
        let store = FileTokenStore::new(&path);

        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(store.load().await.unwrap(), None);

        std::fs::write(&path, "{\"access_token\": ").unwrap();
        assert_eq!(store.load().await.unwrap(), None);

        std::fs::write(&path, r#"{"mbb_token":"orphan","mbb_token_expiry":null}"#).unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_non_utf8_file_is_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0x7b]).unwrap();

        assert_eq!(FileTokenStore::new(&path).load().await.unwrap(), None);
    }

    /// Validates that files written by older clients (naive local
    /// timestamps) are accepted.
    #[tokio::test]
    async fn test_loads_naive_timestamps() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.json");
        std::fs::write(
            &path,
            r#"{
                "access_token": "a",
                "refresh_token": "r",
                "id_token": "i",
                "mbb_token": "m",
                "token_expiry": "2099-01-01T10:00:00.123456",
                "mbb_token_expiry": "2099-01-01T09:30:00"
            }"#,
        )
        .unwrap();

        let record = FileTokenStore::new(&path).load().await.unwrap().unwrap();
        assert_eq!(record.refresh_token(), Some("r"));
        assert!(record.valid_capability(Duration::zero()).is_some());
    }

    /// Validates that saves replace the file and leave no temp files.
    #[tokio::test]
    async fn test_save_replaces_atomically() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.json");
        let store = FileTokenStore::new(&path);

        store.save(&sample_record()).await.unwrap();
        let mut second = sample_record();
        second.tokens.access_token = "access-2".to_string();
        store.save(&second).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(store.load().await.unwrap().unwrap().tokens.access_token, "access-2");

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["mbb_token"], "mbb-1");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_mode_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.json");
        FileTokenStore::new(&path).save(&sample_record()).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_default_path_file_name() {
        if let Some(path) = FileTokenStore::default_path() {
            assert!(path.ends_with(DEFAULT_TOKEN_FILE));
        }
    }
}
