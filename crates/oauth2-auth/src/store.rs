//! Credential file persistence
//!
//! Stores a single credential as JSON so a later process can restore it
//! and refresh without re-running the interactive flow. Writes go through a
//! temp file + rename and the file is kept at 0600 since it holds tokens.

use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use common::Secret;

use crate::credential::Credential;
use crate::error::{Error, Result};

/// On-disk form of a `Credential`. `issued_at` is unix seconds.
#[derive(Debug, Serialize, Deserialize)]
struct StoredCredential {
    access_token: String,
    token_type: String,
    expires_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    issued_at: u64,
}

impl From<&Credential> for StoredCredential {
    fn from(credential: &Credential) -> Self {
        Self {
            access_token: credential.access_token().to_owned(),
            token_type: credential.token_type().to_owned(),
            expires_in: credential.expires_in(),
            refresh_token: credential.refresh_token().map(str::to_owned),
            scope: credential.scope().map(str::to_owned),
            issued_at: credential
                .issued_at()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }
}

impl From<StoredCredential> for Credential {
    fn from(stored: StoredCredential) -> Self {
        Credential::new(
            stored.access_token,
            stored.token_type,
            stored.expires_in,
            stored.refresh_token.map(Secret::new),
            stored.scope,
            UNIX_EPOCH + Duration::from_secs(stored.issued_at),
        )
    }
}

/// A JSON file holding one credential.
#[derive(Debug, Clone)]
pub struct CredentialFile {
    path: PathBuf,
}

impl CredentialFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored credential. `Ok(None)` when the file does not exist.
    pub async fn load(&self) -> Result<Option<Credential>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no stored credential");
                return Ok(None);
            }
            Err(e) => return Err(Error::Io(format!("reading credential file: {e}"))),
        };
        let stored: StoredCredential = serde_json::from_str(&contents)
            .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
        info!(path = %self.path.display(), "loaded stored credential");
        Ok(Some(stored.into()))
    }

    /// Persist `credential`, replacing any previous contents.
    pub async fn save(&self, credential: &Credential) -> Result<()> {
        write_atomic(&self.path, &StoredCredential::from(credential)).await
    }
}

async fn write_atomic(path: &Path, data: &StoredCredential) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing credential: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let tmp_path = dir.join(format!(".credential.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credential");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(refresh: Option<&str>) -> Credential {
        Credential::new(
            "tok1",
            "Bearer",
            3600,
            refresh.map(Secret::from),
            Some("read write".into()),
            UNIX_EPOCH + Duration::from_secs(1_700_000_000),
        )
    }

    #[tokio::test]
    async fn save_then_load_restores_fields() {
        let dir = tempfile::tempdir().unwrap();
        let file = CredentialFile::new(dir.path().join("credential.json"));

        file.save(&credential(Some("rt_1"))).await.unwrap();
        let loaded = file.load().await.unwrap().unwrap();

        assert_eq!(loaded.access_token(), "tok1");
        assert_eq!(loaded.token_type(), "Bearer");
        assert_eq!(loaded.expires_in(), 3600);
        assert_eq!(loaded.refresh_token(), Some("rt_1"));
        assert_eq!(loaded.scope(), Some("read write"));
        assert_eq!(
            loaded.issued_at(),
            UNIX_EPOCH + Duration::from_secs(1_700_000_000)
        );
    }

    #[tokio::test]
    async fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let file = CredentialFile::new(dir.path().join("absent.json"));
        assert!(file.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn absent_refresh_token_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let file = CredentialFile::new(dir.path().join("credential.json"));
        file.save(&credential(None)).await.unwrap();

        let raw = tokio::fs::read_to_string(file.path()).await.unwrap();
        assert!(!raw.contains("refresh_token"), "got: {raw}");
        assert!(file.load().await.unwrap().unwrap().refresh_token().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credential.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let err = CredentialFile::new(path).load().await.unwrap_err();
        assert!(matches!(err, Error::CredentialParse(_)), "got: {err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let file = CredentialFile::new(dir.path().join("credential.json"));
        file.save(&credential(Some("rt"))).await.unwrap();

        let mode = tokio::fs::metadata(file.path())
            .await
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600, "credential file must be 0600, got {mode:o}");
    }
}
