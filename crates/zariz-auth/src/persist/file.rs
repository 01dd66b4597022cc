//! File-backed renewal store used as the secure-storage tier on native clients.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use zariz_core::error::AppError;
use zariz_core::result::AppResult;
use zariz_core::traits::RenewalStore;
use zariz_core::types::StoredSession;

/// Persists the session as a JSON document readable only by its owner.
///
/// Writes go to a sibling temp file which is then renamed over the target,
/// so a crash never leaves a half-written document behind.
#[derive(Debug)]
pub struct FileRenewalStore {
    path: PathBuf,
    /// Serializes writers within this process.
    io_lock: Mutex<()>,
}

impl FileRenewalStore {
    /// Creates a store backed by `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            io_lock: Mutex::new(()),
        }
    }

    /// The document path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "session".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl RenewalStore for FileRenewalStore {
    async fn load(&self) -> AppResult<Option<StoredSession>> {
        let _guard = self.io_lock.lock().await;
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AppError::with_source(
                    zariz_core::error::ErrorKind::Storage,
                    format!("Failed to read session file {}", self.path.display()),
                    e,
                ));
            }
        };

        match serde_json::from_slice::<StoredSession>(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring corrupt session file");
                Ok(None)
            }
        }
    }

    async fn save(&self, session: &StoredSession) -> AppResult<()> {
        let _guard = self.io_lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec(session)?;
        let temp = self.temp_path();
        // A leftover temp file from a crash may carry looser permissions.
        match fs::remove_file(&temp).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut file = owner_only().open(&temp).await?;
        file.write_all(&body).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp, &self.path).await?;

        debug!(path = %self.path.display(), "Session persisted");
        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        let _guard = self.io_lock.lock().await;
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Options for a new file that is never readable by other users, not even
/// before the first write.
fn owner_only() -> OpenOptions {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    options
}
