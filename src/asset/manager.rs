//! Asset Lifecycle Manager
//!
//! Creates and removes the directories backing volumes. Creation refuses to
//! take over an existing directory unless reuse was asked for; removal is
//! idempotent.

use crate::domain::ports::AssetOwner;
use crate::error::{Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Creates, chowns and removes asset directories
#[derive(Debug, Clone)]
pub struct AssetManager {
    dir_mode: u32,
}

impl Default for AssetManager {
    fn default() -> Self {
        Self { dir_mode: 0o755 }
    }
}

impl AssetManager {
    pub fn new(dir_mode: u32) -> Self {
        Self { dir_mode }
    }

    pub async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path)
            .await
            .map_err(|e| Error::asset_io(path, "stat", e))
    }

    /// Create the asset directory and hand it to `owner`.
    ///
    /// Without `allow_reuse` the leaf directory is created exclusively: an
    /// existing path, including one a concurrent attempt just created, is an
    /// [`Error::AssetConflict`] and is left untouched. With `allow_reuse` an
    /// existing path is kept and only re-chowned. A failing chown leaves the
    /// directory in place; see [`AssetManager::compensate`].
    pub async fn create(&self, path: &Path, owner: AssetOwner, allow_reuse: bool) -> Result<()> {
        if allow_reuse {
            if self.exists(path).await? {
                debug!("Reusing existing storage asset {}", path.display());
            }
            self.mkdir(path, true).await?;
        } else {
            if let Some(parent) = path.parent() {
                self.mkdir(parent, true).await?;
            }
            self.mkdir(path, false).await?;
        }

        info!("Storage asset {} created", path.display());

        chown(path.to_path_buf(), owner).await?;

        info!("Storage asset {} ownership set to {}", path.display(), owner);
        Ok(())
    }

    async fn mkdir(&self, path: &Path, recursive: bool) -> Result<()> {
        match fs::DirBuilder::new()
            .recursive(recursive)
            .mode(self.dir_mode)
            .create(path)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if !recursive && e.kind() == ErrorKind::AlreadyExists => Err(Error::AssetConflict {
                path: path.to_path_buf(),
            }),
            Err(e) => Err(Error::asset_io(path, "create", e)),
        }
    }

    /// Recursively remove the asset; an absent path is not an error
    pub async fn delete(&self, path: &Path) -> Result<()> {
        match fs::remove_dir_all(path).await {
            Ok(()) => {
                info!("Storage asset {} deleted", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Storage asset {} already absent", path.display());
                Ok(())
            }
            Err(e) => Err(Error::asset_io(path, "remove", e)),
        }
    }

    /// Undo a fresh creation after a later step of the same attempt failed,
    /// so the next attempt does not run into [`Error::AssetConflict`]
    pub async fn compensate(&self, path: &Path) {
        if let Err(e) = self.delete(path).await {
            warn!(
                "Could not remove storage asset {} after failed provisioning: {}",
                path.display(),
                e
            );
        }
    }
}

async fn chown(path: PathBuf, owner: AssetOwner) -> Result<()> {
    let target = path.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        std::os::unix::fs::chown(&target, Some(owner.uid), Some(owner.gid))
    })
    .await
    .unwrap_or_else(|e| {
        Err(std::io::Error::new(
            ErrorKind::Other,
            format!("chown task failed: {}", e),
        ))
    });

    outcome.map_err(|source| Error::AssetOwnership {
        path,
        uid: owner.uid,
        gid: owner.gid,
        source,
    })
}
