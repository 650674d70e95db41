//! Snapshot of the installed application taken before an install swap.
//!
//! One [`BackupManager`] owns at most one live snapshot. The snapshot is a
//! temp directory held inside the manager, so dropping the manager removes it
//! unless it was explicitly preserved with [`BackupManager::preserve_backup`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use gaello_registry::InstallLocator;
use tempfile::TempDir;

use super::fs_ops;

/// Prefix of snapshot directory names.
const SNAPSHOT_PREFIX: &str = "gaello-backup-";

/// The installed tree and its live snapshot.
#[derive(Debug)]
pub struct BackupRecord {
    source: PathBuf,
    snapshot: TempDir,
}

impl BackupRecord {
    /// Directory the application is installed in.
    pub fn source_directory(&self) -> &Path {
        &self.source
    }

    /// Directory holding the snapshot.
    pub fn backup_directory(&self) -> &Path {
        self.snapshot.path()
    }
}

/// Locates the installed application and snapshots, restores or discards it.
pub struct BackupManager {
    product_name: String,
    locator: Arc<dyn InstallLocator>,
    temp_root: Option<PathBuf>,
    record: Option<BackupRecord>,
}

impl BackupManager {
    pub fn new(product_name: impl Into<String>, locator: Arc<dyn InstallLocator>) -> Self {
        Self {
            product_name: product_name.into(),
            locator,
            temp_root: None,
            record: None,
        }
    }

    /// Create snapshots under `root` instead of the system temp directory.
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn has_backup(&self) -> bool {
        self.record.is_some()
    }

    /// Snapshot directory, while a backup is live.
    pub fn backup_path(&self) -> Option<&Path> {
        self.record.as_ref().map(BackupRecord::backup_directory)
    }

    /// Install directory recorded by the live backup.
    pub fn install_dir(&self) -> Option<&Path> {
        self.record.as_ref().map(BackupRecord::source_directory)
    }

    /// Look up where the application whose display name contains
    /// `display_name` is installed.
    ///
    /// Registry failures are logged and reported as `None`.
    pub async fn locate_installation(&self, display_name: &str) -> Option<PathBuf> {
        tracing::info!(locator = self.locator.id(), "looking up installation path");
        let locator = Arc::clone(&self.locator);
        let name = display_name.to_owned();

        match tokio::task::spawn_blocking(move || locator.locate(&name)).await {
            Ok(Ok(Some(path))) => {
                tracing::info!(path = %path.display(), "installation found");
                Some(path)
            }
            Ok(Ok(None)) => {
                tracing::info!(name = display_name, "application not found");
                None
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "error accessing install registry");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "install lookup task failed");
                None
            }
        }
    }

    /// Snapshot the installed application into a fresh temp directory.
    ///
    /// A snapshot that is still live is discarded first. Returns `false` when
    /// the installation cannot be located or the copy fails.
    pub async fn create_backup(&mut self) -> bool {
        let product = self.product_name.clone();
        let Some(source) = self.locate_installation(&product).await else {
            tracing::error!(product = %product, "cannot back up: application not found");
            return false;
        };

        if let Some(previous) = self.record.take() {
            let path = previous.backup_directory().to_path_buf();
            tracing::warn!(path = %path.display(), "replacing live backup");
            match tokio::task::spawn_blocking(move || previous.snapshot.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove previous backup");
                }
                Err(e) => tracing::warn!(error = %e, "previous backup removal task failed"),
            }
        }

        let temp_root = self.temp_root.clone();
        let copy_source = source.clone();
        let result = tokio::task::spawn_blocking(move || -> std::io::Result<TempDir> {
            let builder = {
                let mut b = tempfile::Builder::new();
                b.prefix(SNAPSHOT_PREFIX);
                b
            };
            let snapshot = match temp_root {
                Some(root) => {
                    std::fs::create_dir_all(&root)?;
                    builder.tempdir_in(root)?
                }
                None => builder.tempdir()?,
            };
            tracing::info!(path = %snapshot.path().display(), "backup directory created");
            fs_ops::copy_dir_recursive(&copy_source, snapshot.path())?;
            Ok(snapshot)
        })
        .await;

        match result {
            Ok(Ok(snapshot)) => {
                tracing::info!(
                    source = %source.display(),
                    backup = %snapshot.path().display(),
                    "backup created"
                );
                self.record = Some(BackupRecord { source, snapshot });
                true
            }
            Ok(Err(e)) => {
                tracing::error!(source = %source.display(), error = %e, "error creating backup");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "backup task failed");
                false
            }
        }
    }

    /// Replace the installed tree with the live snapshot.
    ///
    /// The snapshot stays live afterwards; discard it with
    /// [`delete_backup`](Self::delete_backup). Returns `false` without
    /// touching the filesystem when no backup was created by this manager.
    pub async fn restore_backup(&self) -> bool {
        let Some(record) = &self.record else {
            tracing::warn!("no backup to restore");
            return false;
        };

        let source = record.source.clone();
        let snapshot = record.snapshot.path().to_path_buf();
        tracing::info!(source = %source.display(), "restoring backup");

        let result = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            fs_ops::remove_dir_if_exists(&source)?;
            fs_ops::copy_dir_recursive(&snapshot, &source)
        })
        .await;

        match result {
            Ok(Ok(())) => {
                tracing::info!("backup restored");
                true
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "error restoring backup");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "restore task failed");
                false
            }
        }
    }

    /// Remove the live snapshot. Returns `false` when there is none or the
    /// removal fails.
    pub async fn delete_backup(&mut self) -> bool {
        let Some(record) = self.record.take() else {
            tracing::info!("no backup to delete");
            return false;
        };

        let path = record.backup_directory().to_path_buf();
        match tokio::task::spawn_blocking(move || record.snapshot.close()).await {
            Ok(Ok(())) => {
                tracing::info!(path = %path.display(), "backup deleted");
                true
            }
            Ok(Err(e)) => {
                tracing::error!(path = %path.display(), error = %e, "error deleting backup");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "backup deletion task failed");
                false
            }
        }
    }

    /// Detach the live snapshot so it survives this manager, returning its
    /// path. Used when the installed tree is left broken and the snapshot is
    /// the only good copy.
    pub fn preserve_backup(&mut self) -> Option<PathBuf> {
        self.record.take().map(|record| {
            let path = record.snapshot.keep();
            tracing::warn!(path = %path.display(), "backup preserved for manual recovery");
            path
        })
    }
}
