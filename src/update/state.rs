//! Update state persistence.
//!
//! Tracks the last check time, the newest release seen, and an installer that
//! was downloaded but not yet installed. Persisted to `update-state.json`.

use crate::error::{Result, UpdateError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::version::ReleaseNumber;

/// An installer downloaded on an earlier run whose install was postponed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDownload {
    pub version: ReleaseNumber,
    pub path: PathBuf,
}

impl PendingDownload {
    /// Whether this download is for `version` and its file is still on disk.
    pub fn is_reusable_for(&self, version: ReleaseNumber) -> bool {
        self.version == version && self.path.is_file()
    }
}

/// Persistent update state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateState {
    /// When the last update check was performed.
    pub last_check: Option<DateTime<Utc>>,
    /// Newest release version reported by the endpoint.
    pub last_seen_version: Option<ReleaseNumber>,
    /// Downloaded installer awaiting install.
    pub pending_download: Option<PendingDownload>,
}

impl UpdateState {
    /// Load state from `path`. Returns the default state if the file is
    /// missing or cannot be parsed.
    pub fn load_from(path: &Path) -> Self {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(_) => return Self::default(),
        };

        match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable update state");
                Self::default()
            }
        }
    }

    /// Persist the state to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the state directory cannot be created or the file
    /// cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                UpdateError::State(format!(
                    "cannot create state directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| UpdateError::State(format!("cannot serialize update state: {e}")))?;

        std::fs::write(path, json).map_err(|e| {
            UpdateError::State(format!(
                "cannot write update state to {}: {e}",
                path.display()
            ))
        })?;

        Ok(())
    }

    /// Record that an update check was performed now.
    pub fn mark_checked(&mut self) {
        self.last_check = Some(Utc::now());
    }

    /// The pending download, if it can be reused for `version`.
    pub fn reusable_download(&self, version: ReleaseNumber) -> Option<&PendingDownload> {
        self.pending_download
            .as_ref()
            .filter(|pending| pending.is_reusable_for(version))
    }
}
