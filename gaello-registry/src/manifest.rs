//! JSON manifest registry for platforms without an installed-programs hive.
//!
//! The packaging scripts append one record per installed product:
//!
//! ```json
//! [{ "display_name": "Gaello", "install_location": "/opt/gaello" }]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};
use crate::{InstallEntry, InstallLocator, find_install_location};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestRecord {
    display_name: String,
    #[serde(default)]
    install_location: Option<PathBuf>,
}

/// Manifest-file backed [`InstallLocator`].
#[derive(Debug, Clone)]
pub struct ManifestRegistry {
    path: PathBuf,
}

impl ManifestRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record in the manifest.
    ///
    /// A missing manifest is an empty registry, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn entries(&self) -> Result<Vec<InstallEntry>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let records: Vec<ManifestRecord> = serde_json::from_slice(&bytes).map_err(|e| {
            RegistryError::Parse(format!("invalid manifest {}: {e}", self.path.display()))
        })?;

        Ok(records
            .into_iter()
            .map(|r| InstallEntry {
                display_name: r.display_name,
                install_location: r.install_location,
            })
            .collect())
    }

    /// Add or replace the record for `entry.display_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be read, serialized or written.
    pub fn upsert(&self, entry: InstallEntry) -> Result<()> {
        let mut entries = self.entries()?;
        entries.retain(|e| e.display_name != entry.display_name);
        entries.push(entry);

        let records: Vec<ManifestRecord> = entries
            .into_iter()
            .map(|e| ManifestRecord {
                display_name: e.display_name,
                install_location: e.install_location,
            })
            .collect();

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&records)
            .map_err(|e| RegistryError::Parse(format!("cannot serialize manifest: {e}")))?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl InstallLocator for ManifestRegistry {
    fn id(&self) -> &'static str {
        "manifest"
    }

    fn locate(&self, display_name: &str) -> Result<Option<PathBuf>> {
        let entries = self.entries()?;
        Ok(find_install_location(&entries, display_name))
    }
}
