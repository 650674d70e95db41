//! # gaello-registry
//!
//! Read-only lookup of where an application is installed, keyed by its
//! display name.
//!
//! On Windows the source of truth is the "installed programs" uninstall hive.
//! Other platforms have no such registry, so a small JSON manifest written by
//! the packaging scripts plays the same role.
//!
//! Matching is a case-insensitive substring match on the display name, and the
//! first entry that records an install location wins.

pub mod error;
pub mod hive;
pub mod manifest;

use std::path::{Path, PathBuf};

pub use error::{RegistryError, Result};
pub use hive::{Hive, UninstallHive, UninstallRoot};
pub use manifest::ManifestRegistry;

/// One installed application as recorded by a registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallEntry {
    /// Display name shown in the platform's installed-programs list.
    pub display_name: String,
    /// Recorded install location, if the installer wrote one.
    pub install_location: Option<PathBuf>,
}

impl InstallEntry {
    pub fn new(display_name: impl Into<String>, install_location: impl Into<PathBuf>) -> Self {
        Self {
            display_name: display_name.into(),
            install_location: Some(install_location.into()),
        }
    }

    /// Case-insensitive substring match against `name`.
    pub fn matches(&self, name: &str) -> bool {
        self.display_name
            .to_lowercase()
            .contains(&name.to_lowercase())
    }
}

/// Source of installed-application records.
pub trait InstallLocator: Send + Sync {
    /// Short identifier used in log lines.
    fn id(&self) -> &'static str;

    /// Return the install location of the first application whose display
    /// name contains `display_name` (case-insensitive), or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying registry cannot be read at all.
    fn locate(&self, display_name: &str) -> Result<Option<PathBuf>>;
}

/// Pick the install location of the first matching entry that has one.
///
/// Entries that match by name but carry no (or an empty) location are skipped.
pub fn find_install_location<'a, I>(entries: I, display_name: &str) -> Option<PathBuf>
where
    I: IntoIterator<Item = &'a InstallEntry>,
{
    entries
        .into_iter()
        .filter(|entry| entry.matches(display_name))
        .find_map(|entry| {
            entry
                .install_location
                .as_deref()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
        })
}

/// In-memory registry, for embedding hosts that already know the install
/// directory and for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    entries: Vec<InstallEntry>,
}

impl StaticRegistry {
    pub fn new(entries: Vec<InstallEntry>) -> Self {
        Self { entries }
    }

    /// Registry holding a single application.
    pub fn single(display_name: impl Into<String>, install_location: impl Into<PathBuf>) -> Self {
        Self::new(vec![InstallEntry::new(display_name, install_location)])
    }
}

impl InstallLocator for StaticRegistry {
    fn id(&self) -> &'static str {
        "static"
    }

    fn locate(&self, display_name: &str) -> Result<Option<PathBuf>> {
        Ok(find_install_location(&self.entries, display_name))
    }
}

/// The registry appropriate for the current platform.
///
/// Windows reads the uninstall hive. Elsewhere the manifest at
/// `manifest_path` is used.
pub fn platform_default(manifest_path: PathBuf) -> Box<dyn InstallLocator> {
    if cfg!(target_os = "windows") {
        let _ = manifest_path;
        Box::new(UninstallHive::default())
    } else {
        Box::new(ManifestRegistry::new(manifest_path))
    }
}
