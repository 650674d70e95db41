//! Windows "installed programs" lookup through the uninstall hive.
//!
//! Each installed application has a subkey under one of the uninstall roots
//! carrying `DisplayName` and, when the installer wrote one,
//! `InstallLocation`:
//!
//! ```text
//! HKEY_LOCAL_MACHINE\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall\Gaello_is1
//!     DisplayName        Gaello
//!     InstallLocation    C:\Program Files\Gaello\
//! ```
//!
//! Values are read with `winreg`, so paths keep their exact UTF-16 content.

use std::fmt;
use std::path::PathBuf;

use crate::error::{RegistryError, Result};
use crate::{InstallEntry, InstallLocator, find_install_location};

/// Uninstall key path below `SOFTWARE`.
pub const UNINSTALL_KEY: &str = r"SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall";

/// Uninstall key for 32-bit installers on 64-bit Windows.
pub const WOW64_UNINSTALL_KEY: &str =
    r"SOFTWARE\WOW6432Node\Microsoft\Windows\CurrentVersion\Uninstall";

/// Predefined registry hive an uninstall root lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hive {
    LocalMachine,
    CurrentUser,
}

impl fmt::Display for Hive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalMachine => f.write_str("HKLM"),
            Self::CurrentUser => f.write_str("HKCU"),
        }
    }
}

/// One uninstall key to enumerate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallRoot {
    pub hive: Hive,
    pub path: String,
}

impl UninstallRoot {
    pub fn new(hive: Hive, path: impl Into<String>) -> Self {
        Self {
            hive,
            path: path.into(),
        }
    }
}

impl fmt::Display for UninstallRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, r"{}\{}", self.hive, self.path)
    }
}

/// Raw values of one application subkey.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UninstallRecord {
    pub display_name: Option<String>,
    pub install_location: Option<String>,
}

/// Uninstall-hive backed [`InstallLocator`].
#[derive(Debug, Clone)]
pub struct UninstallHive {
    roots: Vec<UninstallRoot>,
}

impl Default for UninstallHive {
    fn default() -> Self {
        Self {
            roots: vec![
                UninstallRoot::new(Hive::LocalMachine, UNINSTALL_KEY),
                UninstallRoot::new(Hive::LocalMachine, WOW64_UNINSTALL_KEY),
                UninstallRoot::new(Hive::CurrentUser, UNINSTALL_KEY),
            ],
        }
    }
}

impl UninstallHive {
    /// Query only the given roots, in order.
    pub fn with_roots(roots: Vec<UninstallRoot>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[UninstallRoot] {
        &self.roots
    }
}

impl InstallLocator for UninstallHive {
    fn id(&self) -> &'static str {
        "uninstall-hive"
    }

    fn locate(&self, display_name: &str) -> Result<Option<PathBuf>> {
        let mut last_error = None;
        let mut queried = 0usize;

        for root in &self.roots {
            match read_root(root) {
                Ok(records) => {
                    queried += 1;
                    let entries = entries_from_records(records);
                    tracing::debug!(root = %root, entries = entries.len(), "read uninstall hive");
                    if let Some(path) = find_install_location(&entries, display_name) {
                        tracing::info!(path = %path.display(), "installation found in uninstall hive");
                        return Ok(Some(path));
                    }
                }
                Err(e) => {
                    // Missing roots (no per-user installs, no WOW64 node) are normal.
                    tracing::debug!(root = %root, error = %e, "uninstall root not readable");
                    last_error = Some(e);
                }
            }
        }

        match (queried, last_error) {
            (0, Some(e)) => Err(e),
            _ => Ok(None),
        }
    }
}

/// Turn raw subkey values into install entries.
///
/// Subkeys without a `DisplayName` are skipped; a blank `InstallLocation`
/// counts as none.
pub fn entries_from_records<I>(records: I) -> Vec<InstallEntry>
where
    I: IntoIterator<Item = UninstallRecord>,
{
    records
        .into_iter()
        .filter_map(|record| {
            let display_name = record.display_name?;
            let install_location = record
                .install_location
                .map(|l| l.trim().to_owned())
                .filter(|l| !l.is_empty())
                .map(PathBuf::from);
            Some(InstallEntry {
                display_name,
                install_location,
            })
        })
        .collect()
}

#[cfg(windows)]
fn read_root(root: &UninstallRoot) -> Result<Vec<UninstallRecord>> {
    use winreg::RegKey;
    use winreg::enums::{HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, KEY_READ};

    let predef = match root.hive {
        Hive::LocalMachine => RegKey::predef(HKEY_LOCAL_MACHINE),
        Hive::CurrentUser => RegKey::predef(HKEY_CURRENT_USER),
    };
    let uninstall = predef
        .open_subkey_with_flags(&root.path, KEY_READ)
        .map_err(|e| RegistryError::Query(format!("cannot open {root}: {e}")))?;

    let mut records = Vec::new();
    for name in uninstall.enum_keys() {
        let name = match name {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!(root = %root, error = %e, "skipping unreadable subkey name");
                continue;
            }
        };
        let app = match uninstall.open_subkey_with_flags(&name, KEY_READ) {
            Ok(app) => app,
            Err(e) => {
                tracing::debug!(key = %name, error = %e, "skipping unreadable uninstall key");
                continue;
            }
        };
        records.push(UninstallRecord {
            display_name: app.get_value::<String, _>("DisplayName").ok(),
            install_location: app.get_value::<String, _>("InstallLocation").ok(),
        });
    }
    Ok(records)
}

#[cfg(not(windows))]
fn read_root(root: &UninstallRoot) -> Result<Vec<UninstallRecord>> {
    Err(RegistryError::Query(format!(
        "{root}: the uninstall hive exists only on Windows"
    )))
}
