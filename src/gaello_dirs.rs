//! Centralized application directory paths for the Gaello updater.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! | Purpose | Windows | Linux |
//! |---------|---------|-------|
//! | App data | `%APPDATA%\gaello\` | `~/.local/share/gaello/` |
//! | Config | `%APPDATA%\gaello\` | `~/.config/gaello/` |
//! | Cache | `%LOCALAPPDATA%\gaello\` | `~/.cache/gaello/` |
//!
//! # Environment Overrides
//!
//! - `GAELLO_DATA_DIR` overrides [`data_dir`]
//! - `GAELLO_CONFIG_DIR` overrides [`config_dir`]
//! - `GAELLO_CACHE_DIR` overrides [`cache_dir`]

use std::path::PathBuf;

/// Application data root directory (logs, install manifest).
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("GAELLO_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("gaello"))
        .unwrap_or_else(|| std::env::temp_dir().join("gaello-data"))
}

/// Application config directory (`config.toml`, `update-state.json`).
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("GAELLO_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("gaello"))
        .unwrap_or_else(|| std::env::temp_dir().join("gaello-config"))
}

/// Application cache directory (downloaded installers).
#[must_use]
pub fn cache_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("GAELLO_CACHE_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::cache_dir()
        .map(|d| d.join("gaello"))
        .unwrap_or_else(|| std::env::temp_dir().join("gaello-cache"))
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Downloaded installer directory (`cache_dir()/downloads/`).
#[must_use]
pub fn downloads_dir() -> PathBuf {
    cache_dir().join("downloads")
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Persisted update state (`config_dir()/update-state.json`).
#[must_use]
pub fn state_file() -> PathBuf {
    config_dir().join("update-state.json")
}

/// Install manifest read on platforms without an uninstall hive
/// (`data_dir()/installed.json`).
#[must_use]
pub fn install_manifest() -> PathBuf {
    data_dir().join("installed.json")
}
