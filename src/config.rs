//! Configuration types for the update pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, UpdateError};

/// Top-level updater configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    /// Override for the persisted update state file.
    pub state_file: Option<PathBuf>,
    /// Override for the install manifest (non-Windows registry).
    pub install_manifest: Option<PathBuf>,
    /// Installed product identity.
    pub product: ProductConfig,
    /// Version endpoint settings.
    pub check: CheckConfig,
    /// Installer download settings.
    pub download: DownloadConfig,
    /// Staged install and relaunch settings.
    pub install: InstallConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// Installed product identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductConfig {
    /// Display name searched for in the installed-programs registry.
    pub display_name: String,
    /// Screen resolution a release must support, as `WIDTHxHEIGHT`.
    pub target_resolution: String,
}

impl Default for ProductConfig {
    fn default() -> Self {
        Self {
            display_name: "Gaello".to_owned(),
            target_resolution: "1920x1080".to_owned(),
        }
    }
}

/// Version endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConfig {
    /// URL answering with a release descriptor (or a release history array).
    pub endpoint_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Number of retries on transient failures.
    pub retry_count: u32,
    /// Initial delay between retries in milliseconds (doubles per attempt).
    pub retry_delay_ms: u64,
    /// Delay the command-line front end waits before checking.
    ///
    /// Hosts with a UI pass their own readiness future instead.
    pub startup_delay_ms: u64,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            endpoint_url: "https://www.gaello.io/api/versions/latest".to_owned(),
            timeout_secs: 10,
            retry_count: 2,
            retry_delay_ms: 500,
            startup_delay_ms: 2000,
        }
    }
}

impl CheckConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Installer download settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Directory the installer is written to.
    pub directory: PathBuf,
    /// Installer file name. Derived from the release URL when unset.
    pub file_name: Option<String>,
    /// Write/progress block size in bytes.
    pub chunk_size: usize,
    /// Whole-transfer timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: crate::gaello_dirs::downloads_dir(),
            file_name: None,
            chunk_size: 1024 * 1024,
            timeout_secs: 600,
        }
    }
}

/// Placeholder replaced by the staging directory in installer arguments.
pub const STAGING_PLACEHOLDER: &str = "{staging}";

/// Staged install and relaunch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Arguments passed to the downloaded installer.
    pub installer_args: Vec<String>,
    /// Fixed staging directory. A fresh temp path is used when unset.
    pub staging_dir: Option<PathBuf>,
    /// Script launched (detached) after a successful install.
    pub update_script: PathBuf,
    /// How long the restart warning stays up before relaunching, in ms.
    pub restart_notice_ms: u64,
    /// Longest the installer may run before it is killed, in seconds.
    pub installer_timeout_secs: u64,
}

impl Default for InstallConfig {
    fn default() -> Self {
        let script = if cfg!(target_os = "windows") {
            "relaunch.cmd"
        } else {
            "relaunch.sh"
        };
        Self {
            installer_args: vec![
                "/VERYSILENT".to_owned(),
                "/SUPPRESSMSGBOXES".to_owned(),
                "/NORESTART".to_owned(),
                format!("/DIR={STAGING_PLACEHOLDER}"),
            ],
            staging_dir: None,
            update_script: crate::gaello_dirs::data_dir().join(script),
            restart_notice_ms: 5000,
            installer_timeout_secs: 900,
        }
    }
}

impl InstallConfig {
    pub fn installer_timeout(&self) -> Duration {
        Duration::from_secs(self.installer_timeout_secs)
    }

    /// Installer arguments with the staging placeholder substituted.
    pub fn args_for(&self, staging: &Path) -> Vec<String> {
        let staging = staging.display().to_string();
        self.installer_args
            .iter()
            .map(|arg| arg.replace(STAGING_PLACEHOLDER, &staging))
            .collect()
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive, used when `RUST_LOG` is unset.
    pub filter: String,
    /// Whether to also write daily log files.
    pub file: bool,
    /// Log directory override.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "gaello_updater=info,gaello_registry=info".to_owned(),
            file: true,
            directory: None,
        }
    }
}

impl UpdaterConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| UpdateError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| UpdateError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default config file path (`config_dir()/config.toml`).
    pub fn default_config_path() -> PathBuf {
        crate::gaello_dirs::config_file()
    }

    /// Load the config at `path`, or the default path, falling back to defaults
    /// when no file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default_path = Self::default_config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Effective update state path.
    pub fn state_path(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(crate::gaello_dirs::state_file)
    }

    /// Effective install manifest path.
    pub fn manifest_path(&self) -> PathBuf {
        self.install_manifest
            .clone()
            .unwrap_or_else(crate::gaello_dirs::install_manifest)
    }

    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Config`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.product.display_name.trim().is_empty() {
            return Err(UpdateError::Config(
                "product.display_name must not be empty".into(),
            ));
        }
        if self.check.endpoint_url.trim().is_empty() {
            return Err(UpdateError::Config(
                "check.endpoint_url must not be empty".into(),
            ));
        }
        if self.check.timeout_secs == 0 {
            return Err(UpdateError::Config(
                "check.timeout_secs must be greater than 0".into(),
            ));
        }
        if self.check.retry_delay_ms > self.check.timeout_secs.saturating_mul(1000) {
            return Err(UpdateError::Config(
                "check.retry_delay_ms must not exceed the check timeout".into(),
            ));
        }
        if self.download.chunk_size == 0 {
            return Err(UpdateError::Config(
                "download.chunk_size must be greater than 0".into(),
            ));
        }
        if self.install.installer_timeout_secs == 0 {
            return Err(UpdateError::Config(
                "install.installer_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.download.timeout_secs == 0 {
            return Err(UpdateError::Config(
                "download.timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
