//! Running the downloaded installer into a staging directory.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;

use crate::config::InstallConfig;
use crate::error::{Result, UpdateError};

/// Runs a downloaded installer so that it places the new build in `staging`.
///
/// Returning `Ok` only means the installer ran to completion; the caller
/// decides success by inspecting the staging directory.
#[async_trait]
pub trait Installer: Send + Sync {
    async fn install(&self, binary: &Path, staging: &Path) -> Result<()>;
}

/// Runs the installer as a child process with an argument template.
#[derive(Debug, Clone)]
pub struct ProcessInstaller {
    config: InstallConfig,
}

impl ProcessInstaller {
    pub fn new(config: InstallConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Installer for ProcessInstaller {
    async fn install(&self, binary: &Path, staging: &Path) -> Result<()> {
        set_executable(binary)?;

        let args = self.config.args_for(staging);
        tracing::info!(
            binary = %binary.display(),
            staging = %staging.display(),
            ?args,
            "running installer"
        );

        let mut child = tokio::process::Command::new(binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                UpdateError::Install(format!("cannot run installer {}: {e}", binary.display()))
            })?;

        let limit = self.config.installer_timeout();
        let status = match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status.map_err(|e| {
                UpdateError::Install(format!("cannot wait for installer: {e}"))
            })?,
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "cannot kill timed-out installer");
                }
                return Err(UpdateError::Install(format!(
                    "installer did not finish within {} seconds",
                    limit.as_secs()
                )));
            }
        };

        if status.success() {
            tracing::info!("installer exited successfully");
        } else {
            tracing::warn!(code = ?status.code(), "installer exited with failure status");
        }
        Ok(())
    }
}

/// Set executable permission on Unix platforms.
fn set_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).map_err(|e| {
            UpdateError::Install(format!(
                "cannot set executable permission on {}: {e}",
                path.display()
            ))
        })?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
