//! Detached launch of the update script after an install.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::error::{Result, UpdateError};

/// Starts whatever brings the application back up after an install.
pub trait Relauncher: Send + Sync {
    fn launch(&self) -> Result<()>;
}

/// Spawns the update script as a detached process and does not wait for it.
#[derive(Debug, Clone)]
pub struct ScriptRelauncher {
    script: PathBuf,
}

impl ScriptRelauncher {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
        }
    }

    pub fn script(&self) -> &Path {
        &self.script
    }
}

impl Relauncher for ScriptRelauncher {
    fn launch(&self) -> Result<()> {
        let mut cmd = script_command(&self.script);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(target_os = "windows")]
        {
            use std::os::windows::process::CommandExt;
            const DETACHED_PROCESS: u32 = 0x0000_0008;
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            cmd.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
        }

        let child = cmd.spawn().map_err(|e| {
            UpdateError::Launch(format!(
                "cannot launch update script {}: {e}",
                self.script.display()
            ))
        })?;
        tracing::info!(script = %self.script.display(), pid = child.id(), "update script launched");
        Ok(())
    }
}

#[cfg(target_os = "windows")]
fn script_command(script: &Path) -> std::process::Command {
    let is_batch = script
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("cmd") || e.eq_ignore_ascii_case("bat"));
    if is_batch {
        let mut cmd = std::process::Command::new("cmd");
        cmd.arg("/C").arg(script);
        cmd
    } else {
        std::process::Command::new(script)
    }
}

#[cfg(not(target_os = "windows"))]
fn script_command(script: &Path) -> std::process::Command {
    let is_shell = script.extension().and_then(|e| e.to_str()) == Some("sh");
    if is_shell {
        let mut cmd = std::process::Command::new("sh");
        cmd.arg(script);
        cmd
    } else {
        std::process::Command::new(script)
    }
}
