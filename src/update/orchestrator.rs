//! End-to-end update flow.
//!
//! One [`UpdateOrchestrator::run`] walks the phases
//! check → download consent → download → install consent → backup →
//! staged install → swap → relaunch, restoring the backup when the install
//! fails. Every run ends in exactly one [`UpdateOutcome`].

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gaello_registry::InstallLocator;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::backup::BackupManager;
use super::checker::{CheckOutcome, UpdateChecker};
use super::download::{DownloadManager, DownloadProgress};
use super::fs_ops;
use super::installer::{Installer, ProcessInstaller};
use super::prompt::{ConsentStage, UpdateNotice, UpdatePrompter};
use super::relaunch::{Relauncher, ScriptRelauncher};
use super::state::{PendingDownload, UpdateState};
use crate::config::UpdaterConfig;
use crate::error::{Result, UpdateError};
use crate::version::{ReleaseNumber, VersionDescriptor};

/// Stage of the flow a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStage {
    Check,
    Download,
    Backup,
    Install,
    Restore,
    Relaunch,
}

impl fmt::Display for UpdateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Check => "version check",
            Self::Download => "download",
            Self::Backup => "backup",
            Self::Install => "install",
            Self::Restore => "restore",
            Self::Relaunch => "relaunch",
        };
        f.write_str(name)
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// No newer release.
    UpToDate,
    /// The new version is in place. `relaunched` is false when the update
    /// script could not be started.
    Installed {
        version: ReleaseNumber,
        relaunched: bool,
    },
    /// The user said no.
    Declined { stage: ConsentStage },
    /// A stage failed. `degraded` means the installation could not be rolled
    /// back and may be broken.
    Failed {
        stage: UpdateStage,
        message: String,
        degraded: bool,
    },
}

impl UpdateOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    fn failed(stage: UpdateStage, message: impl Into<String>) -> Self {
        Self::Failed {
            stage,
            message: message.into(),
            degraded: false,
        }
    }
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpToDate => write!(f, "up to date"),
            Self::Installed {
                version,
                relaunched: true,
            } => write!(f, "installed {version}, restarting"),
            Self::Installed {
                version,
                relaunched: false,
            } => write!(f, "installed {version}, restart manually"),
            Self::Declined { stage } => write!(f, "{stage} declined"),
            Self::Failed {
                stage,
                message,
                degraded,
            } => {
                write!(f, "{stage} failed: {message}")?;
                if *degraded {
                    write!(f, " (installation degraded)")?;
                }
                Ok(())
            }
        }
    }
}

/// Where a run currently is.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdatePhase {
    Idle,
    Checking,
    AwaitingDownloadConsent,
    Downloading,
    AwaitingInstallConsent,
    BackingUp,
    Installing,
    Restoring,
    Relaunching,
    Terminal(UpdateOutcome),
}

/// Observable progress of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateEvent {
    PhaseChanged(UpdatePhase),
    Progress(DownloadProgress),
}

/// Callback receiving [`UpdateEvent`]s.
pub type EventCallback = Box<dyn Fn(UpdateEvent) + Send + Sync>;

/// Transient state of one run.
#[derive(Debug, Clone)]
pub struct UpdateSession {
    pub id: Uuid,
    pub target_resolution: String,
    /// Where the installer was stored.
    pub download_path: Option<PathBuf>,
    /// The release being installed.
    pub release: Option<VersionDescriptor>,
    /// Shutdown was requested during the restart notice; the update script
    /// was launched early.
    pub closed_before_timeout: bool,
}

impl UpdateSession {
    fn new(target_resolution: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_resolution: target_resolution.to_owned(),
            download_path: None,
            release: None,
            closed_before_timeout: false,
        }
    }
}

/// Drives the update flow. One run at a time per instance.
pub struct UpdateOrchestrator {
    config: UpdaterConfig,
    checker: UpdateChecker,
    downloader: DownloadManager,
    locator: Arc<dyn InstallLocator>,
    installer: Arc<dyn Installer>,
    prompter: Arc<dyn UpdatePrompter>,
    relauncher: Arc<dyn Relauncher>,
    events: Option<EventCallback>,
    shutdown: CancellationToken,
    backup_root: Option<PathBuf>,
    run_lock: tokio::sync::Mutex<()>,
}

impl UpdateOrchestrator {
    pub fn new(
        config: UpdaterConfig,
        locator: Arc<dyn InstallLocator>,
        installer: Arc<dyn Installer>,
        prompter: Arc<dyn UpdatePrompter>,
        relauncher: Arc<dyn Relauncher>,
    ) -> Self {
        let checker = UpdateChecker::new(
            config.check.clone(),
            config.product.target_resolution.clone(),
            VersionDescriptor::current(),
        );
        let downloader = DownloadManager::new(config.download.clone());
        Self {
            config,
            checker,
            downloader,
            locator,
            installer,
            prompter,
            relauncher,
            events: None,
            shutdown: CancellationToken::new(),
            backup_root: None,
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Orchestrator using the platform registry, the configured installer
    /// arguments and the configured update script.
    pub fn from_config(config: UpdaterConfig, prompter: Arc<dyn UpdatePrompter>) -> Self {
        let locator: Arc<dyn InstallLocator> =
            Arc::from(gaello_registry::platform_default(config.manifest_path()));
        let installer = Arc::new(ProcessInstaller::new(config.install.clone()));
        let relauncher = Arc::new(ScriptRelauncher::new(config.install.update_script.clone()));
        Self::new(config, locator, installer, prompter, relauncher)
    }

    /// Compare against `running` instead of the built-in version.
    pub fn with_running(mut self, running: VersionDescriptor) -> Self {
        self.checker = UpdateChecker::new(
            self.config.check.clone(),
            self.config.product.target_resolution.clone(),
            running,
        );
        self
    }

    pub fn with_events(mut self, callback: EventCallback) -> Self {
        self.events = Some(callback);
        self
    }

    /// Token whose cancellation cuts the restart notice short.
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Create backup snapshots under `root` instead of the system temp dir.
    pub fn with_backup_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.backup_root = Some(root.into());
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn checker(&self) -> &UpdateChecker {
        &self.checker
    }

    /// Whether a run is in progress.
    pub fn is_running(&self) -> bool {
        self.run_lock.try_lock().is_err()
    }

    /// Perform one update attempt.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Busy`] if another run is in progress. Every
    /// other failure is reported through the outcome.
    pub async fn run(&self) -> Result<UpdateOutcome> {
        self.run_session().await.map(|(outcome, _)| outcome)
    }

    /// Like [`run`](Self::run), also returning the session record.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Busy`] if another run is in progress.
    pub async fn run_session(&self) -> Result<(UpdateOutcome, UpdateSession)> {
        let _guard = self.run_lock.try_lock().map_err(|_| UpdateError::Busy)?;
        Ok(self.drive_session().await)
    }

    /// Wait for `ready` (e.g. the host UI finishing its setup), then run.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Busy`] if another run is in progress.
    pub async fn run_when_ready<F>(&self, ready: F) -> Result<UpdateOutcome>
    where
        F: Future<Output = ()> + Send,
    {
        let _guard = self.run_lock.try_lock().map_err(|_| UpdateError::Busy)?;
        ready.await;
        Ok(self.drive_session().await.0)
    }

    async fn drive_session(&self) -> (UpdateOutcome, UpdateSession) {
        let mut session = UpdateSession::new(&self.config.product.target_resolution);
        let span = tracing::info_span!("update", session = %session.id);
        let outcome = self.drive(&mut session).instrument(span).await;
        tracing::info!(session = %session.id, %outcome, "update run finished");
        self.emit_phase(UpdatePhase::Terminal(outcome.clone()));
        (outcome, session)
    }

    async fn drive(&self, session: &mut UpdateSession) -> UpdateOutcome {
        let state_path = self.config.state_path();
        let mut state = UpdateState::load_from(&state_path);

        self.emit_phase(UpdatePhase::Checking);
        let check = self.checker.check().await;
        state.mark_checked();
        let release = match check {
            CheckOutcome::UpdateAvailable(release) => release,
            CheckOutcome::UpToDate => {
                save_state(&state, &state_path);
                return UpdateOutcome::UpToDate;
            }
            CheckOutcome::Failed { reason, .. } => {
                save_state(&state, &state_path);
                return self.fail(UpdateStage::Check, reason).await;
            }
        };
        state.last_seen_version = Some(release.version());
        save_state(&state, &state_path);
        session.release = Some(release.clone());

        self.emit_phase(UpdatePhase::AwaitingDownloadConsent);
        if !self.prompter.confirm_download(&release).await {
            tracing::info!(version = %release.version(), "download declined");
            return UpdateOutcome::Declined {
                stage: ConsentStage::Download,
            };
        }

        self.emit_phase(UpdatePhase::Downloading);
        let installer_path = match self.obtain_installer(&release, &state).await {
            Ok(path) => path,
            Err(e) => return self.fail(UpdateStage::Download, e.to_string()).await,
        };
        session.download_path = Some(installer_path.clone());

        self.emit_phase(UpdatePhase::AwaitingInstallConsent);
        if !self.prompter.confirm_install(&release).await {
            tracing::info!(
                version = %release.version(),
                path = %installer_path.display(),
                "install postponed"
            );
            state.pending_download = Some(PendingDownload {
                version: release.version(),
                path: installer_path,
            });
            save_state(&state, &state_path);
            return UpdateOutcome::Declined {
                stage: ConsentStage::Install,
            };
        }

        self.emit_phase(UpdatePhase::BackingUp);
        let mut backup = BackupManager::new(
            self.config.product.display_name.clone(),
            Arc::clone(&self.locator),
        );
        if let Some(root) = &self.backup_root {
            backup = backup.with_temp_root(root);
        }
        if !backup.create_backup().await {
            return self
                .fail(
                    UpdateStage::Backup,
                    "could not back up the installed application",
                )
                .await;
        }
        let Some(install_dir) = backup.install_dir().map(Path::to_path_buf) else {
            return self
                .fail(UpdateStage::Backup, "backup has no install directory")
                .await;
        };

        self.emit_phase(UpdatePhase::Installing);
        let staging = match Staging::prepare(self.config.install.staging_dir.clone()).await {
            Ok(staging) => staging,
            Err(e) => {
                backup.delete_backup().await;
                return self
                    .fail(
                        UpdateStage::Install,
                        format!("cannot prepare staging directory: {e}"),
                    )
                    .await;
            }
        };

        if let Err(message) = self.run_installer(&installer_path, staging.path()).await {
            self.emit_phase(UpdatePhase::Restoring);
            let restored = backup.restore_backup().await;
            backup.delete_backup().await;
            staging.cleanup().await;
            if restored {
                return self.fail(UpdateStage::Install, message).await;
            }
            return self
                .fail_degraded(
                    format!("{message}; restoring the previous version also failed"),
                    None,
                )
                .await;
        }

        if let Err(e) = swap_into(staging.path(), &install_dir).await {
            tracing::error!(
                install_dir = %install_dir.display(),
                error = %e,
                "moving the new version into place failed"
            );
            self.emit_phase(UpdatePhase::Restoring);
            let restored = backup.restore_backup().await;
            staging.cleanup().await;
            if restored {
                backup.delete_backup().await;
                return self
                    .fail(
                        UpdateStage::Install,
                        format!("could not replace installed files ({e}); previous version restored"),
                    )
                    .await;
            }
            let kept = backup.preserve_backup();
            return self
                .fail_degraded(
                    format!("could not replace installed files ({e}) and the previous version could not be restored"),
                    kept,
                )
                .await;
        }

        staging.cleanup().await;
        backup.delete_backup().await;
        state.pending_download = None;
        save_state(&state, &state_path);
        if let Err(e) = tokio::fs::remove_file(&installer_path).await {
            tracing::debug!(path = %installer_path.display(), error = %e, "installer not removed");
        }
        tracing::info!(version = %release.version(), "update installed");

        self.emit_phase(UpdatePhase::Relaunching);
        let relaunched = self.relaunch(&release, session).await;
        UpdateOutcome::Installed {
            version: release.version(),
            relaunched,
        }
    }

    /// Reuse a postponed download of `release`, or download it.
    async fn obtain_installer(
        &self,
        release: &VersionDescriptor,
        state: &UpdateState,
    ) -> Result<PathBuf> {
        if let Some(pending) = state.reusable_download(release.version()) {
            let size = tokio::fs::metadata(&pending.path).await?.len();
            tracing::info!(path = %pending.path.display(), "reusing downloaded installer");
            self.emit(UpdateEvent::Progress(DownloadProgress::complete(size)));
            return Ok(pending.path.clone());
        }

        let dest = self.downloader.destination_for(release);
        let on_progress = |p: DownloadProgress| self.emit(UpdateEvent::Progress(p));
        self.downloader
            .download(release, &dest, &on_progress)
            .await
            .map(|report| report.path)
    }

    /// Run the installer and check that it produced files.
    async fn run_installer(
        &self,
        binary: &Path,
        staging: &Path,
    ) -> std::result::Result<(), String> {
        if let Err(e) = self.installer.install(binary, staging).await {
            tracing::error!(error = %e, "installer failed");
            return Err(e.to_string());
        }
        if !fs_ops::dir_has_entries(staging) {
            tracing::error!(staging = %staging.display(), "installer left the staging directory empty");
            return Err("installer did not produce any files".to_owned());
        }
        Ok(())
    }

    /// Announce the restart, wait out the notice (or shutdown), then launch
    /// the update script.
    async fn relaunch(&self, release: &VersionDescriptor, session: &mut UpdateSession) -> bool {
        let delay = Duration::from_millis(self.config.install.restart_notice_ms);
        self.prompter
            .notify(UpdateNotice::RestartPending {
                version: release.version(),
                delay,
            })
            .await;

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = self.shutdown.cancelled() => {
                session.closed_before_timeout = true;
                tracing::info!("shutdown during restart notice, launching update script now");
            }
        }

        match self.relauncher.launch() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "could not launch update script");
                self.prompter
                    .notify(UpdateNotice::Failed {
                        stage: UpdateStage::Relaunch,
                        message: e.to_string(),
                    })
                    .await;
                false
            }
        }
    }

    async fn fail(&self, stage: UpdateStage, message: impl Into<String>) -> UpdateOutcome {
        let message = message.into();
        tracing::warn!(%stage, message = %message, "update failed");
        self.prompter
            .notify(UpdateNotice::Failed {
                stage,
                message: message.clone(),
            })
            .await;
        UpdateOutcome::failed(stage, message)
    }

    async fn fail_degraded(&self, message: String, backup: Option<PathBuf>) -> UpdateOutcome {
        tracing::error!(
            message = %message,
            backup = ?backup,
            "installation left in a degraded state"
        );
        self.prompter
            .notify(UpdateNotice::Degraded {
                message: message.clone(),
                backup,
            })
            .await;
        UpdateOutcome::Failed {
            stage: UpdateStage::Restore,
            message,
            degraded: true,
        }
    }

    fn emit_phase(&self, phase: UpdatePhase) {
        tracing::debug!(?phase, "update phase");
        self.emit(UpdateEvent::PhaseChanged(phase));
    }

    fn emit(&self, event: UpdateEvent) {
        if let Some(callback) = &self.events {
            callback(event);
        }
    }
}

fn save_state(state: &UpdateState, path: &Path) {
    if let Err(e) = state.save_to(path) {
        tracing::warn!(error = %e, "could not save update state");
    }
}

/// Replace the contents of `install_dir` with the contents of `staging`.
async fn swap_into(staging: &Path, install_dir: &Path) -> std::io::Result<()> {
    let staging = staging.to_path_buf();
    let install_dir = install_dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        fs_ops::remove_dir_if_exists(&install_dir)?;
        fs_ops::move_dir_contents(&staging, &install_dir)
    })
    .await
    .map_err(std::io::Error::other)?
}

/// Directory the installer writes into.
struct Staging {
    path: PathBuf,
    temp: Option<TempDir>,
}

impl Staging {
    /// Use `configured` (emptied first) or a fresh temp directory.
    async fn prepare(configured: Option<PathBuf>) -> std::io::Result<Self> {
        tokio::task::spawn_blocking(move || match configured {
            Some(path) => {
                fs_ops::remove_dir_if_exists(&path)?;
                std::fs::create_dir_all(&path)?;
                Ok(Self { path, temp: None })
            }
            None => {
                let temp = tempfile::Builder::new()
                    .prefix("gaello-staging-")
                    .tempdir()?;
                Ok(Self {
                    path: temp.path().to_path_buf(),
                    temp: Some(temp),
                })
            }
        })
        .await
        .map_err(std::io::Error::other)?
    }

    fn path(&self) -> &Path {
        &self.path
    }

    async fn cleanup(self) {
        let path = self.path;
        let temp = self.temp;
        let result = tokio::task::spawn_blocking(move || match temp {
            Some(temp) => temp.close(),
            None => fs_ops::remove_dir_if_exists(&path),
        })
        .await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "could not remove staging directory"),
            Err(e) => tracing::warn!(error = %e, "staging cleanup task failed"),
        }
    }
}
