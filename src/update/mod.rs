//! Self-update pipeline for Gaello.
//!
//! Checks the version endpoint for a newer release, asks the user, downloads
//! the installer, snapshots the installed application, installs through a
//! staging directory and rolls back from the snapshot when the install fails.

pub mod backup;
pub mod checker;
pub mod download;
pub mod fs_ops;
pub mod installer;
pub mod orchestrator;
pub mod prompt;
pub mod relaunch;
pub mod state;


pub use backup::{BackupManager, BackupRecord};
pub use checker::{CheckOutcome, UpdateChecker};
pub use download::{DownloadManager, DownloadProgress, DownloadReport};
pub use installer::{Installer, ProcessInstaller};
pub use orchestrator::{
    EventCallback, UpdateEvent, UpdateOrchestrator, UpdateOutcome, UpdatePhase, UpdateSession,
    UpdateStage,
};
pub use prompt::{
    AutoPrompter, ChannelPrompter, ConsentStage, PromptMessage, PromptRequest, UpdateNotice,
    UpdatePrompter,
};
pub use relaunch::{Relauncher, ScriptRelauncher};
pub use state::{PendingDownload, UpdateState};
