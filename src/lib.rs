//! Gaello updater: self-update pipeline for the Gaello desktop client.
//!
//! # Architecture
//!
//! The pipeline is a chain of small components driven by one orchestrator:
//! - **Version check**: [`update::UpdateChecker`] asks the version endpoint
//!   for the newest [`VersionDescriptor`] and compares it with the running one
//! - **Download**: [`update::DownloadManager`] streams the installer to disk
//!   with chunked progress reporting
//! - **Backup**: [`update::BackupManager`] finds the installed application
//!   through the `gaello-registry` crate and snapshots it
//! - **Install**: the installer runs into a staging directory whose contents
//!   then replace the installed tree, with a rollback from the snapshot on
//!   failure
//! - **Relaunch**: the update script is started detached
//!
//! [`update::UpdateOrchestrator`] sequences these, asking for consent through
//! an awaitable [`update::UpdatePrompter`].

pub mod config;
pub mod error;
pub mod gaello_dirs;
pub mod logging;
pub mod update;
pub mod version;

pub use config::UpdaterConfig;
pub use error::{Result, UpdateError};
pub use update::{UpdateOrchestrator, UpdateOutcome};
pub use version::{ReleaseNumber, VersionDescriptor};
