//! User consent and notices for the update flow.
//!
//! The orchestrator never blocks on a dialog. It awaits an [`UpdatePrompter`],
//! and frontends either answer [`PromptRequest`]s from a channel
//! ([`ChannelPrompter`]) or accept everything ([`AutoPrompter`]).

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use super::orchestrator::UpdateStage;
use crate::version::{ReleaseNumber, VersionDescriptor};

/// Point in the flow where the user is asked to continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsentStage {
    Download,
    Install,
}

impl fmt::Display for ConsentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Download => write!(f, "download"),
            Self::Install => write!(f, "install"),
        }
    }
}

/// Information-only message for the user.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateNotice {
    /// The new version is installed and the application is about to restart.
    RestartPending {
        version: ReleaseNumber,
        delay: Duration,
    },
    /// A stage failed; the installation was left as it was (or rolled back).
    Failed { stage: UpdateStage, message: String },
    /// The installation could not be rolled back and may be broken.
    Degraded {
        message: String,
        backup: Option<PathBuf>,
    },
}

impl fmt::Display for UpdateNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RestartPending { version, delay } => write!(
                f,
                "Gaello {version} is installed. The application will restart in {} seconds.",
                delay.as_secs()
            ),
            Self::Failed { stage, message } => write!(f, "Update failed during {stage}: {message}"),
            Self::Degraded { message, backup } => {
                write!(f, "The installation may be damaged: {message}.")?;
                if let Some(backup) = backup {
                    write!(f, " A copy of the previous version is kept at {}.", backup.display())?;
                }
                Ok(())
            }
        }
    }
}

/// Awaitable user interaction.
#[async_trait]
pub trait UpdatePrompter: Send + Sync {
    /// Ask whether to download `release`.
    async fn confirm_download(&self, release: &VersionDescriptor) -> bool;

    /// Ask whether to install the downloaded `release` now.
    async fn confirm_install(&self, release: &VersionDescriptor) -> bool;

    /// Show an information-only message.
    async fn notify(&self, notice: UpdateNotice);
}

/// A yes/no question waiting for the frontend.
pub struct PromptRequest {
    pub stage: ConsentStage,
    pub release: VersionDescriptor,
    respond_to: oneshot::Sender<bool>,
}

impl PromptRequest {
    /// Answer the request.
    ///
    /// Returns `true` if the answer reached the waiting orchestrator.
    pub fn respond(self, accept: bool) -> bool {
        self.respond_to.send(accept).is_ok()
    }
}

impl fmt::Debug for PromptRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromptRequest")
            .field("stage", &self.stage)
            .field("version", &self.release.version())
            .finish_non_exhaustive()
    }
}

/// Messages delivered to the frontend by a [`ChannelPrompter`].
#[derive(Debug)]
pub enum PromptMessage {
    Request(PromptRequest),
    Notice(UpdateNotice),
}

/// Forwards prompts to a frontend over a channel.
///
/// A closed channel or a request dropped without an answer counts as decline.
#[derive(Debug, Clone)]
pub struct ChannelPrompter {
    tx: mpsc::Sender<PromptMessage>,
}

impl ChannelPrompter {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<PromptMessage>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    async fn ask(&self, stage: ConsentStage, release: &VersionDescriptor) -> bool {
        let (respond_to, answer) = oneshot::channel();
        let request = PromptRequest {
            stage,
            release: release.clone(),
            respond_to,
        };
        if self.tx.send(PromptMessage::Request(request)).await.is_err() {
            tracing::warn!(%stage, "prompt channel closed, treating as decline");
            return false;
        }
        match answer.await {
            Ok(accept) => accept,
            Err(_) => {
                tracing::warn!(%stage, "prompt dropped without an answer, treating as decline");
                false
            }
        }
    }
}

#[async_trait]
impl UpdatePrompter for ChannelPrompter {
    async fn confirm_download(&self, release: &VersionDescriptor) -> bool {
        self.ask(ConsentStage::Download, release).await
    }

    async fn confirm_install(&self, release: &VersionDescriptor) -> bool {
        self.ask(ConsentStage::Install, release).await
    }

    async fn notify(&self, notice: UpdateNotice) {
        if self.tx.send(PromptMessage::Notice(notice)).await.is_err() {
            tracing::debug!("prompt channel closed, notice dropped");
        }
    }
}

/// Accepts every prompt. Used for unattended updates.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoPrompter;

#[async_trait]
impl UpdatePrompter for AutoPrompter {
    async fn confirm_download(&self, release: &VersionDescriptor) -> bool {
        tracing::info!(version = %release.version(), "auto-accepting download");
        true
    }

    async fn confirm_install(&self, release: &VersionDescriptor) -> bool {
        tracing::info!(version = %release.version(), "auto-accepting install");
        true
    }

    async fn notify(&self, notice: UpdateNotice) {
        match &notice {
            UpdateNotice::RestartPending { .. } => tracing::info!(%notice),
            UpdateNotice::Failed { .. } => tracing::warn!(%notice),
            UpdateNotice::Degraded { .. } => tracing::error!(%notice),
        }
    }
}
