//! Remote version check.
//!
//! Queries the version endpoint for the latest release and compares it with
//! the running version. The endpoint may answer with a single release object
//! or with the full release history as an array.

use std::time::Duration;

use serde_json::Value;

use crate::config::CheckConfig;
use crate::error::Result;
use crate::version::VersionDescriptor;

/// Result of one update check.
#[derive(Debug, Clone)]
pub enum CheckOutcome {
    /// A strictly newer release is available.
    UpdateAvailable(VersionDescriptor),
    /// The running version is current (or no release targets this screen).
    UpToDate,
    /// The check itself failed.
    Failed {
        reason: String,
        /// Whether retrying later might succeed (timeouts, connect errors, 5xx).
        transient: bool,
    },
}

impl CheckOutcome {
    /// The newer release, collapsing "up to date" and failure into `None`.
    pub fn into_update(self) -> Option<VersionDescriptor> {
        match self {
            Self::UpdateAvailable(release) => Some(release),
            Self::UpToDate | Self::Failed { .. } => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    fn transient(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
            transient: true,
        }
    }

    fn permanent(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
            transient: false,
        }
    }
}

/// Checks the version endpoint for a release newer than the running one.
pub struct UpdateChecker {
    config: CheckConfig,
    target_resolution: String,
    running: VersionDescriptor,
    client: reqwest::Client,
}

impl UpdateChecker {
    pub fn new(
        config: CheckConfig,
        target_resolution: impl Into<String>,
        running: VersionDescriptor,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .unwrap_or_default();
        Self {
            config,
            target_resolution: target_resolution.into(),
            running,
            client,
        }
    }

    pub fn running(&self) -> &VersionDescriptor {
        &self.running
    }

    pub fn target_resolution(&self) -> &str {
        &self.target_resolution
    }

    /// Newer release, or `None` when up to date or when the check failed.
    ///
    /// Never errors; failures are logged.
    pub async fn check_for_update(&self) -> Option<VersionDescriptor> {
        self.check().await.into_update()
    }

    /// Check with bounded exponential backoff.
    ///
    /// Only transient failures are retried; the delay doubles per attempt and
    /// is capped at the request timeout.
    pub async fn check(&self) -> CheckOutcome {
        let max_attempts = self.config.retry_count.saturating_add(1);
        let mut outcome = CheckOutcome::transient("no attempt made");

        for attempt in 0..max_attempts {
            outcome = self.check_once().await;
            let CheckOutcome::Failed {
                transient: true,
                reason,
            } = &outcome
            else {
                return outcome;
            };

            if attempt + 1 < max_attempts {
                let shift = attempt.min(63);
                let multiplier = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
                let delay_ms = self.config.retry_delay_ms.saturating_mul(multiplier);
                let max_delay_ms = self.config.timeout_secs.saturating_mul(1000);
                let capped_delay = delay_ms.min(max_delay_ms);
                tracing::warn!(
                    attempt = attempt + 1,
                    delay_ms = capped_delay,
                    reason = %reason,
                    "version check failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(capped_delay)).await;
            }
        }

        if let CheckOutcome::Failed { reason, .. } = &outcome {
            tracing::error!(attempts = max_attempts, reason = %reason, "version check failed");
        }
        outcome
    }

    async fn check_once(&self) -> CheckOutcome {
        let url = &self.config.endpoint_url;
        tracing::info!(url = %url, "checking for updates");

        let resp = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => return classify_reqwest_error(&e),
        };

        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "version endpoint returned an error status");
            let reason = format!("version endpoint returned HTTP {status}");
            return if status.is_server_error() {
                CheckOutcome::transient(reason)
            } else {
                CheckOutcome::permanent(reason)
            };
        }

        let payload: Value = match resp.json().await {
            Ok(v) => v,
            Err(e) if e.is_timeout() => return classify_reqwest_error(&e),
            Err(e) => return CheckOutcome::permanent(format!("invalid version payload: {e}")),
        };

        let candidate = match self.select_release(&payload) {
            Ok(Some(candidate)) => candidate,
            Ok(None) => {
                tracing::info!(
                    resolution = %self.target_resolution,
                    "no release available for this screen resolution"
                );
                return CheckOutcome::UpToDate;
            }
            Err(e) => {
                tracing::error!(error = %e, "version payload failed schema validation");
                return CheckOutcome::permanent(e.to_string());
            }
        };

        if candidate > self.running {
            tracing::info!(
                current = %self.running.version(),
                latest = %candidate.version(),
                "update available"
            );
            CheckOutcome::UpdateAvailable(candidate)
        } else {
            tracing::info!(
                current = %self.running.version(),
                latest = %candidate.version(),
                "already up to date"
            );
            CheckOutcome::UpToDate
        }
    }

    /// Pick the release to compare against from an endpoint payload.
    ///
    /// A single object is taken as is. For an array, the newest release
    /// supporting the target resolution is chosen.
    ///
    /// # Errors
    ///
    /// Returns a schema error if the payload, or any element of it, is not a
    /// valid release.
    pub fn select_release(&self, payload: &Value) -> Result<Option<VersionDescriptor>> {
        let Value::Array(items) = payload else {
            return VersionDescriptor::from_json_value(payload).map(Some);
        };

        let mut releases = items
            .iter()
            .map(VersionDescriptor::from_json_value)
            .collect::<Result<Vec<_>>>()?;
        releases.sort_by_key(|release| std::cmp::Reverse(release.version()));

        Ok(releases
            .into_iter()
            .find(|release| release.supports_resolution(&self.target_resolution)))
    }
}

fn classify_reqwest_error(err: &reqwest::Error) -> CheckOutcome {
    if err.is_timeout() {
        CheckOutcome::transient(format!("version check timed out: {err}"))
    } else if err.is_connect() {
        CheckOutcome::transient(format!("cannot reach version endpoint: {err}"))
    } else {
        CheckOutcome::permanent(format!("version request failed: {err}"))
    }
}
