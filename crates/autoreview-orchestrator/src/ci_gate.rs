//! Wait for running CI checks before a review starts.
//!
//! Only checks in `in_progress` hold the gate; queued checks may never start
//! and would otherwise block the review indefinitely. Polling failures let the
//! review proceed.

use autoreview_core::config::CiWaitConfig;
use autoreview_core::platform::{CheckStatus, PlatformApi};
use autoreview_core::types::Project;
use serde::Serialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CiWaitOutcome {
    /// At least one poll found running checks.
    pub waited: bool,
    pub timed_out: bool,
    pub cancelled: bool,
    /// Polls that found running checks.
    pub iterations: u32,
    /// Running checks seen by the last poll that found any.
    pub in_progress_checks: Vec<String>,
}

impl CiWaitOutcome {
    /// The review may go ahead (timed out and degraded waits included).
    pub fn should_proceed(&self) -> bool {
        !self.cancelled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CiGate {
    interval: Duration,
    max_iterations: u32,
}

impl Default for CiGate {
    fn default() -> Self {
        Self::from_config(&CiWaitConfig::default())
    }
}

impl CiGate {
    pub fn new(interval: Duration, max_iterations: u32) -> Self {
        Self {
            interval,
            max_iterations: max_iterations.max(1),
        }
    }

    pub fn from_config(config: &CiWaitConfig) -> Self {
        Self::new(config.poll_interval(), config.max_iterations())
    }

    /// Poll `sha`'s checks until none are in progress, the iteration ceiling is
    /// reached, or `token` is cancelled. `on_wait` runs after every poll that
    /// found running checks.
    pub async fn wait<F>(
        &self,
        platform: &dyn PlatformApi,
        project: &Project,
        sha: &str,
        token: &CancellationToken,
        mut on_wait: F,
    ) -> CiWaitOutcome
    where
        F: FnMut(&CiWaitOutcome) + Send,
    {
        let mut outcome = CiWaitOutcome::default();

        for iteration in 0..self.max_iterations {
            if token.is_cancelled() {
                outcome.cancelled = true;
                return outcome;
            }

            let polled = tokio::select! {
                _ = token.cancelled() => {
                    outcome.cancelled = true;
                    return outcome;
                }
                r = platform.list_checks(project, sha) => r,
            };

            let checks = match polled {
                Ok(checks) => checks,
                Err(e) => {
                    tracing::warn!(repo = %project.repo, sha, error = %e, "CI check poll failed; proceeding");
                    return outcome;
                }
            };

            let running: Vec<String> = checks
                .into_iter()
                .filter(|c| c.status == CheckStatus::InProgress)
                .map(|c| c.name)
                .collect();
            if running.is_empty() {
                return outcome;
            }

            outcome.waited = true;
            outcome.iterations = iteration + 1;
            outcome.in_progress_checks = running;
            tracing::info!(
                repo = %project.repo,
                sha,
                iteration = outcome.iterations,
                running = outcome.in_progress_checks.len(),
                "waiting for CI checks"
            );
            on_wait(&outcome);

            tokio::select! {
                _ = token.cancelled() => {
                    outcome.cancelled = true;
                    return outcome;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::warn!(repo = %project.repo, sha, "CI wait ceiling reached; proceeding");
        outcome.timed_out = true;
        outcome
    }
}
