//! Review lifecycle: reserve, wait for CI, validate, run the analysis
//! process, persist, notify.
//!
//! Every side effect of a run (log writes, events, persistence, registry
//! release) is gated on the run still owning its registry slot, so a run that
//! was cancelled and replaced never touches its successor's state.

use crate::ci_gate::{CiGate, CiWaitOutcome};
use crate::error::{OrchestratorError, Result};
use crate::events::{EventBus, ReviewEvent, ReviewStage};
use crate::merge::{self, MergeReadiness};
use crate::registry::{Cancelled, Reservation, ReviewRegistry, SlotState};
use crate::report;
use autoreview_core::config::{CiWaitConfig, ReviewConfig};
use autoreview_core::env::ProcessEnvironment;
use autoreview_core::invocation::RunnerInvocation;
use autoreview_core::json_output::{parse_json_as, JSON_MARKER};
use autoreview_core::logs::{self, PrLogs, ReviewLogCollector};
use autoreview_core::platform::{PlatformApi, ReviewSubmission};
use autoreview_core::review::{self, Finding, ReviewResult, ReviewResultRecord};
use autoreview_core::staleness::{self, NewCommitsCheck};
use autoreview_core::types::{Project, ReviewKey};
use autoreview_core::validation::{ModuleValidation, ModuleValidator};
use autoreview_core::ReviewError;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use subprocess_runner::{AuthFailureInfo, SubprocessListener, SubprocessOptions};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

// ---------------------------------------------------------------------------
// Preflight
// ---------------------------------------------------------------------------

/// Environment check run before every review. Blocking; called on the
/// blocking pool.
pub trait Preflight: Send + Sync {
    fn check(&self, project: &Project, config: &ReviewConfig) -> ModuleValidation;
}

/// Probes the real toolchain with [`ModuleValidator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolchainPreflight;

impl Preflight for ToolchainPreflight {
    fn check(&self, project: &Project, config: &ReviewConfig) -> ModuleValidation {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|d| d.to_path_buf()));
        ModuleValidator::new(project.platform)
            .with_backend_override(config.runner.backend_path.clone())
            .with_search_roots(exe_dir, Some(project.path.clone()))
            .validate()
    }
}

// ---------------------------------------------------------------------------
// Requests and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub project: Project,
    pub item_number: u64,
    pub followup: bool,
    pub wait_for_ci: bool,
}

impl ReviewRequest {
    pub fn new(project: Project, item_number: u64) -> Self {
        Self {
            project,
            item_number,
            followup: false,
            wait_for_ci: true,
        }
    }

    pub fn followup(mut self, followup: bool) -> Self {
        self.followup = followup;
        self
    }

    pub fn wait_for_ci(mut self, wait: bool) -> Self {
        self.wait_for_ci = wait;
        self
    }
}

#[derive(Debug, Clone)]
pub enum ReviewOutcome {
    Completed(ReviewResult),
    /// Cancelled or superseded. Nothing was persisted or emitted.
    Cancelled,
}

/// A review running in the background.
pub struct ReviewTask {
    key: ReviewKey,
    handle: JoinHandle<Result<ReviewOutcome>>,
}

impl ReviewTask {
    pub fn key(&self) -> &ReviewKey {
        &self.key
    }

    pub async fn join(self) -> Result<ReviewOutcome> {
        self.handle.await?
    }
}

// ---------------------------------------------------------------------------
// ReviewOrchestrator
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ReviewOrchestrator {
    platform: Arc<dyn PlatformApi>,
    registry: Arc<ReviewRegistry>,
    events: EventBus,
    preflight: Arc<dyn Preflight>,
    token: Option<String>,
    grace_period: Duration,
    ci_gate: Option<CiGate>,
}

impl ReviewOrchestrator {
    pub fn new(platform: Arc<dyn PlatformApi>) -> Self {
        Self {
            platform,
            registry: Arc::new(ReviewRegistry::new()),
            events: EventBus::default(),
            preflight: Arc::new(ToolchainPreflight),
            token: None,
            grace_period: Duration::from_secs(1),
            ci_gate: None,
        }
    }

    pub fn with_preflight(mut self, preflight: Arc<dyn Preflight>) -> Self {
        self.preflight = preflight;
        self
    }

    /// Platform token handed to the analysis process.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Use `gate` instead of the project's configured CI wait.
    pub fn with_ci_gate(mut self, gate: CiGate) -> Self {
        self.ci_gate = Some(gate);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReviewEvent> {
        self.events.subscribe()
    }

    pub fn review_state(&self, key: &ReviewKey) -> Option<SlotState> {
        self.registry.state(key)
    }

    pub fn running_reviews(&self) -> Vec<(ReviewKey, SlotState)> {
        self.registry.entries()
    }

    // -----------------------------------------------------------------------
    // Start / cancel
    // -----------------------------------------------------------------------

    /// Reserve the item and start the review in the background.
    ///
    /// The reservation is taken before this returns, so a second call for the
    /// same item fails with [`OrchestratorError::AlreadyRunning`] even if the
    /// first has not done any work yet. Must be called inside a Tokio runtime.
    pub fn start_review(&self, request: ReviewRequest) -> Result<ReviewTask> {
        let key = ReviewKey::new(request.project.id.clone(), request.item_number)?;
        let Some(reservation) = self.registry.try_reserve(&key) else {
            warn!(key = %key, "review already in progress");
            return Err(OrchestratorError::AlreadyRunning(key.to_string()));
        };
        info!(key = %key, followup = request.followup, ticket = reservation.ticket(), "review reserved");

        let this = self.clone();
        let handle = tokio::spawn(async move {
            let result = this.drive(&reservation, &request).await;
            match &result {
                Ok(ReviewOutcome::Completed(_)) => {
                    info!(key = %reservation.key(), "review complete");
                }
                Ok(ReviewOutcome::Cancelled) => {
                    info!(key = %reservation.key(), "review cancelled");
                }
                Err(e) => {
                    error!(key = %reservation.key(), error = %e, "review failed");
                    if !matches!(e, OrchestratorError::AuthFailed(_)) {
                        this.emit_owned(&reservation, ReviewEvent::error(reservation.key(), e.to_string()));
                    }
                }
            }
            this.registry.release(&reservation);
            result
        });

        Ok(ReviewTask { key, handle })
    }

    /// Start a review and wait for it.
    pub async fn run_review(&self, request: ReviewRequest) -> Result<ReviewOutcome> {
        self.start_review(request)?.join().await
    }

    /// Cancel the review for `key`. Returns false if none was registered.
    ///
    /// A waiting review stops at its next cancellation point. A running
    /// process tree gets a graceful termination, then a forced kill after the
    /// grace period if it is still alive. The key is free again immediately.
    pub fn cancel_review(&self, key: &ReviewKey) -> bool {
        match self.registry.cancel(key) {
            None => {
                debug!(key = %key, "cancel: no review registered");
                false
            }
            Some(Cancelled::Waiting) => {
                info!(key = %key, "cancelled review while waiting for CI");
                true
            }
            Some(Cancelled::Running(handle)) => {
                info!(key = %key, pid = ?handle.pid(), "cancelling review process");
                if let Err(e) = handle.terminate() {
                    warn!(key = %key, error = %e, "graceful termination failed");
                }
                let grace = self.grace_period;
                let key = key.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    if !handle.has_exited() {
                        warn!(key = %key, "review process outlived grace period; killing");
                        if let Err(e) = handle.kill() {
                            warn!(key = %key, error = %e, "forced kill failed");
                        }
                    }
                });
                true
            }
        }
    }

    /// Cancel every review and kill every running process tree.
    pub fn shutdown(&self) {
        let handles = self.registry.drain();
        for handle in &handles {
            if let Err(e) = handle.kill() {
                warn!(pid = ?handle.pid(), error = %e, "kill on shutdown failed");
            }
        }
        info!(killed = handles.len(), "review orchestrator shut down");
    }

    // -----------------------------------------------------------------------
    // CI wait
    // -----------------------------------------------------------------------

    /// Wait for `sha`'s running checks. Returns false only when the wait was
    /// cancelled; timeouts and polling failures let the review proceed.
    pub async fn perform_ci_wait_check(
        &self,
        key: &ReviewKey,
        project: &Project,
        sha: &str,
        config: &CiWaitConfig,
        token: &CancellationToken,
    ) -> bool {
        let gate = self.ci_gate.unwrap_or_else(|| CiGate::from_config(config));
        let label = project.platform.item_kind().to_uppercase();
        let events = self.events.clone();
        let outcome: CiWaitOutcome = gate
            .wait(self.platform.as_ref(), project, sha, token, |o| {
                if token.is_cancelled() {
                    return;
                }
                events.emit(ReviewEvent::progress(
                    key,
                    ReviewStage::WaitingForCi,
                    5,
                    format!(
                        "Waiting for {} CI check(s) on {label} #{} (poll {})",
                        o.in_progress_checks.len(),
                        key.item_number(),
                        o.iterations
                    ),
                ));
            })
            .await;

        if outcome.timed_out {
            info!(key = %key, iterations = outcome.iterations, "CI still running after wait ceiling; reviewing anyway");
        }
        outcome.should_proceed()
    }

    // -----------------------------------------------------------------------
    // Review run
    // -----------------------------------------------------------------------

    fn owns(&self, reservation: &Reservation) -> bool {
        self.registry.owns(reservation)
    }

    fn emit_owned(&self, reservation: &Reservation, event: ReviewEvent) {
        if self.owns(reservation) {
            self.events.emit(event);
        }
    }

    async fn drive(&self, reservation: &Reservation, request: &ReviewRequest) -> Result<ReviewOutcome> {
        let key = reservation.key();
        let project = &request.project;
        let number = request.item_number;
        let label = project.platform.item_kind().to_uppercase();

        let config = match ReviewConfig::load(&project.path) {
            Ok(config) => config,
            Err(e) => {
                warn!(key = %key, error = %e, "could not load review config; using defaults");
                ReviewConfig::default()
            }
        };

        self.emit_owned(
            reservation,
            ReviewEvent::progress(key, ReviewStage::Fetching, 2, format!("Fetching {label} #{number}")),
        );
        let head_sha = match self.platform.fetch_item(project, number).await {
            Ok(item) => Some(item.head_sha),
            Err(e) => {
                warn!(key = %key, error = %e, "could not fetch head commit; skipping CI wait");
                None
            }
        };

        if request.wait_for_ci && config.ci.enabled {
            if let Some(sha) = &head_sha {
                if !self
                    .perform_ci_wait_check(key, project, sha, &config.ci, reservation.token())
                    .await
                {
                    return Ok(ReviewOutcome::Cancelled);
                }
            }
        }
        if !self.owns(reservation) {
            return Ok(ReviewOutcome::Cancelled);
        }

        self.emit_owned(
            reservation,
            ReviewEvent::progress(key, ReviewStage::Validating, 8, "Checking review toolchain"),
        );
        let validation = {
            let preflight = Arc::clone(&self.preflight);
            let project = project.clone();
            let config = config.clone();
            tokio::task::spawn_blocking(move || preflight.check(&project, &config)).await?
        };
        let toolchain = match validation.toolchain {
            Some(toolchain) if validation.valid => toolchain,
            _ => {
                return Err(OrchestratorError::Validation(
                    validation
                        .error
                        .unwrap_or_else(|| "review toolchain is not available".to_string()),
                ))
            }
        };
        if !self.owns(reservation) {
            return Ok(ReviewOutcome::Cancelled);
        }

        let previous = if request.followup {
            review::load_review(&project.path, project.platform, number)
        } else {
            None
        };

        let invocation = RunnerInvocation::new(
            &toolchain.python_path,
            &toolchain.runner_path,
            &project.path,
            project.platform.review_command(request.followup),
        )
        .model(config.runner.model.clone())
        .thinking_level(config.runner.thinking_level.clone())
        .arg(number.to_string());

        let mut env = ProcessEnvironment::new();
        if let Some(token) = &self.token {
            env = env.with_token(project.platform, token.clone());
        }
        let options = SubprocessOptions::new(&invocation.python)
            .args(invocation.argv())
            .cwd(&toolchain.backend_path)
            .env(env.build())
            .result_marker(JSON_MARKER);

        let collector = ReviewLogCollector::new(
            &project.path,
            project.platform,
            number,
            project.repo.clone(),
            request.followup,
            config.logs.save_every,
        );
        let listener = Arc::new(ReviewListener {
            reservation: reservation.clone(),
            registry: Arc::clone(&self.registry),
            events: self.events.clone(),
            collector: Mutex::new(collector),
            auth_failed: AtomicBool::new(false),
        });

        self.emit_owned(
            reservation,
            ReviewEvent::progress(key, ReviewStage::Analyzing, 10, format!("Reviewing {label} #{number}")),
        );
        debug!(key = %key, argv = ?invocation.argv(), "starting review process");
        let running = subprocess_runner::run(options, listener.clone(), parse_review_output);

        if !self.registry.promote(reservation, running.handle.clone()) {
            debug!(key = %key, "cancelled before the process was registered; killing");
            if let Err(e) = running.handle.kill() {
                warn!(key = %key, error = %e, "kill of unregistered review process failed");
            }
            running.wait().await;
            return Ok(ReviewOutcome::Cancelled);
        }

        let outcome = running.wait().await;
        if !self.owns(reservation) {
            debug!(key = %key, "review superseded; discarding output");
            return Ok(ReviewOutcome::Cancelled);
        }
        listener.finalize(outcome.success);

        if !outcome.success {
            let message = outcome
                .error
                .unwrap_or_else(|| "review process failed".to_string());
            if listener.auth_failed.load(Ordering::SeqCst) {
                return Err(OrchestratorError::AuthFailed(message));
            }
            return Err(OrchestratorError::Subprocess(message));
        }
        let Some(data) = outcome.data else {
            return Err(OrchestratorError::Subprocess("review produced no result".to_string()));
        };

        let result = complete_result(data, request, head_sha, previous.as_ref(), Utc::now());

        self.emit_owned(
            reservation,
            ReviewEvent::progress(key, ReviewStage::Saving, 98, "Saving review"),
        );
        {
            let root = project.path.clone();
            let platform = project.platform;
            let result = result.clone();
            tokio::task::spawn_blocking(move || review::save_review(&root, platform, &result)).await??;
        }
        if !self.owns(reservation) {
            return Ok(ReviewOutcome::Cancelled);
        }
        info!(key = %key, findings = result.findings.len(), status = result.overall_status.as_str(), "review saved");
        self.events.emit(ReviewEvent::complete(key, result.clone()));
        Ok(ReviewOutcome::Completed(result))
    }

    // -----------------------------------------------------------------------
    // Queries and posting
    // -----------------------------------------------------------------------

    pub fn get_review(&self, project: &Project, number: u64) -> Option<ReviewResult> {
        review::load_review(&project.path, project.platform, number)
    }

    pub fn get_logs(&self, project: &Project, number: u64) -> Option<PrLogs> {
        logs::load_logs(&project.path, project.platform, number)
    }

    pub async fn check_new_commits(&self, project: &Project, number: u64) -> NewCommitsCheck {
        let config = ReviewConfig::load(&project.path).unwrap_or_default();
        staleness::check_new_commits(self.platform.as_ref(), project, number, &config.staleness).await
    }

    pub async fn check_merge_readiness(&self, project: &Project, number: u64) -> Result<MergeReadiness> {
        Ok(merge::check_merge_readiness(self.platform.as_ref(), project, number).await?)
    }

    /// Post the stored review's findings (all, or only `finding_ids`) and
    /// record what was posted.
    pub async fn post_review(
        &self,
        project: &Project,
        number: u64,
        finding_ids: Option<&[String]>,
    ) -> Result<ReviewResult> {
        let mut stored = {
            let root = project.path.clone();
            let platform = project.platform;
            tokio::task::spawn_blocking(move || review::load_review(&root, platform, number)).await?
        }
        .ok_or(ReviewError::ReviewNotFound(number))?;

        let (submission, posted_ids) = {
            let selected: Vec<&Finding> = match finding_ids {
                None => stored.findings.iter().collect(),
                Some(ids) => stored.findings.iter().filter(|f| ids.contains(&f.id)).collect(),
            };
            if let Some(ids) = finding_ids {
                if selected.len() != ids.len() {
                    let unknown: Vec<&str> = ids
                        .iter()
                        .filter(|id| !selected.iter().any(|f| &f.id == *id))
                        .map(String::as_str)
                        .collect();
                    return Err(OrchestratorError::Validation(format!(
                        "unknown finding id(s): {}",
                        unknown.join(", ")
                    )));
                }
            }
            let submission = ReviewSubmission {
                body: report::review_body(&stored, &selected),
                status: report::submission_status(&stored, &selected),
                commit_sha: stored.reviewed_commit_sha.clone(),
            };
            let ids: Vec<String> = selected.iter().map(|f| f.id.clone()).collect();
            (submission, ids)
        };

        let review_id = self.platform.post_review(project, number, &submission).await?;
        stored.record_posted(&posted_ids, Some(review_id), Utc::now());
        let stored = {
            let root = project.path.clone();
            let platform = project.platform;
            tokio::task::spawn_blocking(move || {
                review::save_review(&root, platform, &stored).map(|()| stored)
            })
            .await??
        };
        info!(project = %project.id, number, review_id, posted = posted_ids.len(), "review posted");
        Ok(stored)
    }
}

fn parse_review_output(stdout: &str, _stderr: &str) -> autoreview_core::Result<ReviewResult> {
    parse_json_as::<ReviewResultRecord>(stdout).map(ReviewResult::from)
}

/// Fill in what the analysis process leaves out and reset posting state.
fn complete_result(
    mut result: ReviewResult,
    request: &ReviewRequest,
    head_sha: Option<String>,
    previous: Option<&ReviewResult>,
    now: DateTime<Utc>,
) -> ReviewResult {
    result.item_number = request.item_number;
    if result.repo.is_empty() {
        result.repo = request.project.repo.clone();
    }
    if result.reviewed_at == DateTime::<Utc>::default() {
        result.reviewed_at = now;
    }
    if result.reviewed_commit_sha.is_none() {
        result.reviewed_commit_sha = head_sha;
    }
    result.is_followup_review |= request.followup;
    if request.followup && result.previous_review_id.is_none() {
        result.previous_review_id = previous.and_then(|p| p.review_id);
    }
    result.success = result.error.is_none();
    result.has_posted_findings = false;
    result.posted_finding_ids.clear();
    result.posted_at = None;
    result.review_id = None;
    result
}

// ---------------------------------------------------------------------------
// ReviewListener
// ---------------------------------------------------------------------------

/// Routes process output into the log collector and the event bus while the
/// run still owns its slot.
struct ReviewListener {
    reservation: Reservation,
    registry: Arc<ReviewRegistry>,
    events: EventBus,
    collector: Mutex<ReviewLogCollector>,
    auth_failed: AtomicBool,
}

impl ReviewListener {
    fn current(&self) -> bool {
        self.registry.owns(&self.reservation)
    }

    fn record(&self, line: &str) {
        if self.current() {
            self.collector
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .process_line(line);
        }
    }

    fn finalize(&self, success: bool) {
        if self.current() {
            self.collector
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .finalize(success);
        }
    }
}

impl SubprocessListener for ReviewListener {
    fn on_progress(&self, percent: u8, message: &str) {
        if self.current() {
            self.events.emit(ReviewEvent::progress(
                self.reservation.key(),
                ReviewStage::Analyzing,
                percent,
                message,
            ));
        }
    }

    fn on_stdout(&self, line: &str) {
        self.record(line);
    }

    fn on_stderr(&self, line: &str) {
        self.record(line);
    }

    fn on_auth_failure(&self, info: &AuthFailureInfo) {
        self.auth_failed.store(true, Ordering::SeqCst);
        if self.current() {
            warn!(key = %self.reservation.key(), failure = ?info.failure_type, "review process lost authentication");
            self.events
                .emit(ReviewEvent::auth_failure(self.reservation.key(), info.clone()));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
