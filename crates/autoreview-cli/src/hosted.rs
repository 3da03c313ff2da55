//! [`PlatformApi`] backed by the `gh` / `glab` CLIs.
//!
//! Every call shells out to `<cli> api <endpoint>` with a 30 s ceiling and
//! maps the JSON response onto the platform-neutral types.

use async_trait::async_trait;
use autoreview_core::platform::{
    CheckConclusion, CheckRun, CheckStatus, CommitComparison, CommitInfo, ItemSnapshot,
    PlatformApi, PlatformResult, ReviewSubmission,
};
use autoreview_core::types::{OverallStatus, PlatformKind, Project};
use autoreview_core::PlatformError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub const API_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Default)]
pub struct CliPlatform;

impl CliPlatform {
    async fn api<T: DeserializeOwned>(
        &self,
        platform: PlatformKind,
        args: &[&str],
        input: Option<Vec<u8>>,
    ) -> PlatformResult<T> {
        let program = platform.cli_name();
        let mut cmd = Command::new(program);
        cmd.arg("api")
            .args(args)
            .env("GH_NO_UPDATE_NOTIFIER", "1")
            .env("GLAB_NO_UPDATE_NOTIFIER", "1")
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(program, ?args, "platform api call");
        let mut child = cmd
            .spawn()
            .map_err(|e| PlatformError::Request(format!("failed to run {program}: {e}")))?;

        if let (Some(body), Some(mut stdin)) = (input, child.stdin.take()) {
            stdin
                .write_all(&body)
                .await
                .map_err(|e| PlatformError::Request(format!("failed to write {program} input: {e}")))?;
        }

        let output = tokio::time::timeout(API_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| PlatformError::Timeout(API_TIMEOUT.as_secs()))?
            .map_err(|e| PlatformError::Request(format!("{program} api failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(classify_failure(&stderr));
        }
        serde_json::from_slice(&output.stdout)
            .map_err(|e| PlatformError::Request(format!("unexpected {program} api response: {e}")))
    }
}

fn classify_failure(stderr: &str) -> PlatformError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("401") || lower.contains("bad credentials") || lower.contains("auth login") {
        PlatformError::Auth(stderr.to_string())
    } else if lower.contains("404") || lower.contains("not found") {
        PlatformError::NotFound(stderr.to_string())
    } else {
        PlatformError::Request(stderr.to_string())
    }
}

/// GitLab addresses projects by their URL-encoded path.
fn gitlab_project(repo: &str) -> String {
    repo.replace('/', "%2F")
}

#[async_trait]
impl PlatformApi for CliPlatform {
    async fn fetch_item(&self, project: &Project, number: u64) -> PlatformResult<ItemSnapshot> {
        match project.platform {
            PlatformKind::GitHub => {
                let endpoint = format!("repos/{}/pulls/{number}", project.repo);
                let pr: GhPull = self.api(project.platform, &[endpoint.as_str()], None).await?;
                Ok(pr.into_snapshot(number))
            }
            PlatformKind::GitLab => {
                let endpoint = format!(
                    "projects/{}/merge_requests/{number}",
                    gitlab_project(&project.repo)
                );
                let mr: GlMergeRequest = self.api(project.platform, &[endpoint.as_str()], None).await?;
                Ok(mr.into_snapshot(number))
            }
        }
    }

    async fn list_checks(&self, project: &Project, sha: &str) -> PlatformResult<Vec<CheckRun>> {
        match project.platform {
            PlatformKind::GitHub => {
                let endpoint = format!("repos/{}/commits/{sha}/check-runs?per_page=100", project.repo);
                let runs: GhCheckRuns = self.api(project.platform, &[endpoint.as_str()], None).await?;
                Ok(runs.check_runs.into_iter().map(GhCheckRun::into_check).collect())
            }
            PlatformKind::GitLab => {
                let endpoint = format!(
                    "projects/{}/repository/commits/{sha}/statuses",
                    gitlab_project(&project.repo)
                );
                let statuses: Vec<GlStatus> = self.api(project.platform, &[endpoint.as_str()], None).await?;
                Ok(statuses.into_iter().map(GlStatus::into_check).collect())
            }
        }
    }

    async fn compare_commits(
        &self,
        project: &Project,
        base: &str,
        head: &str,
    ) -> PlatformResult<CommitComparison> {
        match project.platform {
            PlatformKind::GitHub => {
                let endpoint = format!("repos/{}/compare/{base}...{head}", project.repo);
                let cmp: GhCompare = self.api(project.platform, &[endpoint.as_str()], None).await?;
                Ok(cmp.into_comparison())
            }
            PlatformKind::GitLab => {
                let endpoint = format!(
                    "projects/{}/repository/compare?from={base}&to={head}",
                    gitlab_project(&project.repo)
                );
                let cmp: GlCompare = self.api(project.platform, &[endpoint.as_str()], None).await?;
                Ok(cmp.into_comparison())
            }
        }
    }

    async fn post_review(
        &self,
        project: &Project,
        number: u64,
        submission: &ReviewSubmission,
    ) -> PlatformResult<u64> {
        match project.platform {
            PlatformKind::GitHub => {
                let endpoint = format!("repos/{}/pulls/{number}/reviews", project.repo);
                let payload = github_review_payload(submission);
                let body = serde_json::to_vec(&payload)
                    .map_err(|e| PlatformError::Request(e.to_string()))?;
                let created: Created = self
                    .api(
                        project.platform,
                        &[endpoint.as_str(), "--method", "POST", "--input", "-"],
                        Some(body),
                    )
                    .await?;
                Ok(created.id)
            }
            PlatformKind::GitLab => {
                let mr = format!(
                    "projects/{}/merge_requests/{number}",
                    gitlab_project(&project.repo)
                );
                let body = serde_json::to_vec(&serde_json::json!({ "body": submission.body }))
                    .map_err(|e| PlatformError::Request(e.to_string()))?;
                let notes = format!("{mr}/notes");
                let created: Created = self
                    .api(
                        project.platform,
                        &[notes.as_str(), "--method", "POST", "--input", "-"],
                        Some(body),
                    )
                    .await?;
                if submission.status == OverallStatus::Approve {
                    let approve = format!("{mr}/approve");
                    if let Err(e) = self
                        .api::<serde_json::Value>(project.platform, &[approve.as_str(), "--method", "POST"], None)
                        .await
                    {
                        tracing::warn!(repo = %project.repo, number, error = %e, "approval failed; note was posted");
                    }
                }
                Ok(created.id)
            }
        }
    }
}

fn github_review_payload(submission: &ReviewSubmission) -> serde_json::Value {
    let event = match submission.status {
        OverallStatus::Approve => "APPROVE",
        OverallStatus::RequestChanges => "REQUEST_CHANGES",
        OverallStatus::Comment => "COMMENT",
    };
    let mut payload = serde_json::json!({ "body": submission.body, "event": event });
    if let Some(sha) = &submission.commit_sha {
        payload["commit_id"] = serde_json::Value::String(sha.clone());
    }
    payload
}

// ---------------------------------------------------------------------------
// Response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Created {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct GhRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GhPull {
    head: GhRef,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    mergeable: Option<bool>,
    #[serde(default)]
    mergeable_state: Option<String>,
}

impl GhPull {
    fn into_snapshot(self, number: u64) -> ItemSnapshot {
        let state = self.mergeable_state.unwrap_or_default();
        ItemSnapshot {
            number,
            head_sha: self.head.sha,
            is_draft: self.draft,
            mergeable: self.mergeable,
            is_behind: state == "behind",
            has_conflicts: state == "dirty",
        }
    }
}

#[derive(Debug, Deserialize)]
struct GhCheckRuns {
    #[serde(default)]
    check_runs: Vec<GhCheckRun>,
}

#[derive(Debug, Deserialize)]
struct GhCheckRun {
    name: String,
    status: String,
    #[serde(default)]
    conclusion: Option<String>,
}

impl GhCheckRun {
    fn into_check(self) -> CheckRun {
        let status = match self.status.as_str() {
            "in_progress" => CheckStatus::InProgress,
            "completed" => CheckStatus::Completed,
            _ => CheckStatus::Queued,
        };
        let conclusion = self.conclusion.as_deref().and_then(|c| match c {
            "success" => Some(CheckConclusion::Success),
            "failure" => Some(CheckConclusion::Failure),
            "neutral" => Some(CheckConclusion::Neutral),
            "cancelled" => Some(CheckConclusion::Cancelled),
            "skipped" => Some(CheckConclusion::Skipped),
            "timed_out" => Some(CheckConclusion::TimedOut),
            "action_required" => Some(CheckConclusion::ActionRequired),
            _ => None,
        });
        CheckRun {
            name: self.name,
            status,
            conclusion,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GhCommitMeta {
    message: String,
    #[serde(default)]
    committer: Option<GhSignature>,
}

#[derive(Debug, Deserialize)]
struct GhSignature {
    #[serde(default)]
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GhCommit {
    sha: String,
    commit: GhCommitMeta,
    #[serde(default)]
    parents: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GhFile {
    filename: String,
}

#[derive(Debug, Deserialize)]
struct GhCompare {
    #[serde(default)]
    ahead_by: usize,
    #[serde(default)]
    commits: Vec<GhCommit>,
    #[serde(default)]
    files: Vec<GhFile>,
}

impl GhCompare {
    fn into_comparison(self) -> CommitComparison {
        CommitComparison {
            ahead_by: self.ahead_by,
            commits: self
                .commits
                .into_iter()
                .map(|c| CommitInfo {
                    sha: c.sha,
                    message: c.commit.message,
                    parent_count: c.parents.len(),
                    committed_at: c.commit.committer.and_then(|s| s.date),
                })
                .collect(),
            files: self.files.into_iter().map(|f| f.filename).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GlMergeRequest {
    sha: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    work_in_progress: bool,
    #[serde(default)]
    merge_status: Option<String>,
    #[serde(default)]
    detailed_merge_status: Option<String>,
    #[serde(default)]
    has_conflicts: bool,
}

impl GlMergeRequest {
    fn into_snapshot(self, number: u64) -> ItemSnapshot {
        let mergeable = match self.merge_status.as_deref() {
            Some("can_be_merged") => Some(true),
            Some("cannot_be_merged") => Some(false),
            _ => None,
        };
        ItemSnapshot {
            number,
            head_sha: self.sha,
            is_draft: self.draft || self.work_in_progress,
            mergeable,
            is_behind: self.detailed_merge_status.as_deref() == Some("need_rebase"),
            has_conflicts: self.has_conflicts,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GlStatus {
    name: String,
    status: String,
}

impl GlStatus {
    fn into_check(self) -> CheckRun {
        let (status, conclusion) = match self.status.as_str() {
            "running" => (CheckStatus::InProgress, None),
            "success" => (CheckStatus::Completed, Some(CheckConclusion::Success)),
            "failed" => (CheckStatus::Completed, Some(CheckConclusion::Failure)),
            "canceled" => (CheckStatus::Completed, Some(CheckConclusion::Cancelled)),
            "skipped" => (CheckStatus::Completed, Some(CheckConclusion::Skipped)),
            _ => (CheckStatus::Queued, None),
        };
        CheckRun {
            name: self.name,
            status,
            conclusion,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GlCommit {
    id: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    parent_ids: Vec<String>,
    #[serde(default)]
    committed_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GlDiff {
    new_path: String,
}

#[derive(Debug, Deserialize)]
struct GlCompare {
    #[serde(default)]
    commits: Vec<GlCommit>,
    #[serde(default)]
    diffs: Vec<GlDiff>,
}

impl GlCompare {
    fn into_comparison(self) -> CommitComparison {
        CommitComparison {
            ahead_by: self.commits.len(),
            commits: self
                .commits
                .into_iter()
                .map(|c| CommitInfo {
                    sha: c.id,
                    message: c.message,
                    parent_count: c.parent_ids.len(),
                    committed_at: c.committed_date,
                })
                .collect(),
            files: self.diffs.into_iter().map(|d| d.new_path).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn github_pull_state_maps_to_snapshot() {
        let pr: GhPull = serde_json::from_str(
            r#"{"head": {"sha": "abc"}, "draft": true, "mergeable": null, "mergeable_state": "behind"}"#,
        )
        .unwrap();
        let item = pr.into_snapshot(5);
        assert_eq!(item.head_sha, "abc");
        assert!(item.is_draft && item.is_behind && !item.has_conflicts);
        assert_eq!(item.mergeable, None);
    }

    #[test]
    fn github_check_status_mapping() {
        let runs: GhCheckRuns = serde_json::from_str(
            r#"{"check_runs": [
                {"name": "a", "status": "queued"},
                {"name": "b", "status": "in_progress", "conclusion": null},
                {"name": "c", "status": "completed", "conclusion": "timed_out"},
                {"name": "d", "status": "waiting"}
            ]}"#,
        )
        .unwrap();
        let checks: Vec<CheckRun> = runs.check_runs.into_iter().map(GhCheckRun::into_check).collect();
        assert_eq!(checks[0].status, CheckStatus::Queued);
        assert_eq!(checks[1].status, CheckStatus::InProgress);
        assert_eq!(checks[2].conclusion, Some(CheckConclusion::TimedOut));
        assert_eq!(checks[3].status, CheckStatus::Queued);
    }

    #[test]
    fn gitlab_pipeline_jobs_map_to_checks() {
        let statuses: Vec<GlStatus> = serde_json::from_str(
            r#"[{"name": "test", "status": "running"}, {"name": "lint", "status": "pending"},
                {"name": "build", "status": "failed"}]"#,
        )
        .unwrap();
        let checks: Vec<CheckRun> = statuses.into_iter().map(GlStatus::into_check).collect();
        assert_eq!(checks[0].status, CheckStatus::InProgress);
        assert_eq!(checks[1].status, CheckStatus::Queued);
        assert_eq!(checks[2].conclusion, Some(CheckConclusion::Failure));
    }

    #[test]
    fn github_compare_counts_parents_and_files() {
        let cmp: GhCompare = serde_json::from_str(
            r#"{"ahead_by": 2, "commits": [
                {"sha": "1", "commit": {"message": "fix", "committer": {"date": "2026-01-02T03:04:05Z"}}, "parents": [{}]},
                {"sha": "2", "commit": {"message": "Merge branch 'main'"}, "parents": [{}, {}]}
            ], "files": [{"filename": "src/a.rs"}]}"#,
        )
        .unwrap();
        let cmp = cmp.into_comparison();
        assert_eq!(cmp.ahead_by, 2);
        assert_eq!(cmp.commits[1].parent_count, 2);
        assert!(cmp.commits[0].committed_at.is_some());
        assert_eq!(cmp.files, vec!["src/a.rs"]);
    }

    #[test]
    fn review_payload_carries_verdict_and_commit() {
        let payload = github_review_payload(&ReviewSubmission {
            body: "b".into(),
            status: OverallStatus::RequestChanges,
            commit_sha: Some("abc".into()),
        });
        assert_eq!(payload["event"], "REQUEST_CHANGES");
        assert_eq!(payload["commit_id"], "abc");
    }

    #[test]
    fn failures_are_classified() {
        assert!(matches!(classify_failure("HTTP 401: Bad credentials"), PlatformError::Auth(_)));
        assert!(matches!(classify_failure("HTTP 404: Not Found"), PlatformError::NotFound(_)));
        assert!(matches!(classify_failure("HTTP 502"), PlatformError::Request(_)));
        assert_eq!(gitlab_project("group/sub/app"), "group%2Fsub%2Fapp");
    }
}
