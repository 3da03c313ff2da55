//! Port to the hosting platform (GitHub / GitLab).
//!
//! The orchestration layer never talks HTTP itself; the host application
//! provides an implementation of [`PlatformApi`].

use crate::error::PlatformError;
use crate::types::{OverallStatus, Project};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

// ---------------------------------------------------------------------------
// Item snapshot
// ---------------------------------------------------------------------------

/// Current state of a pull/merge request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSnapshot {
    pub number: u64,
    pub head_sha: String,
    pub is_draft: bool,
    /// `None` while the platform is still computing mergeability.
    pub mergeable: Option<bool>,
    /// Head branch is behind its base.
    pub is_behind: bool,
    pub has_conflicts: bool,
}

// ---------------------------------------------------------------------------
// Checks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Queued,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckConclusion {
    Success,
    Failure,
    Neutral,
    Cancelled,
    Skipped,
    TimedOut,
    ActionRequired,
}

impl CheckConclusion {
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            CheckConclusion::Failure
                | CheckConclusion::Cancelled
                | CheckConclusion::TimedOut
                | CheckConclusion::ActionRequired
        )
    }
}

/// A CI check run (GitHub) or pipeline job (GitLab) on a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRun {
    pub name: String,
    pub status: CheckStatus,
    pub conclusion: Option<CheckConclusion>,
}

// ---------------------------------------------------------------------------
// Commit comparison
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
    pub parent_count: usize,
    pub committed_at: Option<DateTime<Utc>>,
}

/// Result of comparing `base...head`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitComparison {
    pub ahead_by: usize,
    pub commits: Vec<CommitInfo>,
    /// Paths touched between base and head.
    pub files: Vec<String>,
}

// ---------------------------------------------------------------------------
// Review submission
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSubmission {
    pub body: String,
    pub status: OverallStatus,
    pub commit_sha: Option<String>,
}

// ---------------------------------------------------------------------------
// PlatformApi
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn fetch_item(&self, project: &Project, number: u64) -> PlatformResult<ItemSnapshot>;

    async fn list_checks(&self, project: &Project, sha: &str) -> PlatformResult<Vec<CheckRun>>;

    async fn compare_commits(
        &self,
        project: &Project,
        base: &str,
        head: &str,
    ) -> PlatformResult<CommitComparison>;

    /// Submit a review and return the platform's review (or note) id.
    async fn post_review(
        &self,
        project: &Project,
        number: u64,
        submission: &ReviewSubmission,
    ) -> PlatformResult<u64>;
}
