//! Detection of commits pushed after a review.
//!
//! Compares the commit recorded in the stored review against the item's
//! current head. Every platform failure here is advisory: the check degrades
//! to a conservative answer instead of returning an error.

use crate::config::StalenessConfig;
use crate::platform::{CommitComparison, CommitInfo, PlatformApi};
use crate::review::{self, ReviewResult};
use crate::types::Project;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCommitsCheck {
    pub has_new_commits: bool,
    pub new_commit_count: usize,
    pub last_reviewed_commit: Option<String>,
    pub current_head_commit: Option<String>,
    /// At least one new commit is newer than the posted review.
    pub has_commits_after_posting: bool,
    pub followup_eligible: bool,
    /// Files touched by new commits that also carry findings.
    pub overlapping_files: Vec<String>,
    /// A new commit merges the base branch into the head branch.
    pub has_merge_from_base: bool,
}

static MERGE_RE: OnceLock<Regex> = OnceLock::new();

fn merge_re() -> &'static Regex {
    MERGE_RE.get_or_init(|| {
        Regex::new(r"^Merge (?:branch|remote-tracking branch|pull request|commit) ").unwrap()
    })
}

pub fn is_merge_from_base(commit: &CommitInfo) -> bool {
    commit.parent_count >= 2 && merge_re().is_match(commit.message.trim_start())
}

/// Check the stored review of `number` against the platform's current head.
pub async fn check_new_commits(
    platform: &dyn PlatformApi,
    project: &Project,
    number: u64,
    config: &StalenessConfig,
) -> NewCommitsCheck {
    let Some(review) = review::load_review(&project.path, project.platform, number) else {
        return NewCommitsCheck::default();
    };
    let Some(reviewed_sha) = review.reviewed_commit_sha.clone().filter(|s| !s.is_empty()) else {
        return NewCommitsCheck::default();
    };

    let head_sha = match platform.fetch_item(project, number).await {
        Ok(item) => item.head_sha,
        Err(e) => {
            tracing::warn!(project = %project.id, number, error = %e, "could not fetch head commit");
            return NewCommitsCheck {
                last_reviewed_commit: Some(reviewed_sha),
                ..Default::default()
            };
        }
    };

    if head_sha == reviewed_sha {
        return NewCommitsCheck {
            last_reviewed_commit: Some(reviewed_sha),
            current_head_commit: Some(head_sha),
            ..Default::default()
        };
    }

    match platform
        .compare_commits(project, &reviewed_sha, &head_sha)
        .await
    {
        Ok(comparison) => {
            let mut check = evaluate_comparison(&review, &comparison, config);
            check.last_reviewed_commit = Some(reviewed_sha);
            check.current_head_commit = Some(head_sha);
            check
        }
        Err(e) => {
            // Usually a force-push made the reviewed commit unreachable.
            tracing::info!(
                project = %project.id,
                number,
                error = %e,
                "commit comparison failed; treating diverged head as new work"
            );
            NewCommitsCheck {
                has_new_commits: true,
                new_commit_count: 1,
                last_reviewed_commit: Some(reviewed_sha),
                current_head_commit: Some(head_sha),
                has_commits_after_posting: true,
                followup_eligible: true,
                ..Default::default()
            }
        }
    }
}

/// Derive the staleness verdict from a successful comparison.
pub fn evaluate_comparison(
    review: &ReviewResult,
    comparison: &CommitComparison,
    config: &StalenessConfig,
) -> NewCommitsCheck {
    let count = comparison.ahead_by.max(comparison.commits.len());

    let posted_at = review.posted_at.filter(|_| review.has_posted_findings);
    let (after_posting, eligible) = match posted_at {
        Some(posted) => {
            let after = commits_after(&comparison.commits, posted);
            (after, after)
        }
        None => (false, config.followup_when_unposted && count > 0),
    };

    let finding_files: BTreeSet<String> = review.finding_files().into_iter().collect();
    let overlapping_files = comparison
        .files
        .iter()
        .filter(|f| finding_files.contains(*f))
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    NewCommitsCheck {
        has_new_commits: count > 0,
        new_commit_count: count,
        has_commits_after_posting: after_posting,
        followup_eligible: eligible,
        overlapping_files,
        has_merge_from_base: comparison.commits.iter().any(is_merge_from_base),
        ..Default::default()
    }
}

/// Commits without a timestamp count as newer than the posted review.
fn commits_after(commits: &[CommitInfo], posted: DateTime<Utc>) -> bool {
    commits
        .iter()
        .any(|c| c.committed_at.map(|t| t > posted).unwrap_or(true))
}
