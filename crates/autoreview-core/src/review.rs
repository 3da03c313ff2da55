//! Review results: the in-memory model, its on-disk record, and the store.
//!
//! On disk every field is snake_case and optional (files written by older
//! versions omit many of them). In memory the model is fully populated and
//! serializes as camelCase for UI payloads. The two shapes are converted field
//! by field so a rename on one side can never silently drop data.

use crate::error::Result;
use crate::io;
use crate::paths;
use crate::types::{OverallStatus, PlatformKind, Severity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Finding
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub id: String,
    pub severity: Severity,
    pub category: String,
    pub title: String,
    pub description: String,
    pub file: String,
    pub line: u32,
    pub end_line: Option<u32>,
    pub suggested_fix: Option<String>,
    pub fixable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindingRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    #[serde(default)]
    pub fixable: bool,
}

impl From<FindingRecord> for Finding {
    fn from(r: FindingRecord) -> Self {
        Self {
            id: r.id,
            severity: r.severity,
            category: r.category,
            title: r.title,
            description: r.description,
            file: r.file,
            line: r.line,
            end_line: r.end_line,
            suggested_fix: r.suggested_fix,
            fixable: r.fixable,
        }
    }
}

impl From<&Finding> for FindingRecord {
    fn from(f: &Finding) -> Self {
        Self {
            id: f.id.clone(),
            severity: f.severity,
            category: f.category.clone(),
            title: f.title.clone(),
            description: f.description.clone(),
            file: f.file.clone(),
            line: f.line,
            end_line: f.end_line,
            suggested_fix: f.suggested_fix.clone(),
            fixable: f.fixable,
        }
    }
}

// ---------------------------------------------------------------------------
// ReviewResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResult {
    pub item_number: u64,
    pub repo: String,
    pub success: bool,
    pub findings: Vec<Finding>,
    pub summary: String,
    pub overall_status: OverallStatus,
    pub reviewed_at: DateTime<Utc>,
    pub reviewed_commit_sha: Option<String>,
    pub is_followup_review: bool,
    pub previous_review_id: Option<u64>,
    pub resolved_findings: Vec<String>,
    pub unresolved_findings: Vec<String>,
    pub has_posted_findings: bool,
    pub posted_finding_ids: Vec<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub review_id: Option<u64>,
    pub error: Option<String>,
}

impl ReviewResult {
    /// Files that carry at least one finding, deduplicated and sorted.
    pub fn finding_files(&self) -> Vec<String> {
        let mut files: Vec<String> = self
            .findings
            .iter()
            .filter(|f| !f.file.is_empty())
            .map(|f| f.file.clone())
            .collect();
        files.sort();
        files.dedup();
        files
    }

    /// Record that `finding_ids` were posted to the platform as `review_id`.
    /// Previously posted ids are kept; duplicates are dropped.
    pub fn record_posted(
        &mut self,
        finding_ids: &[String],
        review_id: Option<u64>,
        posted_at: DateTime<Utc>,
    ) {
        for id in finding_ids {
            if !self.posted_finding_ids.contains(id) {
                self.posted_finding_ids.push(id.clone());
            }
        }
        self.has_posted_findings = true;
        self.posted_at = Some(posted_at);
        if review_id.is_some() {
            self.review_id = review_id;
        }
    }
}

// ---------------------------------------------------------------------------
// ReviewResultRecord (on disk)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewResultRecord {
    #[serde(default, alias = "pr_number", alias = "mr_iid")]
    pub item_number: u64,
    #[serde(default, alias = "project")]
    pub repo: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub findings: Vec<FindingRecord>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub overall_status: OverallStatus,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub reviewed_commit_sha: Option<String>,
    #[serde(default)]
    pub is_followup_review: bool,
    #[serde(default)]
    pub previous_review_id: Option<u64>,
    #[serde(default)]
    pub resolved_findings: Vec<String>,
    #[serde(default)]
    pub unresolved_findings: Vec<String>,
    #[serde(default)]
    pub has_posted_findings: bool,
    #[serde(default)]
    pub posted_finding_ids: Vec<String>,
    #[serde(default)]
    pub posted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub review_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ReviewResultRecord> for ReviewResult {
    fn from(r: ReviewResultRecord) -> Self {
        Self {
            item_number: r.item_number,
            repo: r.repo,
            success: r.success,
            findings: r.findings.into_iter().map(Finding::from).collect(),
            summary: r.summary,
            overall_status: r.overall_status,
            reviewed_at: r.reviewed_at.unwrap_or_default(),
            reviewed_commit_sha: r.reviewed_commit_sha,
            is_followup_review: r.is_followup_review,
            previous_review_id: r.previous_review_id,
            resolved_findings: r.resolved_findings,
            unresolved_findings: r.unresolved_findings,
            has_posted_findings: r.has_posted_findings,
            posted_finding_ids: r.posted_finding_ids,
            posted_at: r.posted_at,
            review_id: r.review_id,
            error: r.error,
        }
    }
}

impl From<&ReviewResult> for ReviewResultRecord {
    fn from(r: &ReviewResult) -> Self {
        Self {
            item_number: r.item_number,
            repo: r.repo.clone(),
            success: r.success,
            findings: r.findings.iter().map(FindingRecord::from).collect(),
            summary: r.summary.clone(),
            overall_status: r.overall_status,
            reviewed_at: Some(r.reviewed_at),
            reviewed_commit_sha: r.reviewed_commit_sha.clone(),
            is_followup_review: r.is_followup_review,
            previous_review_id: r.previous_review_id,
            resolved_findings: r.resolved_findings.clone(),
            unresolved_findings: r.unresolved_findings.clone(),
            has_posted_findings: r.has_posted_findings,
            posted_finding_ids: r.posted_finding_ids.clone(),
            posted_at: r.posted_at,
            review_id: r.review_id,
            error: r.error.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Persist `review` as `review_<n>.json`, replacing any previous run.
pub fn save_review(root: &Path, platform: PlatformKind, review: &ReviewResult) -> Result<()> {
    let path = paths::review_path(root, platform, review.item_number);
    io::write_json(&path, &ReviewResultRecord::from(review))
}

/// Load the stored review for `number`. Missing or unreadable files are `None`.
pub fn load_review(root: &Path, platform: PlatformKind, number: u64) -> Option<ReviewResult> {
    let path = paths::review_path(root, platform, number);
    io::read_json::<ReviewResultRecord>(&path).map(|mut record| {
        if record.item_number == 0 {
            record.item_number = number;
        }
        ReviewResult::from(record)
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
