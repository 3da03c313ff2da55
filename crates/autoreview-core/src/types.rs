use crate::error::{Result, ReviewError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// PlatformKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    GitHub,
    GitLab,
}

impl PlatformKind {
    /// Directory name under the tool directory.
    pub fn as_str(self) -> &'static str {
        match self {
            PlatformKind::GitHub => "github",
            PlatformKind::GitLab => "gitlab",
        }
    }

    /// Directory name for review items: `pr` on GitHub, `mr` on GitLab.
    pub fn item_kind(self) -> &'static str {
        match self {
            PlatformKind::GitHub => "pr",
            PlatformKind::GitLab => "mr",
        }
    }

    /// The platform CLI the analysis backend shells out to.
    pub fn cli_name(self) -> &'static str {
        match self {
            PlatformKind::GitHub => "gh",
            PlatformKind::GitLab => "glab",
        }
    }

    /// Runner sub-command for a review of this platform's items.
    pub fn review_command(self, followup: bool) -> &'static str {
        match (self, followup) {
            (PlatformKind::GitHub, false) => "review-pr",
            (PlatformKind::GitHub, true) => "followup-review-pr",
            (PlatformKind::GitLab, false) => "review-mr",
            (PlatformKind::GitLab, true) => "followup-review-mr",
        }
    }
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PlatformKind {
    type Err = ReviewError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(PlatformKind::GitHub),
            "gitlab" => Ok(PlatformKind::GitLab),
            _ => Err(ReviewError::Config(format!("unknown platform '{s}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

/// A project record as handed over by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub path: PathBuf,
    pub platform: PlatformKind,
    /// `owner/name` on GitHub, the project path or numeric id on GitLab.
    pub repo: String,
}

// ---------------------------------------------------------------------------
// ReviewKey
// ---------------------------------------------------------------------------

/// Identifies one review slot: a project plus a PR/MR number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewKey {
    project_id: String,
    item_number: u64,
}

impl ReviewKey {
    pub fn new(project_id: impl Into<String>, item_number: u64) -> Result<Self> {
        let project_id = project_id.into();
        if project_id.is_empty() {
            return Err(ReviewError::InvalidKey("project id is empty".into()));
        }
        if item_number == 0 {
            return Err(ReviewError::InvalidKey(
                "item number must be positive".into(),
            ));
        }
        Ok(Self {
            project_id,
            item_number,
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn item_number(&self) -> u64 {
        self.item_number
    }
}

impl fmt::Display for ReviewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.project_id, self.item_number)
    }
}

// ---------------------------------------------------------------------------
// Severity / OverallStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Medium
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Approve,
    RequestChanges,
    Comment,
}

impl OverallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OverallStatus::Approve => "approve",
            OverallStatus::RequestChanges => "request_changes",
            OverallStatus::Comment => "comment",
        }
    }
}

impl Default for OverallStatus {
    fn default() -> Self {
        OverallStatus::Comment
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
