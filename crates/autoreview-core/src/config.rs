use crate::error::{Result, ReviewError};
use crate::paths;
use crate::types::{PlatformKind, Project};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// CiWaitConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CiWaitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    20
}

fn default_max_wait() -> u64 {
    30 * 60
}

impl Default for CiWaitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval(),
            max_wait_secs: default_max_wait(),
        }
    }
}

impl CiWaitConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Number of polls that fit in the wait ceiling (90 with the defaults).
    pub fn max_iterations(&self) -> u32 {
        let n = self.max_wait_secs / self.poll_interval_secs.max(1);
        u32::try_from(n).unwrap_or(u32::MAX).max(1)
    }
}

// ---------------------------------------------------------------------------
// RunnerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Explicit backend directory; skips the candidate probe when it exists.
    #[serde(default)]
    pub backend_path: Option<PathBuf>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub thinking_level: Option<String>,
    /// Delay between graceful termination and forced kill on cancel.
    #[serde(default = "default_grace_ms")]
    pub grace_period_ms: u64,
}

fn default_grace_ms() -> u64 {
    1000
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            backend_path: None,
            model: None,
            thinking_level: None,
            grace_period_ms: default_grace_ms(),
        }
    }
}

impl RunnerConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

// ---------------------------------------------------------------------------
// LogsConfig / StalenessConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsConfig {
    /// Persist the log file after this many entries when no phase changed.
    #[serde(default = "default_save_every")]
    pub save_every: usize,
}

fn default_save_every() -> usize {
    3
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            save_every: default_save_every(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StalenessConfig {
    /// Follow-up eligibility when new commits exist but no findings were
    /// ever posted.
    #[serde(default = "default_true")]
    pub followup_when_unposted: bool,
}

impl Default for StalenessConfig {
    fn default() -> Self {
        Self {
            followup_when_unposted: true,
        }
    }
}

// ---------------------------------------------------------------------------
// ReviewConfig
// ---------------------------------------------------------------------------

/// Per-project settings from `.autoreview/config.yaml`. Every field is
/// optional on disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewConfig {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub platform: Option<PlatformKind>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub ci: CiWaitConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default)]
    pub staleness: StalenessConfig,
}

impl ReviewConfig {
    /// Load the config for `root`. A missing file yields the defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        let config: ReviewConfig = serde_yaml::from_str(&data)?;
        Ok(config)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&paths::config_path(root), data.as_bytes())
    }

    /// Build the project record for `root`.
    ///
    /// The project id defaults to the directory name; the platform defaults to
    /// GitHub. The repository slug is required.
    pub fn project(&self, root: &Path) -> Result<Project> {
        let repo = self.repo.clone().filter(|r| !r.trim().is_empty()).ok_or_else(|| {
            ReviewError::Config(format!(
                "'repo' is not set in {}",
                paths::config_path(root).display()
            ))
        })?;
        let id = self.project_id.clone().unwrap_or_else(|| {
            root.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "default".to_string())
        });
        Ok(Project {
            id,
            path: root.to_path_buf(),
            platform: self.platform.unwrap_or(PlatformKind::GitHub),
            repo,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
