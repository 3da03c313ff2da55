use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

// ─── SubprocessOptions ────────────────────────────────────────────────────

/// Default progress marker: `[ 45%] message`.
pub const DEFAULT_PROGRESS_PATTERN: &str = r"^\[\s*(\d+)%\]\s*(.*)$";

/// Result error used when a run was killed after an auth failure.
pub const AUTH_FAILED_MESSAGE: &str = "Authentication failed. Please re-authenticate and retry.";

static DEFAULT_PROGRESS_RE: OnceLock<Regex> = OnceLock::new();

pub fn default_progress_regex() -> &'static Regex {
    DEFAULT_PROGRESS_RE.get_or_init(|| Regex::new(DEFAULT_PROGRESS_PATTERN).unwrap())
}

/// Credentials the child runs under, reported back on auth failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthProfile {
    pub id: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SubprocessOptions {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Complete child environment. `None` inherits the parent's.
    pub env: Option<HashMap<String, String>>,
    /// Progress marker; group 1 is the percentage, group 2 the message.
    /// Falls back to [`DEFAULT_PROGRESS_PATTERN`].
    pub progress_pattern: Option<Regex>,
    pub auth_profile: Option<AuthProfile>,
    /// Stdout line that opens the result document. Auth detection stops on
    /// stdout once it is seen.
    pub result_marker: Option<String>,
}

impl SubprocessOptions {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn progress_pattern(mut self, re: Regex) -> Self {
        self.progress_pattern = Some(re);
        self
    }

    pub fn auth_profile(mut self, profile: AuthProfile) -> Self {
        self.auth_profile = Some(profile);
        self
    }

    pub fn result_marker(mut self, marker: impl Into<String>) -> Self {
        self.result_marker = Some(marker.into());
        self
    }
}

// ─── SubprocessResult ─────────────────────────────────────────────────────

/// Terminal value of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct SubprocessResult<T> {
    pub success: bool,
    /// `None` when the process was killed by a signal or never started.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    /// Set only when `success` is true.
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> SubprocessResult<T> {
    pub fn ok(exit_code: Option<i32>, stdout: String, stderr: String, data: T) -> Self {
        Self {
            success: true,
            exit_code,
            stdout,
            stderr,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
        error: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            exit_code,
            stdout,
            stderr,
            data: None,
            error: Some(error.into()),
        }
    }
}

// ─── Auth failures ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFailureType {
    Unauthorized,
    TokenExpired,
    InvalidCredentials,
    NotLoggedIn,
}

impl AuthFailureType {
    pub fn message(self) -> &'static str {
        match self {
            AuthFailureType::Unauthorized => "The platform rejected the request as unauthorized.",
            AuthFailureType::TokenExpired => "The access token has expired.",
            AuthFailureType::InvalidCredentials => "The configured credentials are invalid.",
            AuthFailureType::NotLoggedIn => "The platform CLI is not logged in.",
        }
    }
}

static AUTH_PATTERNS: OnceLock<Vec<(Regex, AuthFailureType)>> = OnceLock::new();
static ERROR_LINE: OnceLock<Regex> = OnceLock::new();
static CLI_LOGGED_OUT: OnceLock<Regex> = OnceLock::new();

fn auth_patterns() -> &'static [(Regex, AuthFailureType)] {
    AUTH_PATTERNS.get_or_init(|| {
        [
            (
                r"(?i)\b(token|credentials?|session)\b.{0,20}\b(has |have )?expired\b",
                AuthFailureType::TokenExpired,
            ),
            (
                r"(?i)\b(invalid|bad|revoked) (api[ _-]?key|token|credentials?)\b",
                AuthFailureType::InvalidCredentials,
            ),
            (r"(?i)\bnot (logged in|authenticated)\b", AuthFailureType::NotLoggedIn),
            (
                r"(?i)\b(authentication (failed|required|error)|401 unauthori[sz]ed|http 401\b|error code: 401\b)",
                AuthFailureType::Unauthorized,
            ),
        ]
        .into_iter()
        .map(|(pat, kind)| (Regex::new(pat).unwrap(), kind))
        .collect()
    })
}

/// `Error: …`, `gh: HTTP 401 …`, `anthropic.AuthenticationError: …`, `API Error …`.
fn error_line_regex() -> &'static Regex {
    ERROR_LINE.get_or_init(|| {
        Regex::new(
            r"(?i)^(?:[\w.\-]+:\s*)?(?:error\b|fatal\b|exception\b|api error\b|http \d{3}\b|401\b|\w+(?:error|exception):)",
        )
        .unwrap()
    })
}

/// The `gh` / `glab` logged-out message, which carries no error prefix.
fn cli_logged_out_regex() -> &'static Regex {
    CLI_LOGGED_OUT.get_or_init(|| {
        Regex::new(r"(?i)^you are not logged in(?:to| to) any (?:github|gitlab) hosts").unwrap()
    })
}

/// Classify `line` as an authentication failure signature.
///
/// Only error-shaped lines are considered. Structured output (lines opening
/// with `{`, `[`, `"` or a backtick) and `[Tag]` analysis lines never match.
pub fn detect_auth_failure(line: &str) -> Option<AuthFailureType> {
    let line = line.trim();
    if line.starts_with(['{', '[', '"', '`']) {
        return None;
    }
    if cli_logged_out_regex().is_match(line) {
        return Some(AuthFailureType::NotLoggedIn);
    }
    if !error_line_regex().is_match(line) {
        return None;
    }
    auth_patterns()
        .iter()
        .find(|(re, _)| re.is_match(line))
        .map(|(_, kind)| *kind)
}

/// Reported at most once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthFailureInfo {
    pub profile_id: String,
    pub profile_name: Option<String>,
    pub failure_type: AuthFailureType,
    pub message: String,
    pub original_error: Option<String>,
    pub detected_at: DateTime<Utc>,
}

impl AuthFailureInfo {
    pub fn new(profile: Option<&AuthProfile>, failure_type: AuthFailureType, line: &str) -> Self {
        Self {
            profile_id: profile.map(|p| p.id.clone()).unwrap_or_default(),
            profile_name: profile.and_then(|p| p.name.clone()),
            failure_type,
            message: failure_type.message().to_string(),
            original_error: Some(line.trim().to_string()),
            detected_at: Utc::now(),
        }
    }
}
