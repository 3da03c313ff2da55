//! Environment construction for the analysis subprocess.
//!
//! The child starts from an empty environment: only a fixed allow-list of
//! host variables is inherited, then interpreter settings, then the platform
//! token, then caller overrides (last writer wins).

use crate::types::PlatformKind;
use std::collections::HashMap;

/// Host variables the child may inherit.
pub const INHERITED_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "LOGNAME",
    "SHELL",
    "LANG",
    "LC_ALL",
    "LC_CTYPE",
    "TERM",
    "TMPDIR",
    "TMP",
    "TEMP",
    "XDG_CONFIG_HOME",
    "XDG_CACHE_HOME",
    "SSL_CERT_FILE",
    "SSL_CERT_DIR",
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "NO_PROXY",
    "SYSTEMROOT",
    "COMSPEC",
    "PATHEXT",
    "USERPROFILE",
    "APPDATA",
    "LOCALAPPDATA",
    "PROGRAMDATA",
    "GH_HOST",
    "GITLAB_HOST",
];

/// Interpreter settings that keep the runner's output line-buffered UTF-8.
const PYTHON_VARS: &[(&str, &str)] = &[
    ("PYTHONUNBUFFERED", "1"),
    ("PYTHONIOENCODING", "utf-8"),
    ("PYTHONUTF8", "1"),
    ("PYTHONDONTWRITEBYTECODE", "1"),
];

/// Builder for a child process environment.
#[derive(Debug, Clone, Default)]
pub struct ProcessEnvironment {
    platform: Option<PlatformKind>,
    token: Option<String>,
    overrides: HashMap<String, String>,
}

impl ProcessEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose `token` under the variable names the platform CLI reads.
    pub fn with_token(mut self, platform: PlatformKind, token: impl Into<String>) -> Self {
        let token = token.into();
        self.platform = Some(platform);
        self.token = Some(token).filter(|t| !t.trim().is_empty());
        self
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    pub fn with_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in vars {
            self.overrides.insert(k.into(), v.into());
        }
        self
    }

    /// Build from the current process environment.
    pub fn build(&self) -> HashMap<String, String> {
        self.build_from(std::env::vars())
    }

    /// Build from an explicit host environment (used by tests).
    pub fn build_from<I>(&self, host: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut env: HashMap<String, String> = host
            .into_iter()
            .filter(|(k, v)| !v.is_empty() && is_inherited(k))
            .collect();

        for (k, v) in PYTHON_VARS {
            env.insert((*k).to_string(), (*v).to_string());
        }

        if let (Some(platform), Some(token)) = (self.platform, &self.token) {
            for name in token_vars(platform) {
                env.insert((*name).to_string(), token.clone());
            }
        }

        for (k, v) in &self.overrides {
            env.insert(k.clone(), v.clone());
        }
        env
    }
}

fn is_inherited(key: &str) -> bool {
    if cfg!(windows) {
        INHERITED_VARS.iter().any(|v| v.eq_ignore_ascii_case(key))
    } else {
        INHERITED_VARS.contains(&key)
    }
}

/// Variables carrying the platform token, highest precedence first.
pub fn token_vars(platform: PlatformKind) -> &'static [&'static str] {
    match platform {
        PlatformKind::GitHub => &["GH_TOKEN", "GITHUB_TOKEN"],
        PlatformKind::GitLab => &["GITLAB_TOKEN", "GLAB_TOKEN"],
    }
}
