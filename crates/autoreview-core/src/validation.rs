//! Preflight checks for the external review toolchain.
//!
//! Checks run in a fixed order and stop at the first failure, so the report
//! always names the one thing the user has to fix next.

use crate::paths;
use crate::types::PlatformKind;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Resolved paths needed to launch the runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Toolchain {
    pub backend_path: PathBuf,
    pub runner_path: PathBuf,
    pub python_path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleValidation {
    pub valid: bool,
    pub runner_available: bool,
    pub cli_installed: bool,
    pub cli_authenticated: bool,
    pub runtime_env_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_path: Option<PathBuf>,
    #[serde(skip)]
    pub toolchain: Option<Toolchain>,
}

impl ModuleValidation {
    fn fail(mut self, error: String) -> Self {
        self.valid = false;
        self.error = Some(error);
        self
    }
}

pub struct ModuleValidator {
    platform: PlatformKind,
    backend_override: Option<PathBuf>,
    exe_dir: Option<PathBuf>,
    cwd: Option<PathBuf>,
    cli_program: String,
    auth_args: Vec<String>,
}

impl ModuleValidator {
    pub fn new(platform: PlatformKind) -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));
        Self {
            platform,
            backend_override: None,
            exe_dir,
            cwd: std::env::current_dir().ok(),
            cli_program: platform.cli_name().to_string(),
            auth_args: vec!["auth".into(), "status".into()],
        }
    }

    /// Backend directory from configuration; checked before the built-in layouts.
    pub fn with_backend_override(mut self, path: Option<PathBuf>) -> Self {
        self.backend_override = path.map(|p| paths::expand_home(&p));
        self
    }

    /// Replace the executable directory and working directory used for probing.
    pub fn with_search_roots(mut self, exe_dir: Option<PathBuf>, cwd: Option<PathBuf>) -> Self {
        self.exe_dir = exe_dir;
        self.cwd = cwd;
        self
    }

    /// Replace the platform CLI and the arguments of its auth status command.
    pub fn with_cli<I, S>(mut self, program: impl Into<String>, auth_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cli_program = program.into();
        self.auth_args = auth_args.into_iter().map(Into::into).collect();
        self
    }

    /// Backend locations in probe order.
    pub fn candidate_paths(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        if let Some(p) = &self.backend_override {
            out.push(p.clone());
        }
        if let Some(exe) = &self.exe_dir {
            out.push(exe.join("..").join("..").join("backend"));
            out.push(exe.join("..").join("Resources").join("backend"));
            out.push(exe.join("..").join("lib").join("autoreview").join("backend"));
        }
        if let Some(cwd) = &self.cwd {
            out.push(cwd.join("backend"));
            out.push(cwd.join("apps").join("backend"));
        }
        out
    }

    pub fn find_backend(&self) -> Option<PathBuf> {
        self.candidate_paths().into_iter().find(|p| p.is_dir())
    }

    pub fn validate(&self) -> ModuleValidation {
        let mut report = ModuleValidation::default();
        let cli = self.cli_program.as_str();

        // 1. backend
        let Some(backend) = self.find_backend() else {
            let looked = self
                .candidate_paths()
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            return report.fail(format!(
                "Review module not installed. Looked in: {looked}. \
                 Set runner.backend_path in .autoreview/config.yaml to the backend directory."
            ));
        };
        report.backend_path = Some(backend.clone());

        // 2. runner entry point
        let runner = paths::runner_entry(&backend, self.platform);
        if !runner.is_file() {
            return report.fail(format!(
                "Runner entry point not found at {}",
                runner.display()
            ));
        }
        report.runner_available = true;

        // 3. platform CLI
        let cli_path = match which::which(cli) {
            Ok(p) => p,
            Err(_) => {
                return report.fail(format!(
                    "{cli} CLI not found on PATH. {}",
                    install_instructions(self.platform, std::env::consts::OS)
                ));
            }
        };
        report.cli_installed = true;

        // 4. CLI authentication
        if !self.cli_authenticated(&cli_path) {
            return report.fail(format!(
                "{cli} CLI is not authenticated. Run `{cli} auth login` and try again."
            ));
        }
        report.cli_authenticated = true;

        // 5. virtual environment
        let python = paths::venv_python(&backend);
        if !python.is_file() {
            return report.fail(format!(
                "Python environment not found at {}. Create it with \
                 `python3 -m venv .venv` and install requirements from {}.",
                python.display(),
                backend.display()
            ));
        }
        report.runtime_env_valid = true;

        report.valid = true;
        report.toolchain = Some(Toolchain {
            backend_path: backend,
            runner_path: runner,
            python_path: python,
        });
        report
    }

    fn cli_authenticated(&self, cli_path: &Path) -> bool {
        match Command::new(cli_path).args(&self.auth_args).output() {
            Ok(out) => {
                let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&out.stderr));
                classify_auth_output(out.status.success(), &text)
            }
            Err(e) => {
                tracing::debug!(cli = %cli_path.display(), error = %e, "auth status check failed to run");
                true
            }
        }
    }
}

/// Interpret the output of `<cli> auth status`.
///
/// Only an explicit "not logged in" / "not authenticated" counts as
/// unauthenticated; any other failure is assumed to be transient.
pub fn classify_auth_output(success: bool, output: &str) -> bool {
    if success {
        return true;
    }
    let lower = output.to_lowercase();
    !(lower.contains("not logged in") || lower.contains("not authenticated"))
}

pub fn install_instructions(platform: PlatformKind, os: &str) -> String {
    let cmd = match (platform, os) {
        (PlatformKind::GitHub, "macos") => "Install it with `brew install gh`.",
        (PlatformKind::GitHub, "windows") => "Install it with `winget install --id GitHub.cli`.",
        (PlatformKind::GitHub, _) => {
            "Install it from your package manager (see https://github.com/cli/cli#installation)."
        }
        (PlatformKind::GitLab, "macos") => "Install it with `brew install glab`.",
        (PlatformKind::GitLab, "windows") => "Install it with `winget install glab.glab`.",
        (PlatformKind::GitLab, _) => {
            "Install it from your package manager (see https://gitlab.com/gitlab-org/cli#installation)."
        }
    };
    cmd.to_string()
}
