use crate::types::PlatformKind;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const TOOL_DIR: &str = ".autoreview";
pub const CONFIG_FILE: &str = ".autoreview/config.yaml";

pub const REVIEW_PREFIX: &str = "review";
pub const LOGS_PREFIX: &str = "logs";

pub const RUNNERS_DIR: &str = "runners";
pub const RUNNER_ENTRY: &str = "runner.py";
pub const VENV_DIR: &str = ".venv";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn tool_dir(root: &Path) -> PathBuf {
    root.join(TOOL_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// `<root>/.autoreview/<platform>/<pr|mr>`
pub fn items_dir(root: &Path, platform: PlatformKind) -> PathBuf {
    tool_dir(root)
        .join(platform.as_str())
        .join(platform.item_kind())
}

pub fn review_path(root: &Path, platform: PlatformKind, number: u64) -> PathBuf {
    items_dir(root, platform).join(format!("{REVIEW_PREFIX}_{number}.json"))
}

pub fn logs_path(root: &Path, platform: PlatformKind, number: u64) -> PathBuf {
    items_dir(root, platform).join(format!("{LOGS_PREFIX}_{number}.json"))
}

/// `<backend>/runners/<platform>/runner.py`
pub fn runner_entry(backend: &Path, platform: PlatformKind) -> PathBuf {
    backend
        .join(RUNNERS_DIR)
        .join(platform.as_str())
        .join(RUNNER_ENTRY)
}

/// Interpreter inside the backend's virtual environment.
pub fn venv_python(backend: &Path) -> PathBuf {
    let venv = backend.join(VENV_DIR);
    if cfg!(windows) {
        venv.join("Scripts").join("python.exe")
    } else {
        venv.join("bin").join("python")
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = home::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/proj");
        assert_eq!(
            config_path(root),
            PathBuf::from("/tmp/proj/.autoreview/config.yaml")
        );
        assert_eq!(
            review_path(root, PlatformKind::GitHub, 42),
            PathBuf::from("/tmp/proj/.autoreview/github/pr/review_42.json")
        );
        assert_eq!(
            logs_path(root, PlatformKind::GitLab, 7),
            PathBuf::from("/tmp/proj/.autoreview/gitlab/mr/logs_7.json")
        );
    }

    #[test]
    fn runner_entry_layout() {
        assert_eq!(
            runner_entry(Path::new("/opt/backend"), PlatformKind::GitLab),
            PathBuf::from("/opt/backend/runners/gitlab/runner.py")
        );
    }

    #[cfg(unix)]
    #[test]
    fn venv_python_posix() {
        assert_eq!(
            venv_python(Path::new("/opt/backend")),
            PathBuf::from("/opt/backend/.venv/bin/python")
        );
    }

    #[test]
    fn expand_home_leaves_plain_paths() {
        assert_eq!(expand_home(Path::new("/abs/x")), PathBuf::from("/abs/x"));
    }
}
