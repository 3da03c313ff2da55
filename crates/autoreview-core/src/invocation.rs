use std::path::{Path, PathBuf};

/// Command line for one runner invocation:
/// `<python> <runner.py> --project <path> [--model <id>] [--thinking-level <level>] <command> [args...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerInvocation {
    pub python: PathBuf,
    pub runner: PathBuf,
    pub project: PathBuf,
    pub model: Option<String>,
    pub thinking_level: Option<String>,
    pub command: String,
    pub args: Vec<String>,
}

impl RunnerInvocation {
    pub fn new(python: &Path, runner: &Path, project: &Path, command: impl Into<String>) -> Self {
        Self {
            python: python.to_path_buf(),
            runner: runner.to_path_buf(),
            project: project.to_path_buf(),
            model: None,
            thinking_level: None,
            command: command.into(),
            args: Vec::new(),
        }
    }

    pub fn model(mut self, model: Option<String>) -> Self {
        self.model = model.filter(|m| !m.is_empty());
        self
    }

    pub fn thinking_level(mut self, level: Option<String>) -> Self {
        self.thinking_level = level.filter(|l| !l.is_empty());
        self
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Arguments passed to the interpreter (everything after the program).
    pub fn argv(&self) -> Vec<String> {
        let mut argv = vec![
            self.runner.to_string_lossy().into_owned(),
            "--project".to_string(),
            self.project.to_string_lossy().into_owned(),
        ];
        if let Some(model) = &self.model {
            argv.push("--model".into());
            argv.push(model.clone());
        }
        if let Some(level) = &self.thinking_level {
            argv.push("--thinking-level".into());
            argv.push(level.clone());
        }
        argv.push(self.command.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argv_orders_flags_before_command() {
        let inv = RunnerInvocation::new(
            Path::new("/b/.venv/bin/python"),
            Path::new("/b/runners/github/runner.py"),
            Path::new("/work/app"),
            "review-pr",
        )
        .model(Some("sonnet".into()))
        .thinking_level(Some("high".into()))
        .arg("42");

        assert_eq!(
            inv.argv(),
            vec![
                "/b/runners/github/runner.py",
                "--project",
                "/work/app",
                "--model",
                "sonnet",
                "--thinking-level",
                "high",
                "review-pr",
                "42",
            ]
        );
    }

    #[test]
    fn empty_options_are_omitted() {
        let inv = RunnerInvocation::new(
            Path::new("py"),
            Path::new("runner.py"),
            Path::new("/p"),
            "review-mr",
        )
        .model(Some(String::new()))
        .thinking_level(None)
        .arg("7");
        assert_eq!(inv.argv(), vec!["runner.py", "--project", "/p", "review-mr", "7"]);
    }
}
