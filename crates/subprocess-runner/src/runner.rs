use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::kill::{kill_process_tree, terminate_process_tree};
use crate::listener::SubprocessListener;
use crate::process::{self, LineMonitor, StreamKind};
use crate::types::{default_progress_regex, SubprocessOptions, SubprocessResult, AUTH_FAILED_MESSAGE};
use crate::{Result, RunnerError};

// ─── SubprocessHandle ─────────────────────────────────────────────────────

/// Control handle for a spawned run. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SubprocessHandle {
    pid: Option<u32>,
    exited: Arc<AtomicBool>,
}

impl SubprocessHandle {
    /// OS process id; `None` when the process never started.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// True once the process has exited and its output pipes are closed.
    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// Graceful termination of the whole process tree. No-op after exit.
    pub fn terminate(&self) -> Result<()> {
        match self.live_pid() {
            Some(pid) => terminate_process_tree(pid),
            None => Ok(()),
        }
    }

    /// Forced kill of the whole process tree. No-op after exit.
    pub fn kill(&self) -> Result<()> {
        match self.live_pid() {
            Some(pid) => kill_process_tree(pid),
            None => Ok(()),
        }
    }

    fn live_pid(&self) -> Option<u32> {
        self.pid.filter(|_| !self.has_exited())
    }
}

// ─── RunningSubprocess ────────────────────────────────────────────────────

pub struct RunningSubprocess<T> {
    pub handle: SubprocessHandle,
    result: JoinHandle<SubprocessResult<T>>,
}

impl<T> RunningSubprocess<T> {
    /// Wait for the terminal result.
    pub async fn wait(self) -> SubprocessResult<T> {
        match self.result.await {
            Ok(result) => result,
            Err(e) => SubprocessResult::failed(
                None,
                String::new(),
                String::new(),
                format!("runner task failed: {e}"),
            ),
        }
    }
}

// ─── run ──────────────────────────────────────────────────────────────────

/// Spawn `options.program` and stream its output through `listener`.
///
/// `parse` turns the full stdout/stderr of a clean exit into the typed
/// result; its error becomes the run's error. It is never called for failed,
/// killed or unstartable processes. Must be called inside a Tokio runtime.
pub fn run<T, E, F>(
    options: SubprocessOptions,
    listener: Arc<dyn SubprocessListener>,
    parse: F,
) -> RunningSubprocess<T>
where
    T: Send + 'static,
    E: Display + 'static,
    F: FnOnce(&str, &str) -> std::result::Result<T, E> + Send + 'static,
{
    let exited = Arc::new(AtomicBool::new(false));
    let mut child = match process::build_command(&options).spawn() {
        Ok(child) => child,
        Err(source) => {
            let error = RunnerError::Spawn {
                program: options.program.display().to_string(),
                source,
            };
            let message = error.to_string();
            tracing::warn!(error = %message, "runner spawn failed");
            listener.on_error(&message);
            exited.store(true, Ordering::SeqCst);
            let result = tokio::spawn(async move {
                SubprocessResult::failed(None, String::new(), String::new(), message)
            });
            return RunningSubprocess {
                handle: SubprocessHandle { pid: None, exited },
                result,
            };
        }
    };

    let pid = child.id();
    tracing::debug!(?pid, program = %options.program.display(), "runner spawned");

    let progress = options
        .progress_pattern
        .clone()
        .unwrap_or_else(|| default_progress_regex().clone());
    let monitor = Arc::new(LineMonitor::new(
        Arc::clone(&listener),
        progress,
        options.auth_profile.clone(),
        options.result_marker.clone(),
        pid,
    ));

    let stdout_task = child.stdout.take().map(|out| {
        tokio::spawn(process::read_lines(out, StreamKind::Stdout, Arc::clone(&monitor)))
    });
    let stderr_task = child.stderr.take().map(|err| {
        tokio::spawn(process::read_lines(err, StreamKind::Stderr, Arc::clone(&monitor)))
    });

    let exited_flag = Arc::clone(&exited);
    let result = tokio::spawn(async move {
        let status = child.wait().await;
        let stdout = join_output(stdout_task).await;
        let stderr = join_output(stderr_task).await;
        exited_flag.store(true, Ordering::SeqCst);

        let exit_code = match status {
            Ok(status) => status.code(),
            Err(e) => {
                let message = format!("failed to wait for runner: {e}");
                listener.on_error(&message);
                return SubprocessResult::failed(None, stdout, stderr, message);
            }
        };

        let killed_for_auth = monitor.killed_for_auth();
        let result = resolve_exit(exit_code, killed_for_auth, stdout, stderr, parse);
        if !result.success && !killed_for_auth {
            if let Some(error) = &result.error {
                listener.on_error(error);
            }
        }
        tracing::debug!(?pid, ?exit_code, success = result.success, "runner finished");
        result
    });

    RunningSubprocess {
        handle: SubprocessHandle { pid, exited },
        result,
    }
}

async fn join_output(task: Option<JoinHandle<String>>) -> String {
    match task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    }
}

/// Map a finished process to its result.
///
/// An auth kill overrides the exit code. A clean exit runs `parse`. Any other
/// exit, including `None` (killed by a signal), is a failure carrying stderr
/// or a generic message.
pub fn resolve_exit<T, E, F>(
    exit_code: Option<i32>,
    killed_for_auth: bool,
    stdout: String,
    stderr: String,
    parse: F,
) -> SubprocessResult<T>
where
    E: Display,
    F: FnOnce(&str, &str) -> std::result::Result<T, E>,
{
    if killed_for_auth {
        return SubprocessResult::failed(exit_code, stdout, stderr, AUTH_FAILED_MESSAGE);
    }

    match exit_code {
        Some(0) => {
            let parsed = parse(&stdout, &stderr);
            match parsed {
                Ok(data) => SubprocessResult::ok(Some(0), stdout, stderr, data),
                Err(e) => SubprocessResult::failed(Some(0), stdout, stderr, e.to_string()),
            }
        }
        other => {
            let message = if !stderr.trim().is_empty() {
                stderr.trim().to_string()
            } else if let Some(code) = other {
                format!("Process failed with code {code}")
            } else {
                "Process terminated by signal".to_string()
            };
            SubprocessResult::failed(other, stdout, stderr, message)
        }
    }
}
