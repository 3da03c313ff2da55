use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::kill::kill_process_tree;
use crate::listener::SubprocessListener;
use crate::types::{detect_auth_failure, AuthFailureInfo, AuthProfile, SubprocessOptions};

// ─── Command builder ──────────────────────────────────────────────────────

pub(crate) fn build_command(opts: &SubprocessOptions) -> Command {
    let mut cmd = Command::new(&opts.program);
    cmd.args(&opts.args);

    if let Some(cwd) = &opts.cwd {
        cmd.current_dir(cwd);
    }

    if let Some(env) = &opts.env {
        cmd.env_clear().envs(env);
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // Own process group so the whole tree can be signalled at once.
    #[cfg(unix)]
    cmd.process_group(0);

    cmd
}

// ─── LineMonitor ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamKind {
    Stdout,
    Stderr,
}

/// Per-run line handling shared by the stdout and stderr readers.
pub(crate) struct LineMonitor {
    listener: Arc<dyn SubprocessListener>,
    progress: Regex,
    profile: Option<AuthProfile>,
    result_marker: Option<String>,
    pid: Option<u32>,
    in_result: AtomicBool,
    auth_emitted: AtomicBool,
    killed_for_auth: AtomicBool,
}

impl LineMonitor {
    pub(crate) fn new(
        listener: Arc<dyn SubprocessListener>,
        progress: Regex,
        profile: Option<AuthProfile>,
        result_marker: Option<String>,
        pid: Option<u32>,
    ) -> Self {
        Self {
            listener,
            progress,
            profile,
            result_marker,
            pid,
            in_result: AtomicBool::new(false),
            auth_emitted: AtomicBool::new(false),
            killed_for_auth: AtomicBool::new(false),
        }
    }

    pub(crate) fn killed_for_auth(&self) -> bool {
        self.killed_for_auth.load(Ordering::SeqCst)
    }

    /// Raw callback, then auth detection (stdout stops at the result marker),
    /// then progress matching.
    pub(crate) fn handle_line(&self, kind: StreamKind, line: &str) {
        if line.trim().is_empty() {
            return;
        }

        match kind {
            StreamKind::Stdout => self.listener.on_stdout(line),
            StreamKind::Stderr => self.listener.on_stderr(line),
        }

        if kind == StreamKind::Stdout {
            if let Some(marker) = &self.result_marker {
                if line.contains(marker.as_str()) {
                    self.in_result.store(true, Ordering::SeqCst);
                }
            }
        }
        let scan_auth = kind == StreamKind::Stderr || !self.in_result.load(Ordering::SeqCst);

        if let Some(failure_type) = detect_auth_failure(line).filter(|_| scan_auth) {
            // Only the first detection reports and kills.
            if !self.auth_emitted.swap(true, Ordering::SeqCst) {
                let info = AuthFailureInfo::new(self.profile.as_ref(), failure_type, line);
                tracing::warn!(?failure_type, pid = ?self.pid, "authentication failure in runner output");
                self.listener.on_auth_failure(&info);
                self.killed_for_auth.store(true, Ordering::SeqCst);
                if let Some(pid) = self.pid {
                    if let Err(e) = kill_process_tree(pid) {
                        tracing::warn!(pid, error = %e, "failed to kill runner after auth failure");
                    }
                }
            }
        }

        if let Some(caps) = self.progress.captures(line.trim()) {
            let percent = caps
                .get(1)
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .map(|p| p.min(100) as u8);
            if let Some(percent) = percent {
                let message = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
                self.listener.on_progress(percent, message);
            }
        }
    }
}

// ─── Reader ───────────────────────────────────────────────────────────────

/// Read `reader` to EOF, dispatching each complete line to `monitor`.
///
/// Lines are reassembled across read boundaries; invalid UTF-8 is replaced
/// rather than ending the stream. Returns everything read.
pub(crate) async fn read_lines<R>(reader: R, kind: StreamKind, monitor: Arc<LineMonitor>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut raw = Vec::new();
    let mut collected = String::new();

    loop {
        raw.clear();
        match reader.read_until(b'\n', &mut raw).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&raw);
                let line = text.trim_end_matches(|c| c == '\n' || c == '\r');
                collected.push_str(line);
                collected.push('\n');
                monitor.handle_line(kind, line);
            }
            Err(e) => {
                tracing::debug!(?kind, error = %e, "runner output read failed");
                break;
            }
        }
    }

    collected
}
