use tokio::sync::mpsc;

use crate::types::AuthFailureInfo;

// ─── SubprocessListener ───────────────────────────────────────────────────

/// Receives a run's output in real time. Every method defaults to a no-op.
///
/// Callbacks are invoked from the reader tasks and must not block.
pub trait SubprocessListener: Send + Sync {
    fn on_progress(&self, _percent: u8, _message: &str) {}

    fn on_stdout(&self, _line: &str) {}

    fn on_stderr(&self, _line: &str) {}

    fn on_error(&self, _message: &str) {}

    /// Called at most once per run, before the process tree is killed.
    fn on_auth_failure(&self, _info: &AuthFailureInfo) {}
}

/// Listener that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl SubprocessListener for NoopListener {}

// ─── ChannelListener ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum SubprocessEvent {
    Progress { percent: u8, message: String },
    Stdout(String),
    Stderr(String),
    Error(String),
    AuthFailure(AuthFailureInfo),
}

/// Forwards every callback as a [`SubprocessEvent`]. Events sent after the
/// receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<SubprocessEvent>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SubprocessEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: SubprocessEvent) {
        let _ = self.tx.send(event);
    }
}

impl SubprocessListener for ChannelListener {
    fn on_progress(&self, percent: u8, message: &str) {
        self.send(SubprocessEvent::Progress {
            percent,
            message: message.to_string(),
        });
    }

    fn on_stdout(&self, line: &str) {
        self.send(SubprocessEvent::Stdout(line.to_string()));
    }

    fn on_stderr(&self, line: &str) {
        self.send(SubprocessEvent::Stderr(line.to_string()));
    }

    fn on_error(&self, message: &str) {
        self.send(SubprocessEvent::Error(message.to_string()));
    }

    fn on_auth_failure(&self, info: &AuthFailureInfo) {
        self.send(SubprocessEvent::AuthFailure(info.clone()));
    }
}
