//! `subprocess-runner`: streaming driver for external analysis processes.
//!
//! Spawns a program in its own process group, reads stdout and stderr line by
//! line, reports progress markers and authentication failures as they happen,
//! and resolves a typed [`SubprocessResult`] when the process exits.
//!
//! # Architecture
//!
//! ```text
//! SubprocessOptions
//!     │
//!     ▼
//! run()          ← spawns the child (process_group(0) on Unix)
//!     │
//!     ├── stdout / stderr readers ── LineMonitor ──► SubprocessListener
//!     │                               │  auth latch (fires once, kills tree)
//!     │                               └─ progress regex
//!     ▼
//! resolve_exit() ← exit code + auth flag + parser ─► SubprocessResult<T>
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use subprocess_runner::{run, ChannelListener, SubprocessOptions};
//!
//! let (listener, mut events) = ChannelListener::new();
//! let running = run(
//!     SubprocessOptions::new("python3").args(["runner.py", "review-pr", "42"]),
//!     Arc::new(listener),
//!     |stdout, _stderr| Ok::<_, String>(stdout.len()),
//! );
//! let result = running.wait().await;
//! ```

pub mod error;
pub mod kill;
pub mod listener;
pub mod runner;
pub mod types;

pub(crate) mod process;

#[cfg(test)]
mod tests;

pub use error::RunnerError;
pub use kill::{kill_process_tree, terminate_process_tree};
pub use listener::{ChannelListener, NoopListener, SubprocessEvent, SubprocessListener};
pub use runner::{resolve_exit, run, RunningSubprocess, SubprocessHandle};
pub use types::{
    detect_auth_failure, AuthFailureInfo, AuthFailureType, AuthProfile, SubprocessOptions,
    SubprocessResult, AUTH_FAILED_MESSAGE, DEFAULT_PROGRESS_PATTERN,
};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, RunnerError>;
