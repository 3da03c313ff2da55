//! Whole-tree termination for spawned runners.
//!
//! On Unix every child is spawned as the leader of its own process group, so
//! signalling `-pid` reaches the child and everything it forked. Windows has
//! no process groups; `taskkill /T` walks the tree instead.

use crate::{Result, RunnerError};

/// Ask the process tree rooted at `pid` to exit (SIGTERM / `taskkill /T`).
pub fn terminate_process_tree(pid: u32) -> Result<()> {
    imp::signal_tree(pid, false)
}

/// Forcefully kill the process tree rooted at `pid` (SIGKILL / `taskkill /T /F`).
pub fn kill_process_tree(pid: u32) -> Result<()> {
    imp::signal_tree(pid, true)
}

/// Refuse pids whose negation would address the caller's own group (0) or
/// every process (1).
fn checked_pid(pid: u32) -> Result<i32> {
    match i32::try_from(pid) {
        Ok(p) if p > 1 => Ok(p),
        _ => Err(RunnerError::Process(format!("refusing to signal pid {pid}"))),
    }
}

#[cfg(unix)]
mod imp {
    use super::checked_pid;
    use crate::Result;

    pub(super) fn signal_tree(pid: u32, force: bool) -> Result<()> {
        let pgid = checked_pid(pid)?;
        let signal = if force { libc::SIGKILL } else { libc::SIGTERM };

        // SAFETY: kill(2) only delivers a signal; pgid > 1 so -pgid names a
        // single process group.
        let rc = unsafe { libc::kill(-pgid, signal) };
        if rc == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            // Group already gone.
            return Ok(());
        }
        tracing::debug!(pid, error = %err, "process group signal failed");
        Err(err.into())
    }
}

#[cfg(windows)]
mod imp {
    use super::checked_pid;
    use crate::{Result, RunnerError};
    use std::process::{Command, Stdio};

    pub(super) fn signal_tree(pid: u32, force: bool) -> Result<()> {
        checked_pid(pid)?;
        let mut cmd = Command::new("taskkill");
        cmd.args(["/PID", &pid.to_string(), "/T"]);
        if force {
            cmd.arg("/F");
        }
        let status = cmd.stdout(Stdio::null()).stderr(Stdio::null()).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(RunnerError::Process(format!(
                "taskkill for pid {pid} exited with {:?}",
                status.code()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_dangerous_pids() {
        assert!(kill_process_tree(0).is_err());
        assert!(kill_process_tree(1).is_err());
        assert!(terminate_process_tree(u32::MAX).is_err());
    }
}
