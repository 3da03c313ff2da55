//! Process-tree termination against real `sh` trees.
#![cfg(unix)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use subprocess_runner::{run, ChannelListener, SubprocessEvent, SubprocessOptions};

/// Live, non-zombie process check.
fn alive(pid: u32) -> bool {
    let stat = std::path::PathBuf::from(format!("/proc/{pid}/stat"));
    if std::path::Path::new("/proc/self/stat").exists() {
        return match std::fs::read_to_string(stat) {
            Ok(s) => !s
                .rsplit(')')
                .next()
                .map(|rest| rest.trim_start().starts_with('Z'))
                .unwrap_or(false),
            Err(_) => false,
        };
    }
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

async fn wait_dead(pid: u32) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if !alive(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Spawn `sh` with a backgrounded grandchild and return the grandchild pid.
async fn spawn_tree(
) -> (subprocess_runner::RunningSubprocess<()>, u32) {
    let (listener, mut rx) = ChannelListener::new();
    let running = run(
        SubprocessOptions::new("sh").args(["-c", "sleep 30 & echo $!; wait"]),
        Arc::new(listener),
        |_, _| Ok::<_, String>(()),
    );
    let grandchild = loop {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(SubprocessEvent::Stdout(line))) => {
                if let Ok(pid) = line.trim().parse::<u32>() {
                    break pid;
                }
            }
            Ok(Some(_)) => continue,
            other => panic!("no grandchild pid reported: {other:?}"),
        }
    };
    (running, grandchild)
}

#[tokio::test]
async fn kill_reaches_grandchildren() {
    let (running, grandchild) = spawn_tree().await;
    assert!(alive(grandchild));
    running.handle.kill().unwrap();

    let result = tokio::time::timeout(Duration::from_secs(10), running.wait())
        .await
        .expect("runner did not exit after kill");
    assert!(!result.success);
    assert_eq!(result.exit_code, None);
    assert!(wait_dead(grandchild).await, "grandchild {grandchild} survived");
}

#[tokio::test]
async fn terminate_reaches_grandchildren() {
    let (running, grandchild) = spawn_tree().await;
    let handle = running.handle.clone();
    handle.terminate().unwrap();

    let result = tokio::time::timeout(Duration::from_secs(10), running.wait())
        .await
        .expect("runner did not exit after terminate");
    assert!(!result.success);
    assert!(handle.has_exited());
    assert!(wait_dead(grandchild).await, "grandchild {grandchild} survived");
    // Signalling a finished run is a no-op.
    handle.kill().unwrap();
}
