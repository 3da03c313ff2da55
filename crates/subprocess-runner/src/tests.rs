/// Exit resolution rules, independent of any real process.
#[cfg(test)]
mod unit {
    use crate::runner::resolve_exit;
    use crate::types::AUTH_FAILED_MESSAGE;

    fn parse_len(stdout: &str, _: &str) -> Result<usize, String> {
        Ok(stdout.len())
    }

    fn parse_fail(_: &str, _: &str) -> Result<usize, String> {
        Err("No JSON found in output".into())
    }

    #[test]
    fn clean_exit_runs_parser() {
        let r = resolve_exit(Some(0), false, "abc".into(), String::new(), parse_len);
        assert!(r.success);
        assert_eq!(r.data, Some(3));
        assert_eq!(r.error, None);
    }

    #[test]
    fn parser_error_is_failure_without_data() {
        let r = resolve_exit(Some(0), false, "abc".into(), String::new(), parse_fail);
        assert!(!r.success);
        assert_eq!(r.data, None);
        assert_eq!(r.error.as_deref(), Some("No JSON found in output"));
    }

    #[test]
    fn auth_kill_overrides_every_exit_code() {
        for code in [Some(0), Some(1), Some(137), None] {
            let r = resolve_exit(code, true, "{}".into(), "boom".into(), parse_len);
            assert!(!r.success);
            assert_eq!(r.error.as_deref(), Some(AUTH_FAILED_MESSAGE));
            assert_eq!(r.exit_code, code);
        }
    }

    #[test]
    fn nonzero_prefers_stderr() {
        let r = resolve_exit(Some(2), false, String::new(), "  bad flag \n".into(), parse_len);
        assert!(!r.success);
        assert_eq!(r.error.as_deref(), Some("bad flag"));

        let r = resolve_exit(Some(4), false, String::new(), String::new(), parse_len);
        assert_eq!(r.error.as_deref(), Some("Process failed with code 4"));
    }

    #[test]
    fn signal_exit_is_never_success() {
        let r = resolve_exit(None, false, "{}".into(), String::new(), parse_len);
        assert!(!r.success);
        assert_eq!(r.exit_code, None);
        assert_eq!(r.error.as_deref(), Some("Process terminated by signal"));
    }
}

/// Runs against real `sh` children.
#[cfg(all(test, unix))]
mod spawn {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::mpsc::UnboundedReceiver;

    use crate::listener::{ChannelListener, SubprocessEvent};
    use crate::runner::run;
    use crate::types::{AuthProfile, SubprocessOptions, SubprocessResult, AUTH_FAILED_MESSAGE};

    fn sh(script: &str) -> SubprocessOptions {
        SubprocessOptions::new("sh").args(["-c", script])
    }

    fn drain(rx: &mut UnboundedReceiver<SubprocessEvent>) -> Vec<SubprocessEvent> {
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        events
    }

    async fn run_script(
        script: &str,
    ) -> (SubprocessResult<String>, Vec<SubprocessEvent>) {
        let (listener, mut rx) = ChannelListener::new();
        let running = run(sh(script), Arc::new(listener), |stdout, _| {
            Ok::<_, String>(stdout.trim().to_string())
        });
        let result = tokio::time::timeout(Duration::from_secs(10), running.wait())
            .await
            .expect("run timed out");
        (result, drain(&mut rx))
    }

    #[tokio::test]
    async fn success_parses_stdout_and_reports_progress() {
        let (result, events) = run_script("echo '[ 50%] Half way'; echo done").await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.data.as_deref(), Some("[ 50%] Half way\ndone"));
        assert!(events.contains(&SubprocessEvent::Progress {
            percent: 50,
            message: "Half way".into()
        }));
        assert!(events.contains(&SubprocessEvent::Stdout("done".into())));
    }

    #[tokio::test]
    async fn progress_on_stderr_is_reported() {
        let (_, events) = run_script("echo '[ 7%] warming up' >&2").await;
        assert!(events.contains(&SubprocessEvent::Stderr("[ 7%] warming up".into())));
        assert!(events
            .iter()
            .any(|e| matches!(e, SubprocessEvent::Progress { percent: 7, .. })));
    }

    #[tokio::test]
    async fn split_writes_are_reassembled_into_lines() {
        let (_, events) = run_script("printf '[ 1'; sleep 0.1; printf '0%%] split line\\n'").await;
        assert!(events.contains(&SubprocessEvent::Progress {
            percent: 10,
            message: "split line".into()
        }));
    }

    #[tokio::test]
    async fn nonzero_exit_reports_stderr_and_error_event() {
        let (result, events) = run_script("echo boom >&2; exit 3").await;
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert!(result.data.is_none());
        assert!(events.contains(&SubprocessEvent::Error("boom".into())));
    }

    #[tokio::test]
    async fn killed_by_signal_is_failure() {
        let (result, _) = run_script("kill -9 $$").await;
        assert!(!result.success);
        assert_eq!(result.exit_code, None);
    }

    #[tokio::test]
    async fn parser_error_fails_the_run() {
        let (listener, mut rx) = ChannelListener::new();
        let running = run(sh("echo nothing useful"), Arc::new(listener), |_, _| {
            Err::<(), _>("No JSON found in output")
        });
        let result = running.wait().await;
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(0));
        assert!(drain(&mut rx).contains(&SubprocessEvent::Error("No JSON found in output".into())));
    }

    #[tokio::test]
    async fn spawn_failure_never_calls_parser() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        let (listener, mut rx) = ChannelListener::new();
        let running = run(
            SubprocessOptions::new("/nonexistent/autoreview-runner"),
            Arc::new(listener),
            move |_, _| {
                flag.store(true, Ordering::SeqCst);
                Ok::<_, String>(())
            },
        );
        assert!(running.handle.pid().is_none());
        assert!(running.handle.has_exited());
        let result = running.wait().await;
        assert!(!result.success);
        assert_eq!(result.exit_code, None);
        assert!(result.error.unwrap().contains("/nonexistent/autoreview-runner"));
        assert!(!called.load(Ordering::SeqCst));
        assert!(matches!(drain(&mut rx).as_slice(), [SubprocessEvent::Error(_)]));
    }

    #[tokio::test]
    async fn auth_failure_fires_once_and_kills() {
        let script = "i=0; while [ $i -lt 100 ]; do echo 'gh: HTTP 401 Unauthorized'; i=$((i+1)); done; sleep 30";
        let (listener, mut rx) = ChannelListener::new();
        let options = sh(script).auth_profile(AuthProfile {
            id: "default".into(),
            name: None,
        });
        let running = run(options, Arc::new(listener), |_, _| Ok::<_, String>(()));
        let result = tokio::time::timeout(Duration::from_secs(10), running.wait())
            .await
            .expect("auth failure did not kill the runner");

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some(AUTH_FAILED_MESSAGE));

        let events = drain(&mut rx);
        let auth: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                SubprocessEvent::AuthFailure(info) => Some(info),
                _ => None,
            })
            .collect();
        assert_eq!(auth.len(), 1);
        assert_eq!(auth[0].profile_id, "default");
        assert!(!events.iter().any(|e| matches!(e, SubprocessEvent::Error(_))));
    }

    #[tokio::test]
    async fn findings_about_auth_do_not_trip_the_latch() {
        let script = r#"echo '[Specialist:security] Error: bad credentials are logged in plaintext'
echo 'Invalid token accepted by middleware'
echo 'JSON Output:'
echo '{"findings": [{"title": "Invalid token accepted by middleware"}]}'
echo 'Error: token has expired is never reported to the caller'
exit 0"#;
        let (listener, mut rx) = ChannelListener::new();
        let running = run(
            sh(script).result_marker("JSON Output"),
            Arc::new(listener),
            |stdout, _| Ok::<_, String>(stdout.lines().count()),
        );
        let result = running.wait().await;

        assert!(result.success, "unexpected failure: {:?}", result.error);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.data, Some(5));
        assert!(!drain(&mut rx)
            .iter()
            .any(|e| matches!(e, SubprocessEvent::AuthFailure(_))));
    }

    #[tokio::test]
    async fn auth_errors_on_stderr_still_count_after_the_result_marker() {
        let script = "echo 'JSON Output:'; echo 'Error: HTTP 401 Unauthorized' >&2; sleep 30";
        let (listener, mut rx) = ChannelListener::new();
        let running = run(
            sh(script).result_marker("JSON Output"),
            Arc::new(listener),
            |_, _| Ok::<_, String>(()),
        );
        let result = tokio::time::timeout(Duration::from_secs(10), running.wait())
            .await
            .expect("auth failure did not kill the runner");
        assert_eq!(result.error.as_deref(), Some(AUTH_FAILED_MESSAGE));
        assert!(drain(&mut rx)
            .iter()
            .any(|e| matches!(e, SubprocessEvent::AuthFailure(_))));
    }

    #[tokio::test]
    async fn env_is_replaced_when_given() {
        let mut env = std::collections::HashMap::new();
        env.insert("PATH".to_string(), std::env::var("PATH").unwrap_or_default());
        env.insert("AUTOREVIEW_MARKER".to_string(), "present".to_string());
        let (listener, _rx) = ChannelListener::new();
        let running = run(
            sh("echo \"$AUTOREVIEW_MARKER:${HOME:-unset}\"").env(env),
            Arc::new(listener),
            |stdout, _| Ok::<_, String>(stdout.trim().to_string()),
        );
        let result = running.wait().await;
        assert_eq!(result.data.as_deref(), Some("present:unset"));
    }
}
