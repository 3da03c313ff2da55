use crate::cmd::{item_label, load_project, orchestrator, runtime};
use crate::exit::from_orchestrator;
use crate::output::{print_json, print_table};
use autoreview_core::review::ReviewResult;
use autoreview_orchestrator::{ReviewEvent, ReviewOutcome, ReviewRequest};
use std::path::Path;
use tokio::sync::broadcast::error::RecvError;

pub fn run(root: &Path, number: u64, followup: bool, wait_for_ci: bool, json: bool) -> anyhow::Result<()> {
    let (config, project) = load_project(root)?;
    let label = item_label(&project, number);
    let orch = orchestrator(&config, &project);

    let rt = runtime()?;
    let outcome = rt.block_on(async {
        let mut events = orch.subscribe();
        let request = ReviewRequest::new(project.clone(), number)
            .followup(followup)
            .wait_for_ci(wait_for_ci);
        let task = orch.start_review(request).map_err(from_orchestrator)?;
        let key = task.key().clone();

        let printer = {
            let key = key.clone();
            tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(ev) if ev.is_for(&key) => print_event(&ev),
                        Ok(_) | Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    }
                }
            })
        };

        let join = task.join();
        tokio::pin!(join);
        let result = tokio::select! {
            r = &mut join => r,
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Cancelling review of {label}...");
                orch.cancel_review(&key);
                join.await
            }
        };
        printer.abort();
        result.map_err(from_orchestrator)
    })?;

    match outcome {
        ReviewOutcome::Completed(result) => {
            if json {
                print_json(&result)?;
            } else {
                print_summary(&label, &result);
            }
            Ok(())
        }
        ReviewOutcome::Cancelled => anyhow::bail!("review of {label} was cancelled"),
    }
}

fn print_event(ev: &ReviewEvent) {
    match ev {
        ReviewEvent::Progress { percent, message, .. } => eprintln!("[{percent:>3}%] {message}"),
        ReviewEvent::AuthFailure { info, .. } => eprintln!("auth: {}", info.message),
        ReviewEvent::Error { .. } | ReviewEvent::Complete { .. } => {}
    }
}

pub fn print_summary(label: &str, result: &ReviewResult) {
    println!(
        "{label}: {} ({} finding(s))",
        result.overall_status.as_str(),
        result.findings.len()
    );
    if !result.summary.trim().is_empty() {
        println!("\n{}\n", result.summary.trim());
    }
    if result.findings.is_empty() {
        return;
    }
    let rows: Vec<Vec<String>> = result
        .findings
        .iter()
        .map(|f| {
            vec![
                f.id.clone(),
                f.severity.as_str().to_string(),
                if f.line > 0 {
                    format!("{}:{}", f.file, f.line)
                } else {
                    f.file.clone()
                },
                f.title.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "SEVERITY", "LOCATION", "TITLE"], &rows);
}
