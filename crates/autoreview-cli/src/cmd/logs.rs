use crate::cmd::{item_label, load_project};
use crate::output::print_json;
use autoreview_core::logs::{self, LogPhase, PhaseStatus};
use std::path::Path;

pub fn run(root: &Path, number: u64, json: bool) -> anyhow::Result<()> {
    let (_, project) = load_project(root)?;
    let label = item_label(&project, number);
    let Some(log) = logs::load_logs(&project.path, project.platform, number) else {
        anyhow::bail!("no review logs for {label}");
    };

    if json {
        return print_json(&log);
    }

    let kind = if log.is_followup { "follow-up review" } else { "review" };
    println!("{label} {kind} (updated {})", log.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    for phase in LogPhase::all() {
        let p = log.phases.get(*phase);
        let status = match p.status {
            PhaseStatus::Pending => "pending",
            PhaseStatus::Active => "active",
            PhaseStatus::Completed => "completed",
            PhaseStatus::Failed => "failed",
        };
        println!("\n{} [{status}]", phase.as_str());
        for e in &p.entries {
            match &e.source {
                Some(source) => println!(
                    "  {} {source}: {}",
                    e.timestamp.format("%H:%M:%S"),
                    e.content
                ),
                None => println!("  {} {}", e.timestamp.format("%H:%M:%S"), e.content),
            }
        }
    }
    Ok(())
}
