use crate::cmd::{item_label, load_project, orchestrator, runtime};
use crate::exit::from_orchestrator;
use crate::output::{print_fields, print_json, yes_no};
use autoreview_orchestrator::CiStatus;
use std::path::Path;

pub fn run(root: &Path, number: u64, json: bool) -> anyhow::Result<()> {
    let (config, project) = load_project(root)?;
    let orch = orchestrator(&config, &project);
    let readiness = runtime()?
        .block_on(orch.check_merge_readiness(&project, number))
        .map_err(from_orchestrator)?;

    if json {
        return print_json(&readiness);
    }

    let ci = match readiness.ci_status {
        CiStatus::Passing => "passing",
        CiStatus::Failing => "failing",
        CiStatus::Pending => "pending",
        CiStatus::None => "none",
        CiStatus::Unknown => "unknown",
    };
    print_fields(&[
        ("draft", yes_no(readiness.is_draft)),
        (
            "mergeable",
            readiness.mergeable.map(yes_no).unwrap_or_else(|| "unknown".into()),
        ),
        ("behind base", yes_no(readiness.is_behind)),
        ("conflicts", yes_no(readiness.has_conflicts)),
        ("ci", ci.to_string()),
    ]);
    if readiness.is_ready() {
        println!("\n{} is ready to merge", item_label(&project, number));
    } else {
        println!("\nBlockers:");
        for b in &readiness.blockers {
            println!("  - {b}");
        }
    }
    Ok(())
}
