use crate::cmd::{item_label, load_project, orchestrator, runtime};
use crate::exit::from_orchestrator;
use crate::output::print_json;
use std::path::Path;

pub fn run(root: &Path, number: u64, findings: Vec<String>, json: bool) -> anyhow::Result<()> {
    let (config, project) = load_project(root)?;
    let orch = orchestrator(&config, &project);
    let selection = (!findings.is_empty()).then_some(findings.as_slice());

    let updated = runtime()?
        .block_on(orch.post_review(&project, number, selection))
        .map_err(from_orchestrator)?;

    if json {
        return print_json(&updated);
    }
    println!(
        "Posted review to {} (review id {}); {} finding(s) posted so far",
        item_label(&project, number),
        updated
            .review_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".into()),
        updated.posted_finding_ids.len()
    );
    Ok(())
}
