use crate::cmd::{item_label, load_project, orchestrator, runtime};
use crate::output::{print_fields, print_json, yes_no};
use std::path::Path;

pub fn run(root: &Path, number: u64, json: bool) -> anyhow::Result<()> {
    let (config, project) = load_project(root)?;
    let orch = orchestrator(&config, &project);
    let check = runtime()?.block_on(orch.check_new_commits(&project, number));

    if json {
        return print_json(&check);
    }

    let Some(reviewed) = &check.last_reviewed_commit else {
        println!("{} has not been reviewed yet", item_label(&project, number));
        return Ok(());
    };
    let mut fields = vec![
        ("reviewed commit", reviewed.clone()),
        (
            "current head",
            check.current_head_commit.clone().unwrap_or_else(|| "unknown".into()),
        ),
        ("new commits", check.new_commit_count.to_string()),
        ("after posting", yes_no(check.has_commits_after_posting)),
        ("follow-up eligible", yes_no(check.followup_eligible)),
        ("merge from base", yes_no(check.has_merge_from_base)),
    ];
    if !check.overlapping_files.is_empty() {
        fields.push(("overlapping files", check.overlapping_files.join(", ")));
    }
    print_fields(&fields);
    Ok(())
}
