use crate::cmd::review::print_summary;
use crate::cmd::{item_label, load_project};
use crate::output::print_json;
use autoreview_core::review;
use std::path::Path;

pub fn run(root: &Path, number: u64, json: bool) -> anyhow::Result<()> {
    let (_, project) = load_project(root)?;
    let label = item_label(&project, number);
    let Some(result) = review::load_review(&project.path, project.platform, number) else {
        anyhow::bail!("no stored review for {label}");
    };

    if json {
        return print_json(&result);
    }
    print_summary(&label, &result);
    println!();
    println!(
        "reviewed {} at commit {}",
        result.reviewed_at.format("%Y-%m-%d %H:%M UTC"),
        result.reviewed_commit_sha.as_deref().unwrap_or("unknown")
    );
    if result.has_posted_findings {
        let when = result
            .posted_at
            .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_default();
        println!(
            "posted {} finding(s) {when}",
            result.posted_finding_ids.len()
        );
    }
    Ok(())
}
