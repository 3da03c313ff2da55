use crate::cmd::load_project;
use crate::exit::CliExit;
use crate::output::{print_json, print_table, yes_no};
use autoreview_orchestrator::{Preflight, ToolchainPreflight};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let (config, project) = load_project(root)?;
    let report = ToolchainPreflight.check(&project, &config);

    if json {
        print_json(&report)?;
    } else {
        let cli = project.platform.cli_name();
        let backend = report
            .backend_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        print_table(
            &["CHECK", "OK", "DETAIL"],
            &[
                vec!["review backend".into(), yes_no(report.backend_path.is_some()), backend],
                vec!["runner entry point".into(), yes_no(report.runner_available), String::new()],
                vec![format!("{cli} installed"), yes_no(report.cli_installed), String::new()],
                vec![format!("{cli} authenticated"), yes_no(report.cli_authenticated), String::new()],
                vec!["python environment".into(), yes_no(report.runtime_env_valid), String::new()],
            ],
        );
    }

    if !report.valid {
        let error = report
            .error
            .unwrap_or_else(|| "review module is not ready".to_string());
        return Err(CliExit::Validation(error).into());
    }
    Ok(())
}
