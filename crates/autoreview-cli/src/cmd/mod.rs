pub mod check_commits;
pub mod logs;
pub mod merge_readiness;
pub mod post;
pub mod review;
pub mod show;
pub mod validate;

use crate::exit::CliExit;
use crate::hosted::CliPlatform;
use anyhow::Context;
use autoreview_core::config::ReviewConfig;
use autoreview_core::env;
use autoreview_core::types::{PlatformKind, Project};
use autoreview_orchestrator::ReviewOrchestrator;
use std::path::Path;
use std::sync::Arc;

/// Load `.autoreview/config.yaml` and the project it describes.
pub fn load_project(root: &Path) -> anyhow::Result<(ReviewConfig, Project)> {
    let config = ReviewConfig::load(root).context("failed to load review config")?;
    let project = config
        .project(root)
        .map_err(|e| CliExit::Validation(e.to_string()))?;
    Ok((config, project))
}

pub fn orchestrator(config: &ReviewConfig, project: &Project) -> ReviewOrchestrator {
    ReviewOrchestrator::new(Arc::new(CliPlatform))
        .with_token(platform_token(project.platform))
        .with_grace_period(config.runner.grace_period())
}

pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to start async runtime")
}

/// Token for the platform CLI, from the same variables the runner is given.
fn platform_token(platform: PlatformKind) -> Option<String> {
    token_from(platform, |name| std::env::var(name).ok())
}

fn token_from(platform: PlatformKind, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    env::token_vars(platform)
        .iter()
        .filter_map(|name| lookup(*name))
        .find(|v| !v.trim().is_empty())
}

pub fn item_label(project: &Project, number: u64) -> String {
    format!("{} #{number}", project.platform.item_kind().to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name| {
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn gitlab_token_uses_runner_variable_names() {
        let vars = [("GLAB_TOKEN", "glpat-1")];
        assert_eq!(
            token_from(PlatformKind::GitLab, lookup(&vars)).as_deref(),
            Some("glpat-1")
        );
        let legacy = [("GL_TOKEN", "glpat-2")];
        assert_eq!(token_from(PlatformKind::GitLab, lookup(&legacy)), None);
    }

    #[test]
    fn github_token_prefers_gh_token_and_skips_blanks() {
        let vars = [("GITHUB_TOKEN", "ghp-b"), ("GH_TOKEN", "ghp-a")];
        assert_eq!(
            token_from(PlatformKind::GitHub, lookup(&vars)).as_deref(),
            Some("ghp-a")
        );
        let blank = [("GH_TOKEN", " "), ("GITHUB_TOKEN", "ghp-b")];
        assert_eq!(
            token_from(PlatformKind::GitHub, lookup(&blank)).as_deref(),
            Some("ghp-b")
        );
    }
}
