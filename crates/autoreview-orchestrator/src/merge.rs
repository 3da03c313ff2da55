use autoreview_core::platform::{CheckRun, CheckStatus, PlatformApi, PlatformResult};
use autoreview_core::types::Project;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CiStatus {
    Passing,
    Failing,
    Pending,
    None,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReadiness {
    pub is_draft: bool,
    pub mergeable: Option<bool>,
    pub is_behind: bool,
    pub has_conflicts: bool,
    pub ci_status: CiStatus,
    pub failing_checks: Vec<String>,
    pub blockers: Vec<String>,
}

impl MergeReadiness {
    pub fn is_ready(&self) -> bool {
        self.blockers.is_empty()
    }
}

/// Roll individual checks up into one status. Any failure wins over pending.
pub fn ci_rollup(checks: &[CheckRun]) -> CiStatus {
    if checks.is_empty() {
        return CiStatus::None;
    }
    if checks
        .iter()
        .any(|c| c.conclusion.is_some_and(|con| con.is_failure()))
    {
        return CiStatus::Failing;
    }
    if checks.iter().any(|c| c.status != CheckStatus::Completed) {
        return CiStatus::Pending;
    }
    CiStatus::Passing
}

/// Merge readiness of item `number`. Only the item fetch can fail; the check
/// listing degrades to [`CiStatus::Unknown`].
pub async fn check_merge_readiness(
    platform: &dyn PlatformApi,
    project: &Project,
    number: u64,
) -> PlatformResult<MergeReadiness> {
    let item = platform.fetch_item(project, number).await?;
    let label = project.platform.item_kind().to_uppercase();

    let (ci_status, failing_checks) = match platform.list_checks(project, &item.head_sha).await {
        Ok(checks) => {
            let failing = checks
                .iter()
                .filter(|c| c.conclusion.is_some_and(|con| con.is_failure()))
                .map(|c| c.name.clone())
                .collect();
            (ci_rollup(&checks), failing)
        }
        Err(e) => {
            tracing::warn!(repo = %project.repo, number, error = %e, "could not list checks");
            (CiStatus::Unknown, Vec::new())
        }
    };

    let mut blockers = Vec::new();
    if item.is_draft {
        blockers.push(format!("{label} is a draft"));
    }
    if item.has_conflicts || item.mergeable == Some(false) {
        blockers.push("Merge conflicts with the base branch".to_string());
    }
    if item.is_behind {
        blockers.push("Branch is behind the base branch".to_string());
    }
    match ci_status {
        CiStatus::Failing => blockers.push(format!("CI failing: {}", failing_checks.join(", "))),
        CiStatus::Pending => blockers.push("CI checks are still running".to_string()),
        _ => {}
    }

    Ok(MergeReadiness {
        is_draft: item.is_draft,
        mergeable: item.mergeable,
        is_behind: item.is_behind,
        has_conflicts: item.has_conflicts,
        ci_status,
        failing_checks,
        blockers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{check, MockPlatform};
    use autoreview_core::platform::CheckConclusion;
    use autoreview_core::platform::CheckStatus::{Completed, InProgress};
    use std::sync::atomic::Ordering;

    fn done(name: &str, conclusion: CheckConclusion) -> CheckRun {
        CheckRun {
            conclusion: Some(conclusion),
            ..check(name, Completed)
        }
    }

    #[test]
    fn rollup() {
        assert_eq!(ci_rollup(&[]), CiStatus::None);
        assert_eq!(
            ci_rollup(&[done("a", CheckConclusion::Success), done("b", CheckConclusion::Skipped)]),
            CiStatus::Passing
        );
        assert_eq!(
            ci_rollup(&[done("a", CheckConclusion::Success), check("b", InProgress)]),
            CiStatus::Pending
        );
        assert_eq!(
            ci_rollup(&[done("a", CheckConclusion::TimedOut), check("b", InProgress)]),
            CiStatus::Failing
        );
    }

    #[tokio::test]
    async fn ready_item_has_no_blockers() {
        let platform = MockPlatform::default();
        platform.set_default_checks(vec![done("build", CheckConclusion::Success)]);
        let r = check_merge_readiness(&platform, &platform.project(), 3).await.unwrap();
        assert!(r.is_ready());
        assert_eq!(r.ci_status, CiStatus::Passing);
    }

    #[tokio::test]
    async fn blockers_are_collected() {
        let platform = MockPlatform::default();
        platform.update_item(|item| {
            item.is_draft = true;
            item.is_behind = true;
        });
        platform.set_default_checks(vec![done("lint", CheckConclusion::Failure)]);
        let r = check_merge_readiness(&platform, &platform.project(), 3).await.unwrap();
        assert_eq!(r.failing_checks, vec!["lint"]);
        assert_eq!(
            r.blockers,
            vec![
                "PR is a draft".to_string(),
                "Branch is behind the base branch".to_string(),
                "CI failing: lint".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn check_listing_failure_is_unknown() {
        let platform = MockPlatform::default();
        platform.fail_checks.store(true, Ordering::SeqCst);
        let r = check_merge_readiness(&platform, &platform.project(), 3).await.unwrap();
        assert_eq!(r.ci_status, CiStatus::Unknown);
        assert!(r.is_ready());
    }

    #[tokio::test]
    async fn item_fetch_failure_is_an_error() {
        let platform = MockPlatform::default();
        platform.fail_fetch.store(true, Ordering::SeqCst);
        assert!(check_merge_readiness(&platform, &platform.project(), 3).await.is_err());
    }
}
