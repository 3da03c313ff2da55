//! In-memory [`PlatformApi`] for unit tests.

use async_trait::async_trait;
use autoreview_core::platform::{
    CheckRun, CheckStatus, CommitComparison, ItemSnapshot, PlatformApi, PlatformResult,
    ReviewSubmission,
};
use autoreview_core::types::{PlatformKind, Project};
use autoreview_core::PlatformError;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub(crate) fn check(name: &str, status: CheckStatus) -> CheckRun {
    CheckRun {
        name: name.to_string(),
        status,
        conclusion: None,
    }
}

pub(crate) struct MockPlatform {
    root: PathBuf,
    item: Mutex<ItemSnapshot>,
    queued_checks: Mutex<VecDeque<Vec<CheckRun>>>,
    default_checks: Mutex<Vec<CheckRun>>,
    comparison: Mutex<Option<CommitComparison>>,
    pub posted: Mutex<Vec<(u64, ReviewSubmission)>>,
    pub fail_checks: AtomicBool,
    pub fail_fetch: AtomicBool,
    pub check_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::at(PathBuf::from("/nonexistent/app"))
    }
}

impl MockPlatform {
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            item: Mutex::new(ItemSnapshot {
                number: 0,
                head_sha: "head0001".to_string(),
                is_draft: false,
                mergeable: Some(true),
                is_behind: false,
                has_conflicts: false,
            }),
            queued_checks: Mutex::new(VecDeque::new()),
            default_checks: Mutex::new(Vec::new()),
            comparison: Mutex::new(None),
            posted: Mutex::new(Vec::new()),
            fail_checks: AtomicBool::new(false),
            fail_fetch: AtomicBool::new(false),
            check_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    pub fn project(&self) -> Project {
        Project {
            id: "app".to_string(),
            path: self.root.clone(),
            platform: PlatformKind::GitHub,
            repo: "acme/app".to_string(),
        }
    }

    /// Answer the next `list_checks` call with `checks`.
    pub fn push_checks(&self, checks: Vec<CheckRun>) {
        self.queued_checks.lock().unwrap().push_back(checks);
    }

    /// Answer once the queue is empty.
    pub fn set_default_checks(&self, checks: Vec<CheckRun>) {
        *self.default_checks.lock().unwrap() = checks;
    }

    pub fn update_item(&self, f: impl FnOnce(&mut ItemSnapshot)) {
        f(&mut self.item.lock().unwrap());
    }

    pub fn set_comparison(&self, comparison: CommitComparison) {
        *self.comparison.lock().unwrap() = Some(comparison);
    }
}

#[async_trait]
impl PlatformApi for MockPlatform {
    async fn fetch_item(&self, _project: &Project, number: u64) -> PlatformResult<ItemSnapshot> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(PlatformError::Request("fetch refused".into()));
        }
        let mut item = self.item.lock().unwrap().clone();
        item.number = number;
        Ok(item)
    }

    async fn list_checks(&self, _project: &Project, _sha: &str) -> PlatformResult<Vec<CheckRun>> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_checks.load(Ordering::SeqCst) {
            return Err(PlatformError::Request("checks refused".into()));
        }
        let queued = self.queued_checks.lock().unwrap().pop_front();
        Ok(queued.unwrap_or_else(|| self.default_checks.lock().unwrap().clone()))
    }

    async fn compare_commits(
        &self,
        _project: &Project,
        base: &str,
        _head: &str,
    ) -> PlatformResult<CommitComparison> {
        self.comparison
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| PlatformError::NotFound(base.to_string()))
    }

    async fn post_review(
        &self,
        _project: &Project,
        number: u64,
        submission: &ReviewSubmission,
    ) -> PlatformResult<u64> {
        let mut posted = self.posted.lock().unwrap();
        posted.push((number, submission.clone()));
        Ok(1000 + posted.len() as u64)
    }
}
