//! Phase-structured review logs.
//!
//! [`ReviewLogCollector`] consumes runner output line by line, keeps the lines
//! that carry a source tag (`[Context] ...`), a progress percentage or a
//! markdown summary, and files them under one of three phases. The log file is
//! rewritten atomically so the UI can tail it while the review runs.

use crate::io;
use crate::paths;
use crate::types::PlatformKind;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// LogPhase / PhaseStatus / EntryType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogPhase {
    Context,
    Analysis,
    Synthesis,
}

impl LogPhase {
    pub fn all() -> &'static [LogPhase] {
        &[LogPhase::Context, LogPhase::Analysis, LogPhase::Synthesis]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogPhase::Context => "context",
            LogPhase::Analysis => "analysis",
            LogPhase::Synthesis => "synthesis",
        }
    }
}

impl fmt::Display for LogPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Pending,
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Info,
    Success,
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// LogEntry / PhaseLog / PrLogs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub content: String,
    pub phase: LogPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseLog {
    #[serde(default)]
    pub status: PhaseStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub entries: Vec<LogEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Phases {
    #[serde(default)]
    pub context: PhaseLog,
    #[serde(default)]
    pub analysis: PhaseLog,
    #[serde(default)]
    pub synthesis: PhaseLog,
}

impl Phases {
    pub fn get(&self, phase: LogPhase) -> &PhaseLog {
        match phase {
            LogPhase::Context => &self.context,
            LogPhase::Analysis => &self.analysis,
            LogPhase::Synthesis => &self.synthesis,
        }
    }

    pub fn get_mut(&mut self, phase: LogPhase) -> &mut PhaseLog {
        match phase {
            LogPhase::Context => &mut self.context,
            LogPhase::Analysis => &mut self.analysis,
            LogPhase::Synthesis => &mut self.synthesis,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrLogs {
    #[serde(alias = "pr_number", alias = "mr_iid")]
    pub item_number: u64,
    pub repo: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_followup: bool,
    #[serde(default)]
    pub phases: Phases,
}

// ---------------------------------------------------------------------------
// Line classification
// ---------------------------------------------------------------------------

static PROGRESS_RE: OnceLock<Regex> = OnceLock::new();
static TAG_RE: OnceLock<Regex> = OnceLock::new();

fn progress_re() -> &'static Regex {
    PROGRESS_RE.get_or_init(|| Regex::new(r"^\[\s*(\d{1,3})%\]\s*(.*)$").unwrap())
}

fn tag_re() -> &'static Regex {
    TAG_RE.get_or_init(|| Regex::new(r"^\[([^\]]+)\]\s*(.*)$").unwrap())
}

const SPECIALIST_PREFIX: &str = "Specialist";

const SOURCE_PHASES: &[(&str, LogPhase)] = &[
    ("Context", LogPhase::Context),
    ("BotDetector", LogPhase::Context),
    ("Fetcher", LogPhase::Context),
    ("Git", LogPhase::Context),
    ("AI", LogPhase::Analysis),
    ("Orchestrator", LogPhase::Analysis),
    ("ParallelOrchestrator", LogPhase::Analysis),
    ("Followup", LogPhase::Analysis),
    ("ParallelFollowup", LogPhase::Analysis),
    ("Review", LogPhase::Analysis),
    ("Agent", LogPhase::Analysis),
    ("Synthesis", LogPhase::Synthesis),
    ("Summary", LogPhase::Synthesis),
    ("Verdict", LogPhase::Synthesis),
    ("Post", LogPhase::Synthesis),
    ("Complete", LogPhase::Synthesis),
];

/// Phase for a `[Tag]` source. Unknown tags belong to synthesis.
pub fn phase_for_source(source: &str) -> LogPhase {
    if source.starts_with(SPECIALIST_PREFIX) {
        return LogPhase::Analysis;
    }
    SOURCE_PHASES
        .iter()
        .find(|(name, _)| *name == source)
        .map(|(_, phase)| *phase)
        .unwrap_or(LogPhase::Synthesis)
}

/// Where a line should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineTarget {
    Phase(LogPhase),
    /// Progress lines follow whichever phase is currently active.
    CurrentPhase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedLine {
    pub source: Option<String>,
    pub target: LineTarget,
    pub content: String,
}

fn is_summary_like(line: &str) -> bool {
    ["#", "**", "- ", "* ", "|", "✓", "✗", "✅", "❌"]
        .iter()
        .any(|p| line.starts_with(p))
}

/// Classify a raw output line; `None` means the line is not recorded.
pub fn classify_line(line: &str) -> Option<ClassifiedLine> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if let Some(caps) = progress_re().captures(line) {
        return Some(ClassifiedLine {
            source: Some("Progress".to_string()),
            target: LineTarget::CurrentPhase,
            content: caps[2].to_string(),
        });
    }
    if let Some(caps) = tag_re().captures(line) {
        let source = caps[1].trim().to_string();
        let rest = caps[2].trim();
        let content = if rest.is_empty() { line } else { rest };
        return Some(ClassifiedLine {
            target: LineTarget::Phase(phase_for_source(&source)),
            source: Some(source),
            content: content.to_string(),
        });
    }
    if is_summary_like(line) {
        return Some(ClassifiedLine {
            source: None,
            target: LineTarget::Phase(LogPhase::Synthesis),
            content: line.to_string(),
        });
    }
    None
}

fn entry_type_for(content: &str) -> EntryType {
    let lower = content.to_lowercase();
    if lower.contains("error") || lower.contains("failed") || lower.contains("exception") {
        EntryType::Error
    } else if lower.contains("warning") || lower.starts_with("warn") {
        EntryType::Warning
    } else if lower.contains("complete") || lower.contains("success") || content.contains('✓') {
        EntryType::Success
    } else {
        EntryType::Info
    }
}

// ---------------------------------------------------------------------------
// ReviewLogCollector
// ---------------------------------------------------------------------------

pub struct ReviewLogCollector {
    path: PathBuf,
    logs: PrLogs,
    unsaved: usize,
    save_every: usize,
}

impl ReviewLogCollector {
    /// Start a fresh log for one review run. The initial (all-pending) document
    /// is written immediately so the UI can show the review as started.
    pub fn new(
        root: &Path,
        platform: PlatformKind,
        item_number: u64,
        repo: impl Into<String>,
        is_followup: bool,
        save_every: usize,
    ) -> Self {
        let now = Utc::now();
        let mut collector = Self {
            path: paths::logs_path(root, platform, item_number),
            logs: PrLogs {
                item_number,
                repo: repo.into(),
                created_at: now,
                updated_at: now,
                is_followup,
                phases: Phases::default(),
            },
            unsaved: 0,
            save_every: save_every.max(1),
        };
        collector.save();
        collector
    }

    pub fn logs(&self) -> &PrLogs {
        &self.logs
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Latest phase currently in `active` state.
    pub fn active_phase(&self) -> Option<LogPhase> {
        LogPhase::all()
            .iter()
            .rev()
            .copied()
            .find(|p| self.logs.phases.get(*p).status == PhaseStatus::Active)
    }

    /// Record one output line. Returns the stored entry, or `None` when the
    /// line was filtered out.
    pub fn process_line(&mut self, line: &str) -> Option<LogEntry> {
        let classified = classify_line(line)?;
        let phase = match classified.target {
            LineTarget::Phase(p) => p,
            LineTarget::CurrentPhase => self.active_phase().unwrap_or(LogPhase::Context),
        };
        let now = Utc::now();
        let mut phase_changed = false;

        for earlier in LogPhase::all().iter().copied().filter(|p| *p < phase) {
            let log = self.logs.phases.get_mut(earlier);
            if log.status == PhaseStatus::Active {
                log.status = PhaseStatus::Completed;
                log.completed_at = Some(now);
                phase_changed = true;
            }
        }

        let entry = LogEntry {
            timestamp: now,
            entry_type: entry_type_for(&classified.content),
            content: classified.content,
            phase,
            source: classified.source,
        };

        let target = self.logs.phases.get_mut(phase);
        if target.status == PhaseStatus::Pending {
            target.status = PhaseStatus::Active;
            target.started_at = Some(now);
            phase_changed = true;
        }
        target.entries.push(entry.clone());

        self.logs.updated_at = now;
        self.unsaved += 1;
        if phase_changed || self.unsaved >= self.save_every {
            self.save();
        }
        Some(entry)
    }

    /// Close `phase` if it is active. Pending phases stay pending.
    pub fn mark_phase_complete(&mut self, phase: LogPhase, success: bool) {
        let log = self.logs.phases.get_mut(phase);
        if log.status != PhaseStatus::Active {
            return;
        }
        log.status = if success {
            PhaseStatus::Completed
        } else {
            PhaseStatus::Failed
        };
        log.completed_at = Some(Utc::now());
        self.logs.updated_at = Utc::now();
        self.save();
    }

    /// Close every active phase with the run's outcome and write the file.
    pub fn finalize(&mut self, success: bool) {
        let now = Utc::now();
        for phase in LogPhase::all() {
            let log = self.logs.phases.get_mut(*phase);
            if log.status == PhaseStatus::Active {
                log.status = if success {
                    PhaseStatus::Completed
                } else {
                    PhaseStatus::Failed
                };
                log.completed_at = Some(now);
            }
        }
        self.logs.updated_at = now;
        self.save();
    }

    fn save(&mut self) {
        self.unsaved = 0;
        if let Err(e) = io::write_json(&self.path, &self.logs) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to persist review logs");
        }
    }
}

/// Load the stored log for `number`. Missing or unreadable files are `None`.
pub fn load_logs(root: &Path, platform: PlatformKind, number: u64) -> Option<PrLogs> {
    io::read_json(&paths::logs_path(root, platform, number))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn collector(dir: &TempDir) -> ReviewLogCollector {
        ReviewLogCollector::new(dir.path(), PlatformKind::GitHub, 9, "acme/app", false, 3)
    }

    fn on_disk(dir: &TempDir) -> PrLogs {
        load_logs(dir.path(), PlatformKind::GitHub, 9).unwrap()
    }

    #[test]
    fn source_table() {
        assert_eq!(phase_for_source("Context"), LogPhase::Context);
        assert_eq!(phase_for_source("BotDetector"), LogPhase::Context);
        assert_eq!(phase_for_source("ParallelOrchestrator"), LogPhase::Analysis);
        assert_eq!(phase_for_source("Specialist:security"), LogPhase::Analysis);
        assert_eq!(phase_for_source("SpecialistPerformance"), LogPhase::Analysis);
        assert_eq!(phase_for_source("Something new"), LogPhase::Synthesis);
    }

    #[test]
    fn classification_filters_noise() {
        assert!(classify_line("plain chatter").is_none());
        assert!(classify_line("   ").is_none());

        let progress = classify_line("[ 45%] Running agents").unwrap();
        assert_eq!(progress.target, LineTarget::CurrentPhase);
        assert_eq!(progress.content, "Running agents");

        let tagged = classify_line("[Context] Fetched 12 files").unwrap();
        assert_eq!(tagged.source.as_deref(), Some("Context"));
        assert_eq!(tagged.content, "Fetched 12 files");

        let md = classify_line("## Summary").unwrap();
        assert_eq!(md.target, LineTarget::Phase(LogPhase::Synthesis));
    }

    #[test]
    fn new_collector_writes_pending_document() {
        let dir = TempDir::new().unwrap();
        let _c = collector(&dir);
        let logs = on_disk(&dir);
        assert_eq!(logs.item_number, 9);
        for phase in LogPhase::all() {
            assert_eq!(logs.phases.get(*phase).status, PhaseStatus::Pending);
        }
    }

    #[test]
    fn first_entry_activates_phase() {
        let dir = TempDir::new().unwrap();
        let mut c = collector(&dir);
        assert!(c.process_line("[Context] Gathering").is_some());
        let logs = on_disk(&dir);
        assert_eq!(logs.phases.context.status, PhaseStatus::Active);
        assert!(logs.phases.context.started_at.is_some());
        assert_eq!(logs.phases.context.entries.len(), 1);
    }

    #[test]
    fn later_phase_completes_active_earlier_phase_only() {
        let dir = TempDir::new().unwrap();
        let mut c = collector(&dir);
        // Follow-up style: no context lines at all.
        c.process_line("[Followup] Comparing against previous review");
        c.process_line("[Verdict] Ready to merge");
        let logs = c.logs();
        assert_eq!(logs.phases.context.status, PhaseStatus::Pending);
        assert_eq!(logs.phases.analysis.status, PhaseStatus::Completed);
        assert_eq!(logs.phases.synthesis.status, PhaseStatus::Active);
    }

    #[test]
    fn progress_lines_follow_active_phase() {
        let dir = TempDir::new().unwrap();
        let mut c = collector(&dir);
        let first = c.process_line("[ 5%] Starting").unwrap();
        assert_eq!(first.phase, LogPhase::Context);
        c.process_line("[AI] Thinking");
        let next = c.process_line("[ 60%] Halfway").unwrap();
        assert_eq!(next.phase, LogPhase::Analysis);
    }

    #[test]
    fn empty_phase_stays_pending_after_finalize() {
        for success in [true, false] {
            let dir = TempDir::new().unwrap();
            let mut c = collector(&dir);
            c.process_line("[AI] Analysing diff");
            c.finalize(success);
            let logs = on_disk(&dir);
            assert_eq!(logs.phases.context.status, PhaseStatus::Pending);
            assert_eq!(logs.phases.synthesis.status, PhaseStatus::Pending);
            let expected = if success {
                PhaseStatus::Completed
            } else {
                PhaseStatus::Failed
            };
            assert_eq!(logs.phases.analysis.status, expected);
            assert!(logs.phases.analysis.completed_at.is_some());
        }
    }

    #[test]
    fn saves_in_batches_without_phase_change() {
        let dir = TempDir::new().unwrap();
        let mut c = collector(&dir);
        c.process_line("[AI] one"); // activation: saved
        assert_eq!(on_disk(&dir).phases.analysis.entries.len(), 1);
        c.process_line("[AI] two");
        c.process_line("[AI] three");
        assert_eq!(on_disk(&dir).phases.analysis.entries.len(), 1);
        c.process_line("[AI] four"); // third unsaved entry: saved
        assert_eq!(on_disk(&dir).phases.analysis.entries.len(), 4);
    }

    #[test]
    fn mark_phase_complete_ignores_pending() {
        let dir = TempDir::new().unwrap();
        let mut c = collector(&dir);
        c.mark_phase_complete(LogPhase::Context, true);
        assert_eq!(c.logs().phases.context.status, PhaseStatus::Pending);
        c.process_line("[Context] x");
        c.mark_phase_complete(LogPhase::Context, false);
        assert_eq!(c.logs().phases.context.status, PhaseStatus::Failed);
    }

    #[test]
    fn entry_types() {
        assert_eq!(entry_type_for("Request failed: 500"), EntryType::Error);
        assert_eq!(entry_type_for("Warning: large diff"), EntryType::Warning);
        assert_eq!(entry_type_for("Analysis complete"), EntryType::Success);
        assert_eq!(entry_type_for("Reading files"), EntryType::Info);
    }
}
