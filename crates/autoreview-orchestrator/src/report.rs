//! Markdown body and verdict for a review posted back to the platform.

use autoreview_core::review::{Finding, ReviewResult};
use autoreview_core::types::{OverallStatus, Severity};
use std::fmt::Write;

/// Verdict for a submission carrying `selected`. Blocking findings request
/// changes; an approved review with nothing selected stays approved.
pub fn submission_status(review: &ReviewResult, selected: &[&Finding]) -> OverallStatus {
    if selected
        .iter()
        .any(|f| matches!(f.severity, Severity::Critical | Severity::High))
    {
        return OverallStatus::RequestChanges;
    }
    if selected.is_empty() && review.overall_status == OverallStatus::Approve {
        return OverallStatus::Approve;
    }
    OverallStatus::Comment
}

pub fn review_body(review: &ReviewResult, selected: &[&Finding]) -> String {
    let mut out = String::from("## Automated review\n\n");
    if !review.summary.trim().is_empty() {
        out.push_str(review.summary.trim());
        out.push_str("\n\n");
    }
    if review.is_followup_review && !review.resolved_findings.is_empty() {
        let _ = writeln!(
            out,
            "Resolved since the previous review: {}\n",
            review.resolved_findings.len()
        );
    }
    if selected.is_empty() {
        out.push_str("No findings.\n");
        return out;
    }

    let mut ordered = selected.to_vec();
    ordered.sort_by(|a, b| a.severity.cmp(&b.severity).then(a.file.cmp(&b.file)));

    let _ = writeln!(out, "### Findings ({})\n", ordered.len());
    for (i, f) in ordered.iter().enumerate() {
        let _ = writeln!(
            out,
            "#### {}. [{}] {}",
            i + 1,
            f.severity.as_str().to_uppercase(),
            f.title
        );
        if !f.file.is_empty() {
            let _ = writeln!(out, "`{}`\n", location(f));
        }
        if !f.description.trim().is_empty() {
            let _ = writeln!(out, "{}\n", f.description.trim());
        }
        if let Some(fix) = f.suggested_fix.as_deref().filter(|s| !s.trim().is_empty()) {
            let _ = writeln!(out, "**Suggested fix:** {}\n", fix.trim());
        }
    }
    out
}

fn location(f: &Finding) -> String {
    match (f.line, f.end_line) {
        (0, _) => f.file.clone(),
        (start, Some(end)) if end > start => format!("{}:{start}-{end}", f.file),
        (start, _) => format!("{}:{start}", f.file),
    }
}
