//! Views and rendered summaries over the ledger.
//!
//! Supports three output formats:
//! - Pretty: colored terminal output for operators
//! - JSON: structured output for automation
//! - Markdown: stakeholder report
//!
//! Everything here is derived from a [`Snapshot`] taken by the caller; nothing
//! is cached between calls and nothing writes to the ledger.

use chrono::{DateTime, Utc};
use colored::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::detect::{Candidate, Detection, IngestOutcome};
use crate::gate::{self, GateResult, Verdict};
use crate::issue::{Issue, IssueId, Severity, Status};
use crate::store::Snapshot;

/// Output format shared by read-only commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Pretty,
    Json,
    Markdown,
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(Format::Pretty),
            "json" => Ok(Format::Json),
            "markdown" | "md" => Ok(Format::Markdown),
            _ => Err(format!(
                "invalid format {:?}, must be 'pretty', 'json', or 'markdown'",
                s
            )),
        }
    }
}

// =============================================================================
// Views
// =============================================================================

/// Conjunction of optional criteria.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub status: Option<Status>,
    pub severity: Option<Severity>,
    /// Only unresolved issues flagged as deployment-blocking
    pub blocking_only: bool,
}

impl Filter {
    pub fn matches(&self, issue: &Issue) -> bool {
        self.status.map_or(true, |s| issue.status == s)
            && self.severity.map_or(true, |s| issue.severity == s)
            && (!self.blocking_only || issue.is_blocking())
    }

    /// Matching issues in ledger order.
    pub fn apply<'a>(&self, snapshot: &'a Snapshot) -> Vec<&'a Issue> {
        snapshot.iter().filter(|i| self.matches(i)).collect()
    }
}

pub fn by_status(snapshot: &Snapshot, status: Status) -> Vec<&Issue> {
    Filter {
        status: Some(status),
        ..Default::default()
    }
    .apply(snapshot)
}

pub fn by_severity(snapshot: &Snapshot, severity: Severity) -> Vec<&Issue> {
    Filter {
        severity: Some(severity),
        ..Default::default()
    }
    .apply(snapshot)
}

pub fn blocking_only(snapshot: &Snapshot) -> Vec<&Issue> {
    Filter {
        blocking_only: true,
        ..Default::default()
    }
    .apply(snapshot)
}

// =============================================================================
// Summary
// =============================================================================

/// Aggregate counts for stakeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub by_warning: BTreeMap<String, usize>,
    /// Unresolved deployment-blocking issues, in ledger order
    pub open_blocking: Vec<IssueId>,
}

impl Summary {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut by_status: BTreeMap<String, usize> = Status::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        let mut by_severity: BTreeMap<String, usize> = Severity::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        let mut by_type = BTreeMap::new();
        let mut by_warning = BTreeMap::new();
        let mut open_blocking = Vec::new();

        for issue in snapshot {
            *by_status.entry(issue.status.as_str().to_string()).or_insert(0) += 1;
            *by_severity
                .entry(issue.severity.as_str().to_string())
                .or_insert(0) += 1;
            *by_type.entry(issue.issue_type.clone()).or_insert(0) += 1;
            for w in &issue.content_warnings {
                *by_warning.entry(w.clone()).or_insert(0) += 1;
            }
            if issue.is_blocking() {
                open_blocking.push(issue.id.clone());
            }
        }

        Self {
            generated_at: Utc::now(),
            total: snapshot.len(),
            by_status,
            by_severity,
            by_type,
            by_warning,
            open_blocking,
        }
    }

    pub fn status_count(&self, status: Status) -> usize {
        self.by_status.get(status.as_str()).copied().unwrap_or(0)
    }

    pub fn severity_count(&self, severity: Severity) -> usize {
        self.by_severity.get(severity.as_str()).copied().unwrap_or(0)
    }

    /// Issues not yet resolved.
    pub fn open(&self) -> usize {
        self.total - self.status_count(Status::Resolved)
    }
}

// =============================================================================
// JSON
// =============================================================================

/// Full machine-readable report.
#[derive(Serialize, Deserialize)]
pub struct JsonReport {
    pub version: String,
    pub ledger: String,
    pub summary: Summary,
    pub gate: GateResult,
    pub issues: Vec<Issue>,
}

pub fn render_json_report(ledger: &str, snapshot: &Snapshot) -> anyhow::Result<String> {
    let report = JsonReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        ledger: ledger.to_string(),
        summary: Summary::from_snapshot(snapshot),
        gate: gate::evaluate(snapshot.as_slice(), true),
        issues: snapshot.as_slice().to_vec(),
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

pub fn render_json_issues(issues: &[&Issue]) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(issues)?)
}

// =============================================================================
// Markdown
// =============================================================================

/// Stakeholder report in Markdown.
pub fn render_markdown(ledger: &str, snapshot: &Snapshot) -> String {
    let summary = Summary::from_snapshot(snapshot);
    let gate = gate::evaluate(snapshot.as_slice(), true);
    let mut out = String::new();

    let _ = writeln!(out, "# Content compliance report");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Generated {} from `{}`.",
        summary.generated_at.format("%Y-%m-%d %H:%M UTC"),
        ledger
    );
    let _ = writeln!(out);

    let status_line = if gate.verdict == Verdict::Pass {
        "**Deployment: CLEAR** - no unresolved blocking issues.".to_string()
    } else {
        format!(
            "**Deployment: BLOCKED** - {} unresolved blocking issue{}.",
            gate.blocking.len(),
            plural(gate.blocking.len())
        )
    };
    let _ = writeln!(out, "{}", status_line);
    let _ = writeln!(out);

    let _ = writeln!(out, "## Overview");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Status | Issues |");
    let _ = writeln!(out, "|---|---:|");
    for status in Status::ALL {
        let _ = writeln!(out, "| {} | {} |", status, summary.status_count(status));
    }
    let _ = writeln!(out, "| **total** | **{}** |", summary.total);
    let _ = writeln!(out);
    let _ = writeln!(out, "| Severity | Issues |");
    let _ = writeln!(out, "|---|---:|");
    for severity in Severity::ALL {
        let _ = writeln!(out, "| {} | {} |", severity, summary.severity_count(severity));
    }
    let _ = writeln!(out);

    if !gate.blocking.is_empty() {
        let _ = writeln!(out, "## Blocking issues");
        let _ = writeln!(out);
        write_markdown_table(&mut out, gate.blocking.iter());
        let _ = writeln!(out);
    }

    let mut open: Vec<&Issue> = snapshot
        .iter()
        .filter(|i| i.status != Status::Resolved && !i.is_blocking())
        .collect();
    if !open.is_empty() {
        open.sort_by_key(|i| i.severity);
        let _ = writeln!(out, "## Other open issues");
        let _ = writeln!(out);
        write_markdown_table(&mut out, open.into_iter());
        let _ = writeln!(out);
    }

    if !summary.by_warning.is_empty() {
        let _ = writeln!(out, "## Content warnings");
        let _ = writeln!(out);
        for (warning, count) in &summary.by_warning {
            let _ = writeln!(out, "- `{}`: {}", warning, count);
        }
        let _ = writeln!(out);
    }

    out
}

fn write_markdown_table<'a>(out: &mut String, issues: impl Iterator<Item = &'a Issue>) {
    let _ = writeln!(out, "| ID | Severity | Status | File | Type | Description |");
    let _ = writeln!(out, "|---|---|---|---|---|---|");
    for i in issues {
        let _ = writeln!(
            out,
            "| {} | {} | {} | `{}` | {} | {} |",
            i.id,
            i.severity,
            i.status,
            i.file_path,
            i.issue_type,
            table_cell(&i.description)
        );
    }
}

/// Text safe inside one Markdown table cell: pipes escaped, line breaks flattened.
fn table_cell(text: &str) -> String {
    text.replace("\r\n", " ")
        .replace(['\r', '\n'], " ")
        .replace('|', "\\|")
}

// =============================================================================
// Pretty
// =============================================================================

/// Print issues as a compact list.
pub fn write_pretty_list(issues: &[&Issue]) {
    if issues.is_empty() {
        println!("  {}", "No matching issues.".dimmed());
        return;
    }

    println!();
    for i in issues {
        write_severity_tag(i.severity);
        print!(" {:<8}", i.id.as_str().bold());
        write_status(i.status);
        print!("  {}", i.file_path.blue());
        if i.blocks_deployment {
            print!("  {}", "[blocks deploy]".red());
        }
        println!();
        println!("            {}  {}", i.issue_type.dimmed(), i.description);
    }
    println!();
    println!("  {} issue{}", issues.len(), plural(issues.len()));
}

/// Print every field of one issue.
pub fn write_pretty_issue(issue: &Issue) {
    println!();
    print!("  {}  ", issue.id.as_str().cyan().bold());
    write_severity_tag(issue.severity);
    print!(" ");
    write_status(issue.status);
    println!();
    println!();
    println!("  {}{}", "File:        ".dimmed(), issue.file_path);
    println!("  {}{}", "Type:        ".dimmed(), issue.issue_type);
    println!("  {}{}", "Created:     ".dimmed(), issue.created_at.to_rfc3339());
    println!(
        "  {}{}",
        "Blocks:      ".dimmed(),
        if issue.blocks_deployment { "yes".red() } else { "no".normal() }
    );
    if !issue.content_warnings.is_empty() {
        println!("  {}{}", "Warnings:    ".dimmed(), issue.content_warnings.join(", "));
    }
    println!("  {}{}", "Description: ".dimmed(), issue.description);

    if !issue.required_actions.is_empty() {
        println!();
        println!("  {}", "Required actions:".bold());
        for (n, action) in issue.required_actions.iter().enumerate() {
            println!("    {}. {}", n + 1, action);
        }
    }

    if issue.status == Status::Resolved {
        println!();
        println!(
            "  {}{}",
            "Resolved:    ".dimmed(),
            issue
                .resolved_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default()
        );
        println!(
            "  {}{}",
            "By:          ".dimmed(),
            issue.resolved_by.as_deref().unwrap_or_default()
        );
        println!(
            "  {}{}",
            "Commit:      ".dimmed(),
            issue.assigned_commit.as_deref().unwrap_or_default()
        );
    }

    if !issue.notes.is_empty() {
        println!();
        println!("  {}", "Notes:".bold());
        for note in &issue.notes {
            println!("    - {}", note);
        }
    }
    println!();
}

/// Print the stakeholder summary.
pub fn write_pretty_report(ledger: &str, snapshot: &Snapshot) {
    let summary = Summary::from_snapshot(snapshot);
    let gate = gate::evaluate(snapshot.as_slice(), true);

    println!();
    print!("  ");
    print!("{}", "contentgate".cyan().bold());
    println!(" v{}", env!("CARGO_PKG_VERSION"));
    println!();
    print!("  {}", "Ledger: ".dimmed());
    println!("{}", ledger);
    println!();

    println!(
        "  {} total, {} open, {} resolved",
        summary.total.to_string().bold(),
        summary.open(),
        summary.status_count(Status::Resolved)
    );
    println!();

    println!("  {}", "By status:".bold());
    for status in Status::ALL {
        println!("    {:<12} {:>4}", status.as_str(), summary.status_count(status));
    }
    println!();
    println!("  {}", "By severity:".bold());
    for severity in Severity::ALL {
        println!(
            "    {:<12} {:>4}",
            severity.as_str(),
            summary.severity_count(severity)
        );
    }
    if !summary.by_type.is_empty() {
        println!();
        println!("  {}", "By type:".bold());
        let mut types: Vec<_> = summary.by_type.iter().collect();
        types.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (issue_type, count) in types {
            println!("    {:<24} {:>4}", issue_type, count);
        }
    }
    println!();

    if !gate.blocking.is_empty() {
        let blocking: Vec<&Issue> = gate.blocking.iter().collect();
        println!("  {} ({}):", "Blocking deployment".red().bold(), blocking.len());
        write_pretty_list(&blocking);
        println!();
    }

    write_gate_status(&gate);
    println!();
}

/// Print a gate result.
pub fn write_pretty_gate(ledger: &str, result: &GateResult) {
    println!();
    print!("  {}", "Ledger: ".dimmed());
    println!("{}", ledger);
    print!("  {}", "Mode:   ".dimmed());
    println!("{}", if result.strict { "strict" } else { "advisory" });
    println!();

    if let Some(err) = &result.error {
        println!("  {} {}", "✗ ERROR".red(), err);
        println!(
            "  {}",
            "Compliance state is unknown; treating the deploy as blocked.".dimmed()
        );
        println!();
        return;
    }

    if !result.blocking.is_empty() {
        let blocking: Vec<&Issue> = result.blocking.iter().collect();
        write_pretty_list(&blocking);
        println!();
    }
    write_gate_status(result);
    println!();
}

/// Print scan candidates grouped by file, and what ingestion did with them.
pub fn write_pretty_scan(root: &str, scanned: usize, detection: &Detection, ingest: Option<&IngestOutcome>) {
    println!();
    print!("  {}", "Scanned: ".dimmed());
    println!("{} ({} file{})", root, scanned, plural(scanned));
    println!();

    if detection.is_clean() {
        println!("  {}", "✓ No sensitive content found".green());
    } else {
        let mut by_file: BTreeMap<&str, Vec<&Candidate>> = BTreeMap::new();
        for c in &detection.candidates {
            by_file.entry(c.file_path.as_str()).or_default().push(c);
        }
        for (file, candidates) in by_file {
            println!("  {}", file.blue().bold());
            for c in candidates {
                write_severity_tag(c.severity);
                print!(" {}", c.rule.bold());
                print!(" {}", format!("line {}", c.line).dimmed());
                if c.match_count > 1 {
                    print!(" {}", format!("(x{})", c.match_count).dimmed());
                }
                if c.blocks_deployment {
                    print!("  {}", "[blocks deploy]".red());
                }
                println!();
                println!("            {}", c.excerpt.dimmed());
            }
            println!();
        }
    }

    if !detection.suppressed.is_empty() {
        println!(
            "  {} rule match{} suppressed inline",
            detection.suppressed.len(),
            if detection.suppressed.len() == 1 { "" } else { "es" }
        );
    }

    match ingest {
        Some(outcome) => {
            println!(
                "  {} issue{} recorded, {} already tracked",
                outcome.created.len().to_string().bold(),
                plural(outcome.created.len()),
                outcome.skipped.len()
            );
            for issue in &outcome.created {
                println!("    {} {}", "+".green(), issue.id);
            }
        }
        None => println!(
            "  {} candidate{} (dry run, nothing recorded)",
            detection.candidates.len(),
            plural(detection.candidates.len())
        ),
    }
    println!();
}

fn write_gate_status(result: &GateResult) {
    match result.verdict {
        Verdict::Pass => print!("  {}", "✓ PASS".green()),
        Verdict::Warn => print!("  {}", "! WARN".yellow()),
        Verdict::Fail => print!("  {}", "✗ FAIL".red()),
    }
    println!(
        "  {} blocking issue{} of {}",
        result.blocking.len(),
        plural(result.blocking.len()),
        result.total
    );
}

fn write_severity_tag(severity: Severity) {
    match severity {
        Severity::Blocker => print!("    {}", "BLOCKER".red().bold()),
        Severity::High => print!("    {}", "HIGH   ".red()),
        Severity::Medium => print!("    {}", "MEDIUM ".yellow()),
        Severity::Low => print!("    {}", "LOW    ".blue()),
    }
}

fn write_status(status: Status) {
    let label = format!("{:<11}", status.as_str());
    match status {
        Status::Pending => print!("{}", label.yellow()),
        Status::InProgress => print!("{}", label.cyan()),
        Status::Resolved => print!("{}", label.green()),
        Status::Deferred => print!("{}", label.dimmed()),
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}
