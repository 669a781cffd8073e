//! Scan runner: walks a content tree and feeds candidates to the ledger.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use walkdir::WalkDir;

use crate::error::GovernanceError;
use crate::issue::{Issue, IssueDraft, Status};
use crate::rules::RuleSet;
use crate::store::Ledger;

use super::{detect, CompiledRules, Detection};

/// Directories never worth reading for published content.
const SKIPPED_DIRS: &[&str] = &["node_modules", "target", "vendor", "__pycache__"];

/// Runs the detection engine over files on disk.
pub struct Scanner {
    base_dir: PathBuf,
    rules: RuleSet,
    compiled: CompiledRules,
}

/// Detection output for a whole tree.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub detection: Detection,
    /// Number of files scanned
    pub scanned: usize,
}

/// What happened when candidates were submitted to the ledger.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub created: Vec<Issue>,
    /// Candidates already tracked by an unresolved issue
    pub skipped: Vec<IssueDraft>,
}

impl Scanner {
    /// Create a scanner rooted at `base_dir`. Logical file paths are relative to it.
    pub fn new<P: AsRef<Path>>(base_dir: P, rules: RuleSet) -> anyhow::Result<Self> {
        let compiled = CompiledRules::compile(&rules)?;
        Ok(Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            rules,
            compiled,
        })
    }

    /// Collect the files under `root` that the rule set wants read.
    pub fn collect_files(&self, root: &Path) -> anyhow::Result<Vec<PathBuf>> {
        if root.is_file() {
            return Ok(vec![root.to_path_buf()]);
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                let name = e.file_name().to_string_lossy();
                if e.file_type().is_dir() && e.depth() > 0 {
                    // Skip hidden and tooling directories
                    return !name.starts_with('.') && !SKIPPED_DIRS.contains(&name.as_ref());
                }
                true
            })
        {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if !self.rules.accepts_extension(path) {
                continue;
            }
            if self.rules.is_path_excluded(path) {
                tracing::debug!(file = %path.display(), "excluded by rule set");
                continue;
            }
            files.push(path.to_path_buf());
        }
        Ok(files)
    }

    /// Detect over every file, in parallel. Results keep the order of `files`.
    pub fn scan(&self, files: &[PathBuf]) -> anyhow::Result<ScanResult> {
        let per_file: Vec<Detection> = files
            .par_iter()
            .map(|path| {
                let bytes = std::fs::read(path)?;
                let content = String::from_utf8_lossy(&bytes);
                let logical = self.logical_path(path);
                let found = detect(&content, &logical, &self.compiled);
                tracing::debug!(
                    file = %logical,
                    candidates = found.candidates.len(),
                    "file scanned"
                );
                Ok(found)
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut result = ScanResult {
            scanned: per_file.len(),
            ..Default::default()
        };
        for found in per_file {
            result.detection.merge(found);
        }
        Ok(result)
    }

    /// Path relative to the base directory, with forward slashes.
    pub fn logical_path(&self, path: &Path) -> String {
        make_relative_path(path, &self.base_dir)
    }
}

/// Submit candidates to the ledger under one lock.
///
/// A candidate is skipped only when an unresolved issue already records the
/// same finding: same file and issue type, and the same severity, blocking
/// flag and content warnings. Re-scanning an unchanged tree adds nothing, and
/// a blocking candidate is never absorbed by a non-blocking issue.
pub fn ingest(ledger: &Ledger, detection: &Detection) -> Result<IngestOutcome, GovernanceError> {
    let drafts: Vec<IssueDraft> = detection.candidates.iter().map(|c| c.to_draft()).collect();
    let mut skipped = Vec::new();
    let created = ledger.append_batch_filtered(drafts, |known, draft| {
        if is_already_tracked(known, draft) {
            skipped.push(draft.clone());
            false
        } else {
            true
        }
    })?;
    tracing::info!(
        created = created.len(),
        skipped = skipped.len(),
        "scan candidates ingested"
    );
    Ok(IngestOutcome { created, skipped })
}

fn is_already_tracked(known: &[Issue], draft: &IssueDraft) -> bool {
    known.iter().any(|i| {
        i.status != Status::Resolved
            && i.file_path == draft.file_path
            && i.issue_type == draft.issue_type
            && i.severity == draft.severity
            && i.blocks_deployment == draft.blocks_deployment
            && same_warnings(&i.content_warnings, &draft.content_warnings)
    })
}

/// Order-insensitive comparison of warning tags.
fn same_warnings(a: &[String], b: &[String]) -> bool {
    let mut a: Vec<&str> = a.iter().map(String::as_str).collect();
    let mut b: Vec<&str> = b.iter().map(String::as_str).collect();
    a.sort_unstable();
    a.dedup();
    b.sort_unstable();
    b.dedup();
    a == b
}

fn make_relative_path(file: &Path, base: &Path) -> String {
    if file == base {
        return file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file.to_string_lossy().to_string());
    }
    file.strip_prefix(base)
        .map(|p| p.to_string_lossy().replace('\\', "/"))
        .unwrap_or_else(|_| file.to_string_lossy().replace('\\', "/"))
}
