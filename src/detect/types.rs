//! Core types for detection results.

use serde::{Deserialize, Serialize};

use crate::issue::{IssueDraft, Severity};

use super::Suppression;

/// An unsaved issue proposed by one rule for one file.
///
/// A rule produces at most one candidate per file; `match_count` records how
/// many times it fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub rule: String,
    pub file_path: String,
    /// First unsuppressed match (1-based)
    pub line: usize,
    pub match_count: usize,
    pub excerpt: String,
    pub issue_type: String,
    pub severity: Severity,
    pub content_warnings: Vec<String>,
    pub blocks_deployment: bool,
    pub description: String,
    pub required_actions: Vec<String>,
}

impl Candidate {
    /// Convert into a draft for the ledger.
    pub fn to_draft(&self) -> IssueDraft {
        let occurrences = if self.match_count == 1 {
            "1 match".to_string()
        } else {
            format!("{} matches", self.match_count)
        };
        let description = format!(
            "{} ({}, first at line {}: {:?})",
            self.description, occurrences, self.line, self.excerpt
        );
        IssueDraft::new(&self.file_path, &self.issue_type, self.severity, description)
            .warnings(self.content_warnings.iter().cloned())
            .actions(self.required_actions.iter().cloned())
            .blocking(self.blocks_deployment)
    }
}

/// A rule whose every match in a file was suppressed inline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressedRule {
    pub rule: String,
    pub file_path: String,
    pub match_count: usize,
    pub suppression: Suppression,
}

/// Results of running the rule set over one content string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Detection {
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub suppressed: Vec<SuppressedRule>,
}

impl Detection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge another result into this one.
    pub fn merge(&mut self, other: Detection) {
        self.candidates.extend(other.candidates);
        self.suppressed.extend(other.suppressed);
    }

    pub fn is_clean(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Number of candidates that would block deployment once recorded.
    pub fn blocking_count(&self) -> usize {
        self.candidates
            .iter()
            .filter(|c| c.blocks_deployment)
            .count()
    }
}
