//! The issue record and its vocabulary types.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{GovernanceError, Result};

static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9]*)-(\d+)$").expect("static id pattern"));

/// Stable ledger identifier such as `SC-001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueId(String);

impl IssueId {
    /// Build the id for sequence number `seq`, zero-padded to `width` digits.
    pub fn format(prefix: &str, seq: u64, width: usize) -> Self {
        Self(format!("{}-{:0width$}", prefix, seq, width = width))
    }

    /// Sequence number if this id has the shape `<prefix>-<digits>`.
    pub fn sequence(&self, prefix: &str) -> Option<u64> {
        let caps = ID_PATTERN.captures(&self.0)?;
        if &caps[1] != prefix {
            return None;
        }
        caps[2].parse().ok()
    }

    /// Whether a manually supplied id is well formed.
    pub fn is_well_formed(&self) -> bool {
        ID_PATTERN.is_match(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for IssueId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for IssueId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for IssueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Pending,
    InProgress,
    Resolved,
    Deferred,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Pending,
        Status::InProgress,
        Status::Resolved,
        Status::Deferred,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::InProgress => "in-progress",
            Status::Resolved => "resolved",
            Status::Deferred => "deferred",
        }
    }

    /// Resolved and deferred accept notes but no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Resolved | Status::Deferred)
    }

    /// Edges of the lifecycle state machine.
    pub fn can_transition_to(&self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Pending, Status::InProgress)
                | (Status::Pending, Status::Resolved)
                | (Status::Pending, Status::Deferred)
                | (Status::InProgress, Status::Resolved)
                | (Status::InProgress, Status::Deferred)
        )
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "pending" => Ok(Status::Pending),
            "in-progress" => Ok(Status::InProgress),
            "resolved" => Ok(Status::Resolved),
            "deferred" => Ok(Status::Deferred),
            _ => Err(format!("unknown status: {}", s)),
        }
    }
}

/// Urgency tier. Variant order is decreasing urgency, so `Blocker < Low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Blocker,
    High,
    Medium,
    Low,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Blocker,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Blocker => "blocker",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "blocker" => Ok(Severity::Blocker),
            "high" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            _ => Err(format!("unknown severity: {}", s)),
        }
    }
}

/// A tracked compliance finding. This is the only persisted entity.
///
/// Optional fields serialize as explicit `null` so ledger diffs stay stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: IssueId,
    pub created_at: DateTime<Utc>,
    pub status: Status,
    pub file_path: String,
    pub issue_type: String,
    pub severity: Severity,
    pub description: String,
    pub required_actions: Vec<String>,
    pub content_warnings: Vec<String>,
    pub blocks_deployment: bool,
    pub assigned_commit: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub notes: Vec<String>,
}

impl Issue {
    /// Materialize a draft as a fresh `pending` issue.
    pub fn from_draft(id: IssueId, draft: IssueDraft, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at,
            status: Status::Pending,
            file_path: draft.file_path,
            issue_type: draft.issue_type,
            severity: draft.severity,
            description: draft.description,
            required_actions: draft.required_actions,
            content_warnings: dedup_preserving_order(draft.content_warnings),
            blocks_deployment: draft.blocks_deployment,
            assigned_commit: None,
            resolved_at: None,
            resolved_by: None,
            notes: draft.notes,
        }
    }

    /// Unresolved and flagged as deployment-blocking. Deferral does not waive this.
    pub fn is_blocking(&self) -> bool {
        self.blocks_deployment && self.status != Status::Resolved
    }

    /// Audit fields are present iff the issue is resolved.
    pub fn audit_fields_consistent(&self) -> bool {
        let set = self.assigned_commit.is_some()
            && self.resolved_at.is_some()
            && self.resolved_by.is_some();
        let unset = self.assigned_commit.is_none()
            && self.resolved_at.is_none()
            && self.resolved_by.is_none();
        if self.status == Status::Resolved {
            set
        } else {
            unset
        }
    }
}

/// Everything needed to create an issue except its id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueDraft {
    pub file_path: String,
    pub issue_type: String,
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub required_actions: Vec<String>,
    #[serde(default)]
    pub content_warnings: Vec<String>,
    #[serde(default)]
    pub blocks_deployment: bool,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl IssueDraft {
    pub fn new(
        file_path: impl Into<String>,
        issue_type: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            issue_type: issue_type.into(),
            severity,
            description: description.into(),
            required_actions: Vec::new(),
            content_warnings: Vec::new(),
            blocks_deployment: false,
            notes: Vec::new(),
        }
    }

    pub fn blocking(mut self, blocks: bool) -> Self {
        self.blocks_deployment = blocks;
        self
    }

    pub fn warnings<I, S>(mut self, warnings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.content_warnings = warnings.into_iter().map(Into::into).collect();
        self
    }

    pub fn actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_actions = actions.into_iter().map(Into::into).collect();
        self
    }

    /// Required text fields must be non-blank.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("file path", &self.file_path),
            ("issue type", &self.issue_type),
            ("description", &self.description),
        ] {
            if value.trim().is_empty() {
                return Err(GovernanceError::Validation(format!("{} is required", name)));
            }
        }
        Ok(())
    }
}

/// Split a comma-separated list, trimming entries and dropping empties.
pub fn parse_csv(input: &str) -> Vec<String> {
    dedup_preserving_order(
        input
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
    )
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> IssueDraft {
        IssueDraft::new(
            "programs/fellowship.html",
            "missing-disclaimer",
            Severity::High,
            "stipend amount without disclaimer",
        )
    }

    #[test]
    fn test_id_format_and_sequence() {
        let id = IssueId::format("SC", 7, 3);
        assert_eq!(id.as_str(), "SC-007");
        assert_eq!(id.sequence("SC"), Some(7));
        assert_eq!(id.sequence("CG"), None);
        assert_eq!(IssueId::format("SC", 1234, 3).as_str(), "SC-1234");
        assert!(!IssueId::from("not an id").is_well_formed());
    }

    #[test]
    fn test_severity_order_is_decreasing_urgency() {
        assert!(Severity::Blocker < Severity::High);
        assert!(Severity::Medium < Severity::Low);
        assert_eq!("HIGH".parse::<Severity>().unwrap(), Severity::High);
        assert!("critical".parse::<Severity>().is_err());
    }

    #[test]
    fn test_status_parse_and_terminal() {
        assert_eq!("in_progress".parse::<Status>().unwrap(), Status::InProgress);
        assert!(Status::Resolved.is_terminal());
        assert!(Status::Deferred.is_terminal());
        assert!(!Status::InProgress.is_terminal());
        assert!(!Status::InProgress.can_transition_to(Status::InProgress));
        assert!(!Status::Deferred.can_transition_to(Status::Resolved));
    }

    #[test]
    fn test_new_issue_is_pending_without_audit_fields() {
        let issue = Issue::from_draft(IssueId::from("SC-001"), draft(), Utc::now());
        assert_eq!(issue.status, Status::Pending);
        assert!(issue.assigned_commit.is_none());
        assert!(issue.resolved_at.is_none());
        assert!(issue.resolved_by.is_none());
        assert!(issue.audit_fields_consistent());
    }

    #[test]
    fn test_serializes_camel_case_with_explicit_nulls() {
        let issue = Issue::from_draft(IssueId::from("SC-001"), draft(), Utc::now());
        let line = serde_json::to_string(&issue).unwrap();
        assert!(line.contains("\"filePath\":\"programs/fellowship.html\""));
        assert!(line.contains("\"assignedCommit\":null"));
        assert!(line.contains("\"resolvedAt\":null"));
        assert!(line.contains("\"status\":\"pending\""));
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_draft_validation() {
        assert!(draft().validate().is_ok());
        let mut blank = draft();
        blank.description = "   ".into();
        assert!(matches!(
            blank.validate(),
            Err(GovernanceError::Validation(_))
        ));
    }

    #[test]
    fn test_parse_csv_dedups() {
        assert_eq!(
            parse_csv("funding-amounts, immigration,,funding-amounts "),
            vec!["funding-amounts".to_string(), "immigration".to_string()]
        );
        assert!(parse_csv("").is_empty());
    }
}
