//! Issue lifecycle state machine.
//!
//! ```text
//! pending ──► in-progress ──► resolved
//!    │             │
//!    ├─────────────┴────────► deferred
//!    └──────────────────────► resolved
//! ```
//!
//! Every transition runs inside one [`Ledger::update`] call, so a rejected
//! transition leaves the record exactly as it was.

use chrono::Utc;

use crate::error::{GovernanceError, Result};
use crate::issue::{Issue, IssueId, Status};
use crate::store::Ledger;

/// Fields that must accompany a resolution.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub commit: Option<String>,
    pub resolved_by: Option<String>,
    pub note: Option<String>,
}

/// Drives status changes against a ledger.
pub struct Lifecycle<'a> {
    ledger: &'a Ledger,
}

impl<'a> Lifecycle<'a> {
    pub fn new(ledger: &'a Ledger) -> Self {
        Self { ledger }
    }

    /// pending → in-progress.
    pub fn start(&self, id: &IssueId, note: Option<&str>) -> Result<Issue> {
        let note = optional_text(note);
        let issue = self.ledger.update(id, |issue| {
            check_transition(issue, Status::InProgress)?;
            issue.status = Status::InProgress;
            if let Some(n) = note {
                issue.notes.push(n);
            }
            Ok(())
        })?;
        tracing::info!(id = %id, "remediation started");
        Ok(issue)
    }

    /// pending|in-progress → resolved. Commit and resolver are both required.
    pub fn resolve(&self, id: &IssueId, resolution: Resolution) -> Result<Issue> {
        let commit = optional_text(resolution.commit.as_deref());
        let resolved_by = optional_text(resolution.resolved_by.as_deref());
        let note = optional_text(resolution.note.as_deref());

        let issue = self.ledger.update(id, |issue| {
            check_transition(issue, Status::Resolved)?;
            let commit = commit.ok_or_else(|| {
                GovernanceError::Validation(format!(
                    "resolving {} requires a commit reference",
                    issue.id
                ))
            })?;
            let resolved_by = resolved_by.ok_or_else(|| {
                GovernanceError::Validation(format!("resolving {} requires a resolver", issue.id))
            })?;

            issue.status = Status::Resolved;
            issue.assigned_commit = Some(commit);
            issue.resolved_by = Some(resolved_by);
            issue.resolved_at = Some(Utc::now());
            if let Some(n) = note {
                issue.notes.push(n);
            }
            Ok(())
        })?;
        tracing::info!(
            id = %id,
            commit = issue.assigned_commit.as_deref().unwrap_or_default(),
            "issue resolved"
        );
        Ok(issue)
    }

    /// pending|in-progress → deferred. The justification becomes a note.
    pub fn defer(&self, id: &IssueId, justification: &str) -> Result<Issue> {
        let justification = optional_text(Some(justification));
        let issue = self.ledger.update(id, |issue| {
            check_transition(issue, Status::Deferred)?;
            let reason = justification.ok_or_else(|| {
                GovernanceError::Validation(format!(
                    "deferring {} requires a justification",
                    issue.id
                ))
            })?;
            issue.status = Status::Deferred;
            issue.notes.push(reason);
            Ok(())
        })?;
        if issue.blocks_deployment {
            tracing::warn!(id = %id, "deferred issue still blocks deployment");
        }
        Ok(issue)
    }

    /// Append a note in any state, terminal ones included.
    pub fn annotate(&self, id: &IssueId, note: &str) -> Result<Issue> {
        let note = optional_text(Some(note))
            .ok_or_else(|| GovernanceError::Validation("note text is empty".to_string()))?;
        self.ledger.update(id, |issue| {
            issue.notes.push(note);
            Ok(())
        })
    }
}

fn check_transition(issue: &Issue, next: Status) -> Result<()> {
    if issue.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(GovernanceError::InvalidTransition {
            id: issue.id.clone(),
            from: issue.status,
            to: next,
        })
    }
}

/// Trimmed text, or `None` when blank.
fn optional_text(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
