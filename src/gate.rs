//! Compliance gate: decides whether a deploy may proceed.
//!
//! The blocking set is every issue flagged `blocksDeployment` that is not
//! resolved. Deferred issues stay in it; only resolution, or having been
//! created non-blocking, takes an issue out.

use serde::{Deserialize, Serialize};

use crate::issue::Issue;
use crate::store::Ledger;

/// Exit codes for the gate.
pub mod exit {
    pub const PASS: i32 = 0;
    pub const BLOCKED: i32 = 1;
    pub const ERROR: i32 = 2;
}

/// Outcome of one gate evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// No unresolved blocking issues
    Pass,
    /// Blocking issues exist but the gate is advisory
    Warn,
    /// Strict mode with blocking issues, or the ledger could not be read
    Fail,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Pass => write!(f, "pass"),
            Verdict::Warn => write!(f, "warn"),
            Verdict::Fail => write!(f, "fail"),
        }
    }
}

/// The gate's decision and the issues behind it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    pub strict: bool,
    pub verdict: Verdict,
    /// Issues evaluated
    pub total: usize,
    pub blocking: Vec<Issue>,
    /// Set when the ledger could not be read; the verdict is then `Fail`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GateResult {
    pub fn passed(&self) -> bool {
        self.verdict != Verdict::Fail
    }

    /// Process exit code for this result.
    pub fn exit_code(&self) -> i32 {
        match (self.verdict, &self.error) {
            (Verdict::Fail, Some(_)) => exit::ERROR,
            (Verdict::Fail, None) => exit::BLOCKED,
            _ => exit::PASS,
        }
    }
}

/// Evaluate a set of issues.
pub fn evaluate(issues: &[Issue], strict: bool) -> GateResult {
    let blocking: Vec<Issue> = issues.iter().filter(|i| i.is_blocking()).cloned().collect();

    let verdict = match (blocking.is_empty(), strict) {
        (true, _) => Verdict::Pass,
        (false, false) => Verdict::Warn,
        (false, true) => Verdict::Fail,
    };

    GateResult {
        strict,
        verdict,
        total: issues.len(),
        blocking,
        error: None,
    }
}

/// Evaluate the current ledger. Fail-closed: any read error is a `Fail`.
pub fn evaluate_ledger(ledger: &Ledger, strict: bool) -> GateResult {
    match ledger.list_all() {
        Ok(snapshot) => {
            let result = evaluate(snapshot.as_slice(), strict);
            tracing::info!(
                verdict = %result.verdict,
                strict,
                blocking = result.blocking.len(),
                total = result.total,
                "gate evaluated"
            );
            result
        }
        Err(e) => {
            tracing::error!(error = %e, kind = e.kind(), "gate could not read ledger");
            GateResult {
                strict,
                verdict: Verdict::Fail,
                total: 0,
                blocking: Vec::new(),
                error: Some(format!("{} ({})", e, e.kind())),
            }
        }
    }
}
