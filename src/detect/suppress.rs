//! Inline suppression of rules via comments in content.
//!
//! Supports directives like:
//! - `<!-- contentgate:ignore <rule> - <reason> -->`
//! - `<!-- contentgate:ignore-next-line <rule> - <reason> -->`
//! - `# contentgate:ignore-file * - <reason>`
//!
//! Any comment syntax works; only the directive text is parsed.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"contentgate:(ignore(?:-file|-next-line)?)\s+([\w*-]+)(?:\s+-\s+(.*?))?\s*(?:-->|\*/)?\s*$",
    )
    .expect("static directive pattern")
});

/// How a suppression applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuppressionType {
    /// Applies to the same line
    Line,
    /// Applies to the next line
    NextLine,
    /// Applies to the entire file
    File,
}

/// An inline suppression directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suppression {
    /// Rule name, or "*" for all rules
    pub rule: String,
    pub reason: String,
    /// Line of the directive (1-based)
    pub line: usize,
    pub suppression_type: SuppressionType,
}

impl Suppression {
    /// Whether this directive silences `rule` at `line`.
    pub fn covers(&self, rule: &str, line: usize) -> bool {
        if self.rule != "*" && self.rule != rule {
            return false;
        }
        match self.suppression_type {
            SuppressionType::File => true,
            SuppressionType::Line => line == self.line,
            SuppressionType::NextLine => line == self.line + 1,
        }
    }
}

/// Extract all suppression directives from content.
pub fn parse_suppressions(content: &str) -> Vec<Suppression> {
    let mut out = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if !line.contains("contentgate:") {
            continue;
        }
        if let Some(caps) = DIRECTIVE.captures(line) {
            let suppression_type = match &caps[1] {
                "ignore-file" => SuppressionType::File,
                "ignore-next-line" => SuppressionType::NextLine,
                _ => SuppressionType::Line,
            };
            out.push(Suppression {
                rule: caps[2].to_string(),
                reason: caps
                    .get(3)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default(),
                line: idx + 1,
                suppression_type,
            });
        }
    }
    out
}

/// First suppression covering `rule` at `line`, if any.
pub fn find_covering<'a>(
    suppressions: &'a [Suppression],
    rule: &str,
    line: usize,
) -> Option<&'a Suppression> {
    suppressions.iter().find(|s| s.covers(rule, line))
}
