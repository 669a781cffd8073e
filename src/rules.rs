//! Rule-set schema for the detection engine.
//!
//! A rule set is a versioned YAML table. Each rule names a matcher and the
//! issue it raises; adding a sensitive-topic category means adding a rule, not
//! touching the matching code.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::issue::Severity;

/// Rule-set schema versions this build understands.
pub const SUPPORTED_VERSIONS: &[&str] = &["1", "1.0"];

/// Top-level rule set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RuleSet {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// File extensions `scan` reads (without the dot)
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Glob patterns for paths to skip during `scan` (e.g., "**/drafts/**")
    #[serde(default)]
    pub excluded_paths: Vec<String>,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

fn default_version() -> String {
    "1".to_string()
}

fn default_extensions() -> Vec<String> {
    ["html", "htm", "md", "markdown", "txt"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            version: default_version(),
            name: String::new(),
            description: None,
            extensions: default_extensions(),
            excluded_paths: Vec::new(),
            rules: Vec::new(),
        }
    }
}

impl RuleSet {
    /// Parse a rule set from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::parse_str(&content)
    }

    pub fn parse_str(content: &str) -> anyhow::Result<Self> {
        let rules: RuleSet = serde_yaml::from_str(content)?;
        Ok(rules)
    }

    /// The rule set compiled into the binary, used when none is configured.
    pub fn builtin() -> Self {
        Self::parse_str(BUILTIN_RULES).expect("embedded default rule set parses")
    }

    /// Check if a path should be skipped based on excluded_paths patterns.
    pub fn is_path_excluded(&self, path: &Path) -> bool {
        if self.excluded_paths.is_empty() {
            return false;
        }

        let path_str = path.to_string_lossy();
        self.excluded_paths.iter().any(|pattern| {
            globset::Glob::new(pattern)
                .map(|g| g.compile_matcher().is_match(&*path_str))
                .unwrap_or(false)
        })
    }

    /// Whether `scan` should read a file with this extension.
    pub fn accepts_extension(&self, path: &Path) -> bool {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// One named detection rule.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Rule {
    pub name: String,
    pub matcher: Matcher,
    pub issue_type: String,
    pub severity: Severity,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub blocks_deployment: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required_actions: Vec<String>,
}

/// How a rule recognises sensitive content.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Matcher {
    /// A regular expression, case-insensitive unless told otherwise.
    Regex {
        pattern: String,
        #[serde(default = "default_true")]
        case_insensitive: bool,
    },
    /// Any of a list of literal phrases, matched case-insensitively on word boundaries.
    Keywords { any: Vec<String> },
}

fn default_true() -> bool {
    true
}

impl Matcher {
    /// The regex source this matcher compiles to.
    pub fn to_regex_source(&self) -> String {
        match self {
            Matcher::Regex {
                pattern,
                case_insensitive,
            } => {
                if *case_insensitive {
                    format!("(?i){}", pattern)
                } else {
                    pattern.clone()
                }
            }
            Matcher::Keywords { any } => {
                let alternatives: Vec<String> = any.iter().map(|k| keyword_source(k)).collect();
                format!("(?i)(?:{})", alternatives.join("|"))
            }
        }
    }
}

/// Escaped keyword, anchored by `\b` only on ends that are word characters,
/// so keywords like `#1` or `100%` still match.
fn keyword_source(keyword: &str) -> String {
    let keyword = keyword.trim();
    let body = regex::escape(keyword).replace(' ', r"\s+");
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let lead = if keyword.starts_with(is_word) { r"\b" } else { "" };
    let trail = if keyword.ends_with(is_word) { r"\b" } else { "" };
    format!("{lead}{body}{trail}")
}

/// Validate a rule set for correctness.
pub fn validate(rules: &RuleSet) -> anyhow::Result<()> {
    if !SUPPORTED_VERSIONS.contains(&rules.version.as_str()) {
        anyhow::bail!(
            "unsupported rule set version {:?}, expected one of {}",
            rules.version,
            SUPPORTED_VERSIONS.join(", ")
        );
    }

    let mut seen = HashSet::new();
    for rule in &rules.rules {
        if rule.name.trim().is_empty() {
            anyhow::bail!("rule with empty name");
        }
        if !seen.insert(rule.name.as_str()) {
            anyhow::bail!("duplicate rule name {:?}", rule.name);
        }
        if rule.issue_type.trim().is_empty() {
            anyhow::bail!("rule {:?} has an empty issue_type", rule.name);
        }
        if let Matcher::Keywords { any } = &rule.matcher {
            if any.iter().all(|k| k.trim().is_empty()) {
                anyhow::bail!("rule {:?} has no keywords", rule.name);
            }
        }
        regex::Regex::new(&rule.matcher.to_regex_source())
            .map_err(|e| anyhow::anyhow!("invalid pattern in rule {:?}: {}", rule.name, e))?;
    }

    for pattern in &rules.excluded_paths {
        globset::Glob::new(pattern)
            .map_err(|e| anyhow::anyhow!("invalid excluded_paths pattern {:?}: {}", pattern, e))?;
    }

    Ok(())
}

const BUILTIN_RULES: &str = include_str!("templates/default.yaml");

/// A rule-set template available to `rules init`.
pub struct Template {
    pub name: &'static str,
    pub description: &'static str,
    pub content: &'static str,
}

/// All available templates.
pub static TEMPLATES: &[Template] = &[
    Template {
        name: "default",
        description: "Funding, immigration, career-outcome and ranking claims",
        content: BUILTIN_RULES,
    },
    Template {
        name: "minimal",
        description: "Funding amounts only - a starting point for custom rules",
        content: include_str!("templates/minimal.yaml"),
    },
];
