//! Rule matching over a single content string.

use regex::Regex;

use crate::rules::{Rule, RuleSet};

use super::suppress::{find_covering, parse_suppressions};
use super::{Candidate, Detection, SuppressedRule};

const EXCERPT_CHARS: usize = 80;

/// Pre-compiled rule with metadata.
struct CompiledRule {
    regex: Regex,
    rule: Rule,
}

/// A rule set ready for matching. Compile once, reuse for every file.
pub struct CompiledRules {
    rules: Vec<CompiledRule>,
}

impl CompiledRules {
    /// Compile every rule, in order.
    pub fn compile(rules: &RuleSet) -> anyhow::Result<Self> {
        let rules = rules
            .rules
            .iter()
            .map(|r| {
                let regex = Regex::new(&r.matcher.to_regex_source())
                    .map_err(|e| anyhow::anyhow!("compiling rule {:?}: {}", r.name, e))?;
                Ok(CompiledRule {
                    regex,
                    rule: r.clone(),
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|c| c.rule.name.as_str())
    }
}

/// Apply every rule to `content`, producing at most one candidate per rule.
///
/// Never touches the ledger; the caller decides what to record.
pub fn detect(content: &str, file_path: &str, rules: &CompiledRules) -> Detection {
    let mut result = Detection::new();
    if content.trim().is_empty() {
        return result;
    }

    let lines = LineIndex::new(content);
    let suppressions = parse_suppressions(content);

    for compiled in &rules.rules {
        let name = compiled.rule.name.as_str();
        let mut active = 0usize;
        let mut first: Option<(usize, &str)> = None;
        let mut silenced = 0usize;
        let mut silenced_by = None;

        for mat in compiled.regex.find_iter(content) {
            let line = lines.line_of(mat.start());
            if let Some(s) = find_covering(&suppressions, name, line) {
                silenced += 1;
                silenced_by.get_or_insert_with(|| s.clone());
                continue;
            }
            active += 1;
            first.get_or_insert((line, mat.as_str()));
        }

        if let Some((line, text)) = first {
            let rule = &compiled.rule;
            result.candidates.push(Candidate {
                rule: rule.name.clone(),
                file_path: file_path.to_string(),
                line,
                match_count: active,
                excerpt: excerpt(text),
                issue_type: rule.issue_type.clone(),
                severity: rule.severity,
                content_warnings: rule.warnings.clone(),
                blocks_deployment: rule.blocks_deployment,
                description: rule
                    .description
                    .clone()
                    .unwrap_or_else(|| format!("content matched rule {}", rule.name)),
                required_actions: rule.required_actions.clone(),
            });
        } else if let Some(suppression) = silenced_by {
            result.suppressed.push(SuppressedRule {
                rule: name.to_string(),
                file_path: file_path.to_string(),
                match_count: silenced,
                suppression,
            });
        }
    }

    result
}

/// Collapse whitespace and cap the length of a matched snippet.
fn excerpt(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= EXCERPT_CHARS {
        return collapsed;
    }
    let truncated: String = collapsed.chars().take(EXCERPT_CHARS).collect();
    format!("{}...", truncated)
}

/// Byte offset to 1-based line number.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(content: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(content.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn line_of(&self, offset: usize) -> usize {
        self.starts.partition_point(|&s| s <= offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::Severity;
    use crate::rules::Matcher;

    fn rules() -> CompiledRules {
        CompiledRules::compile(&RuleSet::builtin()).unwrap()
    }

    fn single(name: &str, matcher: Matcher) -> CompiledRules {
        let set = RuleSet {
            rules: vec![Rule {
                name: name.into(),
                matcher,
                issue_type: "test-type".into(),
                severity: Severity::Low,
                warnings: vec!["tag".into()],
                blocks_deployment: false,
                description: None,
                required_actions: vec![],
            }],
            ..Default::default()
        };
        CompiledRules::compile(&set).unwrap()
    }

    #[test]
    fn test_empty_content_yields_nothing() {
        let result = detect("", "index.html", &rules());
        assert!(result.candidates.is_empty());
        let result = detect("   \n\t", "index.html", &rules());
        assert!(result.is_clean());
    }

    #[test]
    fn test_clean_content_yields_nothing() {
        let content = "<h1>About the program</h1><p>Apply by March.</p>";
        assert!(detect(content, "about.html", &rules()).is_clean());
    }

    #[test]
    fn test_stipend_deduplicated_per_rule() {
        let content = "<p>Fellows receive a $2,500 monthly stipend.</p>\n\
                       <p>Summer fellows receive a $1,000 stipend as well.</p>";
        let result = detect(content, "fellowship.html", &rules());
        let stipend: Vec<_> = result
            .candidates
            .iter()
            .filter(|c| c.rule == "stipend-amount")
            .collect();
        assert_eq!(stipend.len(), 1);
        assert_eq!(stipend[0].match_count, 2);
        assert_eq!(stipend[0].line, 1);
        assert_eq!(stipend[0].severity, Severity::High);
        assert!(stipend[0].blocks_deployment);
        assert_eq!(stipend[0].content_warnings, vec!["funding-amounts"]);
    }

    #[test]
    fn test_candidates_follow_rule_order() {
        let content = "We guarantee a job. Ranked #1 by Example Weekly. Visa sponsorship available.";
        let result = detect(content, "home.html", &rules());
        let names: Vec<_> = result.candidates.iter().map(|c| c.rule.as_str()).collect();
        assert_eq!(
            names,
            vec!["immigration-status", "guaranteed-outcome", "ranking-claim"]
        );
    }

    #[test]
    fn test_line_numbers() {
        let c = single(
            "kw",
            Matcher::Keywords {
                any: vec!["green card".into()],
            },
        );
        let result = detect("a\nb\nour Green  Card pathway\n", "x.md", &c);
        assert_eq!(result.candidates[0].line, 3);
        assert_eq!(result.candidates[0].excerpt, "Green Card");
    }

    #[test]
    fn test_next_line_suppression() {
        let c = single(
            "kw",
            Matcher::Keywords {
                any: vec!["work permit".into()],
            },
        );
        let content = "<!-- contentgate:ignore-next-line kw - reviewed -->\nwork permit info\n";
        let result = detect(content, "x.html", &c);
        assert!(result.candidates.is_empty());
        assert_eq!(result.suppressed.len(), 1);
        assert_eq!(result.suppressed[0].suppression.reason, "reviewed");
    }

    #[test]
    fn test_partial_suppression_still_reports() {
        let c = single(
            "kw",
            Matcher::Keywords {
                any: vec!["work permit".into()],
            },
        );
        let content = "work permit <!-- contentgate:ignore kw -->\nwork permit again\n";
        let result = detect(content, "x.html", &c);
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].line, 2);
        assert_eq!(result.candidates[0].match_count, 1);
        assert!(result.suppressed.is_empty());
    }

    #[test]
    fn test_case_sensitive_regex() {
        let c = single(
            "acronym",
            Matcher::Regex {
                pattern: r"\bOPT\b".into(),
                case_insensitive: false,
            },
        );
        assert!(detect("opt in to emails", "x.html", &c).is_clean());
        assert!(!detect("OPT eligibility", "x.html", &c).is_clean());
    }

    #[test]
    fn test_excerpt_truncates() {
        let long = "word ".repeat(50);
        let e = excerpt(&long);
        assert!(e.ends_with("..."));
        assert_eq!(e.chars().count(), EXCERPT_CHARS + 3);
    }

    #[test]
    fn test_candidate_to_draft() {
        let result = detect(
            "A $500 stipend and a $700 stipend.",
            "p.html",
            &rules(),
        );
        let draft = result.candidates[0].to_draft();
        assert_eq!(draft.file_path, "p.html");
        assert_eq!(draft.issue_type, "missing-disclaimer");
        assert!(draft.description.contains("2 matches"));
        assert!(draft.blocks_deployment);
        assert!(!draft.required_actions.is_empty());
    }
}
