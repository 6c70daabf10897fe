//! Eligibility rule set and the `key=value` rule source format.
//!
//! Each line names an operation identifier or a pattern and a value from one
//! of four vocabularies:
//!
//! | Kind              | Values                                                   |
//! |-------------------|----------------------------------------------------------|
//! | enable            | `true`, `on`, `enable`, `1`, `+`                         |
//! | disable           | `false`, `off`, `disable`, `0`, `-`                      |
//! | enable wildcard   | `wildcard`, `all`, `enableAll`, `wildcardOn`, `++`       |
//! | disable wildcard  | `wildcardOff`, `disableAll`, `wildcardDisable`, `disableWildcard`, `--` |
//!
//! Values are case-sensitive. A line without a value enables its key.

use crate::error::RuleError;
use glob::Pattern;
use regex::Regex;
use std::collections::HashSet;
use tracing::{debug, info, warn};

pub use crate::config::PatternSyntax;

const SEPARATOR: char = '=';

const ENABLE: &[&str] = &["true", "on", "enable", "1", "+"];
const DISABLE: &[&str] = &["false", "off", "disable", "0", "-"];
const ENABLE_WILDCARD: &[&str] = &["wildcard", "all", "enableAll", "wildcardOn", "++"];
const DISABLE_WILDCARD: &[&str] = &[
    "wildcardOff",
    "disableAll",
    "wildcardDisable",
    "disableWildcard",
    "--",
];

/// Which of the four rule collections a line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Allow,
    Deny,
    AllowPattern,
    DenyPattern,
}

impl RuleKind {
    /// Classify a rule value. Matching is case-sensitive.
    pub fn from_value(value: &str) -> Option<Self> {
        if DISABLE.contains(&value) {
            Some(Self::Deny)
        } else if ENABLE.contains(&value) {
            Some(Self::Allow)
        } else if DISABLE_WILDCARD.contains(&value) {
            Some(Self::DenyPattern)
        } else if ENABLE_WILDCARD.contains(&value) {
            Some(Self::AllowPattern)
        } else {
            None
        }
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self, Self::AllowPattern | Self::DenyPattern)
    }
}

/// One successfully parsed rule line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleLine {
    pub key: String,
    pub kind: RuleKind,
}

/// Outcome of parsing a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Rule(RuleLine),
    /// Blank line or comment
    Skip,
}

/// Parse one line of the rule source.
///
/// The line is split on every `=` with trailing empty fields dropped; the
/// first field is the key, the second (if any) the value. Extra fields are
/// ignored.
pub fn parse_rule_line(line: &str) -> Result<ParsedLine, RuleError> {
    if line.trim().is_empty() || line.starts_with('#') || line.starts_with('!') {
        return Ok(ParsedLine::Skip);
    }

    let mut fields: Vec<&str> = line.split(SEPARATOR).collect();
    while fields.len() > 1 && fields.last().is_some_and(|f| f.is_empty()) {
        fields.pop();
    }

    let key = fields[0];
    if key.trim().is_empty() {
        return Err(RuleError::BlankKey);
    }
    let value = fields.get(1).copied().unwrap_or(ENABLE[0]);

    match RuleKind::from_value(value) {
        Some(kind) => Ok(ParsedLine::Rule(RuleLine {
            key: key.to_string(),
            kind,
        })),
        None => Err(RuleError::UnrecognizedValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// A pattern compiled at load time.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    source: String,
    matcher: PatternMatcher,
}

#[derive(Debug, Clone)]
enum PatternMatcher {
    Glob(Pattern),
    Regex(Regex),
}

impl CompiledPattern {
    /// Compile `source` with the given syntax.
    pub fn compile(source: &str, syntax: PatternSyntax) -> Result<Self, RuleError> {
        let invalid = |reason: String| RuleError::InvalidPattern {
            pattern: source.to_string(),
            reason,
        };

        let matcher = match syntax {
            PatternSyntax::Glob => {
                PatternMatcher::Glob(Pattern::new(source).map_err(|e| invalid(e.to_string()))?)
            }
            PatternSyntax::Regex => PatternMatcher::Regex(
                Regex::new(&format!("^(?:{})$", source)).map_err(|e| invalid(e.to_string()))?,
            ),
        };

        Ok(Self {
            source: source.to_string(),
            matcher,
        })
    }

    /// Whether the whole identifier matches.
    pub fn matches(&self, operation: &str) -> bool {
        match &self.matcher {
            PatternMatcher::Glob(p) => p.matches(operation),
            PatternMatcher::Regex(r) => r.is_match(operation),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// The four rule collections governing eligibility.
///
/// Built once per load and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub(crate) allow: HashSet<String>,
    pub(crate) deny: HashSet<String>,
    pub(crate) allow_patterns: Vec<CompiledPattern>,
    pub(crate) deny_patterns: Vec<CompiledPattern>,
}

impl RuleSet {
    /// Empty rule set: nothing is eligible.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a whole rule source. Bad lines and patterns are logged and skipped.
    pub fn parse(source: &str, syntax: PatternSyntax) -> Self {
        let mut rules = Self::default();

        for (index, line) in source.lines().enumerate() {
            let line_no = index + 1;
            match parse_rule_line(line) {
                Ok(ParsedLine::Rule(rule)) => {
                    if let Err(err) = rules.insert(rule, syntax) {
                        warn!(line = line_no, code = err.as_str(), error = %err, "Dropping rule pattern");
                    }
                }
                Ok(ParsedLine::Skip) => {}
                Err(err @ RuleError::UnrecognizedValue { .. }) => {
                    info!(line = line_no, "{}", err);
                }
                Err(err) => {
                    debug!(line = line_no, code = err.as_str(), content = %line, "Line is not processed");
                }
            }
        }

        rules
    }

    fn insert(&mut self, rule: RuleLine, syntax: PatternSyntax) -> Result<(), RuleError> {
        if !rule.kind.is_pattern() {
            if rule.kind == RuleKind::Deny {
                info!(action = %rule.key, "action disabled");
                self.deny.insert(rule.key);
            } else {
                info!(action = %rule.key, "action added");
                self.allow.insert(rule.key);
            }
            return Ok(());
        }

        let pattern = CompiledPattern::compile(&rule.key, syntax)?;
        if rule.kind == RuleKind::DenyPattern {
            info!(pattern = %rule.key, "disable wildcard added");
            push_unique(&mut self.deny_patterns, pattern);
        } else {
            info!(pattern = %rule.key, "wildcard added");
            push_unique(&mut self.allow_patterns, pattern);
        }
        Ok(())
    }

    pub fn allowed(&self) -> &HashSet<String> {
        &self.allow
    }

    pub fn denied(&self) -> &HashSet<String> {
        &self.deny
    }

    pub fn allow_patterns(&self) -> &[CompiledPattern] {
        &self.allow_patterns
    }

    pub fn deny_patterns(&self) -> &[CompiledPattern] {
        &self.deny_patterns
    }

    /// Total number of rules across all four collections.
    pub fn len(&self) -> usize {
        self.allow.len() + self.deny.len() + self.allow_patterns.len() + self.deny_patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn push_unique(patterns: &mut Vec<CompiledPattern>, pattern: CompiledPattern) {
    if !patterns.iter().any(|p| p.source == pattern.source) {
        patterns.push(pattern);
    }
}
