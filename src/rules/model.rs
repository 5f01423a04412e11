//! Rule data model.
//!
//! Rules travel over the wire as `{ "email": ..., "keyword": ... }`, the shape
//! the rule editor has always produced. `sourcePattern` / `keywordPattern`
//! are accepted as input aliases.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email regex"));

static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,}$")
        .expect("static domain regex")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    #[error("enter an email address or domain")]
    EmptyPattern,

    #[error("'{0}' is not a valid email address or domain")]
    InvalidPattern(String),

    #[error("a rule for '{pattern}' with keyword '{keyword}' already exists")]
    Duplicate { pattern: String, keyword: String },

    #[error("rule index {index} is out of range ({len} rules)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// A single matching rule: sender/domain substring plus optional subject keyword.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(rename = "email", alias = "sourcePattern", default)]
    pub source_pattern: String,
    #[serde(rename = "keyword", alias = "keywordPattern", default)]
    pub keyword_pattern: String,
}

impl Rule {
    pub fn new(source_pattern: impl Into<String>, keyword_pattern: impl Into<String>) -> Self {
        Self {
            source_pattern: source_pattern.into(),
            keyword_pattern: keyword_pattern.into(),
        }
    }

    /// Rules without a source pattern are kept but can never match.
    pub fn is_matchable(&self) -> bool {
        !self.source_pattern.trim().is_empty()
    }

    /// Same source (case-insensitive) and same keyword (exact, as entered).
    pub fn is_duplicate_of(&self, other: &Rule) -> bool {
        self.source_pattern.to_lowercase() == other.source_pattern.to_lowercase()
            && self.keyword_pattern == other.keyword_pattern
    }

    /// Lenient conversion for entries of an untyped rule list. Anything that
    /// is not an object with a string `email` becomes an unmatchable rule.
    fn from_value_lenient(value: Value) -> Self {
        let Value::Object(map) = value else {
            return Self::default();
        };
        let field = |primary: &str, alias: &str| {
            map.get(primary)
                .or_else(|| map.get(alias))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            source_pattern: field("email", "sourcePattern"),
            keyword_pattern: field("keyword", "keywordPattern"),
        }
    }
}

/// Editor input for a new rule. Fields are trimmed and validated by
/// [`RuleSet::add`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleInput {
    pub email: String,
    #[serde(default)]
    pub keyword: Option<String>,
}

impl RuleInput {
    pub fn into_rule(self) -> Result<Rule, RuleError> {
        let source = self.email.trim().to_string();
        let keyword = self.keyword.unwrap_or_default().trim().to_string();

        if source.is_empty() {
            return Err(RuleError::EmptyPattern);
        }
        if !is_valid_email_or_domain(&source) {
            return Err(RuleError::InvalidPattern(source));
        }

        Ok(Rule::new(source, keyword))
    }
}

pub fn is_valid_email_or_domain(candidate: &str) -> bool {
    EMAIL_RE.is_match(candidate) || DOMAIN_RE.is_match(candidate)
}

/// Ordered rule list. Order is significant: the first matching rule wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Shape coercion for untyped input: anything but a JSON array yields
    /// an empty set; array entries are converted leniently.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Array(items) => Self {
                rules: items.into_iter().map(Rule::from_value_lenient).collect(),
            },
            _ => Self::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    pub fn as_slice(&self) -> &[Rule] {
        &self.rules
    }

    pub fn contains_duplicate_of(&self, rule: &Rule) -> bool {
        self.rules.iter().any(|existing| existing.is_duplicate_of(rule))
    }

    /// Validates and appends. Duplicates are rejected, never merged.
    pub fn add(&mut self, input: RuleInput) -> Result<&Rule, RuleError> {
        let rule = input.into_rule()?;
        if self.contains_duplicate_of(&rule) {
            return Err(RuleError::Duplicate {
                pattern: rule.source_pattern,
                keyword: rule.keyword_pattern,
            });
        }
        self.rules.push(rule);
        Ok(&self.rules[self.rules.len() - 1])
    }

    pub fn remove(&mut self, index: usize) -> Result<Rule, RuleError> {
        if index >= self.rules.len() {
            return Err(RuleError::IndexOutOfRange {
                index,
                len: self.rules.len(),
            });
        }
        Ok(self.rules.remove(index))
    }
}

impl From<Vec<Rule>> for RuleSet {
    fn from(rules: Vec<Rule>) -> Self {
        Self::new(rules)
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
