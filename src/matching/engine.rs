//! Rule matching over a snapshot of observed items.
//!
//! Pure functions: no clock, no I/O. The first rule in list order that fits
//! an item wins, so an item yields at most one match.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rules::Rule;

/// One unprocessed entry as seen during a single scan. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedItem {
    pub source_identity: String,
    pub subject: String,
}

impl ObservedItem {
    pub fn new(source_identity: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            source_identity: source_identity.into(),
            subject: subject.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub source_identity: String,
    pub subject: String,
    pub matched_rule: Rule,
    pub observed_at: DateTime<Utc>,
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

fn rule_fits(rule: &Rule, source: &str, subject: &str) -> bool {
    let pattern = normalize(&rule.source_pattern);
    if pattern.is_empty() || !source.contains(&pattern) {
        return false;
    }

    let keyword = normalize(&rule.keyword_pattern);
    keyword.is_empty() || subject.contains(&keyword)
}

/// First rule (in order) that matches `item`, if any. Items without a source
/// identity never match.
pub fn first_matching_rule<'r>(item: &ObservedItem, rules: &'r [Rule]) -> Option<&'r Rule> {
    let source = normalize(&item.source_identity);
    if source.is_empty() {
        return None;
    }
    let subject = item.subject.to_lowercase();

    rules.iter().find(|rule| rule_fits(rule, &source, &subject))
}

/// Matches for a whole scan, in item order. Each match is paired with the
/// index of the item that produced it so callers can map it back to a row.
pub fn find_matches(
    items: &[ObservedItem],
    rules: &[Rule],
    observed_at: DateTime<Utc>,
) -> Vec<(usize, Match)> {
    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            first_matching_rule(item, rules).map(|rule| {
                (
                    index,
                    Match {
                        source_identity: item.source_identity.clone(),
                        subject: item.subject.clone(),
                        matched_rule: rule.clone(),
                        observed_at,
                    },
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn first_rule_wins_even_when_a_later_rule_is_more_specific() {
        let rules = vec![Rule::new("a.com", ""), Rule::new("a.com", "invoice")];
        let items = vec![ObservedItem::new("billing@a.com", "Invoice #1")];

        let matches = find_matches(&items, &rules, at());
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].1.matched_rule, rules[0]);
    }

    #[test]
    fn source_and_keyword_compare_case_insensitively() {
        let rules = vec![Rule::new("UpWork.com", "NEW JOB")];
        let item = ObservedItem::new("Upwork <noreply@upwork.com>", "A new job matches your profile");

        assert_eq!(first_matching_rule(&item, &rules), Some(&rules[0]));
    }

    #[test]
    fn keyword_must_appear_in_subject() {
        let rules = vec![Rule::new("a.com", "invoice")];
        let item = ObservedItem::new("billing@a.com", "Welcome aboard");

        assert!(first_matching_rule(&item, &rules).is_none());
    }

    #[test]
    fn items_without_sender_are_skipped() {
        let rules = vec![Rule::new("a.com", "")];
        let items = vec![ObservedItem::new("", "from a.com"), ObservedItem::new("   ", "x")];

        assert!(find_matches(&items, &rules, at()).is_empty());
    }

    #[test]
    fn rule_without_source_pattern_never_matches() {
        let rules = vec![Rule::new("", "invoice"), Rule::new("  ", "")];
        let item = ObservedItem::new("billing@a.com", "Invoice #1");

        assert!(first_matching_rule(&item, &rules).is_none());
    }

    #[test]
    fn each_item_matches_at_most_once() {
        let rules = vec![Rule::new("a.com", ""), Rule::new("b.com", "")];
        let items = vec![
            ObservedItem::new("x@a.com", "one"),
            ObservedItem::new("y@c.com", "two"),
            ObservedItem::new("z@b.com", "three"),
        ];

        let matches = find_matches(&items, &rules, at());
        let sources: Vec<_> = matches
            .iter()
            .map(|(index, m)| (*index, m.source_identity.as_str()))
            .collect();
        assert_eq!(sources, vec![(0, "x@a.com"), (2, "z@b.com")]);
        assert!(matches.iter().all(|(_, m)| m.observed_at == at()));
    }
}
