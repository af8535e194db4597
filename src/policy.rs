//! Policy Module
//!
//! Immutable TTL and invalidation tables, loaded once at startup.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::pattern::KeyPattern;

/// TTL applied when no rule matches.
pub const DEFAULT_TTL_SECS: u64 = 300;

// == TTL Rule ==
/// One `(pattern, duration)` pair of the TTL table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlRule {
    /// Rule name, for logs
    pub name: String,
    /// Substring selecting the keys this rule covers
    pub pattern: KeyPattern,
    /// TTL in seconds
    pub ttl: u64,
}

impl TtlRule {
    pub fn new(name: impl Into<String>, pattern: impl Into<KeyPattern>, ttl: u64) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            ttl,
        }
    }
}

// == TTL Policy ==
/// Ordered TTL table. The first rule whose fragment occurs in the key wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlPolicy {
    rules: Vec<TtlRule>,
    default_ttl: u64,
}

impl TtlPolicy {
    pub fn new(rules: Vec<TtlRule>, default_ttl: u64) -> Self {
        Self { rules, default_ttl }
    }

    /// Resolves the TTL for a key.
    pub fn resolve(&self, key: &str) -> u64 {
        self.matching_rule(key)
            .map(|rule| rule.ttl)
            .unwrap_or(self.default_ttl)
    }

    /// Returns the rule that decides a key's TTL, if any.
    pub fn matching_rule(&self, key: &str) -> Option<&TtlRule> {
        self.rules.iter().find(|rule| rule.pattern.matches(key))
    }

    pub fn rules(&self) -> &[TtlRule] {
        &self.rules
    }

    pub fn default_ttl(&self) -> u64 {
        self.default_ttl
    }

    pub fn with_default_ttl(mut self, default_ttl: u64) -> Self {
        self.default_ttl = default_ttl;
        self
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::new(
            vec![
                TtlRule::new("session_data", "session_", 1800),
                TtlRule::new("user_data", "user_", 3600),
                TtlRule::new("project_data", "project_", 3600),
                TtlRule::new("bug_stats", "bug_stats", 120),
                TtlRule::new("bug_detail", "bug_detail_", 600),
                TtlRule::new("bug_list", "bugs_list_", 300),
                TtlRule::new("chat_messages", "chat_", 60),
                TtlRule::new("static_data", "static_", 86_400),
            ],
            DEFAULT_TTL_SECS,
        )
    }
}

// == Invalidation Rules ==
/// `event name -> patterns to purge`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvalidationRules {
    rules: HashMap<String, Vec<KeyPattern>>,
}

impl InvalidationRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the patterns for an event.
    pub fn with_event<I, P>(mut self, event: impl Into<String>, patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<KeyPattern>,
    {
        self.rules
            .insert(event.into(), patterns.into_iter().map(Into::into).collect());
        self
    }

    /// Patterns registered for an event.
    pub fn patterns_for(&self, event: &str) -> Result<&[KeyPattern]> {
        self.rules
            .get(event)
            .map(Vec::as_slice)
            .ok_or_else(|| CacheError::UnknownEvent(event.to_string()))
    }

    /// Registered event names, sorted.
    pub fn events(&self) -> Vec<&str> {
        let mut events: Vec<&str> = self.rules.keys().map(String::as_str).collect();
        events.sort_unstable();
        events
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The bug tracker's standard event table.
    pub fn bug_tracker_defaults() -> Self {
        Self::new()
            .with_event("bug_created", ["bugs_list_", "bug_stats", "project_stats_"])
            .with_event("bug_updated", ["bug_detail_", "bugs_list_", "bug_stats"])
            .with_event(
                "bug_deleted",
                ["bug_detail_", "bugs_list_", "bug_stats", "project_stats_"],
            )
            .with_event("comment_added", ["bug_detail_", "bug_comments_"])
            .with_event("user_updated", ["user_"])
            .with_event("project_updated", ["project_", "bugs_list_"])
            .with_event("message_sent", ["chat_"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_key_resolves_user_data_ttl() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.resolve("user_42"), 3600);
        assert_eq!(policy.matching_rule("user_42").unwrap().name, "user_data");
    }

    #[test]
    fn test_unmapped_key_uses_default() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.resolve("zzz_unmapped"), DEFAULT_TTL_SECS);
        assert!(policy.matching_rule("zzz_unmapped").is_none());
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let policy = TtlPolicy::new(
            vec![TtlRule::new("short", "list", 10), TtlRule::new("long", "bugs_", 99)],
            1,
        );
        assert_eq!(policy.resolve("bugs_list_p1"), 10);

        let reversed = TtlPolicy::new(
            vec![TtlRule::new("long", "bugs_", 99), TtlRule::new("short", "list", 10)],
            1,
        );
        assert_eq!(reversed.resolve("bugs_list_p1"), 99);
    }

    #[test]
    fn test_default_ttl_override() {
        let policy = TtlPolicy::default().with_default_ttl(45);
        assert_eq!(policy.resolve("nothing_here"), 45);
    }

    #[test]
    fn test_unknown_event_is_an_error() {
        let rules = InvalidationRules::bug_tracker_defaults();
        assert!(matches!(
            rules.patterns_for("bug_exploded"),
            Err(CacheError::UnknownEvent(_))
        ));
    }

    #[test]
    fn test_bug_updated_patterns() {
        let rules = InvalidationRules::bug_tracker_defaults();
        let patterns: Vec<&str> = rules
            .patterns_for("bug_updated")
            .unwrap()
            .iter()
            .map(KeyPattern::fragment)
            .collect();
        assert_eq!(patterns, vec!["bug_detail_", "bugs_list_", "bug_stats"]);
    }

    #[test]
    fn test_rules_deserialize_from_json_map() {
        let rules: InvalidationRules =
            serde_json::from_str(r#"{"user_updated":["user_","*profile_*"]}"#).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules.patterns_for("user_updated").unwrap()[1].glob(), "*profile_*");
    }
}
