//! Key Pattern Module
//!
//! One configured pattern, two match languages: the remote tier receives a
//! Redis glob, the memory tier and TTL rules test the same selection locally.

use std::fmt;

use globset::{GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

const GLOB_META: [char; 3] = ['*', '?', '['];

#[derive(Debug, Clone)]
enum LocalMatch {
    /// Plain containment of the fragment
    Contains,
    /// Interior glob syntax, matched like Redis would
    Glob(GlobMatcher),
    /// Glob that does not compile; selects nothing
    Invalid,
}

// == Key Pattern ==
/// A key-matching expression usable against both tiers.
///
/// `bug_detail_` and `*bug_detail_*` are equivalent: both select every key
/// containing `bug_detail_`. A source with interior glob syntax (`user_*_avatar`)
/// is forwarded verbatim to the remote tier and compiled into the same glob
/// for local matching, so both tiers select the same keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct KeyPattern {
    source: String,
    fragment: String,
    glob: String,
    local: LocalMatch,
}

impl KeyPattern {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let fragment = source.trim_matches('*').to_string();
        let glob = if source.contains(GLOB_META) {
            source.clone()
        } else {
            format!("*{}*", escape_glob(&fragment))
        };
        let local = if fragment.contains(GLOB_META) {
            compile_glob(&glob).map_or(LocalMatch::Invalid, LocalMatch::Glob)
        } else {
            LocalMatch::Contains
        };

        Self {
            source,
            fragment,
            glob,
            local,
        }
    }

    /// Pattern as written in configuration.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Source with `*` trimmed from both ends.
    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    /// Glob forwarded to the remote store's `KEYS` command.
    pub fn glob(&self) -> &str {
        &self.glob
    }

    /// True when the pattern selects nothing.
    pub fn is_empty(&self) -> bool {
        self.fragment.is_empty()
    }

    /// Local test used by TTL rules and the memory tier. Agrees with the
    /// remote glob.
    pub fn matches(&self, key: &str) -> bool {
        if self.fragment.is_empty() {
            return false;
        }
        match &self.local {
            LocalMatch::Contains => key.contains(self.fragment.as_str()),
            LocalMatch::Glob(matcher) => matcher.is_match(key),
            LocalMatch::Invalid => false,
        }
    }
}

impl PartialEq for KeyPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for KeyPattern {}

impl From<String> for KeyPattern {
    fn from(source: String) -> Self {
        Self::new(source)
    }
}

impl From<&str> for KeyPattern {
    fn from(source: &str) -> Self {
        Self::new(source)
    }
}

impl From<KeyPattern> for String {
    fn from(pattern: KeyPattern) -> Self {
        pattern.source
    }
}

impl fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Compiles a Redis-style glob; `*` and `?` also cross `/`.
pub(crate) fn compile_glob(glob: &str) -> Result<GlobMatcher> {
    GlobBuilder::new(glob)
        .literal_separator(false)
        .backslash_escape(true)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|e| CacheError::InvalidPattern(format!("{}: {}", glob, e)))
}

fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_fragment_becomes_contains_glob() {
        let pattern = KeyPattern::new("bug_detail_");
        assert_eq!(pattern.fragment(), "bug_detail_");
        assert_eq!(pattern.glob(), "*bug_detail_*");
    }

    #[test]
    fn test_wrapped_glob_is_forwarded_verbatim() {
        let pattern = KeyPattern::new("*bugs_list_*");
        assert_eq!(pattern.fragment(), "bugs_list_");
        assert_eq!(pattern.glob(), "*bugs_list_*");
        assert!(pattern.matches("bugs_list_p1_2"));
    }

    #[test]
    fn test_interior_glob_matches_like_remote() {
        let pattern = KeyPattern::new("user_*_avatar");
        assert_eq!(pattern.glob(), "user_*_avatar");
        assert!(pattern.matches("user_42_avatar"));
        assert!(!pattern.matches("user_42_profile"));
        assert!(!pattern.matches("old_user_42_avatar"));
    }

    #[test]
    fn test_single_char_glob_matches_locally() {
        let pattern = KeyPattern::new("bug_detail_?");
        assert!(pattern.matches("bug_detail_5"));
        assert!(!pattern.matches("bug_detail_55"));
    }

    #[test]
    fn test_malformed_glob_matches_nothing() {
        let pattern = KeyPattern::new("user_[42");
        assert!(!pattern.matches("user_[42"));
        assert!(!pattern.matches("user_4"));
    }

    #[test]
    fn test_equality_follows_source() {
        assert_eq!(KeyPattern::new("user_*_avatar"), KeyPattern::from("user_*_avatar"));
        assert_ne!(KeyPattern::new("user_"), KeyPattern::new("*user_*"));
    }

    #[test]
    fn test_fragment_with_bracket_is_escaped() {
        let pattern = KeyPattern::new("tag]x");
        assert_eq!(pattern.glob(), "*tag\\]x*");
    }

    #[test]
    fn test_empty_pattern_matches_nothing() {
        let pattern = KeyPattern::new("**");
        assert!(pattern.is_empty());
        assert!(!pattern.matches("anything"));
    }

    #[test]
    fn test_serde_uses_source_string() {
        let pattern: KeyPattern = serde_json::from_str("\"user_\"").unwrap();
        assert_eq!(pattern.glob(), "*user_*");
        assert_eq!(serde_json::to_string(&pattern).unwrap(), "\"user_\"");
    }
}
