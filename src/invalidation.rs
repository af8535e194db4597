//! Invalidation Router
//!
//! Maps named domain events to the key patterns they make stale.

use tracing::{info, warn};

use crate::cache::CacheFacade;
use crate::pattern::KeyPattern;
use crate::policy::InvalidationRules;

#[derive(Debug, Clone)]
pub struct InvalidationRouter {
    rules: InvalidationRules,
}

impl InvalidationRouter {
    pub fn new(rules: InvalidationRules) -> Self {
        Self { rules }
    }

    /// Clears every pattern registered for `event` and returns the summed
    /// count. Unknown events are logged and remove nothing.
    pub async fn invalidate(&self, cache: &CacheFacade, event: &str) -> usize {
        let patterns = match self.rules.patterns_for(event) {
            Ok(patterns) => patterns,
            Err(err) => {
                warn!(event, error = %err, "Ignoring invalidation event");
                return 0;
            }
        };

        let mut removed = 0;
        for pattern in patterns {
            removed += cache.clear_pattern(pattern).await;
        }

        info!(event, patterns = patterns.len(), removed, "Invalidated cache entries");
        removed
    }

    pub fn events(&self) -> Vec<&str> {
        self.rules.events()
    }

    pub fn patterns_for(&self, event: &str) -> Option<&[KeyPattern]> {
        self.rules.patterns_for(event).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryStore;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn facade(rules: InvalidationRules) -> CacheFacade {
        let clock = Arc::new(ManualClock::new());
        CacheFacade::builder(Arc::new(InMemoryStore::new(clock.clone())))
            .clock(clock)
            .invalidation_rules(rules)
            .build()
    }

    #[tokio::test]
    async fn test_unknown_event_is_noop() {
        let cache = facade(InvalidationRules::bug_tracker_defaults());
        cache.set("user_42", &1, None).await;

        assert_eq!(cache.invalidate_by_event("no_such_event").await, 0);
        assert_eq!(cache.get::<u32>("user_42").await, Some(1));
    }

    #[tokio::test]
    async fn test_counts_both_tiers() {
        let cache = facade(InvalidationRules::new().with_event("chat", ["chat_"]));
        cache.set("chat_room_1", &1, None).await;
        cache.set("chat_room_2", &2, None).await;

        // Each key lives in both tiers
        assert_eq!(cache.invalidate_by_event("chat").await, 4);
        assert_eq!(cache.get::<u32>("chat_room_1").await, None);
    }

    #[tokio::test]
    async fn test_overlapping_patterns_are_counted_once_per_removal() {
        let cache = facade(InvalidationRules::new().with_event("bug", ["bug_", "bug_detail_"]));
        cache.set("bug_detail_1", &1, None).await;

        // The first pattern already removed the key
        assert_eq!(cache.invalidate_by_event("bug").await, 2);
    }

    #[test]
    fn test_router_lists_events() {
        let router = InvalidationRouter::new(InvalidationRules::bug_tracker_defaults());
        assert!(router.events().contains(&"bug_updated"));
        assert!(router.patterns_for("bug_updated").is_some());
        assert!(router.patterns_for("nope").is_none());
    }
}
