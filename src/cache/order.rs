//! Eviction Order Module
//!
//! Tracks which memory-tier key leaves first when the tier is full.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// == Eviction Policy ==
/// Order in which entries are evicted from a full memory tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// Oldest insert goes first; reads and overwrites do not reorder
    #[default]
    Fifo,
    /// Least recently read or written goes first
    Lru,
}

impl FromStr for EvictionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fifo" => Ok(Self::Fifo),
            "lru" => Ok(Self::Lru),
            other => Err(format!("unknown eviction policy '{}'", other)),
        }
    }
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fifo => f.write_str("fifo"),
            Self::Lru => f.write_str("lru"),
        }
    }
}

// == Eviction Order ==
/// Keys ordered by eviction priority.
///
/// Keys are stored in a VecDeque where:
/// - Front = next to be evicted
/// - Back = most recently inserted (or, under LRU, used)
#[derive(Debug, Default)]
pub struct EvictionOrder {
    policy: EvictionPolicy,
    order: VecDeque<String>,
}

impl EvictionOrder {
    pub fn new(policy: EvictionPolicy) -> Self {
        Self {
            policy,
            order: VecDeque::new(),
        }
    }

    // == Inserted ==
    /// Records a write. A new key joins the back; an existing key keeps its
    /// place under FIFO and moves to the back under LRU.
    pub fn inserted(&mut self, key: &str, is_new: bool) {
        if is_new {
            self.order.push_back(key.to_string());
        } else if self.policy == EvictionPolicy::Lru {
            self.move_to_back(key);
        }
    }

    // == Accessed ==
    /// Records a read hit. Only LRU reorders.
    pub fn accessed(&mut self, key: &str) {
        if self.policy == EvictionPolicy::Lru {
            self.move_to_back(key);
        }
    }

    // == Remove ==
    /// Removes a key from the tracker.
    pub fn remove(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }

    /// Keeps only keys for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.order.retain(|k| keep(k));
    }

    // == Pop Oldest ==
    /// Returns and removes the next eviction candidate.
    pub fn pop_oldest(&mut self) -> Option<String> {
        self.order.pop_front()
    }

    /// Returns the next eviction candidate without removing it.
    pub fn peek_oldest(&self) -> Option<&str> {
        self.order.front().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn move_to_back(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }
}
