//! An LRU-bounded plan cache keyed by a logical tree's digest (spec §4.10).
//!
//! Grounded on the teacher's `RuleManager` (`core/optimizer/rule.rs`): a
//! small, self-contained in-memory structure with no external crate pulled
//! in for something this local — the teacher reaches for `HashMap` +
//! `Vec`/`VecDeque` for every in-process registry of this size rather than
//! a dedicated cache crate.

use std::collections::{HashMap, VecDeque};

use crate::core::query::plan::PlanNode;

pub struct PlanCache {
    capacity: usize,
    entries: HashMap<u64, PlanNode>,
    order: VecDeque<u64>,
}

impl PlanCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { capacity: capacity.max(1), entries: HashMap::new(), order: VecDeque::new() }
    }

    #[must_use]
    pub fn get(&mut self, digest: u64) -> Option<PlanNode> {
        if !self.entries.contains_key(&digest) {
            return None;
        }
        self.touch(digest);
        self.entries.get(&digest).cloned()
    }

    pub fn insert(&mut self, digest: u64, plan: PlanNode) {
        if self.entries.insert(digest, plan).is_some() {
            self.touch(digest);
            return;
        }
        self.order.push_back(digest);
        if self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            }
        }
    }

    fn touch(&mut self, digest: u64) {
        if let Some(pos) = self.order.iter().position(|d| *d == digest) {
            self.order.remove(pos);
        }
        self.order.push_back(digest);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::plan::Operator;

    fn leaf(id: u64) -> PlanNode {
        PlanNode::leaf(id, Operator::EntityCount { schema: "main".to_string(), entity: "features".to_string() }, Vec::new(), Vec::new())
    }

    #[test]
    fn evicts_the_least_recently_used_entry_past_capacity() {
        let mut cache = PlanCache::new(2);
        cache.insert(1, leaf(1));
        cache.insert(2, leaf(2));
        cache.get(1);
        cache.insert(3, leaf(3));
        assert!(cache.get(2).is_none());
        assert!(cache.get(1).is_some());
        assert!(cache.get(3).is_some());
    }
}
