use indexmap::{Equivalent, IndexMap};

use std::hash::Hash;

/// Occurrence counters keyed by entity, kept in first-seen order.
/// Counts only ever grow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsageCounter<K: Hash + Eq> {
    counts: IndexMap<K, u32>,
}

impl<K: Hash + Eq> Default for UsageCounter<K> {
    fn default() -> Self {
        Self {
            counts: IndexMap::new(),
        }
    }
}

impl<K: Hash + Eq> UsageCounter<K> {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn record(&mut self, key: K) {
        self.record_many(key, 1);
    }

    pub fn record_many(&mut self, key: K, times: u32) {
        let count = self.counts.entry(key).or_insert(0);
        *count = count.saturating_add(times);
    }

    pub fn count<Q>(&self, key: &Q) -> u32
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        Q: ?Sized + Hash + Equivalent<K>,
    {
        self.counts.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.counts.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, u32)> {
        self.counts.iter().map(|(k, c)| (k, *c))
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl<K: Hash + Eq + Clone> UsageCounter<K> {
    /// Add every count of `other` into `self`.
    pub fn absorb(&mut self, other: &UsageCounter<K>) {
        for (key, count) in other.iter() {
            self.record_many(key.clone(), count);
        }
    }
}

/// Usage weights consulted by the fuzzy ranking.
pub trait UsageSource {
    fn usage(&self, name: &str) -> u32;
}

impl<K> UsageSource for UsageCounter<K>
where
    K: Hash + Eq + std::borrow::Borrow<str>,
{
    fn usage(&self, name: &str) -> u32 {
        self.count(name)
    }
}

impl UsageSource for std::collections::HashMap<String, u32> {
    fn usage(&self, name: &str) -> u32 {
        self.get(name).copied().unwrap_or(0)
    }
}
