//! Ordered keyed storage for registry records.
//!
//! Services and type repositories are keyed by `(OrgId, local id)`, so every
//! child of one organization sits in a contiguous key range and can be listed
//! with a range scan instead of a full walk.

use std::collections::BTreeMap;

use crate::types::KeyBounds;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityStore<K, V> {
    records: BTreeMap<K, V>,
}

impl<K, V> Default for EntityStore<K, V> {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone, V> EntityStore<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record, returning the previous one.
    pub fn put(&mut self, key: K, record: V) -> Option<V> {
        self.records.insert(key, record)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.records.get(key)
    }

    /// Remove a record, returning it if it existed.
    pub fn delete(&mut self, key: &K) -> Option<V> {
        self.records.remove(key)
    }

    pub fn exists(&self, key: &K) -> bool {
        self.records.contains_key(key)
    }

    /// All keys in ascending order.
    pub fn list_keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.records.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl<S, L, V> EntityStore<(S, L), V>
where
    S: Ord + Copy,
    L: Ord + Copy + KeyBounds,
{
    /// Local ids stored under one scope, ascending.
    pub fn list_keys_in(&self, scope: S) -> Vec<L> {
        self.records
            .range((scope, L::MIN)..=(scope, L::MAX))
            .map(|((_, local), _)| *local)
            .collect()
    }
}
