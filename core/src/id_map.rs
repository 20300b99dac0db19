//! Dense ID remapping.
//!
//! Opaque source identifiers (hex strings in the raw files) are replaced by
//! dense integers starting at 1, in first-encounter order. Value 0 is never
//! handed out, so it stays free as the "no offer" sentinel.
//!
//! RULE: the map is append-only for the lifetime of a run.

use std::collections::HashMap;
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct IdMap<K> {
    ids:   HashMap<K, u64>,
    order: Vec<K>,
}

impl<K: Eq + Hash + Clone> IdMap<K> {
    pub fn new() -> Self {
        Self {
            ids:   HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Build a map over `keys` in iteration order.
    pub fn build<I>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
    {
        let mut map = Self::new();
        for key in keys {
            map.assign(key);
        }
        map
    }

    /// Dense id for `key`, assigning the next counter value on first sight.
    pub fn assign(&mut self, key: K) -> u64 {
        if let Some(&id) = self.ids.get(&key) {
            return id;
        }
        let id = self.order.len() as u64 + 1;
        self.ids.insert(key.clone(), id);
        self.order.push(key);
        id
    }

    /// Pure lookup, never assigns.
    pub fn get(&self, key: &K) -> Option<u64> {
        self.ids.get(key).copied()
    }

    /// Original key for a dense id.
    pub fn original(&self, id: u64) -> Option<&K> {
        if id == 0 {
            return None;
        }
        self.order.get(id as usize - 1)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// `(original, dense)` pairs in assignment order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, u64)> + '_ {
        self.order
            .iter()
            .enumerate()
            .map(|(i, k)| (k, i as u64 + 1))
    }
}

impl<K: Eq + Hash + Clone> Default for IdMap<K> {
    fn default() -> Self {
        Self::new()
    }
}
