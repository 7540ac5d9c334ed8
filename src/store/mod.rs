pub mod orders;
pub mod producer_stats;

pub use orders::*;
pub use producer_stats::*;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

// Simple in-memory state store shared by the reference collaborators
pub struct StateStore<K, V> {
    data: Arc<DashMap<K, V>>,
}

impl<K, V> StateStore<K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            data: Arc::new(DashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.data.get(key).map(|entry| entry.value().clone())
    }

    pub fn put(&self, key: K, value: V) {
        self.data.insert(key, value);
    }

    /// Returns `false` when the key was already present
    pub fn insert_if_absent(&self, key: K, value: V) -> bool {
        match self.data.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(value);
                true
            }
        }
    }

    /// Swap in `value` only if the current one satisfies `expected`.
    ///
    /// `None` when the key is missing, otherwise whether the swap happened.
    pub fn replace_if<F>(&self, key: &K, expected: F, value: V) -> Option<bool>
    where
        F: FnOnce(&V) -> bool,
    {
        let mut entry = self.data.get_mut(key)?;
        if expected(entry.value()) {
            *entry.value_mut() = value;
            Some(true)
        } else {
            Some(false)
        }
    }

    pub fn update<F>(&self, key: &K, f: F) -> bool
    where
        F: FnOnce(&mut V),
    {
        match self.data.get_mut(key) {
            Some(mut entry) => {
                f(entry.value_mut());
                true
            }
            None => false,
        }
    }

    pub fn values(&self) -> Vec<V> {
        self.data.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<K, V> Default for StateStore<K, V>
where
    K: std::hash::Hash + Eq + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Clone for StateStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}
